//! Test fixtures for the runner and the pipeline.

use std::io::Stdout;

use rstest::fixture;
use tempfile::TempDir;

use scribe::tracker::event::EventTracker;
use scribe::tracker::writing::WritingTracker;
use scribe::{CompositeTracker, MemoryStore, Scheduler, Task};

use scribe_pipeline::PipelineTask;

use crate::collab::stub_toolbox;
use crate::task::TestTask;

/// Tracker combination used in tests: event tracking for assertions and
/// stdout writing for debugging.
pub type TestTracker<T> = CompositeTracker<EventTracker<T>, WritingTracker<Stdout>>;

/// Scheduler over [`TestTask`]s with an in-memory store.
pub type TestScheduler = Scheduler<TestTask, MemoryStore, TestTracker<TestTask>>;

/// Scheduler over [`PipelineTask`]s with an in-memory store and stub
/// collaborators.
pub type PipelineScheduler = Scheduler<PipelineTask, MemoryStore, TestTracker<PipelineTask>>;

fn test_tracker<T: Task>() -> TestTracker<T> {
  CompositeTracker(EventTracker::default(), WritingTracker::with_stdout())
}

/// Creates a [`TestScheduler`].
#[inline]
pub fn create_test_scheduler() -> TestScheduler {
  Scheduler::with_tracker(MemoryStore::new(), (), test_tracker())
}

/// Creates a [`PipelineScheduler`] backed by [`stub_toolbox`].
#[inline]
pub fn create_pipeline_scheduler() -> PipelineScheduler {
  Scheduler::with_tracker(MemoryStore::new(), stub_toolbox(), test_tracker())
}

/// Events recorded by a test scheduler's tracker.
#[inline]
pub fn events<T: Task, S>(scheduler: &Scheduler<T, S, TestTracker<T>>) -> &EventTracker<T>
where
  S: scribe::ArtifactStore,
{
  &scheduler.tracker().0
}

// Fixtures

#[fixture]
#[inline]
pub fn scheduler() -> TestScheduler {
  create_test_scheduler()
}

#[fixture]
#[inline]
pub fn pipeline_scheduler() -> PipelineScheduler {
  create_pipeline_scheduler()
}

#[fixture]
#[inline]
pub fn temp_dir() -> TempDir {
  crate::create_temp_dir()
}
