use std::path::Path;

use crate::task::{Task, TaskError};

pub mod event;
pub mod writing;

/// Build event tracker. Can be used to implement logging, progress tracking,
/// metrics, or test assertions over scheduler behavior.
#[allow(unused_variables)]
pub trait Tracker<T: Task> {
  /// Start: planning a build of `targets`.
  #[inline]
  fn plan_start(&mut self, targets: &[T]) {}
  /// End: resolved a plan containing `task_count` tasks.
  #[inline]
  fn plan_end(&mut self, task_count: usize) {}

  /// Start: executing `task`.
  #[inline]
  fn execute_start(&mut self, task: &T) {}
  /// End: executed `task` successfully; its artifact is published.
  #[inline]
  fn execute_end(&mut self, task: &T) {}

  /// Skipped `task`: its artifact already exists at `path` (cache hit).
  #[inline]
  fn skip(&mut self, task: &T, path: &Path) {}
  /// `task` failed with `error`; nothing was published.
  #[inline]
  fn fail(&mut self, task: &T, error: &TaskError) {}
  /// `task` was not executed because required `upstream` failed.
  #[inline]
  fn upstream_failed(&mut self, task: &T, upstream: &T) {}
}

/// Implement [`Tracker`] for `()` that does nothing.
impl<T: Task> Tracker<T> for () {}

/// A [`Tracker`] that forwards events to two [`Tracker`]s.
#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub struct CompositeTracker<A1, A2>(pub A1, pub A2);

impl<A1, A2> CompositeTracker<A1, A2> {
  /// Creates a composite of the two given trackers.
  #[inline]
  pub fn new(tracker_1: A1, tracker_2: A2) -> Self { Self(tracker_1, tracker_2) }
}

impl<T: Task, A1: Tracker<T>, A2: Tracker<T>> Tracker<T> for CompositeTracker<A1, A2> {
  #[inline]
  fn plan_start(&mut self, targets: &[T]) {
    self.0.plan_start(targets);
    self.1.plan_start(targets);
  }
  #[inline]
  fn plan_end(&mut self, task_count: usize) {
    self.0.plan_end(task_count);
    self.1.plan_end(task_count);
  }
  #[inline]
  fn execute_start(&mut self, task: &T) {
    self.0.execute_start(task);
    self.1.execute_start(task);
  }
  #[inline]
  fn execute_end(&mut self, task: &T) {
    self.0.execute_end(task);
    self.1.execute_end(task);
  }
  #[inline]
  fn skip(&mut self, task: &T, path: &Path) {
    self.0.skip(task, path);
    self.1.skip(task, path);
  }
  #[inline]
  fn fail(&mut self, task: &T, error: &TaskError) {
    self.0.fail(task, error);
    self.1.fail(task, error);
  }
  #[inline]
  fn upstream_failed(&mut self, task: &T, upstream: &T) {
    self.0.upstream_failed(task, upstream);
    self.1.upstream_failed(task, upstream);
  }
}
