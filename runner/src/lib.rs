#![forbid(unsafe_code)]

//! A task-dependency runner with file-artifact caching, built for the
//! cuneiform sign-classification pipeline in `scribe_pipeline` but generic
//! over any [`Task`] type.
//!
//! Tasks declare typed parameters (their value is their identity), a
//! [`Requirement`] on upstream tasks, and a deterministic output artifact
//! path. The [`Scheduler`] resolves the transitive closure over requested
//! targets, rejects cyclic configurations before anything runs, topologically
//! orders the closure, and executes only the tasks whose artifact is missing:
//! existing artifacts are cache hits. Artifacts are published atomically
//! through an [`ArtifactStore`], so an interrupted run never leaves a
//! complete-looking artifact behind and a subsequent run resumes from the
//! first incomplete task.

pub mod report;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod tracker;

pub use report::{ExecutionReport, FailureKind, TaskReport, TaskStatus};
pub use scheduler::{PlanError, Scheduler};
pub use store::{ArtifactError, ArtifactStore, FsStore, MemoryStore};
pub use task::{Input, Requirement, RunContext, Task, TaskError};
pub use tracker::{CompositeTracker, Tracker};
