use crate::task::{Task, TaskError};

/// Final status of a task in an [`ExecutionReport`].
///
/// `pending` and `running` are transient states observable through a
/// [`Tracker`](crate::tracker::Tracker); the report records where each task
/// ended up.
#[derive(Debug)]
pub enum TaskStatus<T> {
  /// The task completed. `cached` is `true` when its artifact already
  /// existed and `run()` was skipped; wrapper tasks complete uncached once
  /// their requirements are done.
  Done {
    /// Whether completion was a cache hit.
    cached: bool,
  },
  /// The task failed; its artifact was not published.
  Failed(FailureKind<T>),
}

/// Why a task failed.
#[derive(Debug)]
pub enum FailureKind<T> {
  /// The task's own `run()` returned an error.
  Run(TaskError),
  /// A required upstream task failed, so `run()` was never invoked.
  Upstream {
    /// The failed upstream task.
    upstream: T,
  },
}

/// One task's outcome within an [`ExecutionReport`].
#[derive(Debug)]
pub struct TaskReport<T> {
  /// The task.
  pub task: T,
  /// Its final status.
  pub status: TaskStatus<T>,
}

/// Outcome of [`Scheduler::execute`](crate::scheduler::Scheduler::execute):
/// every task of the plan's closure in execution (topological) order, with
/// its final status.
#[derive(Debug, Default)]
pub struct ExecutionReport<T> {
  entries: Vec<TaskReport<T>>,
}

impl<T: Task> ExecutionReport<T> {
  #[inline]
  pub(crate) fn new(entries: Vec<TaskReport<T>>) -> Self { Self { entries } }

  /// All entries in execution order.
  #[inline]
  pub fn entries(&self) -> &[TaskReport<T>] { &self.entries }

  /// Returns `true` if every task completed.
  #[inline]
  pub fn is_success(&self) -> bool {
    self.entries.iter().all(|entry| matches!(entry.status, TaskStatus::Done { .. }))
  }

  /// The failed tasks with their failure reasons, in execution order.
  pub fn failed(&self) -> impl Iterator<Item = (&T, &FailureKind<T>)> {
    self.entries.iter().filter_map(|entry| match &entry.status {
      TaskStatus::Failed(kind) => Some((&entry.task, kind)),
      TaskStatus::Done { .. } => None,
    })
  }

  /// The status of `task`, if it was part of the plan.
  pub fn status_of(&self, task: &T) -> Option<&TaskStatus<T>> {
    self.entries.iter().find(|entry| &entry.task == task).map(|entry| &entry.status)
  }

  /// Number of tasks whose `run()` was invoked (completed, not cached, and
  /// not a wrapper).
  pub fn executed_count(&self) -> usize {
    self.entries.iter()
      .filter(|entry| {
        matches!(entry.status, TaskStatus::Done { cached: false }) && !entry.task.is_wrapper()
      })
      .count()
  }

  /// Number of cache hits: tasks skipped because their artifact existed.
  pub fn cached_count(&self) -> usize {
    self.entries.iter()
      .filter(|entry| matches!(entry.status, TaskStatus::Done { cached: true }))
      .count()
  }

  /// Renders a failure summary enumerating which tasks failed and why, or
  /// `None` when everything completed.
  pub fn failure_summary(&self) -> Option<String> {
    if self.is_success() {
      return None;
    }
    let mut summary = String::new();
    for (task, kind) in self.failed() {
      match kind {
        FailureKind::Run(error) => {
          summary.push_str(&format!("task {task:?} failed: {error}\n"));
        }
        FailureKind::Upstream { upstream } => {
          summary.push_str(&format!("task {task:?} not run: upstream {upstream:?} failed\n"));
        }
      }
    }
    Some(summary)
  }
}
