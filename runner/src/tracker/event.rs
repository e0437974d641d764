use std::path::{Path, PathBuf};

use crate::task::{Task, TaskError};
use crate::tracker::Tracker;

/// A [`Tracker`] that stores [`Event`]s in a [`Vec`], useful in testing to
/// assert that the scheduler is incremental and correct.
#[derive(Clone, Debug)]
pub struct EventTracker<T> {
  events: Vec<Event<T>>,
  clear_on_plan_start: bool,
}

impl<T> Default for EventTracker<T> {
  fn default() -> Self {
    Self { events: Vec::new(), clear_on_plan_start: true }
  }
}

/// Enumeration of important build events.
#[derive(Clone, Debug)]
pub enum Event<T> {
  /// Start: planning a build of `targets`.
  PlanStart {
    /// The requested target tasks.
    targets: Vec<T>,
  },
  /// End: resolved a plan containing `task_count` tasks.
  PlanEnd {
    /// Number of tasks in the closure.
    task_count: usize,
  },
  /// Start: executing `task`.
  ExecuteStart {
    /// The executing task.
    task: T,
    /// Position in the event sequence.
    index: usize,
  },
  /// End: executed `task` successfully.
  ExecuteEnd {
    /// The executed task.
    task: T,
    /// Position in the event sequence.
    index: usize,
  },
  /// Skipped `task` because its artifact already exists at `path`.
  Skip {
    /// The skipped task.
    task: T,
    /// The existing artifact path.
    path: PathBuf,
    /// Position in the event sequence.
    index: usize,
  },
  /// `task` failed.
  Fail {
    /// The failed task.
    task: T,
    /// Rendered failure message.
    message: String,
    /// Position in the event sequence.
    index: usize,
  },
  /// `task` was not executed because `upstream` failed.
  UpstreamFailed {
    /// The task that was never invoked.
    task: T,
    /// The failed upstream.
    upstream: T,
    /// Position in the event sequence.
    index: usize,
  },
}

impl<T: Task> EventTracker<T> {
  /// All recorded events.
  #[inline]
  pub fn slice(&self) -> &[Event<T>] { &self.events }

  /// Index of the `ExecuteStart` event of `task`, if any.
  pub fn index_execute_start(&self, task: &T) -> Option<usize> {
    self.events.iter().position(|event| {
      matches!(event, Event::ExecuteStart { task: t, .. } if t == task)
    })
  }

  /// Index of the `ExecuteEnd` event of `task`, if any.
  pub fn index_execute_end(&self, task: &T) -> Option<usize> {
    self.events.iter().position(|event| {
      matches!(event, Event::ExecuteEnd { task: t, .. } if t == task)
    })
  }

  /// Index of the `Skip` (cache hit) event of `task`, if any.
  pub fn index_skip(&self, task: &T) -> Option<usize> {
    self.events.iter().position(|event| {
      matches!(event, Event::Skip { task: t, .. } if t == task)
    })
  }

  /// Returns `true` if any task was executed.
  pub fn any_execute(&self) -> bool {
    self.events.iter().any(|event| matches!(event, Event::ExecuteStart { .. }))
  }

  /// Returns `true` if `task` was executed.
  pub fn any_execute_of(&self, task: &T) -> bool {
    self.index_execute_start(task).is_some()
  }

  /// Returns `true` if `task` was executed exactly once.
  pub fn one_execute_of(&self, task: &T) -> bool {
    let count = self.events.iter()
      .filter(|event| matches!(event, Event::ExecuteStart { task: t, .. } if t == task))
      .count();
    count == 1
  }

  /// Number of `ExecuteStart` events.
  pub fn execute_count(&self) -> usize {
    self.events.iter()
      .filter(|event| matches!(event, Event::ExecuteStart { .. }))
      .count()
  }

  /// Returns `true` if `task` failed (own failure, not upstream).
  pub fn any_fail_of(&self, task: &T) -> bool {
    self.events.iter().any(|event| {
      matches!(event, Event::Fail { task: t, .. } if t == task)
    })
  }

  /// Returns `true` if `task` was marked failed due to a failed upstream.
  pub fn any_upstream_fail_of(&self, task: &T) -> bool {
    self.events.iter().any(|event| {
      matches!(event, Event::UpstreamFailed { task: t, .. } if t == task)
    })
  }
}

impl<T: Task> Tracker<T> for EventTracker<T> {
  #[inline]
  fn plan_start(&mut self, targets: &[T]) {
    if self.clear_on_plan_start {
      self.events.clear();
    }
    self.events.push(Event::PlanStart { targets: targets.to_vec() });
  }
  #[inline]
  fn plan_end(&mut self, task_count: usize) {
    self.events.push(Event::PlanEnd { task_count });
  }
  #[inline]
  fn execute_start(&mut self, task: &T) {
    let index = self.events.len();
    self.events.push(Event::ExecuteStart { task: task.clone(), index });
  }
  #[inline]
  fn execute_end(&mut self, task: &T) {
    let index = self.events.len();
    self.events.push(Event::ExecuteEnd { task: task.clone(), index });
  }
  #[inline]
  fn skip(&mut self, task: &T, path: &Path) {
    let index = self.events.len();
    self.events.push(Event::Skip { task: task.clone(), path: path.to_path_buf(), index });
  }
  #[inline]
  fn fail(&mut self, task: &T, error: &TaskError) {
    let index = self.events.len();
    self.events.push(Event::Fail { task: task.clone(), message: error.to_string(), index });
  }
  #[inline]
  fn upstream_failed(&mut self, task: &T, upstream: &T) {
    let index = self.events.len();
    self.events.push(Event::UpstreamFailed {
      task: task.clone(),
      upstream: upstream.clone(),
      index,
    });
  }
}
