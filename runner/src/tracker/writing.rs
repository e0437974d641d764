use std::io::{self, Stderr, Stdout, Write};
use std::path::Path;

use crate::task::{Task, TaskError};
use crate::tracker::Tracker;

/// A [`Tracker`] that writes a human-readable build log to a [`Write`]r,
/// useful for debugging scheduler behavior.
#[derive(Debug)]
pub struct WritingTracker<W> {
  writer: W,
}

impl WritingTracker<Stdout> {
  /// Creates a tracker writing to stdout.
  #[inline]
  pub fn with_stdout() -> Self { Self::new(io::stdout()) }
}

impl WritingTracker<Stderr> {
  /// Creates a tracker writing to stderr.
  #[inline]
  pub fn with_stderr() -> Self { Self::new(io::stderr()) }
}

impl<W: Write> WritingTracker<W> {
  /// Creates a tracker writing to `writer`.
  #[inline]
  pub fn new(writer: W) -> Self { Self { writer } }

  /// The underlying writer.
  #[inline]
  pub fn writer(&self) -> &W { &self.writer }

  #[inline]
  fn writeln(&mut self, args: std::fmt::Arguments) {
    // Swallow write failures: the log is best-effort and must not affect the
    // build outcome.
    let _ = writeln!(self.writer, "{args}");
    let _ = self.writer.flush();
  }
}

impl<T: Task, W: Write> Tracker<T> for WritingTracker<W> {
  fn plan_start(&mut self, targets: &[T]) {
    self.writeln(format_args!("planning {} target(s)", targets.len()));
  }
  fn plan_end(&mut self, task_count: usize) {
    self.writeln(format_args!("plan resolved: {task_count} task(s)"));
  }
  fn execute_start(&mut self, task: &T) {
    self.writeln(format_args!("> {task:?}"));
  }
  fn execute_end(&mut self, task: &T) {
    self.writeln(format_args!("< {task:?}"));
  }
  fn skip(&mut self, task: &T, path: &Path) {
    self.writeln(format_args!("= {task:?} (cached at '{}')", path.display()));
  }
  fn fail(&mut self, task: &T, error: &TaskError) {
    self.writeln(format_args!("X {task:?}: {error}"));
  }
  fn upstream_failed(&mut self, task: &T, upstream: &T) {
    self.writeln(format_args!("X {task:?}: not run, upstream {upstream:?} failed"));
  }
}
