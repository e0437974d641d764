//! Common tasks for testing the runner.

use std::io;
use std::path::PathBuf;

use scribe::{Requirement, RunContext, Task, TaskError};

/// Every task the runner tests use, as one closed enum.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum TestTask {
  /// Publishes a fixed string.
  Constant(Constant),
  /// Concatenates the artifacts of a list of upstream tasks.
  Concat(Concat),
  /// Joins two role-named upstream artifacts with a `+`.
  Combine(Combine),
  /// Always fails with a computation error.
  Fail(Fail),
  /// Writes some bytes, then fails mid-stream.
  PartialWrite(PartialWrite),
  /// Wrapper grouping a list of upstream tasks, without an artifact.
  Group(Group),
  /// Requires itself.
  SelfCycle(PathBuf),
  /// Requires [`TestTask::CycleB`] with the same path.
  CycleA(PathBuf),
  /// Requires [`TestTask::CycleA`] with the same path.
  CycleB(PathBuf),
}

/// Publishes a fixed string.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Constant(pub PathBuf, pub String);

/// Concatenates the artifacts of a list of upstream tasks.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Concat(pub PathBuf, pub Vec<TestTask>);

/// Joins two role-named upstream artifacts with a `+`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Combine(pub PathBuf, pub Box<TestTask>, pub Box<TestTask>);

/// Always fails with a computation error.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Fail(pub PathBuf, pub String);

/// Writes some bytes, then fails mid-stream.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct PartialWrite(pub PathBuf);

/// Wrapper grouping a list of upstream tasks, without an artifact.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Group(pub Vec<TestTask>);

impl TestTask {
  /// Creates a task that publishes `text` at `path`.
  pub fn constant(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
    Self::Constant(Constant(path.into(), text.into()))
  }

  /// Creates a task that concatenates the artifacts of `inputs` at `path`.
  pub fn concat(path: impl Into<PathBuf>, inputs: impl IntoIterator<Item = TestTask>) -> Self {
    Self::Concat(Concat(path.into(), inputs.into_iter().collect()))
  }

  /// Creates a task that joins the artifacts of `left` and `right` at `path`.
  pub fn combine(path: impl Into<PathBuf>, left: TestTask, right: TestTask) -> Self {
    Self::Combine(Combine(path.into(), Box::new(left), Box::new(right)))
  }

  /// Creates a task that fails with `message`.
  pub fn fail(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
    Self::Fail(Fail(path.into(), message.into()))
  }

  /// Creates a task whose producer fails after writing some bytes.
  pub fn partial_write(path: impl Into<PathBuf>) -> Self {
    Self::PartialWrite(PartialWrite(path.into()))
  }

  /// Creates a wrapper task grouping `inputs`.
  pub fn group(inputs: impl IntoIterator<Item = TestTask>) -> Self {
    Self::Group(Group(inputs.into_iter().collect()))
  }

  /// Creates a task that requires itself.
  pub fn self_cycle(path: impl Into<PathBuf>) -> Self {
    Self::SelfCycle(path.into())
  }

  /// Creates two tasks that require each other.
  pub fn cycle_pair(path: impl Into<PathBuf>) -> (Self, Self) {
    let path = path.into();
    (Self::CycleA(path.clone()), Self::CycleB(path))
  }
}

impl Task for TestTask {
  type Env = ();

  fn requires(&self) -> Requirement<Self> {
    match self {
      Self::Constant(_) | Self::Fail(_) | Self::PartialWrite(_) => Requirement::None,
      Self::Concat(Concat(_, inputs)) => Requirement::list(inputs.iter().cloned()),
      Self::Combine(Combine(_, left, right)) => Requirement::named([
        ("left", left.as_ref().clone()),
        ("right", right.as_ref().clone()),
      ]),
      Self::Group(Group(inputs)) => Requirement::list(inputs.iter().cloned()),
      Self::SelfCycle(_) => Requirement::single(self.clone()),
      Self::CycleA(path) => Requirement::single(Self::CycleB(path.clone())),
      Self::CycleB(path) => Requirement::single(Self::CycleA(path.clone())),
    }
  }

  fn output(&self) -> Option<PathBuf> {
    match self {
      Self::Constant(Constant(path, _)) => Some(path.clone()),
      Self::Concat(Concat(path, _)) => Some(path.clone()),
      Self::Combine(Combine(path, _, _)) => Some(path.clone()),
      Self::Fail(Fail(path, _)) => Some(path.clone()),
      Self::PartialWrite(PartialWrite(path)) => Some(path.clone()),
      Self::Group(_) => None,
      Self::SelfCycle(path) => Some(path.clone()),
      Self::CycleA(path) => Some(path.with_extension("a")),
      Self::CycleB(path) => Some(path.with_extension("b")),
    }
  }

  fn run(&self, context: &mut RunContext<Self>) -> Result<(), TaskError> {
    match self {
      Self::Constant(Constant(_, text)) => context.publish_bytes(text.as_bytes()),
      Self::Concat(_) => {
        let mut bytes = Vec::new();
        for path in context.input().list()? {
          bytes.extend(context.read_input(path)?);
        }
        context.publish_bytes(&bytes)
      }
      Self::Combine(_) => {
        let left = context.read_input(context.input().get("left")?)?;
        let right = context.read_input(context.input().get("right")?)?;
        context.publish(|writer| {
          writer.write_all(&left)?;
          writer.write_all(b"+")?;
          writer.write_all(&right)
        })
      }
      Self::Fail(Fail(_, message)) => Err(TaskError::Computation(message.clone())),
      Self::PartialWrite(_) => context.publish(|writer| {
        writer.write_all(b"partial")?;
        Err(io::Error::new(io::ErrorKind::Other, "producer failed mid-stream"))
      }),
      // Wrappers and cycle tasks never get to run.
      Self::Group(_) | Self::SelfCycle(_) | Self::CycleA(_) | Self::CycleB(_) => Ok(()),
    }
  }
}
