use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hashlink::LinkedHashMap;

use crate::store::{ArtifactError, ArtifactStore};

/// The unit of work in the pipeline.
///
/// A task's identity is its value: two equal values denote the same task,
/// must resolve to the same artifact path, and are coalesced into a single
/// node when the scheduler builds its plan. Sequence-valued parameters are
/// therefore order-significant.
pub trait Task: Eq + Hash + Clone + Any + Debug {
  /// Environment of external collaborators, passed to [`run`](Self::run)
  /// through the [`RunContext`].
  type Env;

  /// Returns the upstream tasks this task requires. Must be a pure function
  /// of the task's parameters.
  fn requires(&self) -> Requirement<Self>;

  /// Returns the artifact path this task produces, or `None` for a wrapper
  /// task that only groups its requirements. Must be a pure function of the
  /// task's parameters (and, transitively, of upstream outputs): callable any
  /// number of times, before or after execution, always returning the same
  /// path.
  fn output(&self) -> Option<PathBuf>;

  /// Executes the task. Reads upstream artifacts through
  /// [`RunContext::input`], performs its computation against
  /// [`RunContext::env`], and publishes exactly one artifact at
  /// [`output`](Self::output) via [`RunContext::publish`]. Never invoked for
  /// wrapper tasks, nor when the output artifact already exists.
  fn run(&self, context: &mut RunContext<Self>) -> Result<(), TaskError>;

  /// Returns `true` if this is a wrapper task without an artifact.
  #[inline]
  fn is_wrapper(&self) -> bool { self.output().is_none() }
}

/// The upstream tasks a task requires: none, a single task, an ordered list,
/// or a mapping from role name to task so `run()` can address a specific
/// upstream (e.g. `"model"` vs `"dataset"`).
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Requirement<T> {
  /// No upstream tasks.
  None,
  /// A single upstream task.
  Single(Box<T>),
  /// An ordered list of upstream tasks.
  List(Vec<T>),
  /// Role-named upstream tasks, iterated in declaration order.
  Named(LinkedHashMap<String, T>),
}

impl<T> Requirement<T> {
  /// Creates a [`Requirement::Single`].
  #[inline]
  pub fn single(task: T) -> Self { Self::Single(Box::new(task)) }

  /// Creates a [`Requirement::List`].
  #[inline]
  pub fn list(tasks: impl IntoIterator<Item = T>) -> Self {
    Self::List(tasks.into_iter().collect())
  }

  /// Creates a [`Requirement::Named`]; roles keep their given order.
  #[inline]
  pub fn named<R: Into<String>>(tasks: impl IntoIterator<Item = (R, T)>) -> Self {
    Self::Named(tasks.into_iter().map(|(role, task)| (role.into(), task)).collect())
  }

  /// Traverses the required tasks uniformly, regardless of variant.
  pub fn tasks(&self) -> impl Iterator<Item = &T> {
    let tasks: Vec<&T> = match self {
      Self::None => Vec::new(),
      Self::Single(task) => vec![task],
      Self::List(tasks) => tasks.iter().collect(),
      Self::Named(tasks) => tasks.values().collect(),
    };
    tasks.into_iter()
  }

  /// Returns the number of required tasks.
  #[inline]
  pub fn len(&self) -> usize {
    match self {
      Self::None => 0,
      Self::Single(_) => 1,
      Self::List(tasks) => tasks.len(),
      Self::Named(tasks) => tasks.len(),
    }
  }

  /// Returns `true` if no tasks are required.
  #[inline]
  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl<T: Task> Requirement<T> {
  /// Resolves this requirement into the [`Input`] view passed to `run()`:
  /// the same shape, with every task replaced by its output path.
  ///
  /// Wrapper upstreams have no path to contribute: they are skipped in
  /// [`Requirement::List`] and rejected in the single and named variants.
  pub fn resolve(&self) -> Result<Input, ResolveError> {
    match self {
      Self::None => Ok(Input::None),
      Self::Single(task) => task.output()
        .map(Input::Single)
        .ok_or(ResolveError::WrapperUpstream { role: None }),
      Self::List(tasks) => {
        Ok(Input::List(tasks.iter().filter_map(|task| task.output()).collect()))
      }
      Self::Named(tasks) => {
        let mut paths = LinkedHashMap::new();
        for (role, task) in tasks {
          let path = task.output()
            .ok_or_else(|| ResolveError::WrapperUpstream { role: Some(role.clone()) })?;
          paths.insert(role.clone(), path);
        }
        Ok(Input::Named(paths))
      }
    }
  }
}

/// Error resolving a [`Requirement`] into an [`Input`]: a wrapper task was
/// used where an artifact path is needed. Detected during planning, before
/// any task runs.
#[derive(Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum ResolveError {
  /// A single or role-named upstream is a wrapper task without an artifact.
  #[error("upstream{} is a wrapper task without an artifact", role_suffix(role))]
  WrapperUpstream {
    /// The role name, for named requirements.
    role: Option<String>,
  },
}

fn role_suffix(role: &Option<String>) -> String {
  role.as_ref().map(|role| format!(" '{role}'")).unwrap_or_default()
}

/// The resolved upstream artifact paths passed to `run()`.
///
/// Always mirrors the shape of the task's [`Requirement`] exactly; the
/// accessors fail on a shape mismatch instead of coercing, so addressing
/// mistakes surface as errors rather than reads of the wrong artifact.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Input {
  /// No upstream artifacts.
  None,
  /// The artifact of a single upstream.
  Single(PathBuf),
  /// Artifacts of a list of upstreams, in requirement order.
  List(Vec<PathBuf>),
  /// Artifacts of role-named upstreams.
  Named(LinkedHashMap<String, PathBuf>),
}

impl Input {
  /// Returns the single upstream artifact path.
  pub fn single(&self) -> Result<&Path, TaskError> {
    match self {
      Self::Single(path) => Ok(path),
      _ => Err(TaskError::InputShape { expected: "single" }),
    }
  }

  /// Returns the artifact path of the upstream with given `role`.
  pub fn get(&self, role: &str) -> Result<&Path, TaskError> {
    match self {
      Self::Named(paths) => paths.get(role)
        .map(PathBuf::as_path)
        .ok_or_else(|| TaskError::UnknownRole { role: role.to_string() }),
      _ => Err(TaskError::InputShape { expected: "named" }),
    }
  }

  /// Returns the artifact paths of a list requirement.
  pub fn list(&self) -> Result<&[PathBuf], TaskError> {
    match self {
      Self::List(paths) => Ok(paths),
      _ => Err(TaskError::InputShape { expected: "list" }),
    }
  }
}

/// Error produced by a task's `run()`.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
  /// A required upstream artifact could not be read.
  #[error("required artifact '{}' could not be read", path.display())]
  MissingInput {
    /// Path of the unreadable artifact.
    path: PathBuf,
    /// Underlying store error.
    #[source]
    source: ArtifactError,
  },
  /// A required upstream artifact was read but could not be decoded.
  #[error("required artifact '{}' is malformed: {reason}", path.display())]
  CorruptInput {
    /// Path of the malformed artifact.
    path: PathBuf,
    /// Why decoding failed.
    reason: String,
  },
  /// The input was addressed with the wrong shape accessor.
  #[error("input shape mismatch: expected a {expected} requirement")]
  InputShape {
    /// The shape the accessor expected.
    expected: &'static str,
  },
  /// The input has no upstream with the given role.
  #[error("input has no upstream with role '{role}'")]
  UnknownRole {
    /// The unknown role name.
    role: String,
  },
  /// Reading or publishing an artifact failed.
  #[error(transparent)]
  Artifact(#[from] ArtifactError),
  /// A parameter or external file (e.g. a model-definition JSON) is invalid.
  #[error("configuration error: {0}")]
  Config(String),
  /// An external collaborator failed during the computation.
  #[error("computation failed: {0}")]
  Computation(String),
}

/// Everything a task may touch while running: its resolved input, the
/// artifact store, the collaborator environment, and its own output path.
pub struct RunContext<'a, T: Task> {
  output: &'a Path,
  input: &'a Input,
  store: &'a dyn ArtifactStore,
  env: &'a mut T::Env,
}

impl<'a, T: Task> RunContext<'a, T> {
  #[inline]
  pub(crate) fn new(
    output: &'a Path,
    input: &'a Input,
    store: &'a dyn ArtifactStore,
    env: &'a mut T::Env,
  ) -> Self {
    Self { output, input, store, env }
  }

  /// The resolved upstream artifact paths, mirroring `requires()`.
  #[inline]
  pub fn input(&self) -> &Input { self.input }

  /// The collaborator environment.
  #[inline]
  pub fn env(&mut self) -> &mut T::Env { self.env }

  /// The artifact store.
  #[inline]
  pub fn store(&self) -> &dyn ArtifactStore { self.store }

  /// Reads the upstream artifact at `path`, mapping failures to
  /// [`TaskError::MissingInput`] so the task is marked failed without
  /// publishing anything.
  pub fn read_input(&self, path: &Path) -> Result<Vec<u8>, TaskError> {
    self.store.read(path).map_err(|source| TaskError::MissingInput {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Publishes the task's own artifact by streaming `produce` into the
  /// store, which writes to a temporary location and atomically renames on
  /// success. A failing producer publishes nothing.
  pub fn publish(
    &self,
    produce: impl FnOnce(&mut dyn Write) -> io::Result<()>,
  ) -> Result<(), TaskError> {
    let mut produce = Some(produce);
    self.store.write(self.output, &mut |writer| {
      let produce = produce.take().expect("producer invoked once");
      produce(writer)
    })?;
    Ok(())
  }

  /// Publishes the task's own artifact from an in-memory buffer.
  #[inline]
  pub fn publish_bytes(&self, bytes: &[u8]) -> Result<(), TaskError> {
    self.publish(|writer| writer.write_all(bytes))
  }

  /// Publishes a directory-shaped artifact: `produce` fills a temporary
  /// directory which is atomically moved to the task's output path on
  /// success.
  pub fn publish_dir(
    &self,
    produce: impl FnOnce(&Path) -> io::Result<()>,
  ) -> Result<(), TaskError> {
    let mut produce = Some(produce);
    self.store.write_dir(self.output, &mut |dir| {
      let produce = produce.take().expect("producer invoked once");
      produce(dir)
    })?;
    Ok(())
  }
}
