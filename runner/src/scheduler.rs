use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use scribe_graph::{Graph, Node};
use tracing::{debug, debug_span, info};

use crate::report::{ExecutionReport, FailureKind, TaskReport, TaskStatus};
use crate::store::ArtifactStore;
use crate::task::{Requirement, ResolveError, RunContext, Task};
use crate::tracker::Tracker;

/// Fatal configuration error detected while planning, before any task runs.
#[derive(Debug, thiserror::Error)]
pub enum PlanError<T: Debug> {
  /// The requirement graph contains a cycle: `task` is transitively required
  /// by itself. `stack` is the requirement chain that closed the cycle.
  #[error("cyclic dependency: task {task:?} is transitively required by itself (chain: {stack:?})")]
  Cycle {
    /// The task found to require itself.
    task: T,
    /// The requirement chain from a target down to the cycle.
    stack: Vec<T>,
  },
  /// An artifact-producing task requires a wrapper task in a single or
  /// role-named position, where an artifact path would be needed.
  #[error("task {task:?} requires wrapper task(s) without an artifact in a non-list position{}",
    role.as_ref().map(|role| format!(" (role '{role}')")).unwrap_or_default())]
  WrapperInput {
    /// The requiring task.
    task: T,
    /// The role name, for named requirements.
    role: Option<String>,
  },
}

struct PlanNode<T> {
  task: T,
  requirement: Requirement<T>,
}

struct Plan<T> {
  graph: Graph<PlanNode<T>, ()>,
  order: Vec<Node>,
}

/// Resolves dependency graphs and executes missing tasks.
///
/// Owns the artifact store, the collaborator environment injected into every
/// `run()`, and a [`Tracker`] observing build events. Execution is
/// single-threaded and synchronous: tasks run to completion in topological
/// order, one at a time.
pub struct Scheduler<T: Task, S, A = ()> {
  store: S,
  env: T::Env,
  tracker: A,
}

impl<T: Task, S: ArtifactStore> Scheduler<T, S, ()> {
  /// Creates a scheduler without build-event tracking.
  #[inline]
  pub fn new(store: S, env: T::Env) -> Self {
    Self::with_tracker(store, env, ())
  }
}

impl<T: Task, S: ArtifactStore, A: Tracker<T>> Scheduler<T, S, A> {
  /// Creates a scheduler with the given [`Tracker`].
  #[inline]
  pub fn with_tracker(store: S, env: T::Env, tracker: A) -> Self {
    Self { store, env, tracker }
  }

  /// The artifact store.
  #[inline]
  pub fn store(&self) -> &S { &self.store }
  /// The collaborator environment.
  #[inline]
  pub fn env(&self) -> &T::Env { &self.env }
  /// The collaborator environment, mutably.
  #[inline]
  pub fn env_mut(&mut self) -> &mut T::Env { &mut self.env }
  /// The tracker.
  #[inline]
  pub fn tracker(&self) -> &A { &self.tracker }
  /// The tracker, mutably.
  #[inline]
  pub fn tracker_mut(&mut self) -> &mut A { &mut self.tracker }

  /// Resolves the transitive closure of `targets` and executes every task
  /// whose artifact is missing, in topological order.
  ///
  /// Tasks are deduplicated by identity, so a task required through several
  /// paths runs at most once. Tasks whose artifact already exists are cache
  /// hits and are skipped. A failing task marks all of its dependents failed
  /// without invoking them; unrelated branches still complete. Cycles and
  /// wrapper-input misconfigurations are reported as [`PlanError`] before
  /// anything runs.
  pub fn execute(&mut self, targets: &[T]) -> Result<ExecutionReport<T>, PlanError<T>> {
    self.tracker.plan_start(targets);
    let plan = plan(targets)?;
    self.tracker.plan_end(plan.order.len());
    debug!(targets = targets.len(), tasks = plan.order.len(), "plan resolved");

    let mut failed: HashSet<Node> = HashSet::new();
    let mut entries = Vec::with_capacity(plan.order.len());
    for node in &plan.order {
      let node = *node;
      let PlanNode { task, requirement } = plan.graph.node_data(node)
        .expect("plan order refers to plan nodes");
      let span = debug_span!("task", task = ?task);
      let _guard = span.enter();

      // Fail-fast: a task whose upstream failed is never executed.
      let failed_upstream = plan.graph.targets(node)
        .map(|(upstream, _)| upstream)
        .find(|upstream| failed.contains(upstream));
      if let Some(upstream) = failed_upstream {
        let upstream = plan.graph.node_data(upstream)
          .expect("plan edges refer to plan nodes")
          .task.clone();
        self.tracker.upstream_failed(task, &upstream);
        debug!(upstream = ?upstream, "skipped: upstream failed");
        failed.insert(node);
        entries.push(TaskReport {
          task: task.clone(),
          status: TaskStatus::Failed(FailureKind::Upstream { upstream }),
        });
        continue;
      }

      let Some(output) = task.output() else {
        // Wrapper task: completes once its requirements are done.
        entries.push(TaskReport { task: task.clone(), status: TaskStatus::Done { cached: false } });
        continue;
      };

      if self.store.exists(&output) {
        self.tracker.skip(task, &output);
        debug!(path = %output.display(), "cache hit");
        entries.push(TaskReport { task: task.clone(), status: TaskStatus::Done { cached: true } });
        continue;
      }

      self.tracker.execute_start(task);
      info!("executing");
      // Resolve OK: plans with wrapper upstreams in non-list positions of
      // artifact-producing tasks were rejected during planning.
      let input = requirement.resolve().expect("validated during planning");
      let result = {
        let mut context = RunContext::<T>::new(&output, &input, &self.store, &mut self.env);
        task.run(&mut context)
      };
      match result {
        Ok(()) => {
          self.tracker.execute_end(task);
          entries.push(TaskReport {
            task: task.clone(),
            status: TaskStatus::Done { cached: false },
          });
        }
        Err(error) => {
          self.tracker.fail(task, &error);
          info!(error = %error, "task failed");
          failed.insert(node);
          entries.push(TaskReport {
            task: task.clone(),
            status: TaskStatus::Failed(FailureKind::Run(error)),
          });
        }
      }
    }
    Ok(ExecutionReport::new(entries))
  }
}

/// Builds the transitive closure over `targets` with deduplication by task
/// identity, validates it, and topologically orders it.
fn plan<T: Task>(targets: &[T]) -> Result<Plan<T>, PlanError<T>> {
  let mut graph = Graph::new();
  let mut index: HashMap<T, Node> = HashMap::new();
  let mut stack: Vec<T> = Vec::new();
  for target in targets {
    visit(&mut graph, &mut index, &mut stack, target)?;
  }
  let order = graph.topological_order();
  Ok(Plan { graph, order })
}

fn visit<T: Task>(
  graph: &mut Graph<PlanNode<T>, ()>,
  index: &mut HashMap<T, Node>,
  stack: &mut Vec<T>,
  task: &T,
) -> Result<Node, PlanError<T>> {
  if let Some(node) = index.get(task) {
    if stack.contains(task) {
      return Err(PlanError::Cycle { task: task.clone(), stack: stack.clone() });
    }
    return Ok(*node);
  }

  let requirement = task.requires();
  if task.output().is_some() {
    // Wrapper upstreams contribute no artifact path; reject them early where
    // `run()` would need one.
    if let Err(ResolveError::WrapperUpstream { role }) = requirement.resolve() {
      return Err(PlanError::WrapperInput { task: task.clone(), role });
    }
  }

  let node = graph.add_node(PlanNode { task: task.clone(), requirement: requirement.clone() });
  index.insert(task.clone(), node);
  stack.push(task.clone());
  for upstream in requirement.tasks() {
    let upstream_node = visit(graph, index, stack, upstream)?;
    if graph.add_edge(node, upstream_node, ()).is_err() {
      return Err(PlanError::Cycle { task: upstream.clone(), stack: stack.clone() });
    }
  }
  stack.pop();
  Ok(node)
}
