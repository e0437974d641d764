//! Cuneiform sign classification pipeline.
//!
//! One closed task enum covers the whole experiment: assemble a split
//! dataset from labeled sign images, train an estimator on it, evaluate on
//! the held-out test split, and render analysis artifacts. Every task's
//! artifact path derives from its [`ExperimentParams`], so re-running an
//! experiment only executes what is not cached yet.
//!
//! The numeric and graphical heavy lifting lives behind the collaborator
//! traits in [`collab`]; the pipeline itself only orchestrates.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use scribe::{Requirement, RunContext, Task, TaskError};

pub mod archive;
pub mod collab;
pub mod dataset;
pub mod evaluate;
pub mod params;
pub mod plot;
pub mod train;

pub use archive::{ConfusionMatrix, DatasetArchive, Image};
pub use collab::Toolbox;
pub use params::{ExperimentParams, ModelDefinition, ParamError, SplitFractions};
pub use train::EstimatorKind;

use collab::CollabError;

/// Every task of the pipeline. Task identity is the variant plus its
/// parameters; equal values are coalesced into one plan node.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum PipelineTask {
  /// Assemble and publish the packed dataset archive.
  AssignDataset(dataset::AssignDataset),
  /// Fit one estimator and publish the model bytes.
  TrainModel(train::TrainModel),
  /// Publish the test confusion matrix.
  TestModel(evaluate::TestModel),
  /// Publish the plain-text classification report.
  ClassificationReport(evaluate::ClassificationReport),
  /// Publish the confusion-matrix heat map.
  PlotConfusion(plot::PlotConfusion),
  /// Publish the misclassified-sample grid.
  PlotMisclassified(plot::PlotMisclassified),
  /// Publish the directory of top-k misses.
  PlotMisclassifiedTopK(plot::PlotMisclassifiedTopK),
  /// Wrapper grouping the standard analysis artifacts.
  AnalysisSuite(AnalysisSuite),
}

impl PipelineTask {
  /// Creates an [`AssignDataset`](dataset::AssignDataset) task.
  #[inline]
  pub fn assign_dataset(params: ExperimentParams) -> Self {
    Self::AssignDataset(dataset::AssignDataset { params })
  }

  /// Creates a [`TrainModel`](train::TrainModel) task.
  #[inline]
  pub fn train_model(params: ExperimentParams, estimator: EstimatorKind) -> Self {
    Self::TrainModel(train::TrainModel { params, estimator })
  }

  /// Creates a [`TestModel`](evaluate::TestModel) task.
  #[inline]
  pub fn test_model(params: ExperimentParams, estimator: EstimatorKind) -> Self {
    Self::TestModel(evaluate::TestModel { params, estimator })
  }

  /// Creates a [`ClassificationReport`](evaluate::ClassificationReport) task.
  #[inline]
  pub fn classification_report(params: ExperimentParams, estimator: EstimatorKind) -> Self {
    Self::ClassificationReport(evaluate::ClassificationReport { params, estimator })
  }

  /// Creates a [`PlotConfusion`](plot::PlotConfusion) task.
  #[inline]
  pub fn plot_confusion(params: ExperimentParams, estimator: EstimatorKind) -> Self {
    Self::PlotConfusion(plot::PlotConfusion { params, estimator })
  }

  /// Creates a [`PlotMisclassified`](plot::PlotMisclassified) task.
  #[inline]
  pub fn plot_misclassified(params: ExperimentParams, estimator: EstimatorKind) -> Self {
    Self::PlotMisclassified(plot::PlotMisclassified { params, estimator })
  }

  /// Creates a [`PlotMisclassifiedTopK`](plot::PlotMisclassifiedTopK) task.
  #[inline]
  pub fn plot_misclassified_top_k(
    params: ExperimentParams,
    estimator: EstimatorKind,
    k: u32,
  ) -> Self {
    Self::PlotMisclassifiedTopK(plot::PlotMisclassifiedTopK { params, estimator, k })
  }

  /// Creates an [`AnalysisSuite`] wrapper task.
  #[inline]
  pub fn analysis_suite(params: ExperimentParams, estimator: EstimatorKind) -> Self {
    Self::AnalysisSuite(AnalysisSuite { params, estimator })
  }
}

impl Task for PipelineTask {
  type Env = Toolbox;

  fn requires(&self) -> Requirement<Self> {
    match self {
      Self::AssignDataset(task) => task.requires(),
      Self::TrainModel(task) => task.requires(),
      Self::TestModel(task) => task.requires(),
      Self::ClassificationReport(task) => task.requires(),
      Self::PlotConfusion(task) => task.requires(),
      Self::PlotMisclassified(task) => task.requires(),
      Self::PlotMisclassifiedTopK(task) => task.requires(),
      Self::AnalysisSuite(task) => task.requires(),
    }
  }

  fn output(&self) -> Option<PathBuf> {
    match self {
      Self::AssignDataset(task) => Some(task.output()),
      Self::TrainModel(task) => Some(task.output()),
      Self::TestModel(task) => Some(task.output()),
      Self::ClassificationReport(task) => Some(task.output()),
      Self::PlotConfusion(task) => Some(task.output()),
      Self::PlotMisclassified(task) => Some(task.output()),
      Self::PlotMisclassifiedTopK(task) => Some(task.output()),
      Self::AnalysisSuite(_) => None,
    }
  }

  fn run(&self, context: &mut RunContext<Self>) -> Result<(), TaskError> {
    match self {
      Self::AssignDataset(task) => task.run(context),
      Self::TrainModel(task) => task.run(context),
      Self::TestModel(task) => task.run(context),
      Self::ClassificationReport(task) => task.run(context),
      Self::PlotConfusion(task) => task.run(context),
      Self::PlotMisclassified(task) => task.run(context),
      Self::PlotMisclassifiedTopK(task) => task.run(context),
      // Wrapper tasks have no artifact and are never run by the scheduler.
      Self::AnalysisSuite(_) => Ok(()),
    }
  }
}

/// Wrapper task grouping the standard analysis of one trained estimator:
/// classification report, confusion heat map, and misclassified sample.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct AnalysisSuite {
  /// Experiment parameters.
  pub params: ExperimentParams,
  /// Which trained estimator to analyze.
  pub estimator: EstimatorKind,
}

impl AnalysisSuite {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    Requirement::list([
      PipelineTask::classification_report(self.params.clone(), self.estimator),
      PipelineTask::plot_confusion(self.params.clone(), self.estimator),
      PipelineTask::plot_misclassified(self.params.clone(), self.estimator),
    ])
  }
}

pub(crate) fn computation(error: CollabError) -> TaskError {
  TaskError::Computation(error.to_string())
}

pub(crate) fn corrupt(path: &Path, error: impl std::fmt::Display) -> TaskError {
  TaskError::CorruptInput { path: path.to_path_buf(), reason: error.to_string() }
}

pub(crate) fn read_archive(
  context: &RunContext<PipelineTask>,
  path: &Path,
) -> Result<DatasetArchive, TaskError> {
  let bytes = context.read_input(path)?;
  DatasetArchive::decode(&bytes).map_err(|error| corrupt(path, error))
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  fn params() -> ExperimentParams {
    ExperimentParams::new(
      "imgs",
      "archives",
      "models",
      64,
      ["A", "B"],
      SplitFractions::from_floats(0.7, 0.15, 0.15).unwrap(),
      0,
      false,
      "defs/conv4.json",
    )
    .unwrap()
  }

  #[test]
  fn artifact_paths_are_distinct_per_task_kind() {
    let params = params();
    let estimator = EstimatorKind::Network;
    let tasks = [
      PipelineTask::assign_dataset(params.clone()),
      PipelineTask::train_model(params.clone(), estimator),
      PipelineTask::test_model(params.clone(), estimator),
      PipelineTask::classification_report(params.clone(), estimator),
      PipelineTask::plot_confusion(params.clone(), estimator),
      PipelineTask::plot_misclassified(params.clone(), estimator),
      PipelineTask::plot_misclassified_top_k(params, estimator, 3),
    ];
    let paths: HashSet<PathBuf> = tasks.iter().map(|task| task.output().unwrap()).collect();
    assert_eq!(paths.len(), tasks.len());
  }

  #[test]
  fn output_is_a_pure_function_of_parameters() {
    let task = PipelineTask::train_model(params(), EstimatorKind::Linear);
    assert_eq!(task.output(), task.clone().output());
    assert_eq!(task, PipelineTask::train_model(params(), EstimatorKind::Linear));
  }

  #[test]
  fn analysis_suite_is_a_wrapper_over_the_analysis_tasks() {
    let task = PipelineTask::analysis_suite(params(), EstimatorKind::Network);
    assert!(task.is_wrapper());
    let requirement = task.requires();
    assert_eq!(requirement.len(), 3);
    for upstream in requirement.tasks() {
      assert!(!upstream.is_wrapper());
    }
  }

  #[test]
  fn evaluation_tasks_require_model_and_dataset_by_role() {
    let task = PipelineTask::test_model(params(), EstimatorKind::Network);
    let input = task.requires().resolve().unwrap();
    assert!(input.get("model").unwrap().ends_with("trained.bin"));
    assert!(input.get("dataset").unwrap().to_string_lossy().ends_with(".cbor"));
  }
}
