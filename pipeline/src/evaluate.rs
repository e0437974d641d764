//! Test-set evaluation tasks.

use std::path::PathBuf;

use scribe::{Requirement, RunContext, TaskError};

use crate::params::ExperimentParams;
use crate::train::EstimatorKind;
use crate::{computation, read_archive, PipelineTask};

fn model_and_dataset(
  params: &ExperimentParams,
  estimator: EstimatorKind,
) -> Requirement<PipelineTask> {
  Requirement::named([
    ("model", PipelineTask::train_model(params.clone(), estimator)),
    ("dataset", PipelineTask::assign_dataset(params.clone())),
  ])
}

/// Predicts on the test split and publishes the confusion matrix.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TestModel {
  /// Experiment parameters.
  pub params: ExperimentParams,
  /// Which trained estimator to evaluate.
  pub estimator: EstimatorKind,
}

impl TestModel {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    model_and_dataset(&self.params, self.estimator)
  }

  pub(crate) fn output(&self) -> PathBuf {
    self.params.run_dir(self.estimator).join("test_confusion.cbor")
  }

  pub(crate) fn run(&self, context: &mut RunContext<PipelineTask>) -> Result<(), TaskError> {
    let model_path = context.input().get("model")?.to_path_buf();
    let dataset_path = context.input().get("dataset")?.to_path_buf();
    let model = context.read_input(&model_path)?;
    let dataset = read_archive(context, &dataset_path)?;

    let toolbox = context.env();
    let scores = toolbox.predictor.predict(&model, &dataset.test_imgs).map_err(computation)?;
    let predicted = scores.argmax_rows();
    let matrix =
      toolbox.metrics.confusion_matrix(&dataset.test_labels, &predicted, dataset.classes.len());

    let bytes = matrix.encode().map_err(|error| TaskError::Computation(error.to_string()))?;
    context.publish_bytes(&bytes)
  }
}

/// Predicts on the test split and publishes the plain-text per-class
/// precision/recall/F1 report.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ClassificationReport {
  /// Experiment parameters.
  pub params: ExperimentParams,
  /// Which trained estimator to evaluate.
  pub estimator: EstimatorKind,
}

impl ClassificationReport {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    model_and_dataset(&self.params, self.estimator)
  }

  pub(crate) fn output(&self) -> PathBuf {
    self.params.run_dir(self.estimator).join("classification_report.txt")
  }

  pub(crate) fn run(&self, context: &mut RunContext<PipelineTask>) -> Result<(), TaskError> {
    let model_path = context.input().get("model")?.to_path_buf();
    let dataset_path = context.input().get("dataset")?.to_path_buf();
    let model = context.read_input(&model_path)?;
    let dataset = read_archive(context, &dataset_path)?;

    let toolbox = context.env();
    let scores = toolbox.predictor.predict(&model, &dataset.test_imgs).map_err(computation)?;
    let predicted = scores.argmax_rows();
    let report =
      toolbox.metrics.classification_report(&dataset.test_labels, &predicted, &dataset.classes);

    context.publish_bytes(report.as_bytes())
  }
}
