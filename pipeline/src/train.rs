//! Model training task.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use scribe::{Requirement, RunContext, TaskError};

use crate::collab::Average;
use crate::params::{ExperimentParams, ModelDefinition};
use crate::{computation, read_archive, PipelineTask};

/// The kind of estimator to fit. One training task parameterized by kind;
/// the trainer collaborator interprets the rest of the model definition.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum EstimatorKind {
  /// Neural network built from the model-definition architecture.
  Network,
  /// Linear classifier.
  Linear,
  /// K-nearest-neighbours classifier.
  KNearest,
  /// Random forest.
  RandomForest,
  /// Gradient-boosted trees.
  GradientBoosting,
}

impl EstimatorKind {
  /// Every estimator kind, for sweeping over all of them.
  pub const ALL: [EstimatorKind; 5] = [
    EstimatorKind::Network,
    EstimatorKind::Linear,
    EstimatorKind::KNearest,
    EstimatorKind::RandomForest,
    EstimatorKind::GradientBoosting,
  ];

  /// Short name used in artifact paths.
  #[inline]
  pub fn label(&self) -> &'static str {
    match self {
      EstimatorKind::Network => "network",
      EstimatorKind::Linear => "linear",
      EstimatorKind::KNearest => "knearest",
      EstimatorKind::RandomForest => "forest",
      EstimatorKind::GradientBoosting => "boosting",
    }
  }
}

/// Fits one estimator on the packed dataset and publishes the serialized
/// model bytes. Validation metrics are logged after fitting.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TrainModel {
  /// Experiment parameters.
  pub params: ExperimentParams,
  /// Which estimator to fit.
  pub estimator: EstimatorKind,
}

impl TrainModel {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    Requirement::single(PipelineTask::assign_dataset(self.params.clone()))
  }

  pub(crate) fn output(&self) -> PathBuf {
    self.params.run_dir(self.estimator).join("trained.bin")
  }

  pub(crate) fn run(&self, context: &mut RunContext<PipelineTask>) -> Result<(), TaskError> {
    let archive_path = context.input().single()?.to_path_buf();
    let dataset = read_archive(context, &archive_path)?;
    let mut definition = ModelDefinition::load(&self.params.model_definition)
      .map_err(|error| TaskError::Config(error.to_string()))?;
    definition.num_classes = dataset.classes.len() as u32;

    let toolbox = context.env();
    let model = toolbox
      .trainer
      .train(&dataset, &definition, self.estimator)
      .map_err(computation)?;

    if !dataset.valid_imgs.is_empty() {
      let scores = toolbox
        .predictor
        .predict(&model, &dataset.valid_imgs)
        .map_err(computation)?;
      let predicted = scores.argmax_rows();
      let metrics = toolbox.metrics.as_ref();
      let labels = &dataset.valid_labels;
      tracing::info!(
        estimator = self.estimator.label(),
        accuracy = metrics.accuracy(labels, &predicted),
        balanced_accuracy = metrics.balanced_accuracy(labels, &predicted),
        auc_macro = metrics.auc(labels, &scores, Average::Macro),
        auc_micro = metrics.auc(labels, &scores, Average::Micro),
        f1_macro = metrics.f1(labels, &predicted, Average::Macro),
        f1_micro = metrics.f1(labels, &predicted, Average::Micro),
        "validation metrics"
      );
    }

    context.publish_bytes(&model)
  }
}
