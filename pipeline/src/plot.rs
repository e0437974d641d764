//! Plotting tasks.
//!
//! Rendering itself happens behind the [`Plotter`](crate::collab::Plotter)
//! collaborator; these tasks select what to render and publish the encoded
//! image bytes.

use std::fs;
use std::path::PathBuf;

use scribe::{Requirement, RunContext, TaskError};

use crate::archive::ConfusionMatrix;
use crate::collab::GridPanel;
use crate::params::ExperimentParams;
use crate::train::EstimatorKind;
use crate::{computation, corrupt, read_archive, PipelineTask};

/// At most this many misclassified images go into the sample grid.
const MISCLASSIFIED_SAMPLE: usize = 25;

fn class_name(classes: &[String], label: u32) -> &str {
  classes.get(label as usize).map(String::as_str).unwrap_or("?")
}

/// Renders the test confusion matrix as a heat-map image.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct PlotConfusion {
  /// Experiment parameters.
  pub params: ExperimentParams,
  /// Which trained estimator to plot.
  pub estimator: EstimatorKind,
}

impl PlotConfusion {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    Requirement::named([
      ("confusion", PipelineTask::test_model(self.params.clone(), self.estimator)),
      ("dataset", PipelineTask::assign_dataset(self.params.clone())),
    ])
  }

  pub(crate) fn output(&self) -> PathBuf {
    self.params.run_dir(self.estimator).join("confusion_test.png")
  }

  pub(crate) fn run(&self, context: &mut RunContext<PipelineTask>) -> Result<(), TaskError> {
    let confusion_path = context.input().get("confusion")?.to_path_buf();
    let dataset_path = context.input().get("dataset")?.to_path_buf();
    let bytes = context.read_input(&confusion_path)?;
    let matrix = ConfusionMatrix::decode(&bytes).map_err(|error| corrupt(&confusion_path, error))?;
    let dataset = read_archive(context, &dataset_path)?;

    let title = format!("{} {} test confusion", self.params.definition_stem(), self.estimator.label());
    let image = context
      .env()
      .plotter
      .render_matrix(&matrix, &dataset.classes, &title)
      .map_err(computation)?;
    context.publish_bytes(&image)
  }
}

/// Renders a sample grid of misclassified test images.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct PlotMisclassified {
  /// Experiment parameters.
  pub params: ExperimentParams,
  /// Which trained estimator to inspect.
  pub estimator: EstimatorKind,
}

impl PlotMisclassified {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    Requirement::named([
      ("model", PipelineTask::train_model(self.params.clone(), self.estimator)),
      ("dataset", PipelineTask::assign_dataset(self.params.clone())),
    ])
  }

  pub(crate) fn output(&self) -> PathBuf {
    self.params.run_dir(self.estimator).join("test_misclassified_sample.png")
  }

  pub(crate) fn run(&self, context: &mut RunContext<PipelineTask>) -> Result<(), TaskError> {
    let model_path = context.input().get("model")?.to_path_buf();
    let dataset_path = context.input().get("dataset")?.to_path_buf();
    let model = context.read_input(&model_path)?;
    let dataset = read_archive(context, &dataset_path)?;

    let toolbox = context.env();
    let scores = toolbox.predictor.predict(&model, &dataset.test_imgs).map_err(computation)?;
    let predicted = scores.argmax_rows();
    let panels: Vec<GridPanel> = dataset
      .test_labels
      .iter()
      .zip(&predicted)
      .enumerate()
      .filter(|(_, (truth, predicted))| truth != predicted)
      .take(MISCLASSIFIED_SAMPLE)
      .map(|(index, (truth, predicted))| GridPanel {
        image: &dataset.test_imgs[index],
        caption: format!(
          "predicted {}, was {}",
          class_name(&dataset.classes, *predicted),
          class_name(&dataset.classes, *truth),
        ),
      })
      .collect();
    tracing::debug!(misclassified = panels.len(), "plotting misclassified sample");

    let image = toolbox.plotter.render_grid(&panels).map_err(computation)?;
    context.publish_bytes(&image)
  }
}

/// Renders one image per test example whose true label is not among the
/// top-`k` scored classes, publishing them as a directory artifact.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct PlotMisclassifiedTopK {
  /// Experiment parameters.
  pub params: ExperimentParams,
  /// Which trained estimator to inspect.
  pub estimator: EstimatorKind,
  /// Size of the score window the true label must fall into.
  pub k: u32,
}

impl PlotMisclassifiedTopK {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    Requirement::named([
      ("model", PipelineTask::train_model(self.params.clone(), self.estimator)),
      ("dataset", PipelineTask::assign_dataset(self.params.clone())),
    ])
  }

  pub(crate) fn output(&self) -> PathBuf {
    self.params.run_dir(self.estimator).join("test_misclassified")
  }

  pub(crate) fn run(&self, context: &mut RunContext<PipelineTask>) -> Result<(), TaskError> {
    let model_path = context.input().get("model")?.to_path_buf();
    let dataset_path = context.input().get("dataset")?.to_path_buf();
    let model = context.read_input(&model_path)?;
    let dataset = read_archive(context, &dataset_path)?;

    let toolbox = context.env();
    let scores = toolbox.predictor.predict(&model, &dataset.test_imgs).map_err(computation)?;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    for (index, truth) in dataset.test_labels.iter().enumerate() {
      let top = scores.top_k(index, self.k as usize);
      if top.contains(truth) {
        continue;
      }
      let top_names: Vec<&str> =
        top.iter().map(|label| class_name(&dataset.classes, *label)).collect();
      let caption = format!(
        "was {}, top {}: {}",
        class_name(&dataset.classes, *truth),
        self.k,
        top_names.join(", "),
      );
      let image = toolbox
        .plotter
        .render_single(&dataset.test_imgs[index], &caption)
        .map_err(computation)?;
      files.push((format!("misclassified-{index:04}.png"), image));
    }
    tracing::debug!(k = self.k, misclassified = files.len(), "plotting top-k misses");

    context.publish_dir(|dir| {
      for (name, bytes) in &files {
        fs::write(dir.join(name), bytes)?;
      }
      Ok(())
    })
  }
}
