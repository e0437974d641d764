//! Collaborator traits.
//!
//! Image decoding, model training and inference, metric computation, and
//! plotting all live behind narrow traits, injected into the scheduler as
//! one [`Toolbox`] environment. The pipeline treats them as opaque: it
//! orchestrates, reads, and publishes, and leaves the numerics to whatever
//! implementation the caller wires in.

use std::path::Path;

use crate::archive::{ConfusionMatrix, DatasetArchive, Image};
use crate::params::ModelDefinition;
use crate::train::EstimatorKind;

/// Error from a collaborator call.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CollabError(String);

impl CollabError {
  /// Creates a collaborator error with the given message.
  pub fn new(message: impl Into<String>) -> Self {
    Self(message.into())
  }
}

/// Source of labeled sign images.
pub trait SignSource {
  /// Lists the category names available under `img_folder`.
  fn categories(&mut self, img_folder: &Path) -> Result<Vec<String>, CollabError>;

  /// Loads every image of `category`, resized to a `target_size` square.
  fn load_category(
    &mut self,
    img_folder: &Path,
    category: &str,
    target_size: u32,
  ) -> Result<Vec<Image>, CollabError>;

  /// Produces `count` augmented copies of `image`.
  fn augment(&mut self, image: &Image, count: u32) -> Result<Vec<Image>, CollabError>;
}

/// Trains a model on a split dataset, returning opaque model bytes.
pub trait Trainer {
  /// Fits a model of the given kind on the training split, returning its
  /// serialized form.
  fn train(
    &mut self,
    dataset: &DatasetArchive,
    definition: &ModelDefinition,
    estimator: EstimatorKind,
  ) -> Result<Vec<u8>, CollabError>;
}

/// Runs inference with previously trained model bytes.
pub trait Predictor {
  /// Scores every image against every class.
  fn predict(&mut self, model: &[u8], images: &[Image]) -> Result<Scores, CollabError>;
}

/// Per-example class scores, one row per image.
#[derive(Clone, Debug)]
pub struct Scores {
  /// Number of classes, i.e. the row width.
  pub classes: usize,
  /// Row-major scores, `rows * classes` entries.
  pub values: Vec<f32>,
}

impl Scores {
  /// Number of scored examples.
  #[inline]
  pub fn len(&self) -> usize {
    if self.classes == 0 { 0 } else { self.values.len() / self.classes }
  }

  /// Returns `true` if no examples were scored.
  #[inline]
  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// The score row of example `index`.
  #[inline]
  pub fn row(&self, index: usize) -> &[f32] {
    &self.values[index * self.classes..(index + 1) * self.classes]
  }

  /// The highest-scoring class of each example.
  pub fn argmax_rows(&self) -> Vec<u32> {
    (0..self.len()).map(|index| argmax(self.row(index)) as u32).collect()
  }

  /// The `k` highest-scoring classes of example `index`, best first.
  pub fn top_k(&self, index: usize, k: usize) -> Vec<u32> {
    let row = self.row(index);
    let mut order: Vec<usize> = (0..row.len()).collect();
    order.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b)));
    order.truncate(k);
    order.into_iter().map(|class| class as u32).collect()
  }
}

fn argmax(row: &[f32]) -> usize {
  let mut best = 0;
  for (index, value) in row.iter().enumerate() {
    if *value > row[best] {
      best = index;
    }
  }
  best
}

/// Averaging mode for multi-class metrics.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Average {
  /// Unweighted mean over classes.
  Macro,
  /// Global mean over examples.
  Micro,
}

/// Computes evaluation metrics from labels and predictions. Pure functions
/// of their arguments.
pub trait Metrics {
  /// Fraction of predictions matching the true label.
  fn accuracy(&self, labels: &[u32], predicted: &[u32]) -> f64;

  /// Mean per-class recall.
  fn balanced_accuracy(&self, labels: &[u32], predicted: &[u32]) -> f64;

  /// Area under the ROC curve over the score matrix.
  fn auc(&self, labels: &[u32], scores: &Scores, average: Average) -> f64;

  /// F1 score.
  fn f1(&self, labels: &[u32], predicted: &[u32], average: Average) -> f64;

  /// Confusion matrix with rows indexed by true label.
  fn confusion_matrix(&self, labels: &[u32], predicted: &[u32], classes: usize) -> ConfusionMatrix;

  /// Plain-text per-class precision/recall/F1 report.
  fn classification_report(&self, labels: &[u32], predicted: &[u32], classes: &[String]) -> String;
}

/// One captioned image in a plotted grid.
pub struct GridPanel<'a> {
  /// The image to render.
  pub image: &'a Image,
  /// Caption under the image.
  pub caption: String,
}

/// Renders plots to encoded image bytes.
pub trait Plotter {
  /// Renders a confusion-matrix heat map.
  fn render_matrix(
    &mut self,
    matrix: &ConfusionMatrix,
    classes: &[String],
    title: &str,
  ) -> Result<Vec<u8>, CollabError>;

  /// Renders a grid of captioned images.
  fn render_grid(&mut self, panels: &[GridPanel]) -> Result<Vec<u8>, CollabError>;

  /// Renders a single captioned image.
  fn render_single(&mut self, image: &Image, caption: &str) -> Result<Vec<u8>, CollabError>;
}

/// The full collaborator environment a pipeline run executes against.
pub struct Toolbox {
  /// Image source.
  pub source: Box<dyn SignSource>,
  /// Model trainer.
  pub trainer: Box<dyn Trainer>,
  /// Model predictor.
  pub predictor: Box<dyn Predictor>,
  /// Metric computation.
  pub metrics: Box<dyn Metrics>,
  /// Plot rendering.
  pub plotter: Box<dyn Plotter>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scores_argmax_and_top_k() {
    let scores = Scores {
      classes: 3,
      values: vec![
        0.1, 0.7, 0.2, // example 0: class 1
        0.5, 0.3, 0.2, // example 1: class 0
      ],
    };
    assert_eq!(scores.len(), 2);
    assert_eq!(scores.argmax_rows(), vec![1, 0]);
    assert_eq!(scores.top_k(0, 2), vec![1, 2]);
    assert_eq!(scores.top_k(1, 1), vec![0]);
  }

  #[test]
  fn top_k_breaks_ties_by_class_index() {
    let scores = Scores { classes: 3, values: vec![0.4, 0.4, 0.2] };
    assert_eq!(scores.top_k(0, 2), vec![0, 1]);
  }
}
