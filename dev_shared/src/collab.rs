//! Deterministic stub collaborators for testing the pipeline.
//!
//! The stubs are small but real: the source synthesizes separable images
//! per category, the trainer fits per-class centroids, and the predictor
//! scores by distance to them, so evaluation tasks produce sensible
//! confusion matrices without any numerics dependency.

use std::path::Path;

use scribe_pipeline::archive::{ConfusionMatrix, DatasetArchive, Image};
use scribe_pipeline::collab::{
  Average, CollabError, GridPanel, Metrics, Plotter, Predictor, Scores, SignSource, Trainer,
};
use scribe_pipeline::params::ModelDefinition;
use scribe_pipeline::train::EstimatorKind;
use scribe_pipeline::Toolbox;

/// Creates a toolbox with two stub categories of 20 images each.
pub fn stub_toolbox() -> Toolbox {
  toolbox_with_source(StubSource::new([("A", 20), ("B", 20)]))
}

/// Creates a toolbox around the given stub source.
pub fn toolbox_with_source(source: StubSource) -> Toolbox {
  Toolbox {
    source: Box::new(source),
    trainer: Box::new(CentroidTrainer),
    predictor: Box::new(CentroidPredictor),
    metrics: Box::new(StubMetrics),
    plotter: Box::new(StubPlotter),
  }
}

/// Creates a toolbox whose trainer always fails.
pub fn failing_trainer_toolbox() -> Toolbox {
  let mut toolbox = stub_toolbox();
  toolbox.trainer = Box::new(FailingTrainer);
  toolbox
}

/// Synthesizes a fixed number of images per category. Pixel values derive
/// from the category name, so categories are separable by intensity.
pub struct StubSource {
  categories: Vec<(String, usize)>,
}

impl StubSource {
  /// Creates a source with the given `(category, image count)` pairs.
  pub fn new(categories: impl IntoIterator<Item = (impl Into<String>, usize)>) -> Self {
    Self { categories: categories.into_iter().map(|(name, count)| (name.into(), count)).collect() }
  }
}

fn category_intensity(category: &str) -> u8 {
  let mut value = 11u8;
  for byte in category.as_bytes() {
    value = value.wrapping_mul(31).wrapping_add(*byte);
  }
  // Spread adjacent names apart, with headroom for augmentation offsets.
  value.wrapping_mul(83) % 200
}

impl SignSource for StubSource {
  fn categories(&mut self, _img_folder: &Path) -> Result<Vec<String>, CollabError> {
    Ok(self.categories.iter().map(|(name, _)| name.clone()).collect())
  }

  fn load_category(
    &mut self,
    _img_folder: &Path,
    category: &str,
    target_size: u32,
  ) -> Result<Vec<Image>, CollabError> {
    let count = self
      .categories
      .iter()
      .find(|(name, _)| name == category)
      .map(|(_, count)| *count)
      .ok_or_else(|| CollabError::new(format!("unknown category '{category}'")))?;
    let intensity = category_intensity(category);
    let pixels = (target_size * target_size) as usize;
    Ok(
      (0..count)
        .map(|index| Image {
          width: target_size,
          height: target_size,
          pixels: vec![intensity.wrapping_add((index % 8) as u8); pixels],
        })
        .collect(),
    )
  }

  fn augment(&mut self, image: &Image, count: u32) -> Result<Vec<Image>, CollabError> {
    Ok(
      (1..=count)
        .map(|offset| Image {
          width: image.width,
          height: image.height,
          pixels: image.pixels.iter().map(|pixel| pixel.wrapping_add(offset as u8)).collect(),
        })
        .collect(),
    )
  }
}

/// Fits one mean pixel vector per class.
pub struct CentroidTrainer;

fn encode_centroids(centroids: &[Vec<f32>]) -> Vec<u8> {
  let dim = centroids.first().map(Vec::len).unwrap_or(0);
  let mut bytes = Vec::with_capacity(8 + centroids.len() * dim * 4);
  bytes.extend((centroids.len() as u32).to_le_bytes());
  bytes.extend((dim as u32).to_le_bytes());
  for centroid in centroids {
    for value in centroid {
      bytes.extend(value.to_le_bytes());
    }
  }
  bytes
}

fn decode_centroids(bytes: &[u8]) -> Result<Vec<Vec<f32>>, CollabError> {
  let header = |range: std::ops::Range<usize>| -> Result<u32, CollabError> {
    let slice = bytes.get(range).ok_or_else(|| CollabError::new("model bytes truncated"))?;
    Ok(u32::from_le_bytes(slice.try_into().expect("4-byte slice")))
  };
  let classes = header(0..4)? as usize;
  let dim = header(4..8)? as usize;
  let values = bytes.get(8..).ok_or_else(|| CollabError::new("model bytes truncated"))?;
  if values.len() != classes * dim * 4 {
    return Err(CollabError::new("model bytes have wrong length"));
  }
  let mut centroids = vec![Vec::with_capacity(dim); classes];
  for (index, chunk) in values.chunks_exact(4).enumerate() {
    let value = f32::from_le_bytes(chunk.try_into().expect("4-byte chunk"));
    centroids[index / dim].push(value);
  }
  Ok(centroids)
}

impl Trainer for CentroidTrainer {
  fn train(
    &mut self,
    dataset: &DatasetArchive,
    definition: &ModelDefinition,
    _estimator: EstimatorKind,
  ) -> Result<Vec<u8>, CollabError> {
    let classes = definition.num_classes as usize;
    if classes == 0 {
      return Err(CollabError::new("definition has zero classes"));
    }
    let dim = dataset
      .train_imgs
      .first()
      .map(|image| image.pixels.len())
      .ok_or_else(|| CollabError::new("training split is empty"))?;
    let mut sums = vec![vec![0f64; dim]; classes];
    let mut counts = vec![0usize; classes];
    for (image, label) in dataset.train_imgs.iter().zip(&dataset.train_labels) {
      let label = *label as usize;
      if label >= classes || image.pixels.len() != dim {
        return Err(CollabError::new("inconsistent training data"));
      }
      for (sum, pixel) in sums[label].iter_mut().zip(&image.pixels) {
        *sum += *pixel as f64;
      }
      counts[label] += 1;
    }
    let centroids: Vec<Vec<f32>> = sums
      .into_iter()
      .zip(&counts)
      .map(|(sum, count)| {
        let divisor = (*count).max(1) as f64;
        sum.into_iter().map(|value| (value / divisor) as f32).collect()
      })
      .collect();
    Ok(encode_centroids(&centroids))
  }
}

/// Scores images by negative distance to each centroid.
pub struct CentroidPredictor;

impl Predictor for CentroidPredictor {
  fn predict(&mut self, model: &[u8], images: &[Image]) -> Result<Scores, CollabError> {
    let centroids = decode_centroids(model)?;
    let classes = centroids.len();
    let mut values = Vec::with_capacity(images.len() * classes);
    for image in images {
      for centroid in &centroids {
        let distance: f64 = centroid
          .iter()
          .zip(&image.pixels)
          .map(|(mean, pixel)| {
            let diff = *mean as f64 - *pixel as f64;
            diff * diff
          })
          .sum();
        values.push(-(distance as f32));
      }
    }
    Ok(Scores { classes, values })
  }
}

/// A trainer that always fails, for exercising failure propagation.
pub struct FailingTrainer;

impl Trainer for FailingTrainer {
  fn train(
    &mut self,
    _dataset: &DatasetArchive,
    _definition: &ModelDefinition,
    _estimator: EstimatorKind,
  ) -> Result<Vec<u8>, CollabError> {
    Err(CollabError::new("trainer always fails"))
  }
}

/// Straightforward metric implementations over label arrays.
pub struct StubMetrics;

fn num_classes(labels: &[u32], predicted: &[u32]) -> usize {
  labels.iter().chain(predicted).map(|label| *label as usize + 1).max().unwrap_or(0)
}

impl Metrics for StubMetrics {
  fn accuracy(&self, labels: &[u32], predicted: &[u32]) -> f64 {
    if labels.is_empty() {
      return 0.0;
    }
    let matches = labels.iter().zip(predicted).filter(|(truth, guess)| truth == guess).count();
    matches as f64 / labels.len() as f64
  }

  fn balanced_accuracy(&self, labels: &[u32], predicted: &[u32]) -> f64 {
    let classes = num_classes(labels, predicted);
    let matrix = self.confusion_matrix(labels, predicted, classes);
    let mut recall_sum = 0.0;
    let mut supported = 0;
    for truth in 0..classes {
      let support: u64 = (0..classes).map(|guess| matrix.get(truth, guess)).sum();
      if support > 0 {
        recall_sum += matrix.get(truth, truth) as f64 / support as f64;
        supported += 1;
      }
    }
    if supported == 0 { 0.0 } else { recall_sum / supported as f64 }
  }

  fn auc(&self, labels: &[u32], scores: &Scores, _average: Average) -> f64 {
    // Close enough for stub purposes.
    self.accuracy(labels, &scores.argmax_rows())
  }

  fn f1(&self, labels: &[u32], predicted: &[u32], average: Average) -> f64 {
    match average {
      Average::Micro => self.accuracy(labels, predicted),
      Average::Macro => {
        let classes = num_classes(labels, predicted);
        let matrix = self.confusion_matrix(labels, predicted, classes);
        let mut f1_sum = 0.0;
        let mut supported = 0;
        for class in 0..classes {
          let support: u64 = (0..classes).map(|guess| matrix.get(class, guess)).sum();
          if support == 0 {
            continue;
          }
          let hits = matrix.get(class, class) as f64;
          let predicted_as: u64 = (0..classes).map(|truth| matrix.get(truth, class)).sum();
          let precision = if predicted_as == 0 { 0.0 } else { hits / predicted_as as f64 };
          let recall = hits / support as f64;
          if precision + recall > 0.0 {
            f1_sum += 2.0 * precision * recall / (precision + recall);
          }
          supported += 1;
        }
        if supported == 0 { 0.0 } else { f1_sum / supported as f64 }
      }
    }
  }

  fn confusion_matrix(&self, labels: &[u32], predicted: &[u32], classes: usize) -> ConfusionMatrix {
    let mut matrix = ConfusionMatrix::zeroed(classes);
    for (truth, guess) in labels.iter().zip(predicted) {
      matrix.record(*truth as usize, *guess as usize);
    }
    matrix
  }

  fn classification_report(&self, labels: &[u32], predicted: &[u32], classes: &[String]) -> String {
    let matrix = self.confusion_matrix(labels, predicted, classes.len());
    let mut report = String::from("class precision recall f1 support\n");
    for (index, class) in classes.iter().enumerate() {
      let support: u64 = (0..classes.len()).map(|guess| matrix.get(index, guess)).sum();
      let predicted_as: u64 = (0..classes.len()).map(|truth| matrix.get(truth, index)).sum();
      let hits = matrix.get(index, index) as f64;
      let precision = if predicted_as == 0 { 0.0 } else { hits / predicted_as as f64 };
      let recall = if support == 0 { 0.0 } else { hits / support as f64 };
      let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
      } else {
        0.0
      };
      report.push_str(&format!("{class} {precision:.3} {recall:.3} {f1:.3} {support}\n"));
    }
    report
  }
}

/// Renders recognisable placeholder bytes instead of real images.
pub struct StubPlotter;

impl Plotter for StubPlotter {
  fn render_matrix(
    &mut self,
    matrix: &ConfusionMatrix,
    _classes: &[String],
    title: &str,
  ) -> Result<Vec<u8>, CollabError> {
    Ok(format!("plot:matrix:{}:{title}", matrix.classes).into_bytes())
  }

  fn render_grid(&mut self, panels: &[GridPanel]) -> Result<Vec<u8>, CollabError> {
    Ok(format!("plot:grid:{}", panels.len()).into_bytes())
  }

  fn render_single(&mut self, _image: &Image, caption: &str) -> Result<Vec<u8>, CollabError> {
    Ok(format!("plot:single:{caption}").into_bytes())
  }
}
