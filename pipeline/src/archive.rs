//! Packed dataset archive.
//!
//! `AssignDataset` publishes one binary artifact holding the full split
//! dataset; downstream tasks decode it instead of touching the image folder.

use serde::{Deserialize, Serialize};

use crate::params::SplitFractions;

/// Error encoding or decoding a binary artifact.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
  /// Encoding to CBOR failed.
  #[error("encode failed: {0}")]
  Encode(String),
  /// Decoding from CBOR failed.
  #[error("decode failed: {0}")]
  Decode(String),
}

/// One grayscale sign image, `width * height` pixels in row-major order.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Image {
  /// Width in pixels.
  pub width: u32,
  /// Height in pixels.
  pub height: u32,
  /// Row-major grayscale pixel values.
  pub pixels: Vec<u8>,
}

impl Image {
  /// Creates a black square image of the given size.
  pub fn blank(size: u32) -> Self {
    Self { width: size, height: size, pixels: vec![0; (size * size) as usize] }
  }
}

/// The split dataset of one experiment. Labels index into `classes`.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct DatasetArchive {
  /// Training images, including augmented copies.
  pub train_imgs: Vec<Image>,
  /// Labels of `train_imgs`.
  pub train_labels: Vec<u32>,
  /// Validation images.
  pub valid_imgs: Vec<Image>,
  /// Labels of `valid_imgs`.
  pub valid_labels: Vec<u32>,
  /// Test images.
  pub test_imgs: Vec<Image>,
  /// Labels of `test_imgs`.
  pub test_labels: Vec<u32>,
  /// Class names; label `i` denotes `classes[i]`.
  pub classes: Vec<String>,
}

impl DatasetArchive {
  /// Encodes the archive to CBOR bytes.
  pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(self, &mut bytes).map_err(|error| CodecError::Encode(error.to_string()))?;
    Ok(bytes)
  }

  /// Decodes an archive from CBOR bytes.
  pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
    ciborium::from_reader(bytes).map_err(|error: ciborium::de::Error<std::io::Error>| {
      CodecError::Decode(error.to_string())
    })
  }
}

/// Square confusion matrix over `classes` classes, rows indexed by true
/// label and columns by predicted label.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct ConfusionMatrix {
  /// Number of classes, i.e. the side length.
  pub classes: usize,
  /// Row-major counts, `classes * classes` entries.
  pub counts: Vec<u64>,
}

impl ConfusionMatrix {
  /// Creates a zeroed matrix for the given number of classes.
  pub fn zeroed(classes: usize) -> Self {
    Self { classes, counts: vec![0; classes * classes] }
  }

  /// Returns the count of examples with the given true and predicted labels.
  #[inline]
  pub fn get(&self, truth: usize, predicted: usize) -> u64 {
    self.counts[truth * self.classes + predicted]
  }

  /// Records one example with the given true and predicted labels.
  #[inline]
  pub fn record(&mut self, truth: usize, predicted: usize) {
    self.counts[truth * self.classes + predicted] += 1;
  }

  /// Encodes the matrix to CBOR bytes.
  pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(self, &mut bytes).map_err(|error| CodecError::Encode(error.to_string()))?;
    Ok(bytes)
  }

  /// Decodes a matrix from CBOR bytes.
  pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
    ciborium::from_reader(bytes).map_err(|error: ciborium::de::Error<std::io::Error>| {
      CodecError::Decode(error.to_string())
    })
  }
}

/// Partitions `count` examples into `(train, valid)` prefix lengths; the
/// remainder is the test set. Purely integer arithmetic so the split is
/// deterministic for a given count and fraction triple.
pub fn split_counts(count: usize, fractions: SplitFractions) -> (usize, usize) {
  let train = count * fractions.train as usize / 1000;
  let valid = count * fractions.valid as usize / 1000;
  (train, valid)
}
