//! Experiment parameters.
//!
//! Every task's identity and artifact path derive from these values, so all
//! of them are strongly typed, `Eq + Hash`, and validated at construction.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::train::EstimatorKind;

/// Error constructing or reading experiment parameters.
#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum ParamError {
  /// The split fractions do not sum to a whole.
  #[error("split fractions must sum to 1000 per mille, got {sum}")]
  FractionSum {
    /// The offending sum.
    sum: u32,
  },
  /// The training fraction is zero.
  #[error("training fraction must be non-zero")]
  EmptyTrainFraction,
  /// A float fraction is outside `0.0..=1.0`.
  #[error("fraction {value} is outside 0.0..=1.0")]
  FractionRange {
    /// The offending value.
    value: f64,
  },
  /// The category list is empty.
  #[error("keep_categories must not be empty")]
  NoCategories,
  /// The category list contains a duplicate.
  #[error("duplicate category '{category}'")]
  DuplicateCategory {
    /// The repeated category name.
    category: String,
  },
  /// The target image size is zero.
  #[error("target size must be non-zero")]
  ZeroTargetSize,
  /// The model-definition file could not be read or parsed.
  #[error("model definition '{}' is invalid: {reason}", path.display())]
  ModelDefinition {
    /// Path of the definition file.
    path: PathBuf,
    /// Why reading or parsing failed.
    reason: String,
  },
}

/// Train/validation/test split fractions in per mille, summing to exactly
/// 1000. Integer thousandths keep the type `Eq + Hash` where `f64` would
/// not be, so the split participates in task identity.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct SplitFractions {
  /// Training share, per mille.
  pub train: u16,
  /// Validation share, per mille.
  pub valid: u16,
  /// Test share, per mille.
  pub test: u16,
}

impl SplitFractions {
  /// Creates split fractions, checking that they sum to 1000 and that the
  /// training share is non-zero.
  pub fn new(train: u16, valid: u16, test: u16) -> Result<Self, ParamError> {
    let sum = train as u32 + valid as u32 + test as u32;
    if sum != 1000 {
      return Err(ParamError::FractionSum { sum });
    }
    if train == 0 {
      return Err(ParamError::EmptyTrainFraction);
    }
    Ok(Self { train, valid, test })
  }

  /// Converts float fractions such as `[0.7, 0.15, 0.15]` by rounding each
  /// to per mille. The rounded values must still sum to 1000.
  pub fn from_floats(train: f64, valid: f64, test: f64) -> Result<Self, ParamError> {
    let to_mille = |value: f64| -> Result<u16, ParamError> {
      if !(0.0..=1.0).contains(&value) {
        return Err(ParamError::FractionRange { value });
      }
      Ok((value * 1000.0).round() as u16)
    };
    Self::new(to_mille(train)?, to_mille(valid)?, to_mille(test)?)
  }

  /// Renders the split for use in artifact paths, e.g. `700-150-150`.
  #[inline]
  pub fn label(&self) -> String {
    format!("{}-{}-{}", self.train, self.valid, self.test)
  }
}

/// Parsed model-definition file. The pipeline treats the contents as opaque
/// configuration for the `Trainer` collaborator; only `num_classes` is
/// filled in by the pipeline itself before training.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
  /// Architecture name, interpreted by the trainer.
  pub architecture: String,
  /// Ensemble size for estimator kinds that use one.
  #[serde(default)]
  pub estimators: u32,
  /// Number of output classes. Not read from the file: set from the dataset
  /// before training.
  #[serde(default)]
  pub num_classes: u32,
  /// Free-form hyperparameters, passed through to the trainer.
  #[serde(default)]
  pub hyperparameters: BTreeMap<String, serde_json::Value>,
}

impl ModelDefinition {
  /// Reads and parses a model-definition JSON file.
  pub fn load(path: &Path) -> Result<Self, ParamError> {
    let bytes = fs::read(path).map_err(|error| ParamError::ModelDefinition {
      path: path.to_path_buf(),
      reason: error.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|error| ParamError::ModelDefinition {
      path: path.to_path_buf(),
      reason: error.to_string(),
    })
  }
}

/// The full parameter tuple of one experiment. Shared by every task in the
/// pipeline; two tasks with equal parameters are the same task.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExperimentParams {
  /// Folder of labeled sign images, one subfolder per category.
  pub img_folder: PathBuf,
  /// Folder where dataset archives are published.
  pub archive_folder: PathBuf,
  /// Folder where models and analysis artifacts are published.
  pub models_folder: PathBuf,
  /// Square size images are resized to.
  pub target_size: u32,
  /// Categories to keep, in order. Order is identity-significant.
  pub keep_categories: Vec<String>,
  /// Train/validation/test split.
  pub fractions: SplitFractions,
  /// Augmented copies per training image.
  pub num_augment: u32,
  /// Bin all remaining categories into a synthetic `"other"` class.
  pub rest_as_other: bool,
  /// Path of the model-definition JSON file.
  pub model_definition: PathBuf,
}

impl ExperimentParams {
  /// Validates the parameter tuple. The model-definition file itself is
  /// only read at train time; here its path merely has to name a file stem.
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    img_folder: impl Into<PathBuf>,
    archive_folder: impl Into<PathBuf>,
    models_folder: impl Into<PathBuf>,
    target_size: u32,
    keep_categories: impl IntoIterator<Item = impl Into<String>>,
    fractions: SplitFractions,
    num_augment: u32,
    rest_as_other: bool,
    model_definition: impl Into<PathBuf>,
  ) -> Result<Self, ParamError> {
    if target_size == 0 {
      return Err(ParamError::ZeroTargetSize);
    }
    let keep_categories: Vec<String> = keep_categories.into_iter().map(Into::into).collect();
    if keep_categories.is_empty() {
      return Err(ParamError::NoCategories);
    }
    for (index, category) in keep_categories.iter().enumerate() {
      if keep_categories[..index].contains(category) {
        return Err(ParamError::DuplicateCategory { category: category.clone() });
      }
    }
    let model_definition: PathBuf = model_definition.into();
    if model_definition.file_stem().is_none() {
      return Err(ParamError::ModelDefinition {
        path: model_definition,
        reason: "path has no file stem".to_string(),
      });
    }
    Ok(Self {
      img_folder: img_folder.into(),
      archive_folder: archive_folder.into(),
      models_folder: models_folder.into(),
      target_size,
      keep_categories,
      fractions,
      num_augment,
      rest_as_other,
      model_definition,
    })
  }

  /// Deterministic, injective name of the dataset these parameters select.
  /// The source image folder and the category list (which may be long) are
  /// folded into a digest; the scalar parameters are spelled out.
  pub fn dataset_slug(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.img_folder.as_os_str().as_encoded_bytes());
    hasher.update([0u8]);
    for category in &self.keep_categories {
      hasher.update(category.as_bytes());
      hasher.update([0u8]);
    }
    if self.rest_as_other {
      hasher.update(b"+other");
    }
    let digest = hasher.finalize();
    let short = short_hex(&digest);
    let other = if self.rest_as_other { "-other" } else { "" };
    format!(
      "{}cat{}-{}_{}px_{}_{}aug",
      self.keep_categories.len(),
      other,
      short,
      self.target_size,
      self.fractions.label(),
      self.num_augment,
    )
  }

  /// Path of the packed dataset archive artifact.
  #[inline]
  pub fn dataset_path(&self) -> PathBuf {
    self.archive_folder.join(format!("{}.cbor", self.dataset_slug()))
  }

  /// Stem of the model-definition file, validated non-empty in `new`.
  #[inline]
  pub fn definition_stem(&self) -> String {
    self
      .model_definition
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_default()
  }

  /// Directory under which one trained model and its analysis artifacts
  /// live: `{models_folder}/{definition_stem}-{digest}_{dataset_slug}/{estimator}`.
  /// The digest covers the full model-definition path and the archive folder,
  /// so definitions with equal stems in different directories (or the same
  /// experiment against differently-located archives) never share a run
  /// directory; the estimator segment keeps runs of different estimator
  /// kinds from colliding on the same files.
  pub fn run_dir(&self, estimator: EstimatorKind) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(self.archive_folder.as_os_str().as_encoded_bytes());
    hasher.update([0u8]);
    hasher.update(self.model_definition.as_os_str().as_encoded_bytes());
    let digest = hasher.finalize();
    self
      .models_folder
      .join(format!("{}-{}_{}", self.definition_stem(), short_hex(&digest), self.dataset_slug()))
      .join(estimator.label())
  }
}

fn short_hex(digest: &[u8]) -> String {
  let mut short = String::with_capacity(16);
  for byte in &digest[..8] {
    short.push_str(&format!("{byte:02x}"));
  }
  short
}

#[cfg(test)]
mod tests {
  use assert_matches::assert_matches;

  use super::*;

  fn params(categories: &[&str], size: u32, augment: u32) -> ExperimentParams {
    ExperimentParams::new(
      "imgs",
      "archives",
      "models",
      size,
      categories.iter().copied(),
      SplitFractions::from_floats(0.7, 0.15, 0.15).unwrap(),
      augment,
      false,
      "defs/conv4.json",
    )
    .unwrap()
  }

  #[test]
  fn fractions_from_floats_round_to_per_mille() {
    let fractions = SplitFractions::from_floats(0.7, 0.15, 0.15).unwrap();
    assert_eq!(fractions, SplitFractions { train: 700, valid: 150, test: 150 });
    assert_eq!(fractions.label(), "700-150-150");
  }

  #[test]
  fn fractions_reject_bad_sums_and_empty_train() {
    assert_matches!(SplitFractions::new(700, 150, 100), Err(ParamError::FractionSum { sum: 950 }));
    assert_matches!(SplitFractions::new(0, 500, 500), Err(ParamError::EmptyTrainFraction));
    assert_matches!(SplitFractions::from_floats(1.5, 0.0, 0.0), Err(ParamError::FractionRange { .. }));
  }

  #[test]
  fn new_validates_categories_and_size() {
    let empty: [&str; 0] = [];
    let fractions = SplitFractions::new(1000, 0, 0).unwrap();
    assert_matches!(
      ExperimentParams::new("i", "a", "m", 64, empty, fractions, 0, false, "d.json"),
      Err(ParamError::NoCategories)
    );
    assert_matches!(
      ExperimentParams::new("i", "a", "m", 64, ["A", "A"], fractions, 0, false, "d.json"),
      Err(ParamError::DuplicateCategory { .. })
    );
    assert_matches!(
      ExperimentParams::new("i", "a", "m", 0, ["A"], fractions, 0, false, "d.json"),
      Err(ParamError::ZeroTargetSize)
    );
  }

  #[test]
  fn dataset_slug_is_injective_across_parameter_changes() {
    let base = params(&["A", "B"], 64, 0);
    let mut other_folder = base.clone();
    other_folder.img_folder = PathBuf::from("imgs_site_two");
    let slugs = [
      base.dataset_slug(),
      params(&["B", "A"], 64, 0).dataset_slug(),
      params(&["A", "B"], 32, 0).dataset_slug(),
      params(&["A", "B"], 64, 4).dataset_slug(),
      params(&["A", "B", "C"], 64, 0).dataset_slug(),
      other_folder.dataset_slug(),
    ];
    for (index, slug) in slugs.iter().enumerate() {
      for other in &slugs[index + 1..] {
        assert_ne!(slug, other);
      }
    }
    // Same parameters always derive the same slug.
    assert_eq!(base.dataset_slug(), params(&["A", "B"], 64, 0).dataset_slug());
  }

  #[test]
  fn run_dir_separates_estimator_kinds() {
    let params = params(&["A", "B"], 64, 0);
    let network = params.run_dir(EstimatorKind::Network);
    let linear = params.run_dir(EstimatorKind::Linear);
    assert_ne!(network, linear);
    assert!(network.starts_with("models"));
    assert!(network.to_string_lossy().contains("conv4-"));
  }

  #[test]
  fn run_dir_separates_definition_and_archive_locations() {
    let base = params(&["A", "B"], 64, 0);
    let mut other_definition_dir = base.clone();
    other_definition_dir.model_definition = PathBuf::from("defs_v2/conv4.json");
    let mut other_archives = base.clone();
    other_archives.archive_folder = PathBuf::from("archives_v2");

    assert_eq!(base.definition_stem(), other_definition_dir.definition_stem());
    let dirs = [
      base.run_dir(EstimatorKind::Network),
      other_definition_dir.run_dir(EstimatorKind::Network),
      other_archives.run_dir(EstimatorKind::Network),
    ];
    for (index, dir) in dirs.iter().enumerate() {
      for other in &dirs[index + 1..] {
        assert_ne!(dir, other);
      }
    }
  }

  #[test]
  fn model_definition_parses_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conv4.json");
    std::fs::write(
      &path,
      r#"{"architecture":"conv4","estimators":10,"hyperparameters":{"lr":0.001}}"#,
    )
    .unwrap();
    let definition = ModelDefinition::load(&path).unwrap();
    assert_eq!(definition.architecture, "conv4");
    assert_eq!(definition.estimators, 10);
    assert_eq!(definition.num_classes, 0);
    assert!(definition.hyperparameters.contains_key("lr"));

    std::fs::write(&path, "not json").unwrap();
    assert_matches!(ModelDefinition::load(&path), Err(ParamError::ModelDefinition { .. }));
  }
}
