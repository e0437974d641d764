//! Dataset assembly task.

use std::path::PathBuf;

use scribe::{Requirement, RunContext, TaskError};

use crate::archive::{split_counts, DatasetArchive, Image};
use crate::params::ExperimentParams;
use crate::{computation, PipelineTask};

/// Reads the labeled sign images, filters to the kept categories, splits
/// them deterministically by the configured fractions, augments the training
/// split, and publishes the packed dataset archive.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct AssignDataset {
  /// Experiment parameters.
  pub params: ExperimentParams,
}

impl AssignDataset {
  pub(crate) fn requires(&self) -> Requirement<PipelineTask> {
    Requirement::None
  }

  pub(crate) fn output(&self) -> PathBuf {
    self.params.dataset_path()
  }

  pub(crate) fn run(&self, context: &mut RunContext<PipelineTask>) -> Result<(), TaskError> {
    let params = &self.params;
    let toolbox = context.env();

    let mut classes = params.keep_categories.clone();
    let mut groups: Vec<Vec<Image>> = Vec::with_capacity(classes.len() + 1);
    for category in &params.keep_categories {
      let images = toolbox
        .source
        .load_category(&params.img_folder, category, params.target_size)
        .map_err(computation)?;
      groups.push(images);
    }
    if params.rest_as_other {
      let mut other = Vec::new();
      for category in toolbox.source.categories(&params.img_folder).map_err(computation)? {
        if params.keep_categories.contains(&category) {
          continue;
        }
        other.extend(
          toolbox
            .source
            .load_category(&params.img_folder, &category, params.target_size)
            .map_err(computation)?,
        );
      }
      classes.push("other".to_string());
      groups.push(other);
    }

    // Split each category in order: train prefix, valid middle, test rest.
    let mut archive = DatasetArchive { classes, ..DatasetArchive::default() };
    for (label, images) in groups.iter().enumerate() {
      let label = label as u32;
      let (train, valid) = split_counts(images.len(), params.fractions);
      for image in &images[..train] {
        archive.train_imgs.push(image.clone());
        archive.train_labels.push(label);
        if params.num_augment > 0 {
          for augmented in toolbox.source.augment(image, params.num_augment).map_err(computation)? {
            archive.train_imgs.push(augmented);
            archive.train_labels.push(label);
          }
        }
      }
      for image in &images[train..train + valid] {
        archive.valid_imgs.push(image.clone());
        archive.valid_labels.push(label);
      }
      for image in &images[train + valid..] {
        archive.test_imgs.push(image.clone());
        archive.test_labels.push(label);
      }
    }
    tracing::info!(
      train = archive.train_imgs.len(),
      valid = archive.valid_imgs.len(),
      test = archive.test_imgs.len(),
      classes = archive.classes.len(),
      "assigned dataset"
    );

    let bytes = archive.encode().map_err(|error| TaskError::Computation(error.to_string()))?;
    context.publish_bytes(&bytes)
  }
}
