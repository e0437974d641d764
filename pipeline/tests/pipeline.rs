use std::fs;
use std::path::PathBuf;

use assert_matches::assert_matches;
use rstest::rstest;
use tempfile::TempDir;
use testresult::TestResult;

use dev_shared::collab::{toolbox_with_source, FailingTrainer, StubSource};
use dev_shared::test::{events, pipeline_scheduler, temp_dir, PipelineScheduler};
use scribe::{ArtifactStore, FailureKind, Task, TaskError, TaskStatus};
use scribe_pipeline::{
  DatasetArchive, EstimatorKind, ExperimentParams, PipelineTask, SplitFractions,
};

fn write_definition(temp_dir: &TempDir) -> PathBuf {
  let path = temp_dir.path().join("conv4.json");
  fs::write(&path, r#"{"architecture":"conv4","hyperparameters":{"lr":0.001}}"#)
    .expect("failed to write model definition");
  path
}

fn params(temp_dir: &TempDir) -> ExperimentParams {
  ExperimentParams::new(
    "imgs",
    "archives",
    "models",
    64,
    ["A", "B"],
    SplitFractions::from_floats(0.7, 0.15, 0.15).unwrap(),
    0,
    false,
    write_definition(temp_dir),
  )
  .unwrap()
}

#[rstest]
fn dataset_train_report_scenario(
  mut pipeline_scheduler: PipelineScheduler,
  temp_dir: TempDir,
) -> TestResult {
  let params = params(&temp_dir);
  let dataset = PipelineTask::assign_dataset(params.clone());
  let train = PipelineTask::train_model(params.clone(), EstimatorKind::Network);
  let report_task = PipelineTask::classification_report(params.clone(), EstimatorKind::Network);

  let report = pipeline_scheduler.execute(&[report_task.clone()])?;
  assert!(report.is_success());
  assert_eq!(report.executed_count(), 3);

  // Tasks ran in dependency order.
  let tracker = events(&pipeline_scheduler);
  let dataset_end = assert_matches!(tracker.index_execute_end(&dataset), Some(i) => i);
  let train_start = assert_matches!(tracker.index_execute_start(&train), Some(i) => i);
  let train_end = assert_matches!(tracker.index_execute_end(&train), Some(i) => i);
  let report_start = assert_matches!(tracker.index_execute_start(&report_task), Some(i) => i);
  assert!(train_start > dataset_end);
  assert!(report_start > train_end);

  // 20 images per category, split 700/150/150 per mille.
  let bytes = pipeline_scheduler.store().read(&params.dataset_path())?;
  let archive = DatasetArchive::decode(&bytes)?;
  assert_eq!(archive.classes, vec!["A".to_string(), "B".to_string()]);
  assert_eq!(archive.train_imgs.len(), 28);
  assert_eq!(archive.valid_imgs.len(), 6);
  assert_eq!(archive.test_imgs.len(), 6);
  assert_eq!(archive.train_imgs.len(), archive.train_labels.len());

  let text = pipeline_scheduler.store().read(&report_task.output().unwrap())?;
  let text = String::from_utf8(text)?;
  assert!(text.starts_with("class precision recall f1 support"));
  assert!(text.contains('A') && text.contains('B'));

  // Everything cached: a second execute runs nothing.
  let report = pipeline_scheduler.execute(&[report_task])?;
  assert!(report.is_success());
  assert_eq!(report.executed_count(), 0);
  assert_eq!(report.cached_count(), 3);
  Ok(())
}

#[rstest]
fn analysis_suite_fans_out_to_all_analysis_artifacts(
  mut pipeline_scheduler: PipelineScheduler,
  temp_dir: TempDir,
) -> TestResult {
  let params = params(&temp_dir);
  let estimator = EstimatorKind::RandomForest;
  let suite = PipelineTask::analysis_suite(params.clone(), estimator);

  let report = pipeline_scheduler.execute(&[suite.clone()])?;
  assert!(report.is_success());
  // Dataset, train, test, report, two plots; the wrapper itself runs nothing.
  assert_eq!(report.executed_count(), 6);
  assert_matches!(report.status_of(&suite), Some(TaskStatus::Done { cached: false }));
  assert!(!events(&pipeline_scheduler).any_execute_of(&suite));

  let store = pipeline_scheduler.store();
  let run_dir = params.run_dir(estimator);
  for artifact in ["classification_report.txt", "test_confusion.cbor", "confusion_test.png", "test_misclassified_sample.png"] {
    assert!(store.exists(&run_dir.join(artifact)), "missing {artifact}");
  }
  Ok(())
}

#[rstest]
fn top_k_misses_publish_a_directory_artifact(
  mut pipeline_scheduler: PipelineScheduler,
  temp_dir: TempDir,
) -> TestResult {
  let params = params(&temp_dir);
  let task = PipelineTask::plot_misclassified_top_k(params, EstimatorKind::KNearest, 1);

  let report = pipeline_scheduler.execute(&[task.clone()])?;
  assert!(report.is_success());

  let path = task.output().unwrap();
  let directory = pipeline_scheduler
    .store()
    .directory(&path)
    .expect("directory artifact was published");
  for file in directory.keys() {
    assert!(file.to_string_lossy().starts_with("misclassified-"));
  }
  Ok(())
}

#[rstest]
fn failed_training_spares_the_dataset_and_marks_dependents(
  mut pipeline_scheduler: PipelineScheduler,
  temp_dir: TempDir,
) -> TestResult {
  let params = params(&temp_dir);
  let dataset = PipelineTask::assign_dataset(params.clone());
  let train = PipelineTask::train_model(params.clone(), EstimatorKind::Linear);
  let report_task = PipelineTask::classification_report(params.clone(), EstimatorKind::Linear);

  pipeline_scheduler.env_mut().trainer = Box::new(FailingTrainer);
  let report = pipeline_scheduler.execute(&[report_task.clone()])?;
  assert!(!report.is_success());
  assert_matches!(report.status_of(&dataset), Some(TaskStatus::Done { cached: false }));
  assert_matches!(
    report.status_of(&train),
    Some(TaskStatus::Failed(FailureKind::Run(TaskError::Computation(_))))
  );
  assert_matches!(
    report.status_of(&report_task),
    Some(TaskStatus::Failed(FailureKind::Upstream { upstream })) if upstream == &train
  );
  // The dataset artifact survives the failed run and is reused afterwards.
  assert!(pipeline_scheduler.store().exists(&params.dataset_path()));
  Ok(())
}

#[rstest]
fn missing_model_definition_is_a_configuration_error(
  mut pipeline_scheduler: PipelineScheduler,
  temp_dir: TempDir,
) -> TestResult {
  let mut params = params(&temp_dir);
  params.model_definition = temp_dir.path().join("does_not_exist.json");
  let train = PipelineTask::train_model(params, EstimatorKind::Network);

  let report = pipeline_scheduler.execute(&[train.clone()])?;
  assert!(!report.is_success());
  assert_matches!(
    report.status_of(&train),
    Some(TaskStatus::Failed(FailureKind::Run(TaskError::Config(_))))
  );
  Ok(())
}

#[rstest]
fn augmentation_grows_only_the_training_split(
  mut pipeline_scheduler: PipelineScheduler,
  temp_dir: TempDir,
) -> TestResult {
  let mut params = params(&temp_dir);
  params.num_augment = 2;
  let dataset = PipelineTask::assign_dataset(params.clone());

  let report = pipeline_scheduler.execute(&[dataset])?;
  assert!(report.is_success());

  let bytes = pipeline_scheduler.store().read(&params.dataset_path())?;
  let archive = DatasetArchive::decode(&bytes)?;
  // 14 originals per category, each with 2 augmented copies.
  assert_eq!(archive.train_imgs.len(), 2 * 14 * 3);
  assert_eq!(archive.valid_imgs.len(), 6);
  assert_eq!(archive.test_imgs.len(), 6);
  Ok(())
}

#[rstest]
fn rest_as_other_bins_remaining_categories(temp_dir: TempDir) -> TestResult {
  let source = StubSource::new([("A", 20), ("B", 10), ("C", 10)]);
  let mut scheduler = scribe::Scheduler::new(scribe::MemoryStore::new(), toolbox_with_source(source));

  let mut params = params(&temp_dir);
  params.keep_categories = vec!["A".to_string()];
  params.rest_as_other = true;
  let report = scheduler.execute(&[PipelineTask::assign_dataset(params.clone())])?;
  assert!(report.is_success());

  let bytes = scheduler.store().read(&params.dataset_path())?;
  let archive = DatasetArchive::decode(&bytes)?;
  assert_eq!(archive.classes, vec!["A".to_string(), "other".to_string()]);
  // B and C collapse into one 20-image "other" category.
  let total = archive.train_imgs.len() + archive.valid_imgs.len() + archive.test_imgs.len();
  assert_eq!(total, 40);
  assert!(archive.train_labels.iter().any(|label| *label == 1));
  Ok(())
}

#[rstest]
fn different_parameters_never_share_artifacts(temp_dir: TempDir) {
  let base = params(&temp_dir);
  let mut more_augment = base.clone();
  more_augment.num_augment = 4;
  let mut reordered = base.clone();
  reordered.keep_categories = vec!["B".to_string(), "A".to_string()];
  let mut other_img_folder = base.clone();
  other_img_folder.img_folder = base.img_folder.join("site_two");
  let mut other_definition_dir = base.clone();
  other_definition_dir.model_definition = base
    .model_definition
    .parent()
    .unwrap()
    .join("defs_v2")
    .join(base.model_definition.file_name().unwrap());

  // Any dataset-relevant change moves the archive path.
  let dataset_variants = [base.clone(), more_augment, reordered, other_img_folder];
  for (index, left) in dataset_variants.iter().enumerate() {
    for right in &dataset_variants[index + 1..] {
      assert_ne!(left.dataset_path(), right.dataset_path());
    }
  }
  // Any change at all moves the trained-model path. A relocated definition
  // file shares the dataset but must not share the run directory.
  assert_eq!(base.dataset_path(), other_definition_dir.dataset_path());
  let mut train_variants = dataset_variants.to_vec();
  train_variants.push(other_definition_dir);
  for (index, left) in train_variants.iter().enumerate() {
    for right in &train_variants[index + 1..] {
      assert_ne!(
        PipelineTask::train_model(left.clone(), EstimatorKind::Network).output(),
        PipelineTask::train_model(right.clone(), EstimatorKind::Network).output(),
      );
    }
  }
}
