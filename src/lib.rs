pub mod checkpoint;
pub mod configs;
pub mod data;
pub mod error;
pub mod training;

use std::{cell::RefCell, path::PathBuf, rc::Rc};

use log::{debug, info};
use machine_learning::{arch::loss::SparseCrossEntropy, optimization::Sgd};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    checkpoint::Checkpoint,
    configs::{ModelBuilder, ModelConfig, TeacherConfig},
    data::{DataLoader, Dataset},
    training::{EpochSummary, TeacherTrainer},
};

pub use error::{DatasetErr, Result, TeacherErr};

/// The outcome of a teacher's training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Samples in every teacher's partition.
    pub block_len: usize,
    pub num_epochs: usize,
    pub epochs: Vec<EpochSummary>,
    /// Where the final weights were saved.
    pub checkpoint: PathBuf,
}

/// Loads the configured dataset and trains the teacher it describes with the PATE network.
pub fn run(config: &TeacherConfig) -> Result<TrainingReport> {
    let (train, test) = data::load(&config.dataset_dir(), config.nb_labels)?;
    train_teacher(config, &ModelConfig::pate_cnn(config.nb_labels), &train, &test)
}

/// Trains the teacher described by `config` on its partition of `train`, evaluating it on the
/// whole of `test` after every epoch.
///
/// # Errors
/// Fails before any training when the teacher has no valid partition or when the partition
/// doesn't amount to a single batch.
pub fn train_teacher(
    config: &TeacherConfig,
    model_config: &ModelConfig,
    train: &Dataset,
    test: &Dataset,
) -> Result<TrainingReport> {
    config.validate()?;

    let (inputs, labels, block_len) = data::partition_dataset(
        train.inputs(),
        train.labels(),
        config.nb_teachers,
        config.teacher_id,
    )?;

    let batch_size = config.batch_size.get();
    let num_epochs = training::num_epochs(config.max_steps, block_len, batch_size)?;
    info!(
        teacher_id = config.teacher_id,
        nb_teachers = config.nb_teachers,
        block_len = block_len,
        num_epochs = num_epochs;
        "training teacher"
    );

    let rng = Rc::new(RefCell::new(match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }));
    let model = ModelBuilder::new().build(model_config, &rng)?;
    let shuffle_rng = StdRng::from_rng(&mut *rng.borrow_mut());

    let mut train_loader = DataLoader::shuffled(inputs, labels, batch_size, shuffle_rng);
    let mut test_loader = DataLoader::sequential(test.inputs(), test.labels(), batch_size);

    let checkpoint = Checkpoint::new(config.checkpoint_path())
        .with_json("config", config)?
        .with_json("model", model_config)?;
    let path = checkpoint.path().to_path_buf();

    let optimizer = Sgd::new(config.learning_rate);
    debug!(learning_rate = optimizer.learning_rate(); "sgd optimizer");

    let mut trainer = TeacherTrainer::new(
        model,
        optimizer,
        SparseCrossEntropy,
        checkpoint,
        num_epochs,
    );
    let epochs = trainer.run(&mut train_loader, &mut test_loader)?;

    Ok(TrainingReport {
        block_len,
        num_epochs,
        epochs,
        checkpoint: path,
    })
}
