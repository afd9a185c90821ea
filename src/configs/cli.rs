use std::{num::NonZeroUsize, path::PathBuf};

use clap::Parser;

use crate::data::DatasetKind;

/// Trains one teacher of a PATE ensemble on its partition of the training set.
#[derive(Parser, Debug, Clone)]
#[command(name = "pate-teachers", version, long_about = None)]
pub struct Args {
    /// The name of the dataset to use
    #[arg(long, default_value = "mnist")]
    pub dataset: DatasetKind,

    /// Number of output classes
    #[arg(long, default_value_t = 10)]
    pub nb_labels: usize,

    /// Directory holding one folder of IDX files per dataset
    #[arg(long, default_value = "/tmp/")]
    pub data_dir: PathBuf,

    /// Where model checkpoints are saved
    #[arg(long, default_value = "/tmp/train_dir")]
    pub train_dir: PathBuf,

    /// Upper bound on the amount of training steps
    #[arg(long, default_value_t = 3000)]
    pub max_steps: usize,

    /// Teachers in the ensemble
    #[arg(long, default_value_t = 50)]
    pub nb_teachers: usize,

    /// ID of the teacher being trained
    #[arg(long, default_value_t = 0)]
    pub teacher_id: usize,

    /// Batch size
    #[arg(long, default_value = "128")]
    pub batch_size: NonZeroUsize,

    /// Learning rate for training
    #[arg(long, default_value_t = 0.05)]
    pub learning_rate: f32,

    /// Seed for the initial parameters and the shuffling, drawn from the OS when missing
    #[arg(long)]
    pub seed: Option<u64>,
}
