use std::{fmt, io, path::PathBuf};

use machine_learning::MlErr;
use safetensors::SafeTensorError;

/// The result type used across the teacher trainer.
pub type Result<T> = std::result::Result<T, TeacherErr>;

/// Problems found while reading an IDX dataset.
#[derive(Debug)]
pub enum DatasetErr {
    /// The file doesn't start with the expected magic number.
    BadMagic {
        path: PathBuf,
        got: u32,
        expected: u32,
    },
    /// The file ended before its header said it would.
    Truncated { path: PathBuf },
    /// The images and labels files disagree on the amount of samples.
    CountMismatch { images: usize, labels: usize },
    /// A label isn't one of the model's classes.
    LabelOutOfRange { label: usize, nb_labels: usize },
    /// The dataset name isn't one this crate knows how to load.
    UnknownDataset(String),
}

impl fmt::Display for DatasetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic {
                path,
                got,
                expected,
            } => write!(
                f,
                "{}: bad magic number {got:#010x}, expected {expected:#010x}",
                path.display()
            ),
            Self::Truncated { path } => write!(f, "{}: file is truncated", path.display()),
            Self::CountMismatch { images, labels } => {
                write!(f, "found {images} images but {labels} labels")
            }
            Self::LabelOutOfRange { label, nb_labels } => {
                write!(f, "label {label} is out of range for {nb_labels} classes")
            }
            Self::UnknownDataset(name) => write!(f, "unknown dataset {name:?}"),
        }
    }
}

impl std::error::Error for DatasetErr {}

/// All errors that can occur while training a teacher.
#[derive(Debug)]
pub enum TeacherErr {
    /// An underlying I/O error.
    Io(io::Error),
    /// A numerical error raised by the model.
    Ml(MlErr),
    /// The dataset files are malformed.
    Dataset(DatasetErr),
    /// The teacher index isn't one of the ensemble's.
    InvalidTeacherId { teacher_id: usize, nb_teachers: usize },
    /// An ensemble must have at least one teacher.
    NoTeachers,
    /// The inputs and labels to partition have different lengths.
    LengthMismatch { inputs: usize, labels: usize },
    /// The checkpoint couldn't be written or parsed.
    Checkpoint(SafeTensorError),
    /// The checkpoint doesn't match the model it's loaded into.
    CheckpointLayout(String),
    /// Invalid configuration, caught before training.
    InvalidConfig(String),
    /// The configuration couldn't be (de)serialized.
    Json(serde_json::Error),
}

impl fmt::Display for TeacherErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Ml(e) => write!(f, "model error: {e}"),
            Self::Dataset(e) => write!(f, "dataset error: {e}"),
            Self::InvalidTeacherId {
                teacher_id,
                nb_teachers,
            } => write!(
                f,
                "teacher id {teacher_id} is out of range for {nb_teachers} teachers"
            ),
            Self::NoTeachers => write!(f, "the ensemble must have at least one teacher"),
            Self::LengthMismatch { inputs, labels } => {
                write!(f, "got {inputs} inputs but {labels} labels")
            }
            Self::Checkpoint(e) => write!(f, "checkpoint error: {e}"),
            Self::CheckpointLayout(msg) => write!(f, "checkpoint layout mismatch: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Json(e) => write!(f, "config serialization error: {e}"),
        }
    }
}

impl std::error::Error for TeacherErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Ml(e) => Some(e),
            Self::Dataset(e) => Some(e),
            Self::Checkpoint(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TeacherErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlErr> for TeacherErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<DatasetErr> for TeacherErr {
    fn from(e: DatasetErr) -> Self {
        Self::Dataset(e)
    }
}

impl From<SafeTensorError> for TeacherErr {
    fn from(e: SafeTensorError) -> Self {
        Self::Checkpoint(e)
    }
}

impl From<serde_json::Error> for TeacherErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<ndarray::ShapeError> for TeacherErr {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Ml(MlErr::from(e))
    }
}
