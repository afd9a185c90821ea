use std::{
    error::Error,
    fmt::{self, Display},
};

use ndarray::ShapeError;
use rand_distr::uniform::Error as UniformError;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    Shape(ShapeError),
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    MissingCache {
        layer: &'static str,
    },
    EmptyBatch,
    ParamGen(String),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Shape(e) => write!(f, "Invalid tensor shape: {e}"),
            MlErr::LabelOutOfRange { label, classes } => write!(
                f,
                "Label {label} is out of range for a model with {classes} classes"
            ),
            MlErr::MissingCache { layer } => write!(
                f,
                "Tried to run a backward pass through a {layer} layer without a training forward pass"
            ),
            MlErr::EmptyBatch => write!(f, "Can't compute a loss over an empty batch"),
            MlErr::ParamGen(e) => write!(f, "Failed to generate the initial parameters: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::ParamGen(value.to_string())
    }
}
