use std::{fmt, path::Path, str::FromStr};

use log::info;
use ndarray::{Array4, ArrayView4};
use serde::{Deserialize, Serialize};

use super::idx;
use crate::error::{DatasetErr, Result};

/// The datasets teachers can be trained on. All of them are stored as IDX files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Mnist,
    FashionMnist,
}

impl DatasetKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Mnist => "mnist",
            Self::FashionMnist => "fashion_mnist",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatasetKind {
    type Err = DatasetErr;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "mnist" => Ok(Self::Mnist),
            "fashion_mnist" => Ok(Self::FashionMnist),
            other => Err(DatasetErr::UnknownDataset(other.to_string())),
        }
    }
}

/// An ordered collection of images and their labels, in `(n, height, width, channels)` layout.
#[derive(Debug, Clone)]
pub struct Dataset {
    inputs: Array4<f32>,
    labels: Vec<usize>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Errors
    /// If there isn't exactly one label per image.
    pub fn new(inputs: Array4<f32>, labels: Vec<usize>) -> Result<Self> {
        let images = inputs.len_of(ndarray::Axis(0));
        if images != labels.len() {
            return Err(DatasetErr::CountMismatch {
                images,
                labels: labels.len(),
            }
            .into());
        }

        Ok(Self { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn inputs(&self) -> ArrayView4<'_, f32> {
        self.inputs.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Checks every label is one of the `nb_labels` classes.
    pub fn check_labels(&self, nb_labels: usize) -> Result<()> {
        if let Some(&label) = self.labels.iter().find(|&&label| label >= nb_labels) {
            return Err(DatasetErr::LabelOutOfRange { label, nb_labels }.into());
        }

        Ok(())
    }

    /// Reads an images file and its labels file.
    pub fn read(images: &Path, labels: &Path) -> Result<Self> {
        Self::new(idx::read_images(images)?, idx::read_labels(labels)?)
    }
}

/// Loads the train and test splits of a dataset from `dir`, which must hold the standard
/// `train-*` and `t10k-*` IDX files.
///
/// # Returns
/// The `(train, test)` datasets.
pub fn load(dir: &Path, nb_labels: usize) -> Result<(Dataset, Dataset)> {
    let train = Dataset::read(
        &dir.join("train-images-idx3-ubyte"),
        &dir.join("train-labels-idx1-ubyte"),
    )?;
    let test = Dataset::read(
        &dir.join("t10k-images-idx3-ubyte"),
        &dir.join("t10k-labels-idx1-ubyte"),
    )?;

    train.check_labels(nb_labels)?;
    test.check_labels(nb_labels)?;

    info!(
        train = train.len(),
        test = test.len();
        "loaded dataset from {}",
        dir.display()
    );
    Ok((train, test))
}
