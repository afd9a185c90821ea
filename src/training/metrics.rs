use std::fmt;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Unweighted running mean of the values it's updated with.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    pub fn update(&mut self, value: f32) {
        self.total += value as f64;
        self.count += 1;
    }

    /// The mean of every value since the last reset, zero if there were none.
    pub fn result(&self) -> f32 {
        if self.count == 0 {
            return 0.;
        }

        (self.total / self.count as f64) as f32
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fraction of samples whose highest score is the one of their label, weighted by sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCategoricalAccuracy {
    correct: usize,
    seen: usize,
}

impl SparseCategoricalAccuracy {
    /// Accumulates a batch of predictions.
    ///
    /// # Arguments
    /// * `logits` - The `(batch, classes)` scores, only their argmax matters.
    /// * `labels` - The true class of every sample.
    pub fn update(&mut self, logits: ArrayView2<f32>, labels: &[usize]) {
        for (row, &label) in logits.outer_iter().zip(labels) {
            if argmax(row.iter().copied()) == Some(label) {
                self.correct += 1;
            }
            self.seen += 1;
        }
    }

    /// `correct / seen` since the last reset, zero if nothing was seen.
    pub fn result(&self) -> f32 {
        if self.seen == 0 {
            return 0.;
        }

        self.correct as f32 / self.seen as f32
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Index of the first maximum, ties going to the lowest index.
fn argmax(values: impl Iterator<Item = f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;

    for (i, v) in values.enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }

    best.map(|(i, _)| i)
}

/// The four accumulators of an epoch: loss and accuracy for the train and test passes.
#[derive(Debug, Clone, Default)]
pub struct EpochMetrics {
    pub train_loss: Mean,
    pub train_accuracy: SparseCategoricalAccuracy,
    pub test_loss: Mean,
    pub test_accuracy: SparseCategoricalAccuracy,
}

impl EpochMetrics {
    pub fn reset(&mut self) {
        self.train_loss.reset();
        self.train_accuracy.reset();
        self.test_loss.reset();
        self.test_accuracy.reset();
    }

    /// Reads the accumulators into a summary of epoch `epoch`.
    pub fn summary(&self, epoch: usize, train_secs: f64) -> EpochSummary {
        EpochSummary {
            epoch,
            train_loss: self.train_loss.result(),
            train_accuracy: self.train_accuracy.result(),
            test_loss: self.test_loss.result(),
            test_accuracy: self.test_accuracy.result(),
            train_secs,
        }
    }
}

/// What an epoch ended with. Accuracies are fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// 1-based epoch number.
    pub epoch: usize,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub test_loss: f32,
    pub test_accuracy: f32,
    /// Wall-clock duration of the train pass.
    pub train_secs: f64,
}

impl fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {}, Loss: {}, Accuracy: {}, Test Loss {}, Test Accuracy: {}",
            self.epoch,
            self.train_loss,
            self.train_accuracy * 100.,
            self.test_loss,
            self.test_accuracy * 100.
        )
    }
}
