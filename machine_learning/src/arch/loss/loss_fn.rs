use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A loss over a batch of unnormalized class scores and their integer labels.
pub trait LossFn {
    /// Returns the loss of the batch, reduced to a single value.
    ///
    /// # Arguments
    /// * `logits` - The `(batch, classes)` scores predicted by a model.
    /// * `labels` - The true class of every sample of the batch.
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<f32>;

    /// Returns the derivative of `loss` with respect to every one of the `logits`.
    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>>;
}
