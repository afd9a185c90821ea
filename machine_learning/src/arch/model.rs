use ndarray::{Array2, ArrayD};

use crate::{error::Result, optimization::Optimizer};

/// The name and shape of one of the tensors packed in a model's flat parameter buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParamSpec {
    /// Returns the amount of scalars this tensor holds.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Computes the unnormalized class scores for a batch of inputs.
    ///
    /// # Arguments
    /// * `x` - The batch of inputs, the first axis being the batch axis.
    /// * `training` - Whether the intermediate values needed by `backward` should be kept.
    ///
    /// # Returns
    /// A `(batch, classes)` matrix of scores.
    fn predict(&mut self, x: ArrayD<f32>, training: bool) -> Result<Array2<f32>>;

    /// Backpropagates the derivative of the loss with respect to the last `predict` output,
    /// overwriting the model's gradient buffer.
    ///
    /// # Arguments
    /// * `d` - The loss derivative, same shape as the predicted scores.
    fn backward(&mut self, d: Array2<f32>) -> Result<()>;

    /// Applies the last computed gradient to the parameters.
    ///
    /// # Arguments
    /// * `optimizer` - The optimizer that dictates how to update the parameters.
    fn optimize<O: Optimizer>(&mut self, optimizer: &mut O);

    /// The flat parameter buffer.
    fn params(&self) -> &[f32];

    /// The flat parameter buffer, mutably. Used to restore saved state.
    fn params_mut(&mut self) -> &mut [f32];

    /// Describes how the flat parameter buffer splits into named tensors, in buffer order.
    fn param_specs(&self) -> Vec<ParamSpec>;
}
