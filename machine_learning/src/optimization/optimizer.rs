/// An optimization algorithm, that is, a rule to update a model's parameters given their
/// gradient.
pub trait Optimizer {
    /// Updates `params` in place.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient of the loss with respect to `params`.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]);
}
