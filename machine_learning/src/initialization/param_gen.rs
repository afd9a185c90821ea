/// Produces the initial values of a slice of a model's flat parameter buffer, in buffer order.
pub trait ParamGen {
    /// Draws the next values, up to `n` of them.
    ///
    /// # Returns
    /// Fewer than `n` values when the generator runs out midway, `None` if it already had.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;
}
