use super::ParamGen;

/// A parameter generator that delegates to a chain of generators, moving on to the next one
/// whenever the current one runs out.
///
/// Each layer builds a chain for its own tensors (kernel, then bias), and the model chains the
/// layers' generators, so a single `sample(size)` call fills the whole flat buffer in order.
pub struct ChainedParamGen {
    param_gens: Vec<Box<dyn ParamGen>>,
    curr: usize,
}

impl ChainedParamGen {
    /// Creates a new `ChainedParamGen`.
    ///
    /// # Arguments
    /// * `param_gens` - The generators to drain, in order.
    pub fn new(param_gens: Vec<Box<dyn ParamGen>>) -> Self {
        Self {
            param_gens,
            curr: 0,
        }
    }
}

impl ParamGen for ChainedParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        let mut sample = Vec::with_capacity(n);

        while sample.len() < n && self.curr < self.param_gens.len() {
            match self.param_gens[self.curr].sample(n - sample.len()) {
                Some(part) if !part.is_empty() => sample.extend(part),
                _ => self.curr += 1,
            }
        }

        if sample.is_empty() && n > 0 {
            return None;
        }

        Some(sample)
    }
}
