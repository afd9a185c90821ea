use ndarray::prelude::*;

use crate::{MlErr, Result};

/// Collapses every axis but the batch axis, `(n, ..)` to `(n, features)`.
#[derive(Clone, Default)]
pub struct Flatten {
    shape: Option<Vec<usize>>,
}

impl Flatten {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forward(&mut self, x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        let shape = x.shape().to_vec();
        let n = shape.first().copied().unwrap_or(0);
        let features: usize = shape.iter().skip(1).product();

        let y = x
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&[n, features]))?;
        self.shape = training.then_some(shape);
        Ok(y)
    }

    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let shape = self.shape.take().ok_or(MlErr::MissingCache { layer: "flatten" })?;
        let d = d
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(&shape))?;
        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_in_row_major_order() {
        let mut flatten = Flatten::new();
        let x = Array4::from_shape_fn((2, 2, 1, 3), |(n, y, _, c)| (n * 6 + y * 3 + c) as f32);

        let y = flatten.forward(x.into_dyn(), false).unwrap();

        let expected = Array2::from_shape_fn((2, 6), |(n, i)| (n * 6 + i) as f32);
        assert_eq!(y, expected.into_dyn());
    }

    #[test]
    fn backward_restores_the_input_shape() {
        let mut flatten = Flatten::new();
        let x = Array4::<f32>::zeros((3, 2, 2, 4));
        flatten.forward(x.into_dyn(), true).unwrap();

        let d = Array2::from_shape_fn((3, 16), |(n, i)| (n * 16 + i) as f32);
        let dx = flatten.backward(d.into_dyn()).unwrap();

        assert_eq!(dx.shape(), &[3, 2, 2, 4]);
        assert_eq!(dx[[1, 0, 1, 2]], 22.);
    }
}
