use std::{cell::RefCell, rc::Rc};

use ndarray::{linalg, prelude::*};
use rand::Rng;

use crate::{
    MlErr, Result,
    arch::{ParamSpec, activations::ActFn},
    initialization::{ChainedParamGen, ConstParamGen, ParamGen, RandParamGen},
};

/// A fully connected layer, `a = act_fn(x · w + b)`.
///
/// Its slice of the parameter buffer holds the `(n, m)` weights in row-major order followed by
/// the `m` biases.
#[derive(Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata, only kept on training passes
    x: Option<Array2<f32>>,
    z: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    /// * `act_fn` - An optional activation function applied to the outputs.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: None,
            z: None,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec {
                name: "kernel".into(),
                shape: vec![self.dim.0, self.dim.1],
            },
            ParamSpec {
                name: "bias".into(),
                shape: vec![self.dim.1],
            },
        ]
    }

    /// Xavier uniform weights and zeroed biases.
    pub fn param_gen<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Box<dyn ParamGen>> {
        let (n, m) = self.dim;
        let weights = RandParamGen::xavier_uniform(rng.clone(), n * m, n, m)?;
        let biases = ConstParamGen::zeros(m);
        Ok(Box::new(ChainedParamGen::new(vec![
            Box::new(weights),
            Box::new(biases),
        ])))
    }

    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayD<f32>,
        training: bool,
    ) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix2>()?;
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense layer inputs",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut z);
        z += &b;

        self.x = training.then_some(x);

        let Some(act_fn) = self.act_fn else {
            self.z = None;
            return Ok(z.into_dyn());
        };

        let a = z.mapv(|z| act_fn.f(z));
        self.z = training.then_some(z);
        Ok(a.into_dyn())
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        let mut d = d.into_dimensionality::<Ix2>()?;
        let x = self.x.take().ok_or(MlErr::MissingCache { layer: "dense" })?;

        if let Some(act_fn) = &self.act_fn {
            let z = self.z.take().ok_or(MlErr::MissingCache { layer: "dense" })?;
            d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);

        Ok(dx.into_dyn())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense layer gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense layer parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let (w_raw, b_raw) = params.split_at(w_size);
        let weights = ArrayView2::from_shape(self.dim, w_raw)?;
        let biases = ArrayView1::from_shape(self.dim.1, b_raw)?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::layers::{Layer, gradcheck};

    #[test]
    fn forward_computes_the_affine_map() {
        let mut dense = Dense::new((2, 3), None);
        // w = [[1, 2, 3], [4, 5, 6]], b = [0.5, -0.5, 1]
        let params = [1., 2., 3., 4., 5., 6., 0.5, -0.5, 1.];
        let x = array![[1., 1.], [0., 2.]].into_dyn();

        let y = dense.forward(&params, x, false).unwrap();

        assert_eq!(y, array![[5.5, 6.5, 10.], [8.5, 9.5, 13.]].into_dyn());
    }

    #[test]
    fn relu_clamps_the_outputs() {
        let mut dense = Dense::new((1, 2), Some(ActFn::relu()));
        let params = [1., -1., 0., 0.];
        let x = array![[2.]].into_dyn();

        let y = dense.forward(&params, x, false).unwrap();

        assert_eq!(y, array![[2., 0.]].into_dyn());
    }

    #[test]
    fn rejects_inputs_of_the_wrong_width() {
        let mut dense = Dense::new((3, 1), None);
        let x = Array2::<f32>::zeros((2, 2)).into_dyn();

        assert!(matches!(
            dense.forward(&[0.; 4], x, false),
            Err(MlErr::SizeMismatch { got: 2, expected: 3, .. })
        ));
    }

    #[test]
    fn backward_without_a_training_pass_fails() {
        let mut dense = Dense::new((2, 2), None);
        let params = [0.; 6];
        let mut grad = [0.; 6];
        dense
            .forward(&params, Array2::zeros((1, 2)).into_dyn(), false)
            .unwrap();

        let res = dense.backward(&params, &mut grad, Array2::zeros((1, 2)).into_dyn());
        assert!(matches!(res, Err(MlErr::MissingCache { layer: "dense" })));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut layer = Layer::dense((3, 2), None);
        let params: Vec<f32> = (0..layer.size()).map(|i| (i as f32 * 0.37).sin()).collect();
        let x = Array2::from_shape_fn((4, 3), |(i, j)| ((i * 3 + j) as f32 * 0.53).cos());

        gradcheck::check(&mut layer, &params, x.into_dyn(), 1e-2, 1e-2);
    }

    #[test]
    fn backward_masks_inactive_units() {
        let mut dense = Dense::new((1, 2), Some(ActFn::relu()));
        let params = [1., -1., 0., 0.];
        let mut grad = [9.; 4];

        dense
            .forward(&params, array![[2.]].into_dyn(), true)
            .unwrap();
        let dx = dense
            .backward(&params, &mut grad, array![[1., 1.]].into_dyn())
            .unwrap();

        assert_eq!(grad, [2., 0., 1., 0.]);
        assert_eq!(dx, array![[1.]].into_dyn());
    }
}
