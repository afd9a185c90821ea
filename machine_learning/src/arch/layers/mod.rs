mod conv2d;
mod dense;
mod flatten;
mod layer;
mod lrn;
mod max_pool;

pub use conv2d::Conv2d;
pub use dense::Dense;
pub use flatten::Flatten;
pub use layer::Layer;
pub use lrn::LocalResponseNorm;
pub use max_pool::MaxPool2d;

/// Finite-difference gradient checks shared by the layer tests.
#[cfg(test)]
pub(crate) mod gradcheck {
    use ndarray::prelude::*;

    use super::Layer;

    /// Scalar objective `sum(y * r)` for a fixed projection `r`, accumulated in `f64`.
    fn objective(y: &ArrayD<f32>, r: &ArrayD<f32>) -> f64 {
        y.iter().zip(r).map(|(&y, &r)| y as f64 * r as f64).sum()
    }

    /// Checks the analytic parameter and input gradients of `layer` against central
    /// differences of `sum(layer(x) * r)`.
    ///
    /// # Arguments
    /// * `layer` - The layer under test.
    /// * `params` - The layer's parameters.
    /// * `x` - The input batch.
    /// * `eps` - The perturbation applied to every scalar.
    /// * `tol` - The relative tolerance.
    pub fn check(layer: &mut Layer, params: &[f32], x: ArrayD<f32>, eps: f32, tol: f32) {
        let y = layer.forward(params, x.clone(), true).unwrap();
        let r = ArrayD::from_shape_vec(
            y.raw_dim(),
            (0..y.len()).map(|i| (i as f32 * 0.71).sin()).collect(),
        )
        .unwrap();

        let mut grad = vec![0.; params.len()];
        let dx = layer.backward(params, &mut grad, r.clone()).unwrap();
        assert_eq!(dx.shape(), x.shape());

        let mut eval = |params: &[f32], x: &ArrayD<f32>| {
            let y = layer.forward(params, x.clone(), false).unwrap();
            objective(&y, &r)
        };

        let mut perturbed = params.to_vec();
        for i in 0..params.len() {
            perturbed[i] = params[i] + eps;
            let plus = eval(&perturbed, &x);
            perturbed[i] = params[i] - eps;
            let minus = eval(&perturbed, &x);
            perturbed[i] = params[i];

            let numeric = ((plus - minus) / (2. * eps as f64)) as f32;
            assert_close("param", i, grad[i], numeric, tol);
        }

        for (i, &analytic) in dx.iter().enumerate() {
            let mut shifted = x.clone();
            let Some(v) = shifted.iter_mut().nth(i) else {
                unreachable!();
            };
            let original = *v;

            *v = original + eps;
            let plus = eval(params, &shifted);
            let Some(v) = shifted.iter_mut().nth(i) else {
                unreachable!();
            };
            *v = original - eps;
            let minus = eval(params, &shifted);

            let numeric = ((plus - minus) / (2. * eps as f64)) as f32;
            assert_close("input", i, analytic, numeric, tol);
        }
    }

    fn assert_close(what: &str, i: usize, analytic: f32, numeric: f32, tol: f32) {
        assert!(
            (analytic - numeric).abs() <= tol * (1. + numeric.abs()),
            "{what} {i}: analytic {analytic} vs numeric {numeric}"
        );
    }
}
