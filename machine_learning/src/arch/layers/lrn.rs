use ndarray::{Zip, prelude::*};

use crate::{MlErr, Result};

/// Local response normalization across the channel axis of `(batch, height, width, channels)`
/// inputs:
///
/// `y[c] = x[c] / (bias + alpha * sum(x[c']^2 for |c' - c| <= radius))^beta`
#[derive(Clone)]
pub struct LocalResponseNorm {
    radius: usize,
    bias: f32,
    alpha: f32,
    beta: f32,

    // Forward metadata, only kept on training passes
    x: Option<Array4<f32>>,
    scale: Option<Array4<f32>>,
}

impl LocalResponseNorm {
    /// Creates a new `LocalResponseNorm` layer.
    ///
    /// # Arguments
    /// * `radius` - How many neighbouring channels on each side take part in the sum.
    /// * `bias` - Added to the scaled sum, keeps the denominator away from zero.
    /// * `alpha` - Scale of the sum of squares.
    /// * `beta` - Exponent of the denominator.
    pub fn new(radius: usize, bias: f32, alpha: f32, beta: f32) -> Self {
        Self {
            radius,
            bias,
            alpha,
            beta,
            x: None,
            scale: None,
        }
    }

    pub fn forward(&mut self, x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let mut scale = Array4::<f32>::zeros(x.raw_dim());

        Zip::from(scale.lanes_mut(Axis(3)))
            .and(x.lanes(Axis(3)))
            .par_for_each(|mut scale, x| {
                let c = x.len();
                for j in 0..c {
                    let lo = j.saturating_sub(self.radius);
                    let hi = (j + self.radius + 1).min(c);
                    let sq: f32 = x.slice(s![lo..hi]).iter().map(|v| v * v).sum();
                    scale[j] = self.bias + self.alpha * sq;
                }
            });

        let beta = self.beta;
        let y = Zip::from(&x)
            .and(&scale)
            .par_map_collect(|&x, &s| x * s.powf(-beta));

        if training {
            self.x = Some(x);
            self.scale = Some(scale);
        } else {
            self.x = None;
            self.scale = None;
        }

        Ok(y.into_dyn())
    }

    /// `dx[j] = d[j] * s[j]^-beta - 2 * alpha * beta * x[j] * sum(d[i] * x[i] * s[i]^(-beta - 1))`
    /// over the channels `i` within `radius` of `j`.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let d = d.into_dimensionality::<Ix4>()?;
        let missing = || MlErr::MissingCache { layer: "lrn" };
        let x = self.x.take().ok_or_else(missing)?;
        let scale = self.scale.take().ok_or_else(missing)?;

        if d.dim() != x.dim() {
            return Err(MlErr::SizeMismatch {
                what: "local response normalization derivative",
                got: d.len(),
                expected: x.len(),
            });
        }

        let mut dx = Array4::<f32>::zeros(x.raw_dim());
        let (radius, alpha, beta) = (self.radius, self.alpha, self.beta);

        Zip::from(dx.lanes_mut(Axis(3)))
            .and(d.lanes(Axis(3)))
            .and(x.lanes(Axis(3)))
            .and(scale.lanes(Axis(3)))
            .par_for_each(|mut dx, d, x, s| {
                let c = x.len();
                let weighted: Vec<f32> = (0..c)
                    .map(|i| d[i] * x[i] * s[i].powf(-beta - 1.))
                    .collect();

                for j in 0..c {
                    let lo = j.saturating_sub(radius);
                    let hi = (j + radius + 1).min(c);
                    let cross: f32 = weighted[lo..hi].iter().sum();
                    dx[j] = d[j] * s[j].powf(-beta) - 2. * alpha * beta * x[j] * cross;
                }
            });

        Ok(dx.into_dyn())
    }
}
