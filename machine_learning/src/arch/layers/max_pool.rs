use ndarray::{Zip, prelude::*};

use crate::{MlErr, Result};

/// Max pooling over `(batch, height, width, channels)` inputs with "same" padding: the output
/// has `ceil(h / stride)` rows and `ceil(w / stride)` columns, the padding split evenly with the
/// extra row or column going after the image. Padded positions never win the max.
#[derive(Clone)]
pub struct MaxPool2d {
    pool: usize,
    stride: usize,

    // Input shape and flat `y * w + x` index of the winner of every output, training only
    input_dim: Option<(usize, usize, usize, usize)>,
    argmax: Option<Array4<usize>>,
}

impl MaxPool2d {
    /// Creates a new `MaxPool2d` layer.
    ///
    /// # Arguments
    /// * `pool` - The side of the square pooling window.
    /// * `stride` - The step between consecutive windows.
    pub fn new(pool: usize, stride: usize) -> Self {
        Self {
            pool,
            stride,
            input_dim: None,
            argmax: None,
        }
    }

    /// The output spatial dimensions for an input of `h` by `w`.
    pub fn output_dim(&self, (h, w): (usize, usize)) -> (usize, usize) {
        (h.div_ceil(self.stride), w.div_ceil(self.stride))
    }

    pub fn forward(&mut self, x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, h, w, c) = x.dim();
        if h == 0 || w == 0 {
            return Err(MlErr::SizeMismatch {
                what: "pooled image side",
                got: 0,
                expected: self.pool,
            });
        }

        let (oh, ow) = self.output_dim((h, w));
        let pad_y = self.pad_before(h, oh);
        let pad_x = self.pad_before(w, ow);

        let mut out = Array4::<f32>::zeros((n, oh, ow, c));
        let mut argmax = Array4::<usize>::zeros((n, oh, ow, c));

        Zip::from(out.outer_iter_mut())
            .and(argmax.outer_iter_mut())
            .and(x.outer_iter())
            .par_for_each(|mut out, mut argmax, x| {
                for oy in 0..oh {
                    let rows = self.window(oy, pad_y, h);
                    for ox in 0..ow {
                        let cols = self.window(ox, pad_x, w);

                        for ch in 0..c {
                            let mut best = f32::NEG_INFINITY;
                            let mut best_at = rows.start * w + cols.start;

                            for iy in rows.clone() {
                                for ix in cols.clone() {
                                    let v = x[[iy, ix, ch]];
                                    if v > best {
                                        best = v;
                                        best_at = iy * w + ix;
                                    }
                                }
                            }

                            out[[oy, ox, ch]] = best;
                            argmax[[oy, ox, ch]] = best_at;
                        }
                    }
                }
            });

        if training {
            self.input_dim = Some((n, h, w, c));
            self.argmax = Some(argmax);
        } else {
            self.input_dim = None;
            self.argmax = None;
        }

        Ok(out.into_dyn())
    }

    /// Routes every output derivative back to the input position that won its window.
    pub fn backward(&mut self, d: ArrayD<f32>) -> Result<ArrayD<f32>> {
        let d = d.into_dimensionality::<Ix4>()?;
        let missing = || MlErr::MissingCache { layer: "max_pool2d" };
        let (n, h, w, c) = self.input_dim.take().ok_or_else(missing)?;
        let argmax = self.argmax.take().ok_or_else(missing)?;

        if d.dim() != argmax.dim() {
            return Err(MlErr::SizeMismatch {
                what: "max pooling derivative",
                got: d.len(),
                expected: argmax.len(),
            });
        }

        let mut dx = Array4::<f32>::zeros((n, h, w, c));

        Zip::from(dx.outer_iter_mut())
            .and(argmax.outer_iter())
            .and(d.outer_iter())
            .par_for_each(|mut dx, argmax, d| {
                Zip::indexed(argmax).and(d).for_each(|(_, _, ch), &at, &d| {
                    dx[[at / w, at % w, ch]] += d;
                });
            });

        Ok(dx.into_dyn())
    }

    fn pad_before(&self, len: usize, out: usize) -> usize {
        let needed = (out - 1) * self.stride + self.pool;
        needed.saturating_sub(len) / 2
    }

    /// The in-bounds input positions covered by window `o`.
    fn window(&self, o: usize, pad: usize, len: usize) -> std::ops::Range<usize> {
        let start = o * self.stride;
        let end = start + self.pool;
        start.saturating_sub(pad)..end.saturating_sub(pad).min(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::layers::{Layer, gradcheck};

    #[test]
    fn output_dims_round_up() {
        let pool = MaxPool2d::new(3, 2);

        assert_eq!(pool.output_dim((28, 28)), (14, 14));
        assert_eq!(pool.output_dim((7, 5)), (4, 3));
    }

    #[test]
    fn picks_the_max_of_each_window() {
        // 4x4 image holding 0..16, pool 2 stride 2: no padding
        let mut pool = MaxPool2d::new(2, 2);
        let x = Array4::from_shape_fn((1, 4, 4, 1), |(_, y, x, _)| (y * 4 + x) as f32);

        let y = pool.forward(x.into_dyn(), false).unwrap();

        let expected = Array4::from_shape_vec((1, 2, 2, 1), vec![5., 7., 13., 15.]).unwrap();
        assert_eq!(y, expected.into_dyn());
    }

    #[test]
    fn padded_positions_never_win() {
        // 4x4 of negatives, pool 3 stride 2: total padding 1, all of it after the image
        let mut pool = MaxPool2d::new(3, 2);
        let x = Array4::from_shape_fn((1, 4, 4, 1), |(_, y, x, _)| -((y * 4 + x) as f32) - 1.);

        let y = pool.forward(x.into_dyn(), false).unwrap();

        let expected = Array4::from_shape_vec((1, 2, 2, 1), vec![-1., -3., -9., -11.]).unwrap();
        assert_eq!(y, expected.into_dyn());
    }

    #[test]
    fn channels_are_pooled_independently() {
        let mut pool = MaxPool2d::new(2, 2);
        let x = Array4::from_shape_vec((1, 2, 2, 2), vec![1., 8., 4., 5., 3., 6., 2., 7.])
            .unwrap();

        let y = pool.forward(x.into_dyn(), false).unwrap();

        assert_eq!(
            y,
            Array4::from_shape_vec((1, 1, 1, 2), vec![4., 8.]).unwrap().into_dyn()
        );
    }

    #[test]
    fn backward_routes_to_the_winners() {
        let mut pool = MaxPool2d::new(2, 2);
        let x = Array4::from_shape_vec((1, 2, 2, 1), vec![1., 9., 3., 2.]).unwrap();
        pool.forward(x.into_dyn(), true).unwrap();

        let d = Array4::from_elem((1, 1, 1, 1), 2.5).into_dyn();
        let dx = pool.backward(d).unwrap();

        let expected = Array4::from_shape_vec((1, 2, 2, 1), vec![0., 2.5, 0., 0.]).unwrap();
        assert_eq!(dx, expected.into_dyn());
    }

    #[test]
    fn backward_without_a_training_pass_fails() {
        let mut pool = MaxPool2d::new(2, 2);
        pool.forward(Array4::zeros((1, 2, 2, 1)).into_dyn(), false)
            .unwrap();

        let res = pool.backward(Array4::zeros((1, 1, 1, 1)).into_dyn());
        assert!(matches!(res, Err(MlErr::MissingCache { .. })));
    }

    #[test]
    fn gradients_match_finite_differences() {
        // distinct values spaced well beyond eps so no window has a tie
        let mut layer = Layer::max_pool2d(3, 2);
        let x = Array4::from_shape_fn((2, 5, 4, 2), |(n, y, x, c)| {
            let i = n * 40 + y * 8 + x * 2 + c;
            ((i * 37) % 80) as f32 * 0.1
        });

        gradcheck::check(&mut layer, &[], x.into_dyn(), 1e-3, 1e-2);
    }
}
