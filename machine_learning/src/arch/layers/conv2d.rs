use std::{cell::RefCell, rc::Rc};

use ndarray::prelude::*;
use rand::Rng;
use rayon::prelude::*;

use crate::{
    MlErr, Result,
    arch::{ParamSpec, activations::ActFn},
    initialization::{ChainedParamGen, ConstParamGen, ParamGen, RandParamGen},
};

/// A 2-D convolution over `(batch, height, width, channels)` inputs with stride 1 and "same"
/// padding, so the spatial dimensions are preserved.
///
/// The kernel is stored as `(kernel, kernel, in_channels, out_channels)` in row-major order,
/// followed by `out_channels` biases. Each sample is lowered to an im2col matrix so the
/// convolution becomes a single matrix product; samples are processed in parallel.
#[derive(Clone)]
pub struct Conv2d {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    act_fn: Option<ActFn>,

    // Forward metadata, only kept on training passes
    x: Option<Array4<f32>>,
    z: Option<Array4<f32>>,
}

impl Conv2d {
    /// Creates a new `Conv2d` layer.
    ///
    /// # Arguments
    /// * `in_channels` - The amount of channels of the input images.
    /// * `out_channels` - The amount of filters, that is, the channels of the output.
    /// * `kernel` - The side of the square kernel.
    /// * `act_fn` - An optional activation function applied to the outputs.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        act_fn: Option<ActFn>,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            act_fn,
            x: None,
            z: None,
        }
    }

    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.kernel_len() + self.out_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        let k = self.kernel;

        vec![
            ParamSpec {
                name: "kernel".into(),
                shape: vec![k, k, self.in_channels, self.out_channels],
            },
            ParamSpec {
                name: "bias".into(),
                shape: vec![self.out_channels],
            },
        ]
    }

    /// Xavier uniform kernel, the fans counting every position of the receptive field, and
    /// zeroed biases.
    pub fn param_gen<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Box<dyn ParamGen>> {
        let field = self.kernel * self.kernel;
        let fan_in = field * self.in_channels;
        let fan_out = field * self.out_channels;

        let kernel = RandParamGen::xavier_uniform(rng.clone(), self.kernel_len(), fan_in, fan_out)?;
        let biases = ConstParamGen::zeros(self.out_channels);
        Ok(Box::new(ChainedParamGen::new(vec![
            Box::new(kernel),
            Box::new(biases),
        ])))
    }

    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayD<f32>,
        training: bool,
    ) -> Result<ArrayD<f32>> {
        let x = x.into_dimensionality::<Ix4>()?;
        let (n, h, w, c) = x.dim();
        if c != self.in_channels {
            return Err(MlErr::SizeMismatch {
                what: "convolution input channels",
                got: c,
                expected: self.in_channels,
            });
        }

        let (kernel, bias) = self.view_params(params)?;
        let k = self.kernel;

        let outputs = x
            .outer_iter()
            .into_par_iter()
            .map(|x_i| {
                let cols = im2col(x_i, k);
                let mut out = cols.dot(&kernel);
                out += &bias;
                out
            })
            .collect::<Vec<_>>();

        let mut raw = Vec::with_capacity(n * h * w * self.out_channels);
        for out in outputs {
            raw.extend(out.iter());
        }
        let z = Array4::from_shape_vec((n, h, w, self.out_channels), raw)?;

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
        let mut d = d.into_dimensionality::<Ix4>()?;
        let x = self.x.take().ok_or(MlErr::MissingCache { layer: "conv2d" })?;

        if let Some(act_fn) = &self.act_fn {
            let z = self.z.take().ok_or(MlErr::MissingCache { layer: "conv2d" })?;
            d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));
        }

        let (kernel, _) = self.view_params(params)?;
        let (n, h, w, c) = x.dim();
        let k = self.kernel;
        let cout = self.out_channels;

        let parts = (0..n)
            .into_par_iter()
            .map(|i| -> Result<(Array3<f32>, Array2<f32>)> {
                let d_i = d.index_axis(Axis(0), i);
                let d_rows = d_i.to_shape((h * w, cout))?;
                let cols = im2col(x.index_axis(Axis(0), i), k);

                let dk = cols.t().dot(&d_rows);
                let dcols = d_rows.dot(&kernel.t());
                Ok((col2im(dcols.view(), (h, w, c), k), dk))
            })
            .collect::<Result<Vec<_>>>()?;

        let (mut dk, mut db) = self.view_grad(grad)?;
        dk.fill(0.);
        let mut dx = Array4::<f32>::zeros((n, h, w, c));

        for (i, (dx_i, dk_i)) in parts.into_iter().enumerate() {
            dx.index_axis_mut(Axis(0), i).assign(&dx_i);
            dk += &dk_i;
        }

        let d_rows = d.to_shape((n * h * w, cout))?;
        db.assign(&d_rows.sum_axis(Axis(0)));

        Ok(dx.into_dyn())
    }

    fn kernel_len(&self) -> usize {
        self.kernel * self.kernel * self.in_channels * self.out_channels
    }

    fn kernel_rows(&self) -> usize {
        self.kernel * self.kernel * self.in_channels
    }

    /// Views the kernel as a `(kernel * kernel * in_channels, out_channels)` matrix, matching
    /// the column layout of `im2col`.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("convolution parameters", params.len())?;

        let (k_raw, b_raw) = params.split_at(self.kernel_len());
        let kernel = ArrayView2::from_shape((self.kernel_rows(), self.out_channels), k_raw)?;
        let bias = ArrayView1::from_shape(self.out_channels, b_raw)?;
        Ok((kernel, bias))
    }

    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("convolution gradient", grad.len())?;

        let (k_raw, b_raw) = grad.split_at_mut(self.kernel_len());
        let dk = ArrayViewMut2::from_shape((self.kernel_rows(), self.out_channels), k_raw)?;
        let db = ArrayViewMut1::from_shape(self.out_channels, b_raw)?;
        Ok((dk, db))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size() {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size(),
            });
        }

        Ok(())
    }
}

/// Lays every `k x k` patch of a `(h, w, c)` image out as a row of a `(h * w, k * k * c)`
/// matrix. Row `y * w + x` holds the patch centered at `(y, x)`, column `(ky * k + kx) * c + ch`
/// the value at offset `(ky, kx)` and channel `ch`. Out of bounds positions are zero.
fn im2col(x: ArrayView3<f32>, k: usize) -> Array2<f32> {
    let (h, w, c) = x.dim();
    let pad = (k - 1) / 2;
    let mut cols = Array2::zeros((h * w, k * k * c));

    for oy in 0..h {
        for ox in 0..w {
            let mut row = cols.row_mut(oy * w + ox);

            for ky in 0..k {
                let Some(iy) = (oy + ky).checked_sub(pad).filter(|&iy| iy < h) else {
                    continue;
                };

                for kx in 0..k {
                    let Some(ix) = (ox + kx).checked_sub(pad).filter(|&ix| ix < w) else {
                        continue;
                    };

                    let base = (ky * k + kx) * c;
                    for ch in 0..c {
                        row[base + ch] = x[[iy, ix, ch]];
                    }
                }
            }
        }
    }

    cols
}

/// The adjoint of `im2col`: scatters every patch row back into a `(h, w, c)` image, adding up
/// the contributions of overlapping patches.
fn col2im(cols: ArrayView2<f32>, (h, w, c): (usize, usize, usize), k: usize) -> Array3<f32> {
    let pad = (k - 1) / 2;
    let mut x = Array3::zeros((h, w, c));

    for oy in 0..h {
        for ox in 0..w {
            let row = cols.row(oy * w + ox);

            for ky in 0..k {
                let Some(iy) = (oy + ky).checked_sub(pad).filter(|&iy| iy < h) else {
                    continue;
                };

                for kx in 0..k {
                    let Some(ix) = (ox + kx).checked_sub(pad).filter(|&ix| ix < w) else {
                        continue;
                    };

                    let base = (ky * k + kx) * c;
                    for ch in 0..c {
                        x[[iy, ix, ch]] += row[base + ch];
                    }
                }
            }
        }
    }

    x
}
