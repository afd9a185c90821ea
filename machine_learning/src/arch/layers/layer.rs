use std::{cell::RefCell, rc::Rc};

use ndarray::ArrayD;
use rand::Rng;

use super::{Conv2d, Dense, Flatten, LocalResponseNorm, MaxPool2d};
use crate::{
    MlErr, Result,
    arch::{ParamSpec, activations::ActFn},
    initialization::{ConstParamGen, ParamGen},
};

#[derive(Clone)]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    Lrn(LocalResponseNorm),
    Flatten(Flatten),
    Dense(Dense),
}

impl Layer {
    /// Returns a new convolutional layer.
    ///
    /// # Arguments
    /// * `in_channels` - The channels of the input images.
    /// * `out_channels` - The amount of filters.
    /// * `kernel` - The side of the square kernel.
    /// * `act_fn` - An optional activation function.
    pub fn conv2d(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        act_fn: impl Into<Option<ActFn>>,
    ) -> Self {
        Self::Conv2d(Conv2d::new(
            in_channels,
            out_channels,
            kernel,
            act_fn.into(),
        ))
    }

    pub fn max_pool2d(pool: usize, stride: usize) -> Self {
        Self::MaxPool2d(MaxPool2d::new(pool, stride))
    }

    pub fn lrn(radius: usize, bias: f32, alpha: f32, beta: f32) -> Self {
        Self::Lrn(LocalResponseNorm::new(radius, bias, alpha, beta))
    }

    pub fn flatten() -> Self {
        Self::Flatten(Flatten::new())
    }

    /// Returns a new dense layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    /// * `act_fn` - An optional activation function.
    pub fn dense(dim: (usize, usize), act_fn: impl Into<Option<ActFn>>) -> Self {
        Self::Dense(Dense::new(dim, act_fn.into()))
    }

    /// Returns the amount of parameters this layer owns in the model's flat buffer.
    pub fn size(&self) -> usize {
        match self {
            Self::Conv2d(l) => l.size(),
            Self::Dense(l) => l.size(),
            Self::MaxPool2d(_) | Self::Lrn(_) | Self::Flatten(_) => 0,
        }
    }

    /// A short name of the kind of layer, used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conv2d(_) => "conv2d",
            Self::MaxPool2d(_) => "max_pool2d",
            Self::Lrn(_) => "lrn",
            Self::Flatten(_) => "flatten",
            Self::Dense(_) => "dense",
        }
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        match self {
            Self::Conv2d(l) => l.param_specs(),
            Self::Dense(l) => l.param_specs(),
            Self::MaxPool2d(_) | Self::Lrn(_) | Self::Flatten(_) => Vec::new(),
        }
    }

    /// Returns the generator of this layer's initial parameters.
    pub fn param_gen<R: Rng + 'static>(
        &self,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Box<dyn ParamGen>> {
        match self {
            Self::Conv2d(l) => l.param_gen(rng),
            Self::Dense(l) => l.param_gen(rng),
            Self::MaxPool2d(_) | Self::Lrn(_) | Self::Flatten(_) => {
                Ok(Box::new(ConstParamGen::zeros(0)))
            }
        }
    }

    /// Computes this layer's output.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of the model's parameters.
    /// * `x` - The layer's input.
    /// * `training` - Whether to keep what `backward` needs.
    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayD<f32>,
        training: bool,
    ) -> Result<ArrayD<f32>> {
        self.check_len(params.len())?;

        match self {
            Self::Conv2d(l) => l.forward(params, x, training),
            Self::MaxPool2d(l) => l.forward(x, training),
            Self::Lrn(l) => l.forward(x, training),
            Self::Flatten(l) => l.forward(x, training),
            Self::Dense(l) => l.forward(params, x, training),
        }
    }

    /// Writes this layer's gradient into `grad` and returns the derivative with respect to its
    /// input.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of the model's parameters.
    /// * `grad` - This layer's slice of the model's gradient.
    /// * `d` - The derivative of the loss with respect to this layer's output.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: ArrayD<f32>,
    ) -> Result<ArrayD<f32>> {
        self.check_len(params.len())?;

        match self {
            Self::Conv2d(l) => l.backward(params, grad, d),
            Self::MaxPool2d(l) => l.backward(d),
            Self::Lrn(l) => l.backward(d),
            Self::Flatten(l) => l.backward(d),
            Self::Dense(l) => l.backward(params, grad, d),
        }
    }

    fn check_len(&self, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what: self.kind(),
                got,
                expected,
            });
        }

        Ok(())
    }
}
