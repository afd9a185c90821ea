use std::{cell::RefCell, rc::Rc};

use ndarray::{Array2, ArrayD, Ix2};
use rand::Rng;

use super::{Model, ParamSpec, layers::Layer};
use crate::{
    MlErr, Result,
    initialization::{ChainedParamGen, ParamGen},
    optimization::Optimizer,
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The model owns one flat buffer with the parameters of every layer, laid out in layer order,
/// and a gradient buffer of the same size.
#[derive(Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
    params: Vec<f32>,
    grad: Vec<f32>,
}

impl Sequential {
    /// Creates a new `Sequential` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<_> = layers.into_iter().collect();
        let size = layers.iter().map(Layer::size).sum();

        Self {
            layers,
            params: vec![0.; size],
            grad: vec![0.; size],
        }
    }

    /// Creates a new `Sequential` with the given parameters.
    ///
    /// # Errors
    /// If `params` doesn't have exactly as many values as the layers need.
    pub fn with_params<I>(layers: I, params: Vec<f32>) -> Result<Self>
    where
        I: IntoIterator<Item = Layer>,
    {
        let mut model = Self::new(layers);
        if params.len() != model.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "model parameters",
                got: params.len(),
                expected: model.params.len(),
            });
        }

        model.params = params;
        Ok(model)
    }

    /// Creates a new `Sequential` initialized by each layer's own parameter generator.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `rng` - The random number generator shared by the layers' generators.
    pub fn init<I, R>(layers: I, rng: &Rc<RefCell<R>>) -> Result<Self>
    where
        I: IntoIterator<Item = Layer>,
        R: Rng + 'static,
    {
        let layers: Vec<_> = layers.into_iter().collect();
        let size: usize = layers.iter().map(Layer::size).sum();

        let param_gens = layers
            .iter()
            .map(|layer| layer.param_gen(rng))
            .collect::<Result<Vec<_>>>()?;
        let mut param_gen = ChainedParamGen::new(param_gens);

        let params = match param_gen.sample(size) {
            Some(params) => params,
            None if size == 0 => Vec::new(),
            None => return Err(MlErr::ParamGen("generators exhausted".into())),
        };

        Self::with_params(layers, params)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The gradient computed by the last `backward` call.
    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `x` - The input batch.
    /// * `training` - Whether the layers should keep what `backward` needs.
    ///
    /// # Returns
    /// The output of the last layer or an error if occurred.
    pub fn forward(&mut self, mut x: ArrayD<f32>, training: bool) -> Result<ArrayD<f32>> {
        let mut rest = self.params.as_slice();

        for layer in self.layers.iter_mut() {
            let (params, tail) = rest.split_at(layer.size());
            x = layer.forward(params, x, training)?;
            rest = tail;
        }

        Ok(x)
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn predict(&mut self, x: ArrayD<f32>, training: bool) -> Result<Array2<f32>> {
        let y = self.forward(x, training)?;
        Ok(y.into_dimensionality::<Ix2>()?)
    }

    fn backward(&mut self, d: Array2<f32>) -> Result<()> {
        let mut d = d.into_dyn();
        let mut end = self.params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            let params = &self.params[start..end];
            let grad = &mut self.grad[start..end];

            d = layer.backward(params, grad, d)?;
            end = start;
        }

        Ok(())
    }

    fn optimize<O: Optimizer>(&mut self, optimizer: &mut O) {
        optimizer.update_params(&mut self.params, &self.grad);
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }

    fn param_specs(&self) -> Vec<ParamSpec> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer.param_specs().into_iter().map(move |spec| ParamSpec {
                    name: format!("{i}.{}", spec.name),
                    shape: spec.shape,
                })
            })
            .collect()
    }
}
