use std::{cell::RefCell, rc::Rc};

use log::debug;
use machine_learning::arch::{Model, Sequential, activations::ActFn, layers::Layer};
use rand::Rng;

use super::{ActFnConfig, LayerConfig, ModelConfig};
use crate::error::{Result, TeacherErr};

/// The shape of a single sample flowing between layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Image(usize, usize, usize),
    Flat(usize),
}

/// Resolves a `ModelConfig` into layers, tracking the shape of the samples through the network
/// to fill in every layer's input size.
pub struct ModelBuilder {
    shape: Shape,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            shape: Shape::Flat(0),
        }
    }

    /// Builds the layers described by `config`.
    ///
    /// # Errors
    /// `InvalidConfig` if a layer doesn't fit the output of the previous one.
    pub fn build_layers(&mut self, config: &ModelConfig) -> Result<Vec<Layer>> {
        let (h, w, c) = config.input;
        self.shape = Shape::Image(h, w, c);

        config
            .layers
            .iter()
            .enumerate()
            .map(|(i, layer)| self.build_layer(i, layer))
            .collect()
    }

    /// Builds the model described by `config`, initializing its parameters with `rng`.
    pub fn build<R: Rng + 'static>(
        &mut self,
        config: &ModelConfig,
        rng: &Rc<RefCell<R>>,
    ) -> Result<Sequential> {
        let layers = self.build_layers(config)?;

        if !matches!(self.shape, Shape::Flat(_)) {
            return Err(TeacherErr::InvalidConfig(
                "the model must end in a flat layer of class scores".into(),
            ));
        }

        let model = Sequential::init(layers, rng)?;
        debug!(layers = model.layers().len(), params = model.size(); "built model");
        Ok(model)
    }

    fn build_layer(&mut self, i: usize, layer: &LayerConfig) -> Result<Layer> {
        let invalid = |msg: &str| TeacherErr::InvalidConfig(format!("layer {i}: {msg}"));

        let built = match (*layer, self.shape) {
            (LayerConfig::Conv2d { filters, kernel, act_fn }, Shape::Image(h, w, c)) => {
                if filters == 0 || kernel % 2 == 0 {
                    return Err(invalid("convolutions need filters and an odd kernel"));
                }

                self.shape = Shape::Image(h, w, filters);
                Layer::conv2d(c, filters, kernel, act_fn.map(to_act_fn))
            }
            (LayerConfig::MaxPool2d { pool, stride }, Shape::Image(h, w, c)) => {
                if pool == 0 || stride == 0 {
                    return Err(invalid("pooling needs a non empty window and stride"));
                }

                self.shape = Shape::Image(h.div_ceil(stride), w.div_ceil(stride), c);
                Layer::max_pool2d(pool, stride)
            }
            (
                LayerConfig::Lrn {
                    radius,
                    bias,
                    alpha,
                    beta,
                },
                Shape::Image(..),
            ) => Layer::lrn(radius, bias, alpha, beta),
            (LayerConfig::Flatten, Shape::Image(h, w, c)) => {
                self.shape = Shape::Flat(h * w * c);
                Layer::flatten()
            }
            (LayerConfig::Dense { units, act_fn }, Shape::Flat(n)) => {
                if units == 0 {
                    return Err(invalid("dense layers need at least one unit"));
                }

                self.shape = Shape::Flat(units);
                Layer::dense((n, units), act_fn.map(to_act_fn))
            }
            (_, Shape::Image(..)) => return Err(invalid("expected a flat input, got images")),
            (_, Shape::Flat(_)) => return Err(invalid("expected images, got a flat input")),
        };

        Ok(built)
    }
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn to_act_fn(config: ActFnConfig) -> ActFn {
    match config {
        ActFnConfig::Relu => ActFn::relu(),
    }
}
