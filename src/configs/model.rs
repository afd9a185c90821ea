use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ActFnConfig {
    Relu,
}

/// One layer of a sequential model. Input sizes are not part of the config, they are inferred
/// from the previous layer's output when building.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LayerConfig {
    Conv2d {
        filters: usize,
        kernel: usize,
        act_fn: Option<ActFnConfig>,
    },
    MaxPool2d {
        pool: usize,
        stride: usize,
    },
    Lrn {
        radius: usize,
        bias: f32,
        alpha: f32,
        beta: f32,
    },
    Flatten,
    Dense {
        units: usize,
        act_fn: Option<ActFnConfig>,
    },
}

/// A sequential model over `(height, width, channels)` images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub input: (usize, usize, usize),
    pub layers: Vec<LayerConfig>,
}

impl ModelConfig {
    /// The convolutional network every teacher of the ensemble trains, over 28x28 grayscale
    /// images.
    pub fn pate_cnn(nb_labels: usize) -> Self {
        let lrn = LayerConfig::Lrn {
            radius: 4,
            bias: 1.,
            alpha: 0.001 / 9.,
            beta: 0.75,
        };
        let pool = LayerConfig::MaxPool2d { pool: 3, stride: 2 };

        Self {
            input: (28, 28, 1),
            layers: vec![
                LayerConfig::Conv2d {
                    filters: 64,
                    kernel: 5,
                    act_fn: Some(ActFnConfig::Relu),
                },
                pool,
                lrn,
                LayerConfig::Conv2d {
                    filters: 128,
                    kernel: 5,
                    act_fn: Some(ActFnConfig::Relu),
                },
                lrn,
                pool,
                LayerConfig::Flatten,
                LayerConfig::Dense {
                    units: 384,
                    act_fn: Some(ActFnConfig::Relu),
                },
                LayerConfig::Dense {
                    units: 192,
                    act_fn: Some(ActFnConfig::Relu),
                },
                LayerConfig::Dense {
                    units: nb_labels,
                    act_fn: None,
                },
            ],
        }
    }
}
