mod builder;
mod cli;
mod model;
mod training;

pub use builder::ModelBuilder;
pub use cli::Args;
pub use model::{ActFnConfig, LayerConfig, ModelConfig};
pub use training::TeacherConfig;
