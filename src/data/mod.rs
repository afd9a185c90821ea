mod dataloader;
mod dataset;
pub mod idx;
mod partition;

pub use dataloader::{Batch, Batches, DataLoader};
pub use dataset::{Dataset, DatasetKind, load};
pub use partition::{partition_dataset, partition_range};
