mod metrics;
mod schedule;
mod trainer;

pub use metrics::{EpochMetrics, EpochSummary, Mean, SparseCategoricalAccuracy};
pub use schedule::{MAX_EPOCHS, num_epochs};
pub use trainer::TeacherTrainer;
