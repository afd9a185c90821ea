use std::time::Instant;

use log::{debug, info, warn};
use machine_learning::{
    arch::{Model, loss::LossFn},
    optimization::Optimizer,
};
use ndarray::Array4;

use super::metrics::{EpochMetrics, EpochSummary};
use crate::{checkpoint::Checkpoint, data::DataLoader, error::Result};

/// Trains a single teacher: every epoch runs a train pass, saves the model and then evaluates it
/// on the test set.
pub struct TeacherTrainer<M, O, L> {
    model: M,
    optimizer: O,
    loss_fn: L,
    checkpoint: Checkpoint,
    num_epochs: usize,
    metrics: EpochMetrics,
}

impl<M, O, L> TeacherTrainer<M, O, L>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
{
    /// Returns a new `TeacherTrainer`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `optimizer` - Applies the gradient of every train batch.
    /// * `loss_fn` - Measures the difference between the model's scores and the labels.
    /// * `checkpoint` - Where the model is saved at the end of every train pass.
    /// * `num_epochs` - The amount of epochs `run` performs.
    pub fn new(
        model: M,
        optimizer: O,
        loss_fn: L,
        checkpoint: Checkpoint,
        num_epochs: usize,
    ) -> Self {
        Self {
            model,
            optimizer,
            loss_fn,
            checkpoint,
            num_epochs,
            metrics: EpochMetrics::default(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs every epoch and prints each one's summary line.
    ///
    /// # Arguments
    /// * `train` - The teacher's partition, its model is updated once per batch.
    /// * `test` - The evaluation set, only ever predicted on.
    ///
    /// # Returns
    /// The summary of every epoch, in order.
    pub fn run(
        &mut self,
        train: &mut DataLoader<'_>,
        test: &mut DataLoader<'_>,
    ) -> Result<Vec<EpochSummary>> {
        if self.num_epochs == 0 {
            warn!("the step budget doesn't cover a single epoch, nothing will be trained");
        }

        (1..=self.num_epochs)
            .map(|epoch| {
                let summary = self.epoch(epoch, train, test)?;
                println!("{summary}");
                Ok(summary)
            })
            .collect()
    }

    fn epoch(
        &mut self,
        epoch: usize,
        train: &mut DataLoader<'_>,
        test: &mut DataLoader<'_>,
    ) -> Result<EpochSummary> {
        self.metrics.reset();

        let start = Instant::now();
        for batch in train.batches() {
            self.train_step(batch.inputs, &batch.labels)?;
        }
        let train_secs = start.elapsed().as_secs_f64();
        info!("Epoch {epoch} time in seconds: {train_secs}");

        self.checkpoint.save(&self.model, epoch)?;

        for batch in test.batches() {
            let logits = self.model.predict(batch.inputs.into_dyn(), false)?;
            let loss = self.loss_fn.loss(logits.view(), &batch.labels)?;
            self.metrics.test_loss.update(loss);
            self.metrics
                .test_accuracy
                .update(logits.view(), &batch.labels);
        }

        let summary = self.metrics.summary(epoch, train_secs);
        debug!(
            epoch = epoch,
            train_loss = summary.train_loss,
            test_loss = summary.test_loss;
            "epoch done"
        );
        Ok(summary)
    }

    fn train_step(&mut self, inputs: Array4<f32>, labels: &[usize]) -> Result<()> {
        let logits = self.model.predict(inputs.into_dyn(), true)?;
        let loss = self.loss_fn.loss(logits.view(), labels)?;
        let d = self.loss_fn.loss_prime(logits.view(), labels)?;

        self.model.backward(d)?;
        self.model.optimize(&mut self.optimizer);

        self.metrics.train_loss.update(loss);
        self.metrics.train_accuracy.update(logits.view(), labels);
        Ok(())
    }
}
