use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

/// Categorical cross-entropy between the softmax of a batch of logits and integer labels,
/// averaged over the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SparseCrossEntropy;

impl SparseCrossEntropy {
    fn check(logits: &ArrayView2<f32>, labels: &[usize]) -> Result<()> {
        let (batch, classes) = logits.dim();

        if batch == 0 {
            return Err(MlErr::EmptyBatch);
        }

        if labels.len() != batch {
            return Err(MlErr::SizeMismatch {
                what: "batch labels",
                got: labels.len(),
                expected: batch,
            });
        }

        if let Some(&label) = labels.iter().find(|&&label| label >= classes) {
            return Err(MlErr::LabelOutOfRange { label, classes });
        }

        Ok(())
    }
}

/// `log(sum(exp(z)))` computed around the row's max so large logits don't overflow.
fn log_sum_exp(row: ArrayView1<f32>) -> f32 {
    let max = row.fold(f32::NEG_INFINITY, |acc, &z| acc.max(z));
    max + row.iter().map(|&z| (z - max).exp()).sum::<f32>().ln()
}

impl LossFn for SparseCrossEntropy {
    fn loss(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<f32> {
        Self::check(&logits, labels)?;

        let total: f32 = logits
            .outer_iter()
            .zip(labels)
            .map(|(row, &label)| log_sum_exp(row) - row[label])
            .sum();

        Ok(total / labels.len() as f32)
    }

    /// `(softmax(z) - onehot(label)) / batch`
    fn loss_prime(&self, logits: ArrayView2<f32>, labels: &[usize]) -> Result<Array2<f32>> {
        Self::check(&logits, labels)?;

        let batch = labels.len() as f32;
        let mut d = logits.to_owned();

        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(labels) {
            let lse = log_sum_exp(row.view());
            row.mapv_inplace(|z| (z - lse).exp());
            row[label] -= 1.;
            row /= batch;
        }

        Ok(d)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn uniform_logits_give_log_of_the_classes() {
        let logits = Array2::zeros((3, 4));

        let loss = SparseCrossEntropy.loss(logits.view(), &[0, 1, 3]).unwrap();

        assert!((loss - 4f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn confident_and_right_is_almost_free() {
        let logits = array![[20., 0., 0.], [0., 0., 20.]];

        let loss = SparseCrossEntropy.loss(logits.view(), &[0, 2]).unwrap();

        assert!(loss < 1e-6);
    }

    #[test]
    fn large_logits_do_not_overflow() {
        let logits = array![[1000., 0.]];

        let loss = SparseCrossEntropy.loss(logits.view(), &[1]).unwrap();

        assert!((loss - 1000.).abs() < 1e-3);
    }

    #[test]
    fn gradient_rows_sum_to_zero() {
        let logits = array![[1., 2., 3.], [-1., 0.5, 0.]];

        let d = SparseCrossEntropy
            .loss_prime(logits.view(), &[2, 0])
            .unwrap();

        for row in d.outer_iter() {
            assert!(row.sum().abs() < 1e-6);
        }
        // only the true class gets a negative derivative
        assert!(d[[0, 2]] < 0. && d[[1, 0]] < 0.);
        assert!(d[[0, 0]] > 0. && d[[1, 1]] > 0.);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let logits = array![[0.3, -1.2, 2.0, 0.1], [1.5, 0.2, -0.4, 0.0]];
        let labels = [1, 0];
        let d = SparseCrossEntropy.loss_prime(logits.view(), &labels).unwrap();
        let eps = 1e-2;

        for ((i, j), &analytic) in d.indexed_iter() {
            let mut plus = logits.clone();
            plus[[i, j]] += eps;
            let mut minus = logits.clone();
            minus[[i, j]] -= eps;

            let numeric = (SparseCrossEntropy.loss(plus.view(), &labels).unwrap()
                - SparseCrossEntropy.loss(minus.view(), &labels).unwrap())
                / (2. * eps);
            assert!((analytic - numeric).abs() < 1e-3, "{analytic} vs {numeric}");
        }
    }

    #[test]
    fn rejects_labels_out_of_range() {
        let logits = Array2::zeros((1, 10));

        assert!(matches!(
            SparseCrossEntropy.loss(logits.view(), &[10]),
            Err(MlErr::LabelOutOfRange { label: 10, classes: 10 })
        ));
    }

    #[test]
    fn rejects_mismatched_labels_and_empty_batches() {
        let logits = Array2::zeros((2, 3));
        assert!(matches!(
            SparseCrossEntropy.loss(logits.view(), &[0]),
            Err(MlErr::SizeMismatch { got: 1, expected: 2, .. })
        ));

        let empty = Array2::zeros((0, 3));
        assert!(matches!(
            SparseCrossEntropy.loss_prime(empty.view(), &[]),
            Err(MlErr::EmptyBatch)
        ));
    }
}
