use ndarray::{Array4, ArrayView4, Axis, Slice};
use rand::{rngs::StdRng, seq::SliceRandom};

/// A mini-batch of images and their labels.
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Array4<f32>,
    pub labels: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Order {
    Sequential,
    Shuffled(StdRng),
}

/// Produces the mini-batches of a borrowed dataset, one pass at a time.
///
/// Every call to `batches` starts a new pass; a shuffled loader draws a fresh order for each.
/// The last batch of a pass holds whatever is left when the samples aren't a multiple of the
/// batch size.
#[derive(Debug, Clone)]
pub struct DataLoader<'a> {
    inputs: ArrayView4<'a, f32>,
    labels: &'a [usize],
    batch_size: usize,
    order: Order,
}

impl<'a> DataLoader<'a> {
    /// Creates a loader that walks the dataset in order.
    ///
    /// # Panics
    /// If `batch_size` is zero or there isn't one label per image.
    pub fn sequential(
        inputs: ArrayView4<'a, f32>,
        labels: &'a [usize],
        batch_size: usize,
    ) -> Self {
        Self::new(inputs, labels, batch_size, Order::Sequential)
    }

    /// Creates a loader that reshuffles the dataset on every pass.
    ///
    /// # Panics
    /// If `batch_size` is zero or there isn't one label per image.
    pub fn shuffled(
        inputs: ArrayView4<'a, f32>,
        labels: &'a [usize],
        batch_size: usize,
        rng: StdRng,
    ) -> Self {
        Self::new(inputs, labels, batch_size, Order::Shuffled(rng))
    }

    fn new(
        inputs: ArrayView4<'a, f32>,
        labels: &'a [usize],
        batch_size: usize,
        order: Order,
    ) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");
        assert_eq!(
            inputs.len_of(Axis(0)),
            labels.len(),
            "inputs and labels must have the same length"
        );

        Self {
            inputs,
            labels,
            batch_size,
            order,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// The amount of batches in a pass, `ceil(len / batch_size)`.
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.batch_size)
    }

    /// Starts a new pass over the dataset.
    pub fn batches(&mut self) -> Batches<'_, 'a> {
        let indices = match &mut self.order {
            Order::Sequential => None,
            Order::Shuffled(rng) => {
                let mut indices: Vec<usize> = (0..self.labels.len()).collect();
                indices.shuffle(rng);
                Some(indices)
            }
        };

        Batches {
            loader: self,
            indices,
            cursor: 0,
        }
    }
}

/// One pass of a `DataLoader`.
pub struct Batches<'l, 'a> {
    loader: &'l DataLoader<'a>,
    indices: Option<Vec<usize>>,
    cursor: usize,
}

impl Iterator for Batches<'_, '_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.loader.len();
        if self.cursor >= len {
            return None;
        }

        let end = (self.cursor + self.loader.batch_size).min(len);
        let batch = match &self.indices {
            None => Batch {
                inputs: self
                    .loader
                    .inputs
                    .slice_axis(Axis(0), Slice::from(self.cursor..end))
                    .to_owned(),
                labels: self.loader.labels[self.cursor..end].to_vec(),
            },
            Some(indices) => {
                let picked = &indices[self.cursor..end];
                Batch {
                    inputs: self.loader.inputs.select(Axis(0), picked),
                    labels: picked.iter().map(|&i| self.loader.labels[i]).collect(),
                }
            }
        };

        self.cursor = end;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self
            .loader
            .len()
            .saturating_sub(self.cursor)
            .div_ceil(self.loader.batch_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Batches<'_, '_> {}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn fixture(n: usize) -> (Array4<f32>, Vec<usize>) {
        // every image is filled with its own index, so is its label
        let inputs = Array4::from_shape_fn((n, 2, 2, 1), |(i, ..)| i as f32);
        (inputs, (0..n).collect())
    }

    #[test]
    fn sequential_batches_keep_dataset_order() {
        let (inputs, labels) = fixture(5);
        let mut loader = DataLoader::sequential(inputs.view(), &labels, 2);

        let batches: Vec<_> = loader.batches().collect();

        assert_eq!(loader.num_batches(), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].labels, [0, 1]);
        assert_eq!(batches[1].labels, [2, 3]);
        assert_eq!(batches[2].labels, [4]);
        assert_eq!(batches[2].inputs.dim(), (1, 2, 2, 1));
        assert_eq!(batches[1].inputs[[1, 0, 0, 0]], 3.);
    }

    #[test]
    fn passes_are_restartable() {
        let (inputs, labels) = fixture(3);
        let mut loader = DataLoader::sequential(inputs.view(), &labels, 2);

        assert_eq!(loader.batches().count(), 2);
        assert_eq!(loader.batches().count(), 2);
    }

    #[test]
    fn shuffled_passes_are_permutations_with_matching_labels() {
        let (inputs, labels) = fixture(50);
        let rng = StdRng::seed_from_u64(4);
        let mut loader = DataLoader::shuffled(inputs.view(), &labels, 8, rng);

        let first: Vec<usize> = loader.batches().flat_map(|b| b.labels).collect();
        let second: Vec<usize> = loader.batches().flat_map(|b| b.labels).collect();

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, labels);
        assert_ne!(first, second);

        for batch in loader.batches() {
            for (image, &label) in batch.inputs.outer_iter().zip(&batch.labels) {
                assert!(image.iter().all(|&px| px == label as f32));
            }
        }
    }

    #[test]
    fn empty_datasets_have_no_batches() {
        let (inputs, labels) = fixture(0);
        let mut loader = DataLoader::sequential(inputs.view(), &labels, 4);

        assert_eq!(loader.num_batches(), 0);
        assert!(loader.batches().next().is_none());
    }
}
