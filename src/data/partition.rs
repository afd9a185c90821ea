use std::ops::Range;

use ndarray::{ArrayView, Axis, Dimension, Slice};

use crate::error::{Result, TeacherErr};

/// Splits `len` samples among `nb_teachers` and returns the block of `teacher_id`.
///
/// Properties:
/// - Every block has `floor(len / nb_teachers)` samples.
/// - Blocks are contiguous, disjoint and in teacher order.
/// - The last `len % nb_teachers` samples belong to no teacher.
///
/// # Errors
/// `NoTeachers` if `nb_teachers` is zero and `InvalidTeacherId` if `teacher_id` isn't below
/// it.
pub fn partition_range(
    len: usize,
    nb_teachers: usize,
    teacher_id: usize,
) -> Result<Range<usize>> {
    if nb_teachers == 0 {
        return Err(TeacherErr::NoTeachers);
    }

    if teacher_id >= nb_teachers {
        return Err(TeacherErr::InvalidTeacherId {
            teacher_id,
            nb_teachers,
        });
    }

    let block_len = len / nb_teachers;
    let start = teacher_id * block_len;
    Ok(start..start + block_len)
}

/// Selects `teacher_id`'s block of a dataset without copying it.
///
/// # Arguments
/// * `inputs` - The samples, the first axis being the sample axis.
/// * `labels` - One label per sample.
/// * `nb_teachers` - The amount of teachers in the ensemble.
/// * `teacher_id` - The teacher whose block is selected.
///
/// # Returns
/// The block's inputs, its labels and the length of every block.
pub fn partition_dataset<'a, D: Dimension, L>(
    inputs: ArrayView<'a, f32, D>,
    labels: &'a [L],
    nb_teachers: usize,
    teacher_id: usize,
) -> Result<(ArrayView<'a, f32, D>, &'a [L], usize)> {
    let len = inputs.len_of(Axis(0));
    if len != labels.len() {
        return Err(TeacherErr::LengthMismatch {
            inputs: len,
            labels: labels.len(),
        });
    }

    let range = partition_range(len, nb_teachers, teacher_id)?;
    let block_len = range.len();

    let mut block = inputs;
    block.slice_axis_inplace(Axis(0), Slice::from(range.clone()));
    Ok((block, &labels[range], block_len))
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, Array4};

    use super::*;

    #[test]
    fn blocks_are_floored() {
        assert_eq!(partition_range(10, 3, 0).unwrap(), 0..3);
        assert_eq!(partition_range(10, 3, 1).unwrap(), 3..6);
        assert_eq!(partition_range(10, 3, 2).unwrap(), 6..9);
    }

    #[test]
    fn more_teachers_than_samples_gives_empty_blocks() {
        assert_eq!(partition_range(3, 5, 4).unwrap(), 0..0);
    }

    #[test]
    fn preconditions_are_checked() {
        assert!(matches!(
            partition_range(10, 0, 0),
            Err(TeacherErr::NoTeachers)
        ));
        assert!(matches!(
            partition_range(10, 3, 3),
            Err(TeacherErr::InvalidTeacherId {
                teacher_id: 3,
                nb_teachers: 3
            })
        ));
    }

    #[test]
    fn slices_inputs_and_labels_together() {
        let inputs = Array2::from_shape_fn((7, 2), |(i, j)| (i * 2 + j) as f32);
        let labels: Vec<usize> = (0..7).collect();

        let (x, y, block_len) = partition_dataset(inputs.view(), &labels, 2, 1).unwrap();

        assert_eq!(block_len, 3);
        assert_eq!(y, [3, 4, 5]);
        assert_eq!(x.row(0).to_vec(), [6., 7.]);
        assert_eq!(x.nrows(), 3);
    }

    #[test]
    fn mismatched_lengths_fail() {
        let inputs = Array4::<f32>::zeros((4, 1, 1, 1));

        assert!(matches!(
            partition_dataset(inputs.view(), &[0, 1, 2], 1, 0),
            Err(TeacherErr::LengthMismatch {
                inputs: 4,
                labels: 3
            })
        ));
    }
}
