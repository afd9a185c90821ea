use crate::error::{Result, TeacherErr};

/// No teacher trains for more epochs than this, whatever its step budget.
pub const MAX_EPOCHS: usize = 100;

/// The amount of epochs a teacher trains for, `min(100, floor(max_steps / batches_per_epoch))`
/// where `batches_per_epoch = ceil(block_len / batch_size)`.
///
/// # Errors
/// `InvalidConfig` when the batch size is zero or the partition yields no batches at all.
pub fn num_epochs(max_steps: usize, block_len: usize, batch_size: usize) -> Result<usize> {
    if batch_size == 0 {
        return Err(TeacherErr::InvalidConfig("batch_size must be > 0".into()));
    }

    let batches_per_epoch = block_len.div_ceil(batch_size);
    if batches_per_epoch == 0 {
        return Err(TeacherErr::InvalidConfig(format!(
            "the teacher's partition is empty, there are no batches to train on \
             (block_len = {block_len})"
        )));
    }

    Ok((max_steps / batches_per_epoch).min(MAX_EPOCHS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_setup_is_capped_at_a_hundred_epochs() {
        // 60000 / 50 = 1200 samples, 10 batches of 128
        assert_eq!(num_epochs(3000, 1200, 128).unwrap(), 100);
    }

    #[test]
    fn small_step_budgets_floor_the_epochs() {
        // 600 samples, 5 batches of 128: 1000 / 5
        assert_eq!(num_epochs(1000, 600, 128).unwrap(), 100);
        assert_eq!(num_epochs(99, 600, 128).unwrap(), 19);
        assert_eq!(num_epochs(4, 600, 128).unwrap(), 0);
    }

    #[test]
    fn empty_partitions_are_rejected() {
        assert!(matches!(
            num_epochs(3000, 0, 128),
            Err(TeacherErr::InvalidConfig(_))
        ));
        assert!(num_epochs(3000, 10, 0).is_err());
    }
}
