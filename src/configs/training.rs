use std::{num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::Args;
use crate::{
    data::DatasetKind,
    error::{Result, TeacherErr},
};

/// Everything a teacher's training run needs to know, validated once and then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherConfig {
    pub dataset: DatasetKind,
    pub nb_labels: usize,
    pub data_dir: PathBuf,
    pub train_dir: PathBuf,
    pub max_steps: usize,
    pub nb_teachers: usize,
    pub teacher_id: usize,
    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub seed: Option<u64>,
}

impl TeacherConfig {
    /// Checks the invariants the rest of the trainer relies on.
    ///
    /// # Errors
    /// `NoTeachers` for an empty ensemble, `InvalidTeacherId` when the teacher isn't part of
    /// it and `InvalidConfig` for a model without classes or a learning rate that isn't a
    /// positive number.
    pub fn validate(&self) -> Result<()> {
        if self.nb_teachers == 0 {
            return Err(TeacherErr::NoTeachers);
        }

        if self.teacher_id >= self.nb_teachers {
            return Err(TeacherErr::InvalidTeacherId {
                teacher_id: self.teacher_id,
                nb_teachers: self.nb_teachers,
            });
        }

        if self.nb_labels == 0 {
            return Err(TeacherErr::InvalidConfig(
                "nb_labels must be at least 1".into(),
            ));
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return Err(TeacherErr::InvalidConfig(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }

        Ok(())
    }

    /// Where this teacher's weights are saved:
    /// `{train_dir}/{dataset}_{nb_teachers}_teachers_{teacher_id}.ckpt`.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.train_dir.join(format!(
            "{}_{}_teachers_{}.ckpt",
            self.dataset, self.nb_teachers, self.teacher_id
        ))
    }

    /// The folder holding this dataset's IDX files.
    pub fn dataset_dir(&self) -> PathBuf {
        self.data_dir.join(self.dataset.to_string())
    }
}

impl TryFrom<Args> for TeacherConfig {
    type Error = TeacherErr;

    fn try_from(args: Args) -> Result<Self> {
        let config = Self {
            dataset: args.dataset,
            nb_labels: args.nb_labels,
            data_dir: args.data_dir,
            train_dir: args.train_dir,
            max_steps: args.max_steps,
            nb_teachers: args.nb_teachers,
            teacher_id: args.teacher_id,
            batch_size: args.batch_size,
            learning_rate: args.learning_rate,
            seed: args.seed,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(nb_teachers: usize, teacher_id: usize) -> TeacherConfig {
        TeacherConfig {
            dataset: DatasetKind::Mnist,
            nb_labels: 10,
            data_dir: "/tmp/".into(),
            train_dir: "/tmp/train_dir".into(),
            max_steps: 3000,
            nb_teachers,
            teacher_id,
            batch_size: NonZeroUsize::new(128).unwrap(),
            learning_rate: 0.05,
            seed: None,
        }
    }

    #[test]
    fn checkpoint_path_follows_the_naming_scheme() {
        let config = config(50, 3);

        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("/tmp/train_dir/mnist_50_teachers_3.ckpt")
        );
        assert_eq!(config.dataset_dir(), PathBuf::from("/tmp/mnist"));
    }

    #[test]
    fn teacher_id_must_be_part_of_the_ensemble() {
        assert!(config(50, 49).validate().is_ok());
        assert!(matches!(
            config(50, 50).validate(),
            Err(TeacherErr::InvalidTeacherId {
                teacher_id: 50,
                nb_teachers: 50
            })
        ));
        assert!(matches!(
            config(0, 0).validate(),
            Err(TeacherErr::NoTeachers)
        ));
    }

    #[test]
    fn learning_rate_must_be_positive() {
        let mut config = config(1, 0);
        config.learning_rate = 0.;
        assert!(matches!(
            config.validate(),
            Err(TeacherErr::InvalidConfig(_))
        ));

        config.learning_rate = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let config = config(10, 2);

        let json = serde_json::to_string(&config).unwrap();
        let back: TeacherConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back, config);
    }
}
