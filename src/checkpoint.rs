use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use machine_learning::arch::{Model, ParamSpec};
use safetensors::{
    SafeTensors,
    tensor::{Dtype, TensorView},
};
use serde::Serialize;

use crate::error::{Result, TeacherErr};

/// Metadata key holding the epoch a checkpoint was saved at.
pub const EPOCH_KEY: &str = "epoch";

/// A model's parameters persisted as a safetensors file, one tensor per layer parameter.
///
/// Saving always overwrites the file, so a checkpoint holds the most recent save only.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    metadata: HashMap<String, String>,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: HashMap::new(),
        }
    }

    /// Adds `value`, serialized as JSON, to the metadata of every save.
    pub fn with_json<T: Serialize>(mut self, key: &str, value: &T) -> Result<Self> {
        self.metadata
            .insert(key.to_string(), serde_json::to_string(value)?);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the model's parameters, creating the parent directory if needed.
    ///
    /// # Arguments
    /// * `model` - The model whose parameters are saved.
    /// * `epoch` - The epoch these parameters are the result of.
    pub fn save<M: Model>(&self, model: &M, epoch: usize) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let specs = model.param_specs();
        let params = model.params();
        check_layout(&specs, params.len())?;

        let bytes: &[u8] = bytemuck::cast_slice(params);
        let mut views = Vec::with_capacity(specs.len());
        let mut offset = 0;

        for spec in &specs {
            let len = spec.len() * size_of::<f32>();
            let data = &bytes[offset..offset + len];
            let view = TensorView::new(Dtype::F32, spec.shape.clone(), data)?;
            views.push((spec.name.clone(), view));
            offset += len;
        }

        let mut metadata = self.metadata.clone();
        metadata.insert(EPOCH_KEY.to_string(), epoch.to_string());

        safetensors::serialize_to_file(views, &Some(metadata), &self.path)?;
        debug!(epoch = epoch; "saved checkpoint to {}", self.path.display());
        Ok(())
    }

    /// Reads the metadata stored alongside the tensors.
    pub fn read_metadata(path: &Path) -> Result<HashMap<String, String>> {
        let data = fs::read(path)?;
        let (_, metadata) = SafeTensors::read_metadata(&data)?;
        Ok(metadata.metadata().clone().unwrap_or_default())
    }

    /// Restores the parameters saved at `path` into `model`.
    ///
    /// # Errors
    /// `CheckpointLayout` if the saved tensors don't match the model's, tensor by tensor.
    ///
    /// # Returns
    /// The epoch the checkpoint was saved at.
    pub fn load_into<M: Model>(path: &Path, model: &mut M) -> Result<usize> {
        let data = fs::read(path)?;

        let (_, metadata) = SafeTensors::read_metadata(&data)?;
        let epoch = metadata
            .metadata()
            .as_ref()
            .and_then(|metadata| metadata.get(EPOCH_KEY))
            .and_then(|epoch| epoch.parse().ok())
            .ok_or_else(|| TeacherErr::CheckpointLayout("missing epoch".into()))?;

        let tensors = SafeTensors::deserialize(&data)?;
        let specs = model.param_specs();
        check_layout(&specs, model.size())?;

        if tensors.len() != specs.len() {
            return Err(TeacherErr::CheckpointLayout(format!(
                "found {} tensors, the model has {}",
                tensors.len(),
                specs.len()
            )));
        }

        let params = model.params_mut();
        let mut offset = 0;

        for spec in &specs {
            let view = tensors.tensor(&spec.name)?;
            if view.dtype() != Dtype::F32 || view.shape() != spec.shape.as_slice() {
                return Err(TeacherErr::CheckpointLayout(format!(
                    "tensor {} is {:?} {:?}, expected F32 {:?}",
                    spec.name,
                    view.dtype(),
                    view.shape(),
                    spec.shape
                )));
            }

            let dst = &mut params[offset..offset + spec.len()];
            let raw = view.data().chunks_exact(size_of::<f32>());
            for (w, raw) in dst.iter_mut().zip(raw) {
                *w = bytemuck::pod_read_unaligned(raw);
            }
            offset += spec.len();
        }

        Ok(epoch)
    }
}

fn check_layout(specs: &[ParamSpec], size: usize) -> Result<()> {
    let described: usize = specs.iter().map(ParamSpec::len).sum();
    if described != size {
        return Err(TeacherErr::CheckpointLayout(format!(
            "the model describes {described} parameters but holds {size}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::{Sequential, layers::Layer};

    use super::*;

    fn model(params: Vec<f32>) -> Sequential {
        Sequential::with_params([Layer::flatten(), Layer::dense((3, 2), None)], params).unwrap()
    }

    #[test]
    fn saves_one_tensor_per_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.ckpt");
        let checkpoint = Checkpoint::new(&path);

        checkpoint
            .save(&model((0..8).map(|i| i as f32).collect()), 4)
            .unwrap();

        let data = fs::read(&path).unwrap();
        let tensors = SafeTensors::deserialize(&data).unwrap();
        let kernel = tensors.tensor("1.kernel").unwrap();
        assert_eq!(kernel.shape(), [3, 2]);
        assert_eq!(tensors.tensor("1.bias").unwrap().shape(), [2]);
        assert_eq!(Checkpoint::read_metadata(&path).unwrap()[EPOCH_KEY], "4");
    }

    #[test]
    fn loads_back_into_a_model_of_the_same_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        let saved = model(vec![0.5, -1., 2., 3.25, -0.125, 8., 1e-3, -7.]);
        Checkpoint::new(&path).save(&saved, 2).unwrap();

        let mut restored = model(vec![0.; 8]);
        let epoch = Checkpoint::load_into(&path, &mut restored).unwrap();

        assert_eq!(epoch, 2);
        assert_eq!(restored.params(), saved.params());
    }

    #[test]
    fn later_saves_overwrite_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        let checkpoint = Checkpoint::new(&path);

        checkpoint.save(&model(vec![1.; 8]), 1).unwrap();
        checkpoint.save(&model(vec![2.; 8]), 2).unwrap();

        let mut restored = model(vec![0.; 8]);
        assert_eq!(Checkpoint::load_into(&path, &mut restored).unwrap(), 2);
        assert!(restored.params().iter().all(|&w| w == 2.));
    }

    #[test]
    fn refuses_a_model_with_another_topology() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        Checkpoint::new(&path).save(&model(vec![0.; 8]), 1).unwrap();

        let mut other = Sequential::new([Layer::dense((2, 2), None)]);
        assert!(Checkpoint::load_into(&path, &mut other).is_err());
    }

    #[test]
    fn stores_json_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");

        Checkpoint::new(&path)
            .with_json("config", &vec![1, 2, 3])
            .unwrap()
            .save(&model(vec![0.; 8]), 1)
            .unwrap();

        assert_eq!(
            Checkpoint::read_metadata(&path).unwrap()["config"],
            "[1,2,3]"
        );
    }
}
