use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use log::info;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::{
    MlErr, Result, StateDict, arch::Model, optimization::Optimizer, training::TrainingState,
};

/// Identifies the layout of the files written by this module.
pub const FORMAT: &str = "chunk-classifier/1";

const MODEL_PREFIX: &str = "model.";
const OPTIMIZER_PREFIX: &str = "optimizer.";
const EPOCH_KEY: &str = "epoch";
const BEST_ACCURACY_KEY: &str = "best_accuracy";
const FORMAT_KEY: &str = "format";

/// A snapshot of a training run: everything needed to continue it as if it never stopped.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    /// The index of the next epoch to run.
    pub epoch: usize,
    pub model_state: StateDict,
    pub optimizer_state: StateDict,
    pub best_accuracy: f64,
}

impl Checkpoint {
    /// Copies the current state of `model` and `optimizer` into a new `Checkpoint`.
    pub fn capture<M, O>(epoch: usize, model: &M, optimizer: &O, best_accuracy: f64) -> Result<Self>
    where
        M: Model,
        O: Optimizer + ?Sized,
    {
        Ok(Self {
            epoch,
            model_state: model.state_dict()?,
            optimizer_state: optimizer.state_dict()?,
            best_accuracy,
        })
    }

    /// Returns the training state this checkpoint resumes from.
    pub fn state(&self) -> TrainingState {
        TrainingState {
            epoch: self.epoch,
            best_accuracy: self.best_accuracy,
        }
    }

    /// Loads the stored states into `model` and `optimizer`.
    ///
    /// Both states are checked before either receiver is touched, so on error neither the
    /// model nor the optimizer has changed.
    ///
    /// # Errors
    /// `MlErr::StateMismatch` if either state doesn't have exactly the tensors and shapes the
    /// receiver expects.
    pub fn restore<M, O>(&self, model: &mut M, optimizer: &mut O) -> Result<TrainingState>
    where
        M: Model,
        O: Optimizer + ?Sized,
    {
        model.check_state_dict(&self.model_state)?;
        optimizer.check_state_dict(&self.optimizer_state)?;

        model.load_state_dict(&self.model_state)?;
        optimizer.load_state_dict(&self.optimizer_state)?;
        Ok(self.state())
    }

    /// Writes this checkpoint to `path` as a single safetensors file.
    ///
    /// The bytes are first written to a sibling temporary file which is then renamed over
    /// `path`, so a reader never observes a partially written checkpoint.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        let tensors: Vec<(String, Vec<usize>, Vec<u8>)> = prefixed(MODEL_PREFIX, &self.model_state)
            .chain(prefixed(OPTIMIZER_PREFIX, &self.optimizer_state))
            .map(|(name, tensor)| {
                let values: Vec<f32> = tensor.iter().copied().collect();
                let bytes = bytemuck::cast_slice::<f32, u8>(&values).to_vec();
                (name, tensor.shape().to_vec(), bytes)
            })
            .collect();

        let views = tensors
            .iter()
            .map(|(name, shape, bytes)| {
                TensorView::new(Dtype::F32, shape.clone(), bytes)
                    .map(|view| (name.as_str(), view))
                    .map_err(|e| MlErr::CorruptCheckpoint(format!("{name}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let metadata = HashMap::from([
            (EPOCH_KEY.to_string(), self.epoch.to_string()),
            (BEST_ACCURACY_KEY.to_string(), self.best_accuracy.to_string()),
            (FORMAT_KEY.to_string(), FORMAT.to_string()),
        ]);

        let bytes = safetensors::serialize(views, &Some(metadata))
            .map_err(|e| MlErr::CorruptCheckpoint(e.to_string()))?;

        let tmp = tmp_path(path);
        if let Err(e) = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!(
            "checkpoint written to {} (epoch {}, best accuracy {})",
            path.display(),
            self.epoch,
            self.best_accuracy
        );

        Ok(())
    }

    /// Reads a checkpoint previously written with `Checkpoint::write`.
    ///
    /// # Errors
    /// `MlErr::CheckpointNotFound` if `path` doesn't exist and `MlErr::CorruptCheckpoint` if
    /// its contents can't be parsed back into a checkpoint.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let bytes = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MlErr::CheckpointNotFound(path.to_path_buf()),
            _ => MlErr::Io(e),
        })?;

        let (_, header) =
            SafeTensors::read_metadata(&bytes).map_err(|e| MlErr::CorruptCheckpoint(e.to_string()))?;
        let metadata = header
            .metadata()
            .as_ref()
            .ok_or_else(|| MlErr::CorruptCheckpoint("missing metadata".into()))?;

        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| MlErr::CorruptCheckpoint(format!("missing metadata field {key}")))
        };

        let format = field(FORMAT_KEY)?;
        if format != FORMAT {
            return Err(MlErr::CorruptCheckpoint(format!(
                "unknown checkpoint format {format}"
            )));
        }

        let epoch = field(EPOCH_KEY)?
            .parse()
            .map_err(|e| MlErr::CorruptCheckpoint(format!("{EPOCH_KEY}: {e}")))?;
        let best_accuracy = field(BEST_ACCURACY_KEY)?
            .parse()
            .map_err(|e| MlErr::CorruptCheckpoint(format!("{BEST_ACCURACY_KEY}: {e}")))?;

        let tensors =
            SafeTensors::deserialize(&bytes).map_err(|e| MlErr::CorruptCheckpoint(e.to_string()))?;

        let mut model_state = StateDict::new();
        let mut optimizer_state = StateDict::new();

        for (name, view) in tensors.tensors() {
            let tensor = to_array(&name, &view)?;

            if let Some(key) = name.strip_prefix(MODEL_PREFIX) {
                model_state.insert(key.to_string(), tensor);
            } else if let Some(key) = name.strip_prefix(OPTIMIZER_PREFIX) {
                optimizer_state.insert(key.to_string(), tensor);
            } else {
                return Err(MlErr::CorruptCheckpoint(format!("unexpected tensor {name}")));
            }
        }

        info!("checkpoint read from {} (epoch {epoch})", path.display());

        Ok(Self {
            epoch,
            model_state,
            optimizer_state,
            best_accuracy,
        })
    }
}

/// Saves a checkpoint of a training run to `path`.
///
/// # Arguments
/// * `path` - Where to write the checkpoint, replacing any previous file.
/// * `epoch` - The index of the next epoch to run.
/// * `model` - The model whose parameters are stored.
/// * `optimizer` - The optimizer whose internal state is stored.
/// * `best_accuracy` - The best test accuracy observed so far.
pub fn save<P, M, O>(path: P, epoch: usize, model: &M, optimizer: &O, best_accuracy: f64) -> Result<()>
where
    P: AsRef<Path>,
    M: Model,
    O: Optimizer + ?Sized,
{
    Checkpoint::capture(epoch, model, optimizer, best_accuracy)?.write(path)
}

/// Loads the checkpoint stored at `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
    Checkpoint::read(path)
}

fn prefixed<'a>(
    prefix: &'a str,
    state: &'a StateDict,
) -> impl Iterator<Item = (String, &'a ArrayD<f32>)> + 'a {
    state
        .iter()
        .map(move |(name, tensor)| (format!("{prefix}{name}"), tensor))
}

fn to_array(name: &str, view: &TensorView<'_>) -> Result<ArrayD<f32>> {
    if view.dtype() != Dtype::F32 {
        return Err(MlErr::CorruptCheckpoint(format!(
            "{name}: expected F32, got {:?}",
            view.dtype()
        )));
    }

    let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());

    ArrayD::from_shape_vec(IxDyn(view.shape()), values)
        .map_err(|e| MlErr::CorruptCheckpoint(format!("{name}: {e}")))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
