use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    /// A component was constructed with values it cannot work with.
    InvalidConfig(String),
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    IndexOutOfRange {
        index: usize,
        len: usize,
    },
    InvalidLabel {
        label: usize,
        classes: usize,
    },
    /// A backward pass was requested before any forward pass.
    MissingForward,
    /// A training pass was requested without an optimizer to apply the gradients.
    MissingOptimizer,
    /// The batch sequence of an epoch yielded no samples.
    EmptyEpoch,
    /// A loader worker stopped before delivering the batch it was assembling.
    WorkerLost,
    CheckpointNotFound(PathBuf),
    CorruptCheckpoint(String),
    StateMismatch(String),
    Io(io::Error),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::IndexOutOfRange { index, len } => {
                write!(f, "index {index} is out of range for a dataset of {len} samples")
            }
            MlErr::InvalidLabel { label, classes } => {
                write!(f, "label {label} is not a valid class, there are {classes} classes")
            }
            MlErr::MissingForward => write!(f, "backward pass called before a forward pass"),
            MlErr::MissingOptimizer => {
                write!(f, "a training pass requires an optimizer but none was given")
            }
            MlErr::EmptyEpoch => {
                write!(f, "the epoch produced no batches, accuracy is undefined")
            }
            MlErr::WorkerLost => write!(f, "a loader worker stopped before delivering its batch"),
            MlErr::CheckpointNotFound(path) => {
                write!(f, "checkpoint not found at {}", path.display())
            }
            MlErr::CorruptCheckpoint(msg) => write!(f, "corrupt checkpoint: {msg}"),
            MlErr::StateMismatch(msg) => write!(f, "state mismatch: {msg}"),
            MlErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
