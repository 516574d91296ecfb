use std::{error::Error, fmt, io};

/// The crate's result type.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// Every failure the training engine can surface.
#[derive(Debug)]
pub enum TrainErr {
    Io(io::Error),
    Json(serde_json::Error),
    /// A known option carried a value that couldn't be used.
    InvalidConfig(String),
    /// Options nobody recognised, fatal in distributed mode.
    UnknownOptions(Vec<String>),
    /// A required collaborator was never configured.
    Uninitialized(&'static str),
    SizeMismatch {
        expected: usize,
        got: usize,
    },
    /// A data line that can't be parsed, `offset` is the line's first byte.
    MalformedBatch {
        offset: u64,
        detail: String,
    },
    UnknownTimestamp(u64),
    StoreUnavailable(String),
    /// A spawned task died before reporting a result.
    TaskFailed(String),
    /// A tracked unit finished with an error.
    UnitFailed(String),
}

impl fmt::Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainErr::Io(e) => write!(f, "io error: {e}"),
            TrainErr::Json(e) => write!(f, "json error: {e}"),
            TrainErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            TrainErr::UnknownOptions(keys) => {
                write!(f, "unrecognized options: {}", keys.join(", "))
            }
            TrainErr::Uninitialized(what) => write!(f, "{what} is not initialized"),
            TrainErr::SizeMismatch { expected, got } => {
                write!(f, "size mismatch: expected {expected}, got {got}")
            }
            TrainErr::MalformedBatch { offset, detail } => {
                write!(f, "malformed line at byte {offset}: {detail}")
            }
            TrainErr::UnknownTimestamp(ts) => write!(f, "unknown or already waited timestamp {ts}"),
            TrainErr::StoreUnavailable(msg) => write!(f, "parameter store unavailable: {msg}"),
            TrainErr::TaskFailed(msg) => write!(f, "task failed: {msg}"),
            TrainErr::UnitFailed(msg) => write!(f, "unit failed: {msg}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainErr::Io(e) => Some(e),
            TrainErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<TrainErr> for io::Error {
    fn from(value: TrainErr) -> Self {
        match value {
            TrainErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
