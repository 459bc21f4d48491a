use std::io;

/// Outcome classes a caller can branch on without looking at buffer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    FormatError,
    Truncated,
    SelectionMismatch,
    DegenerateInput,
    Usage,
    Io,
}

/// Every failure surfaced by the snapshot core.
#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    /// The stream is not a recognized NBSNAP1 snapshot, or its header is
    /// inconsistent with the descriptor.
    #[error("not a recognized snapshot: {0}")]
    Format(String),

    /// A read or write moved fewer bytes than requested. The stream can not be
    /// resynchronized afterwards.
    #[error("truncated stream: {0}")]
    Truncated(String),

    #[error("frame body checksum mismatch: header says {expected:016x}, body hashes to {actual:016x}")]
    Checksum { expected: u64, actual: u64 },

    #[error("selection mismatch: {declared} particles declared but table selects {found}")]
    SelectionMismatch { declared: usize, found: usize },

    #[error("invalid selection table: {0}")]
    InvalidSelection(String),

    #[error("degenerate input: {0}")]
    Degenerate(String),

    #[error("field {field} has {got} particles but the frame already holds {expected}")]
    NbodyMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("nothing to save: no field was set on the output frame")]
    NothingToSave,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SnapError {
    /// Collapse the error onto the fixed status set.
    pub fn status(&self) -> Status {
        match self {
            SnapError::Format(_) => Status::FormatError,
            SnapError::Truncated(_) | SnapError::Checksum { .. } => Status::Truncated,
            SnapError::SelectionMismatch { .. } | SnapError::InvalidSelection(_) => {
                Status::SelectionMismatch
            }
            SnapError::Degenerate(_) => Status::DegenerateInput,
            SnapError::NbodyMismatch { .. } | SnapError::NothingToSave => Status::Usage,
            SnapError::Io(_) => Status::Io,
        }
    }

    /// Classify a failed `read_exact`/`write_all`: short transfers become
    /// [`SnapError::Truncated`], anything else stays an I/O error.
    pub(crate) fn from_transfer(err: io::Error, what: &str) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => {
                SnapError::Truncated(format!("{what}: {err}"))
            }
            _ => SnapError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapError>;
