//! Error types for freshet.

use thiserror::Error;

/// Errors surfaced at the engine and stream API boundary.
///
/// Nothing is retried internally except short positioned reads inside a
/// stream block, which are transparently continued until the requested byte
/// count arrives or the OS reports a hard error.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The stream file could not be opened or its header read.
    #[error("bad stream file {path}: {source}")]
    BadStream {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A mid-file read returned short without reaching end of file, or the
    /// stream contained a malformed record.
    #[error("stream read failed: {0}")]
    StreamFailed(String),

    /// `update` was called after a terminal connected-components run began.
    #[error("graph cannot be updated: connected components has already started")]
    UpdateLocked,

    /// Only one engine instance may exist per process.
    #[error("only one graph may be open at a time; drop the other graph first")]
    MultipleGraphs,

    /// A supernode exhausted its samplers mid-query. With `cont = true` the
    /// engine has been rolled back to the pre-query sketches; otherwise it
    /// is terminal.
    #[error("sketch sampling failed during connected components")]
    CCFailure,

    /// Snapshot file did not match the expected layout.
    #[error("snapshot format error: {0}")]
    SnapshotFormat(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying I/O failure outside the stream read path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for freshet operations.
pub type Result<T> = std::result::Result<T, GraphError>;
