use std::path::PathBuf;

use thiserror::Error;

use crate::Mode;

/// Problems that stop a run before any file is touched.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("no input paths given")]
    NoInputs,

    #[error("input path does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("mode {0} needs a destination")]
    MissingDestination(Mode),

    #[error("zip destination is a directory: {0}")]
    DestinationIsDirectory(PathBuf),

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("could not prepare output: {0}")]
    Output(#[source] std::io::Error),
}

/// Failure of a single file's pipeline. Never aborts the batch.
#[derive(Error, Debug)]
pub enum FixError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("tag write failed: {0}")]
    TagWrite(String),

    #[error("tag write timed out after {0}s")]
    Timeout(u64),

    #[error("tag writer unavailable: {0}")]
    ToolUnavailable(String),

    #[error("archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("internal error: {0}")]
    Internal(String),
}
