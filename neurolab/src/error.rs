use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the transform subsystem.
///
/// Missing precondition images are not errors: producers report them as
/// [`crate::outcome::Outcome::Skipped`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown registration type '{0}'")]
    UnknownRegistration(String),

    #[error("Unknown space '{0}'")]
    UnknownSpace(String),

    #[error("ROI list is empty")]
    EmptyRoiList,

    #[error("Output directory '{0}' is not an existing directory")]
    InvalidOutputDir(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("ROI '{0}' not found")]
    RoiNotFound(PathBuf),

    #[error("{op}: required input '{path}' does not exist")]
    MissingInput { op: &'static str, path: PathBuf },

    #[error("Image '{0}' does not exist")]
    MissingImage(PathBuf),

    #[error("Failed to start '{tool}': {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' exited with status {status:?}: {stderr}")]
    ToolFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Unexpected output from '{command}': {output}")]
    ToolOutput { command: String, output: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse matrix '{path}': {reason}")]
    MatParse { path: PathBuf, reason: String },

    #[error("Matrix '{0}' is singular")]
    SingularMatrix(PathBuf),

    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("Worker for subject '{label}' panicked: {message}")]
    WorkerPanicked { label: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
