use std::{io, path::PathBuf};

use thiserror::Error;

/// Failure of a single primitive call against the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("runtime connection to `{endpoint}` failed: {message}")]
    Connect { endpoint: String, message: String },
    #[error("runtime operation `{operation}` found no `{target}`")]
    NotFound {
        operation: &'static str,
        target: String,
    },
    #[error("runtime operation `{operation}` on `{target}` conflicted: {message}")]
    Conflict {
        operation: &'static str,
        target: String,
        message: String,
    },
    #[error("runtime operation `{operation}` on `{target}` failed: {message}")]
    Operation {
        operation: &'static str,
        target: String,
        message: String,
    },
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors that may clear up on their own, such as a file the enforcement
    /// binary has not finished writing yet.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Conflict { .. })
    }
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to inspect sandbox image `{image}`: {source}")]
    Inspect {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to pull sandbox image `{image}`: {source}")]
    Pull {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("sandbox image `{image}` was not visible {waited_ms}ms after pulling")]
    Timeout { image: String, waited_ms: u64 },
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to create sandbox container from `{image}`: {source}")]
    Create {
        image: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to start sandbox container `{container_id}`: {source}")]
    Start {
        container_id: String,
        #[source]
        source: RuntimeError,
    },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to encode archive entry `{name}`: {source}")]
    Encode {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode archive: {source}")]
    Decode {
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("file name `{name}` has no usable base name")]
    InvalidFileName { name: String },
    #[error("failed to read program `{path}`: {source}")]
    ReadProgram {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("failed to upload files to `{path}` in container `{container_id}`: {source}")]
    Upload {
        container_id: String,
        path: String,
        #[source]
        source: RuntimeError,
    },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to create exec in container `{container_id}`: {source}")]
    Create {
        container_id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to start exec `{exec_id}`: {source}")]
    Start {
        exec_id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("failed to inspect exec `{exec_id}`: {source}")]
    Inspect {
        exec_id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("exec `{exec_id}` was still running after {waited_ms}ms")]
    Timeout { exec_id: String, waited_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResultParseError {
    #[error("result file is missing the `{field}` line")]
    MissingField { field: &'static str },
    #[error("result file field `{field}` is not an integer: `{value}`")]
    InvalidInteger { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("failed to retrieve `{path}`: {source}")]
    Retrieval {
        path: String,
        #[source]
        source: RuntimeError,
    },
    #[error("result file `{path}` did not appear within {waited_ms}ms")]
    ResultTimeout { path: String, waited_ms: u64 },
    #[error("result file is malformed: {0}")]
    MalformedResult(#[from] ResultParseError),
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Collection(#[from] CollectionError),
    #[error("failed to initialize async runtime: {source}")]
    AsyncRuntimeInit {
        #[source]
        source: io::Error,
    },
    #[error("sandbox run cancelled")]
    Cancelled,
}
