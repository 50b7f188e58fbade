mod config;
mod error;
mod sandbox;
mod tracing;

pub use config::{
    DEFAULT_DOCKER_TIMEOUT_SECS, DEFAULT_EXEC_GRACE_SECS, DEFAULT_EXEC_PATH,
    DEFAULT_FILE_FETCH_ATTEMPTS, DEFAULT_IMAGE_PULL_TIMEOUT_SECS, DEFAULT_NETWORK_MODE,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REMOVAL_TIMEOUT_MS, DEFAULT_RESULT_PATH,
    DEFAULT_RESULT_TIMEOUT_MS, DEFAULT_SANDBOX_GID, DEFAULT_SANDBOX_IMAGE, DEFAULT_SANDBOX_ROOT,
    DEFAULT_SANDBOX_UID, DEFAULT_UNLIMITED_EXEC_TIMEOUT_SECS, DockerEndpointConfig, PollingConfig, SandboxConfig,
    SandboxConfigError,
};
pub use error::{
    ArchiveError, CollectionError, ContainerError, ExecutionError, ProvisionError,
    ResultParseError, RuntimeError, SandboxError, StagingError,
};
pub use sandbox::{
    ContainerState, DEFAULT_INPUT_FILE_MODE, DEFAULT_MEMORY_LIMIT_RESERVE,
    DEFAULT_TIME_LIMIT_RESERVE, ExecutionResult, InputFile, OutputFile, PROGRAM_FILE_MODE,
    ResultStatus, RunOptions, RunOutcome, StagedFile, sandbox_basename, sandboxed_path,
};
pub use tracing::{DEFAULT_TRACING_FILTER, init_tracing, sandbox_env_filter};
