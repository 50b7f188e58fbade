use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SANDBOX_IMAGE: &str = "menci/docker-sandbox";
pub const DEFAULT_SANDBOX_UID: u32 = 1111;
pub const DEFAULT_SANDBOX_GID: u32 = 1111;
pub const DEFAULT_SANDBOX_ROOT: &str = "/sandbox";
pub const DEFAULT_EXEC_PATH: &str = "/usr/sbin/sandbox";
pub const DEFAULT_RESULT_PATH: &str = "/root/result.txt";
pub const DEFAULT_NETWORK_MODE: &str = "none";
pub const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
pub const DEFAULT_IMAGE_PULL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_EXEC_GRACE_SECS: u64 = 30;
pub const DEFAULT_UNLIMITED_EXEC_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_RESULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FILE_FETCH_ATTEMPTS: u32 = 10;
pub const DEFAULT_REMOVAL_TIMEOUT_MS: u64 = 5_000;

const DEFAULT_SHARED_HOST_PATHS: [&str; 6] = [
    "/lib",
    "/lib64",
    "/usr/lib",
    "/usr/lib64",
    "/usr/bin",
    "/usr/share",
];

/// Everything the orchestrator needs to know about the sandbox image and the
/// container runtime. Every field has a default matching the stock
/// `menci/docker-sandbox` image, so an empty TOML file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_image")]
    pub image: String,
    /// Owner stamped onto every staged file; the enforcement binary drops to
    /// the same ids before running the program.
    #[serde(default = "default_sandbox_uid")]
    pub sandbox_uid: u32,
    #[serde(default = "default_sandbox_gid")]
    pub sandbox_gid: u32,
    /// In-container directory receiving staged files and holding outputs.
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: String,
    #[serde(default = "default_exec_path")]
    pub exec_path: String,
    #[serde(default = "default_result_path")]
    pub result_path: String,
    #[serde(default = "default_network_mode")]
    pub network_mode: String,
    /// Host directories bind-mounted read-only at the same path inside the
    /// container.
    #[serde(default = "default_shared_host_paths")]
    pub shared_host_paths: Vec<String>,
    #[serde(default)]
    pub docker: DockerEndpointConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            sandbox_uid: default_sandbox_uid(),
            sandbox_gid: default_sandbox_gid(),
            sandbox_root: default_sandbox_root(),
            exec_path: default_exec_path(),
            result_path: default_result_path(),
            network_mode: default_network_mode(),
            shared_host_paths: default_shared_host_paths(),
            docker: DockerEndpointConfig::default(),
            polling: PollingConfig::default(),
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<(), SandboxConfigError> {
        if self.image.trim().is_empty() {
            return Err(SandboxConfigError::EmptyField { field: "image" });
        }
        if self.network_mode.trim().is_empty() {
            return Err(SandboxConfigError::EmptyField {
                field: "network_mode",
            });
        }
        for (field, value) in [
            ("sandbox_root", &self.sandbox_root),
            ("exec_path", &self.exec_path),
            ("result_path", &self.result_path),
        ] {
            validate_absolute(field, value)?;
        }
        for path in &self.shared_host_paths {
            validate_absolute("shared_host_paths", path)?;
        }
        self.docker.validate()?;
        self.polling.validate()
    }

    /// Bind specs in `host:container:ro` form.
    pub fn readonly_binds(&self) -> Vec<String> {
        self.shared_host_paths
            .iter()
            .map(|path| format!("{path}:{path}:ro"))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerEndpointConfig {
    /// Unix socket of the Docker daemon. `None` uses the local defaults
    /// (`DOCKER_HOST` or `/var/run/docker.sock`).
    #[serde(default)]
    pub socket_path: Option<String>,
    #[serde(default = "default_docker_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DockerEndpointConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout_secs: default_docker_timeout_secs(),
        }
    }
}

impl DockerEndpointConfig {
    fn validate(&self) -> Result<(), SandboxConfigError> {
        if let Some(path) = &self.socket_path
            && path.trim().is_empty()
        {
            return Err(SandboxConfigError::EmptyField {
                field: "docker.socket_path",
            });
        }
        validate_positive("docker.timeout_secs", self.timeout_secs)
    }

    pub fn label(&self) -> String {
        match &self.socket_path {
            Some(path) => format!("unix://{path}"),
            None => "local-docker-daemon".to_owned(),
        }
    }
}

/// Bounds for the three wait loops (image visibility, exec termination,
/// result file visibility) and the per-file retry count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_image_pull_timeout_secs")]
    pub image_pull_timeout_secs: u64,
    /// Added to `time_limit + time_limit_reserve` to bound the exec wait.
    #[serde(default = "default_exec_grace_secs")]
    pub exec_grace_secs: u64,
    /// Exec wait bound when the request sets no time limit.
    #[serde(default = "default_unlimited_exec_timeout_secs")]
    pub unlimited_exec_timeout_secs: u64,
    #[serde(default = "default_result_timeout_ms")]
    pub result_timeout_ms: u64,
    #[serde(default = "default_file_fetch_attempts")]
    pub file_fetch_attempts: u32,
    /// How long a finished run waits on container removal before returning.
    /// The removal itself continues in the background past this bound.
    #[serde(default = "default_removal_timeout_ms")]
    pub removal_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            image_pull_timeout_secs: default_image_pull_timeout_secs(),
            exec_grace_secs: default_exec_grace_secs(),
            unlimited_exec_timeout_secs: default_unlimited_exec_timeout_secs(),
            result_timeout_ms: default_result_timeout_ms(),
            file_fetch_attempts: default_file_fetch_attempts(),
            removal_timeout_ms: default_removal_timeout_ms(),
        }
    }
}

impl PollingConfig {
    fn validate(&self) -> Result<(), SandboxConfigError> {
        validate_positive("polling.interval_ms", self.interval_ms)?;
        validate_positive(
            "polling.image_pull_timeout_secs",
            self.image_pull_timeout_secs,
        )?;
        validate_positive(
            "polling.unlimited_exec_timeout_secs",
            self.unlimited_exec_timeout_secs,
        )?;
        validate_positive("polling.result_timeout_ms", self.result_timeout_ms)?;
        validate_positive("polling.removal_timeout_ms", self.removal_timeout_ms)?;
        validate_positive(
            "polling.file_fetch_attempts",
            u64::from(self.file_fetch_attempts),
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn image_pull_timeout(&self) -> Duration {
        Duration::from_secs(self.image_pull_timeout_secs)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    pub fn removal_timeout(&self) -> Duration {
        Duration::from_millis(self.removal_timeout_ms)
    }

    /// Longest time to wait for the enforcement binary to exit. The binary
    /// kills the program after `time_limit + time_limit_reserve` wall-clock
    /// seconds, so anything beyond that plus a grace period is a stall.
    pub fn exec_timeout(&self, time_limit: u64, time_limit_reserve: u64) -> Duration {
        if time_limit == 0 {
            return Duration::from_secs(self.unlimited_exec_timeout_secs);
        }
        let limit_secs = time_limit
            .saturating_add(time_limit_reserve)
            .saturating_add(self.exec_grace_secs);
        Duration::from_secs(limit_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxConfigError {
    #[error("sandbox config field `{field}` must not be empty")]
    EmptyField { field: &'static str },
    #[error("sandbox config field `{field}` must be an absolute path; got `{value}`")]
    RelativePath { field: &'static str, value: String },
    #[error("sandbox config field `{field}` must be greater than zero")]
    ZeroValue { field: &'static str },
}

fn validate_absolute(field: &'static str, value: &str) -> Result<(), SandboxConfigError> {
    if value.trim().is_empty() {
        return Err(SandboxConfigError::EmptyField { field });
    }
    if !value.starts_with('/') {
        return Err(SandboxConfigError::RelativePath {
            field,
            value: value.to_owned(),
        });
    }
    Ok(())
}

fn validate_positive(field: &'static str, value: u64) -> Result<(), SandboxConfigError> {
    if value == 0 {
        return Err(SandboxConfigError::ZeroValue { field });
    }
    Ok(())
}

fn default_image() -> String {
    DEFAULT_SANDBOX_IMAGE.to_owned()
}

fn default_sandbox_uid() -> u32 {
    DEFAULT_SANDBOX_UID
}

fn default_sandbox_gid() -> u32 {
    DEFAULT_SANDBOX_GID
}

fn default_sandbox_root() -> String {
    DEFAULT_SANDBOX_ROOT.to_owned()
}

fn default_exec_path() -> String {
    DEFAULT_EXEC_PATH.to_owned()
}

fn default_result_path() -> String {
    DEFAULT_RESULT_PATH.to_owned()
}

fn default_network_mode() -> String {
    DEFAULT_NETWORK_MODE.to_owned()
}

fn default_shared_host_paths() -> Vec<String> {
    DEFAULT_SHARED_HOST_PATHS
        .iter()
        .map(|path| (*path).to_owned())
        .collect()
}

fn default_docker_timeout_secs() -> u64 {
    DEFAULT_DOCKER_TIMEOUT_SECS
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_image_pull_timeout_secs() -> u64 {
    DEFAULT_IMAGE_PULL_TIMEOUT_SECS
}

fn default_exec_grace_secs() -> u64 {
    DEFAULT_EXEC_GRACE_SECS
}

fn default_unlimited_exec_timeout_secs() -> u64 {
    DEFAULT_UNLIMITED_EXEC_TIMEOUT_SECS
}

fn default_result_timeout_ms() -> u64 {
    DEFAULT_RESULT_TIMEOUT_MS
}

fn default_file_fetch_attempts() -> u32 {
    DEFAULT_FILE_FETCH_ATTEMPTS
}

fn default_removal_timeout_ms() -> u64 {
    DEFAULT_REMOVAL_TIMEOUT_MS
}
