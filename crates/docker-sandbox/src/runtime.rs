use std::{collections::HashMap, fmt::Debug};

use async_trait::async_trait;
use types::{RuntimeError, SandboxConfig};

pub const SANDBOX_ROLE_LABEL: &str = "docker-sandbox.role";
const SANDBOX_ROLE: &str = "sandbox";

/// Primitive operations the orchestrator needs from a container runtime.
///
/// Implementations must be safe to share between concurrent runs; each run
/// only touches the container it created.
#[async_trait]
pub trait RuntimeClient: Send + Sync + Debug {
    /// Returns `RuntimeError::NotFound` when the image is absent.
    async fn inspect_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Pulls the image. Completion of this call does not guarantee the image
    /// is immediately visible to `inspect_image`.
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Returns the new container id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Extracts a tar archive into `path` inside the container.
    async fn put_archive(
        &self,
        container_id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), RuntimeError>;

    /// Returns a tar archive holding the file at `path`.
    async fn get_archive(&self, container_id: &str, path: &str) -> Result<Vec<u8>, RuntimeError>;

    /// Returns the new exec id. The exec attaches stdout and stderr.
    async fn create_exec(
        &self,
        container_id: &str,
        command: Vec<String>,
    ) -> Result<String, RuntimeError>;

    async fn start_exec(&self, exec_id: &str) -> Result<(), RuntimeError>;

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecState, RuntimeError>;

    /// Force-removes the container, killing anything still running in it.
    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub network_mode: String,
    pub binds: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl ContainerSpec {
    /// Network-less container sharing the configured host library
    /// directories read-only.
    pub fn for_sandbox(config: &SandboxConfig) -> Self {
        Self {
            image: config.image.clone(),
            network_mode: config.network_mode.clone(),
            binds: config.readonly_binds(),
            labels: HashMap::from([(SANDBOX_ROLE_LABEL.to_owned(), SANDBOX_ROLE.to_owned())]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecState {
    pub running: bool,
    pub exit_code: Option<i64>,
}
