use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use types::{ContainerError, ContainerState, SandboxConfig};

use crate::{
    runtime::{ContainerSpec, RuntimeClient},
    wait::millis,
};

/// One sandbox container, owned by exactly one run.
///
/// Call [`ContainerSession::remove`] on every path once the container exists.
/// A session dropped without it (a panic, or the run future being dropped)
/// schedules the removal on the ambient tokio runtime instead.
pub struct ContainerSession {
    runtime: Arc<dyn RuntimeClient>,
    id: String,
    state: ContainerState,
}

impl ContainerSession {
    pub async fn create(
        runtime: Arc<dyn RuntimeClient>,
        config: &SandboxConfig,
    ) -> Result<Self, ContainerError> {
        let spec = ContainerSpec::for_sandbox(config);
        let id = runtime
            .create_container(&spec)
            .await
            .map_err(|source| ContainerError::Create {
                image: spec.image.clone(),
                source,
            })?;
        info!(container_id = %id, image = %spec.image, "sandbox container created");
        Ok(Self {
            runtime,
            id,
            state: ContainerState::Created,
        })
    }

    pub async fn start(&mut self) -> Result<(), ContainerError> {
        self.runtime
            .start_container(&self.id)
            .await
            .map_err(|source| ContainerError::Start {
                container_id: self.id.clone(),
                source,
            })?;
        self.transition(ContainerState::Started);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub(crate) fn runtime(&self) -> &dyn RuntimeClient {
        self.runtime.as_ref()
    }

    pub(crate) fn transition(&mut self, state: ContainerState) {
        debug!(container_id = %self.id, from = %self.state, to = %state, "sandbox container state");
        self.state = state;
    }

    /// Force-removes the container, waiting at most `wait` for the runtime to
    /// confirm. Failures and expiry are logged and swallowed so they never
    /// replace or hold up the outcome of the run.
    ///
    /// The removal runs in its own task, so it completes even when `wait`
    /// expires or the caller stops polling this future.
    pub async fn remove(mut self, wait: Duration) {
        let runtime = Arc::clone(&self.runtime);
        let id = self.id.clone();
        let removal = tokio::spawn(async move { runtime.remove_container(&id).await });
        self.transition(ContainerState::Removed);

        match tokio::time::timeout(wait, removal).await {
            Ok(Ok(Ok(()))) => info!(container_id = %self.id, "sandbox container removed"),
            Ok(Ok(Err(error))) => warn!(
                container_id = %self.id,
                error = %error,
                "failed to remove sandbox container"
            ),
            Ok(Err(error)) => warn!(
                container_id = %self.id,
                error = %error,
                "sandbox container removal task failed"
            ),
            Err(_) => warn!(
                container_id = %self.id,
                wait_ms = millis(wait),
                "sandbox container removal still pending; continuing in background"
            ),
        }
    }
}

impl Drop for ContainerSession {
    fn drop(&mut self) {
        if self.state == ContainerState::Removed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(container_id = %self.id, "no async runtime to remove abandoned sandbox container");
            return;
        };
        warn!(container_id = %self.id, state = %self.state, "removing abandoned sandbox container");
        let runtime = Arc::clone(&self.runtime);
        let id = std::mem::take(&mut self.id);
        handle.spawn(async move {
            if let Err(error) = runtime.remove_container(&id).await {
                warn!(container_id = %id, error = %error, "failed to remove abandoned sandbox container");
            }
        });
    }
}
