use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use types::{ProvisionError, RuntimeError, SandboxError};

use crate::{
    runtime::RuntimeClient,
    wait::{PollPolicy, WaitError, millis, poll_until},
};

/// Makes sure `image` is present locally, pulling it once if needed and then
/// waiting for it to become visible to inspect.
pub async fn ensure_image(
    runtime: &dyn RuntimeClient,
    image: &str,
    policy: PollPolicy,
    cancellation: &CancellationToken,
) -> Result<(), SandboxError> {
    match runtime.inspect_image(image).await {
        Ok(()) => {
            debug!(image, "sandbox image already present");
            return Ok(());
        }
        Err(error) if error.is_not_found() => {}
        Err(source) => return Err(inspect_failed(image, source)),
    }

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => return Err(SandboxError::Cancelled),
        pulled = runtime.pull_image(image) => pulled.map_err(|source| ProvisionError::Pull {
            image: image.to_owned(),
            source,
        })?,
    }

    let visible = poll_until(policy, cancellation, move || async move {
        match runtime.inspect_image(image).await {
            Ok(()) => Ok(Some(())),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    })
    .await;

    match visible {
        Ok(()) => {
            info!(image, "sandbox image pulled");
            Ok(())
        }
        Err(WaitError::Check(source)) => Err(inspect_failed(image, source)),
        Err(WaitError::TimedOut { waited }) => Err(ProvisionError::Timeout {
            image: image.to_owned(),
            waited_ms: millis(waited),
        }
        .into()),
        Err(WaitError::Cancelled) => Err(SandboxError::Cancelled),
    }
}

fn inspect_failed(image: &str, source: RuntimeError) -> SandboxError {
    ProvisionError::Inspect {
        image: image.to_owned(),
        source,
    }
    .into()
}
