use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use types::{
    CollectionError, ExecutionResult, OutputFile, RuntimeError, SandboxError, StagedFile,
    sandbox_basename, sandboxed_path,
};

use crate::{
    archive,
    runtime::RuntimeClient,
    wait::{PollPolicy, WaitError, millis, poll_until},
};

/// What a bounded round of archive downloads produced for one path.
#[derive(Debug)]
pub enum FetchOutcome {
    Ready(StagedFile),
    /// Every attempt hit a condition that may still clear: the file is not
    /// there yet, or the archive came back empty or undecodable.
    NotYetAvailable,
    /// The runtime failed in a way retrying will not fix.
    PermanentFailure(RuntimeError),
}

/// Downloads the single-file archive at `path`, retrying transient failures
/// back to back up to `attempts` times.
///
/// Only a regular-file entry named after the last component of `path`
/// counts. A directory at `path` comes back as its nested entries, none of
/// which match, so it ends as `NotYetAvailable` like a missing file.
pub async fn fetch_file(
    runtime: &dyn RuntimeClient,
    container_id: &str,
    path: &str,
    attempts: u32,
) -> FetchOutcome {
    let expected = sandbox_basename(path).unwrap_or(path);
    for attempt in 1..=attempts.max(1) {
        match runtime.get_archive(container_id, path).await {
            Ok(bytes) => match archive::unpack(&bytes) {
                Ok(files) => match files
                    .into_iter()
                    .find(|file| file.name.trim_start_matches("./") == expected)
                {
                    Some(file) => return FetchOutcome::Ready(file),
                    None => debug!(
                        container_id,
                        path,
                        expected,
                        attempt,
                        "archive held no matching regular file"
                    ),
                },
                Err(error) => {
                    debug!(container_id, path, attempt, error = %error, "archive not decodable yet");
                }
            },
            Err(error) if error.is_transient() => {
                debug!(container_id, path, attempt, error = %error, "file not retrievable yet");
            }
            Err(error) => return FetchOutcome::PermanentFailure(error),
        }
    }
    FetchOutcome::NotYetAvailable
}

/// Waits for the enforcement binary's result file and parses it. The exec
/// having exited does not mean the file is visible yet, so this polls within
/// `policy`. The binary creates the file before the program runs and fills it
/// at the end, so empty content also counts as not written yet.
pub async fn fetch_result(
    runtime: &dyn RuntimeClient,
    container_id: &str,
    result_path: &str,
    attempts: u32,
    policy: PollPolicy,
    cancellation: &CancellationToken,
) -> Result<ExecutionResult, SandboxError> {
    let fetched = poll_until(policy, cancellation, move || async move {
        match fetch_file(runtime, container_id, result_path, attempts).await {
            FetchOutcome::Ready(file) if file.data.iter().all(u8::is_ascii_whitespace) => {
                debug!(container_id, path = result_path, "result file still empty");
                Ok(None)
            }
            FetchOutcome::Ready(file) => Ok(Some(file)),
            FetchOutcome::NotYetAvailable => Ok(None),
            FetchOutcome::PermanentFailure(error) => Err(error),
        }
    })
    .await;

    let file = match fetched {
        Ok(file) => file,
        Err(WaitError::Check(source)) => {
            return Err(CollectionError::Retrieval {
                path: result_path.to_owned(),
                source,
            }
            .into());
        }
        Err(WaitError::TimedOut { waited }) => {
            return Err(CollectionError::ResultTimeout {
                path: result_path.to_owned(),
                waited_ms: millis(waited),
            }
            .into());
        }
        Err(WaitError::Cancelled) => return Err(SandboxError::Cancelled),
    };

    let content = String::from_utf8_lossy(&file.data);
    let result = ExecutionResult::parse(&content).map_err(CollectionError::from)?;
    debug!(container_id, status = %result.status, "result file parsed");
    Ok(result)
}

/// Fetches each requested file from `<sandbox_root>/<basename>` in request
/// order. Files that never became retrievable are kept as absent entries.
pub async fn fetch_output_files(
    runtime: &dyn RuntimeClient,
    container_id: &str,
    sandbox_root: &str,
    names: &[String],
    attempts: u32,
) -> Vec<OutputFile> {
    let mut outputs = Vec::with_capacity(names.len());
    for name in names {
        let data = match sandboxed_path(sandbox_root, name) {
            Some(path) => match fetch_file(runtime, container_id, &path, attempts).await {
                FetchOutcome::Ready(file) => Some(file.data),
                FetchOutcome::NotYetAvailable => {
                    debug!(container_id, path = %path, "output file not produced");
                    None
                }
                FetchOutcome::PermanentFailure(error) => {
                    warn!(container_id, path = %path, error = %error, "failed to retrieve output file");
                    None
                }
            },
            None => None,
        };
        outputs.push(OutputFile {
            name: name.clone(),
            data,
        });
    }
    outputs
}
