use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use types::{
    ExecutionError, RunOptions, RuntimeError, SandboxConfig, SandboxError, StagingError,
    sandboxed_path,
};

use crate::{
    runtime::{ExecState, RuntimeClient},
    wait::{PollPolicy, WaitError, millis, poll_until},
};

/// Argument vector for the enforcement binary:
///
/// ```text
/// <exec_path> <program> <stdin> <stdout> <stderr>
/// <time_limit> <time_limit_reserve> <memory_limit> <memory_limit_reserve>
/// <output_limit> <process_limit> <result_path>
/// ```
///
/// File arguments are rewritten to `<sandbox_root>/<basename>`; an omitted
/// redirect is passed as an empty string.
pub fn enforcement_command(
    config: &SandboxConfig,
    options: &RunOptions,
) -> Result<Vec<String>, StagingError> {
    let root = config.sandbox_root.as_str();
    let program = options.program.to_string_lossy();
    let redirect = |name: &Option<String>| match name {
        Some(name) => in_sandbox(root, name),
        None => Ok(String::new()),
    };

    Ok(vec![
        config.exec_path.clone(),
        in_sandbox(root, &program)?,
        redirect(&options.file_stdin)?,
        redirect(&options.file_stdout)?,
        redirect(&options.file_stderr)?,
        options.time_limit.to_string(),
        options.time_limit_reserve.to_string(),
        options.memory_limit.to_string(),
        options.memory_limit_reserve.to_string(),
        options.output_limit.to_string(),
        options.process_limit.to_string(),
        config.result_path.clone(),
    ])
}

/// Starts the enforcement binary and waits for it to exit. The verdict is not
/// interpreted here; it is read back from the result file.
pub async fn run(
    runtime: &dyn RuntimeClient,
    container_id: &str,
    command: Vec<String>,
    policy: PollPolicy,
    cancellation: &CancellationToken,
) -> Result<ExecState, SandboxError> {
    let exec_id = runtime
        .create_exec(container_id, command)
        .await
        .map_err(|source| ExecutionError::Create {
            container_id: container_id.to_owned(),
            source,
        })?;
    runtime
        .start_exec(&exec_id)
        .await
        .map_err(|source| ExecutionError::Start {
            exec_id: exec_id.clone(),
            source,
        })?;
    debug!(container_id, exec_id = %exec_id, "enforcement binary started");

    let exec = exec_id.as_str();
    let finished = poll_until(policy, cancellation, move || async move {
        let state = runtime.inspect_exec(exec).await?;
        Ok::<_, RuntimeError>((!state.running).then_some(state))
    })
    .await;

    match finished {
        Ok(state) => {
            info!(
                container_id,
                exec_id = %exec_id,
                exit_code = ?state.exit_code,
                "enforcement binary finished"
            );
            Ok(state)
        }
        Err(WaitError::Check(source)) => Err(ExecutionError::Inspect { exec_id, source }.into()),
        Err(WaitError::TimedOut { waited }) => Err(ExecutionError::Timeout {
            exec_id,
            waited_ms: millis(waited),
        }
        .into()),
        Err(WaitError::Cancelled) => Err(SandboxError::Cancelled),
    }
}

fn in_sandbox(root: &str, name: &str) -> Result<String, StagingError> {
    sandboxed_path(root, name).ok_or_else(|| StagingError::InvalidFileName {
        name: name.to_owned(),
    })
}
