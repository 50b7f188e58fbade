//! Runs an untrusted program under resource limits inside a throwaway Docker
//! container and returns the enforcement binary's verdict plus any requested
//! output files.
//!
//! A run is one linear pipeline:
//!
//! 1. [`provision::ensure_image`] makes sure the sandbox image is present.
//! 2. [`session::ContainerSession`] creates and starts a network-less
//!    container sharing host libraries read-only.
//! 3. [`staging::inject`] uploads the input files and the program.
//! 4. [`exec::run`] starts the enforcement binary and waits for it to exit.
//! 5. [`collect::fetch_result`] and [`collect::fetch_output_files`] read the
//!    verdict and outputs back.
//! 6. The container is removed, whatever happened in steps 2-5.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use types::{ContainerState, RunOptions, RunOutcome, SandboxConfig, SandboxError, StagedFile};

pub mod archive;
pub mod collect;
pub mod config;
pub mod docker;
pub mod exec;
pub mod provision;
pub mod runtime;
pub mod session;
pub mod staging;
pub mod wait;

pub use config::{CONFIG_ENV_PREFIX, ConfigLoadError, load_sandbox_config};
pub use docker::DockerRuntime;
pub use runtime::{ContainerSpec, ExecState, RuntimeClient};
pub use session::ContainerSession;
pub use wait::PollPolicy;

#[derive(Debug, Clone)]
pub struct Sandbox {
    runtime: Arc<dyn RuntimeClient>,
    config: SandboxConfig,
}

impl Sandbox {
    /// Connects to the Docker daemon named by `config.docker`.
    pub fn connect(config: SandboxConfig) -> Result<Self, SandboxError> {
        let runtime = DockerRuntime::connect(&config.docker)?;
        Ok(Self::with_runtime(Arc::new(runtime), config))
    }

    pub fn with_runtime(runtime: Arc<dyn RuntimeClient>, config: SandboxConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub async fn run(&self, options: RunOptions) -> Result<RunOutcome, SandboxError> {
        self.run_with_cancellation(options, &CancellationToken::new())
            .await
    }

    /// Blocking wrapper for callers without an async runtime.
    pub fn run_blocking(&self, options: RunOptions) -> Result<RunOutcome, SandboxError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| SandboxError::AsyncRuntimeInit { source })?;
        runtime.block_on(self.run(options))
    }

    /// Cancelling `cancellation` aborts whichever wait is in progress with
    /// [`SandboxError::Cancelled`]; the container is still removed.
    pub async fn run_with_cancellation(
        &self,
        options: RunOptions,
        cancellation: &CancellationToken,
    ) -> Result<RunOutcome, SandboxError> {
        options.validate()?;
        let command = exec::enforcement_command(&self.config, &options)?;
        let program = staging::read_program(&options.program).await?;
        let files = staging::stage_files(&options, program, &self.config)?;

        let polling = &self.config.polling;
        provision::ensure_image(
            self.runtime.as_ref(),
            &self.config.image,
            PollPolicy::new(polling.interval(), polling.image_pull_timeout()),
            cancellation,
        )
        .await?;

        let mut session = ContainerSession::create(Arc::clone(&self.runtime), &self.config).await?;
        let outcome = self
            .run_in_session(&mut session, &options, command, &files, cancellation)
            .await;
        let container_id = session.id().to_owned();
        session.remove(self.config.polling.removal_timeout()).await;

        match &outcome {
            Ok(outcome) => info!(
                container_id = %container_id,
                status = %outcome.result.status,
                time_usage = outcome.result.time_usage,
                memory_usage = outcome.result.memory_usage,
                "sandbox run finished"
            ),
            Err(error) => info!(container_id = %container_id, error = %error, "sandbox run failed"),
        }
        outcome
    }

    async fn run_in_session(
        &self,
        session: &mut ContainerSession,
        options: &RunOptions,
        command: Vec<String>,
        files: &[StagedFile],
        cancellation: &CancellationToken,
    ) -> Result<RunOutcome, SandboxError> {
        let config = &self.config;
        let polling = &config.polling;

        session.start().await?;
        staging::inject(session.runtime(), session.id(), files, &config.sandbox_root).await?;

        session.transition(ContainerState::ExecRunning);
        exec::run(
            session.runtime(),
            session.id(),
            command,
            PollPolicy::new(
                polling.interval(),
                polling.exec_timeout(options.time_limit, options.time_limit_reserve),
            ),
            cancellation,
        )
        .await?;
        session.transition(ContainerState::ExecFinished);

        let result = collect::fetch_result(
            session.runtime(),
            session.id(),
            &config.result_path,
            polling.file_fetch_attempts,
            PollPolicy::new(polling.interval(), polling.result_timeout()),
            cancellation,
        )
        .await?;
        let output_files = collect::fetch_output_files(
            session.runtime(),
            session.id(),
            &config.sandbox_root,
            &options.output_files,
            polling.file_fetch_attempts,
        )
        .await;

        Ok(RunOutcome {
            result,
            output_files,
        })
    }
}
