use std::time::Duration;

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker, body_full,
    errors::Error as BollardError,
    exec::{StartExecOptions, StartExecResults},
    models::{ContainerCreateBody, ExecConfig, HostConfig},
    query_parameters::{
        CreateContainerOptions, CreateImageOptionsBuilder, DownloadFromContainerOptionsBuilder,
        RemoveContainerOptionsBuilder, StartContainerOptions, UploadToContainerOptionsBuilder,
    },
};
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, info};
use types::{DockerEndpointConfig, RuntimeError};

use crate::runtime::{ContainerSpec, ExecState, RuntimeClient};

/// `RuntimeClient` backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    endpoint: String,
}

impl DockerRuntime {
    pub fn connect(endpoint: &DockerEndpointConfig) -> Result<Self, RuntimeError> {
        let label = endpoint.label();
        let docker = match &endpoint.socket_path {
            None => Docker::connect_with_local_defaults()
                .map(|docker| docker.with_timeout(Duration::from_secs(endpoint.timeout_secs))),
            Some(path) => {
                Docker::connect_with_socket(path, endpoint.timeout_secs, API_DEFAULT_VERSION)
            }
        }
        .map_err(|source| RuntimeError::Connect {
            endpoint: label.clone(),
            message: source.to_string(),
        })?;
        debug!(endpoint = %label, "connected docker runtime client");
        Ok(Self {
            docker,
            endpoint: label,
        })
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn inspect_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.docker
            .inspect_image(image)
            .await
            .map(|_| ())
            .map_err(|source| runtime_error("inspect_image", image, source))
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let (repository, tag) = split_image_reference(image);
        let mut options = CreateImageOptionsBuilder::new().from_image(repository);
        if let Some(tag) = tag {
            options = options.tag(tag);
        }

        info!(endpoint = %self.endpoint, image, "pulling sandbox image");
        let mut progress = self.docker.create_image(Some(options.build()), None, None);
        while let Some(update) = progress.next().await {
            let update = update.map_err(|source| runtime_error("create_image", image, source))?;
            if let Some(status) = update.status {
                debug!(image, status = %status, "image pull progress");
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                network_mode: Some(spec.network_mode.clone()),
                binds: Some(spec.binds.clone()),
                ..HostConfig::default()
            }),
            ..ContainerCreateBody::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions>, body)
            .await
            .map_err(|source| runtime_error("create_container", &spec.image, source))?;
        for warning in &created.warnings {
            debug!(container_id = %created.id, warning = %warning, "container create warning");
        }
        Ok(created.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await
            .map_err(|source| runtime_error("start_container", container_id, source))
    }

    async fn put_archive(
        &self,
        container_id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), RuntimeError> {
        let options = UploadToContainerOptionsBuilder::new().path(path).build();
        self.docker
            .upload_to_container(container_id, Some(options), body_full(Bytes::from(archive)))
            .await
            .map_err(|source| runtime_error("upload_to_container", container_id, source))
    }

    async fn get_archive(&self, container_id: &str, path: &str) -> Result<Vec<u8>, RuntimeError> {
        let options = DownloadFromContainerOptionsBuilder::new().path(path).build();
        let mut chunks = self
            .docker
            .download_from_container(container_id, Some(options));

        let mut archive = Vec::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|source| runtime_error("download_from_container", path, source))?;
            archive.extend_from_slice(&chunk);
        }
        Ok(archive)
    }

    async fn create_exec(
        &self,
        container_id: &str,
        command: Vec<String>,
    ) -> Result<String, RuntimeError> {
        let config = ExecConfig {
            cmd: Some(command),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..ExecConfig::default()
        };
        self.docker
            .create_exec(container_id, config)
            .await
            .map(|created| created.id)
            .map_err(|source| runtime_error("create_exec", container_id, source))
    }

    async fn start_exec(&self, exec_id: &str) -> Result<(), RuntimeError> {
        let started = self
            .docker
            .start_exec(exec_id, None::<StartExecOptions>)
            .await
            .map_err(|source| runtime_error("start_exec", exec_id, source))?;

        // The enforcement binary writes its verdict to a file; attached output
        // is only drained so a chatty program cannot stall on a full pipe.
        if let StartExecResults::Attached { mut output, .. } = started {
            let exec_id = exec_id.to_owned();
            tokio::spawn(async move {
                let mut bytes = 0_usize;
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(chunk) => bytes += chunk.into_bytes().len(),
                        Err(error) => {
                            debug!(exec_id = %exec_id, error = %error, "exec output stream ended with error");
                            break;
                        }
                    }
                }
                debug!(exec_id = %exec_id, bytes, "exec output drained");
            });
        }
        Ok(())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecState, RuntimeError> {
        let inspected = self
            .docker
            .inspect_exec(exec_id)
            .await
            .map_err(|source| runtime_error("inspect_exec", exec_id, source))?;
        Ok(ExecState {
            running: inspected.running.unwrap_or(false),
            exit_code: inspected.exit_code,
        })
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptionsBuilder::new()
            .force(true)
            .v(true)
            .build();
        match self
            .docker
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if is_not_found_error(&error) => Ok(()),
            Err(error) => Err(runtime_error("remove_container", container_id, error)),
        }
    }
}

/// Splits `repo[:tag]` for the pull API, defaulting the tag to `latest` so a
/// bare name does not pull every tag. Digest references are passed through.
fn split_image_reference(image: &str) -> (&str, Option<&str>) {
    if image.contains('@') {
        return (image, None);
    }
    let name_start = image.rfind('/').map_or(0, |index| index + 1);
    match image[name_start..].rfind(':') {
        Some(offset) => {
            let split = name_start + offset;
            (&image[..split], Some(&image[split + 1..]))
        }
        None => (image, Some("latest")),
    }
}

fn is_not_found_error(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

fn runtime_error(operation: &'static str, target: &str, source: BollardError) -> RuntimeError {
    match source {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound {
            operation,
            target: target.to_owned(),
        },
        BollardError::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::Conflict {
            operation,
            target: target.to_owned(),
            message,
        },
        other => RuntimeError::Operation {
            operation,
            target: target.to_owned(),
            message: other.to_string(),
        },
    }
}
