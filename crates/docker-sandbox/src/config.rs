use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use thiserror::Error;
use types::{SandboxConfig, SandboxConfigError};

pub const CONFIG_ENV_PREFIX: &str = "DOCKER_SANDBOX__";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to load sandbox configuration: {0}")]
    Extract(#[source] Box<figment::Error>),
    #[error(transparent)]
    Validation(#[from] SandboxConfigError),
}

impl From<figment::Error> for ConfigLoadError {
    fn from(value: figment::Error) -> Self {
        Self::Extract(Box::new(value))
    }
}

/// Layers, lowest precedence first: built-in defaults, the TOML file at
/// `path` (skipped when `None` or missing), then `DOCKER_SANDBOX__*`
/// environment variables with `__` separating nested keys
/// (`DOCKER_SANDBOX__POLLING__INTERVAL_MS=25`).
pub fn load_sandbox_config(path: Option<&Path>) -> Result<SandboxConfig, ConfigLoadError> {
    let mut figment = Figment::from(Serialized::defaults(SandboxConfig::default()));
    if let Some(path) = path
        && path.is_file()
    {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed(CONFIG_ENV_PREFIX).split("__"));

    let config: SandboxConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
