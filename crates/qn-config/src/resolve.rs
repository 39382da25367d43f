//! Service configuration resolution.
//!
//! Order: explicit CLI path → `QN_CONFIG` env var → XDG config dir →
//! built-in defaults. An explicitly named file that cannot be read is an
//! error; a missing XDG file silently falls through to defaults.

use std::path::{Path, PathBuf};

use crate::service::ServiceConfig;
use crate::validate::ValidationError;

/// Environment variable naming a service config file.
pub const CONFIG_ENV_VAR: &str = "QN_CONFIG";

const APP_DIR: &str = "quake_nowcast";
const CONFIG_FILE_NAME: &str = "config.json";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    Xdg(PathBuf),
    Defaults,
}

/// Resolve and validate the service configuration.
pub fn resolve_config(
    explicit: Option<&Path>,
) -> Result<(ServiceConfig, ConfigSource), ValidationError> {
    let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
    resolve_with(explicit, env_path, default_config_path())
}

fn resolve_with(
    explicit: Option<&Path>,
    env_path: Option<PathBuf>,
    xdg_path: Option<PathBuf>,
) -> Result<(ServiceConfig, ConfigSource), ValidationError> {
    let (config, source) = if let Some(path) = explicit {
        (ServiceConfig::from_file(path)?, ConfigSource::Cli(path.to_path_buf()))
    } else if let Some(path) = env_path {
        (ServiceConfig::from_file(&path)?, ConfigSource::Env(path))
    } else if let Some(path) = xdg_path.filter(|p| p.is_file()) {
        (ServiceConfig::from_file(&path)?, ConfigSource::Xdg(path))
    } else {
        (ServiceConfig::default(), ConfigSource::Defaults)
    };
    config.validate()?;
    Ok((config, source))
}

/// `$XDG_CONFIG_HOME/quake_nowcast/config.json` (platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME))
}
