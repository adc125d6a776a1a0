use std::fs;
use tracing::{debug, error, info};

use crate::types::client_config::{ClientConfig, ConfigError};

pub fn load_config(path: &str) -> Result<ClientConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: ClientConfig = toml::from_str(&contents)?;
    debug!("Config: {:?}", config);

    config.validate()?;

    info!("Configuration loaded and validated");

    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
