use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Sweeper/launch-timeout intervals are non-zero
/// - Runtime image, network and unit prefix are non-empty
/// - Upload ceiling is non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.sweep_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.sweep_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.launch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.launch_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.orchestrator.unit_prefix.is_empty() {
        return Err(ConfigError::ValidationError(
            "orchestrator.unit_prefix cannot be empty".to_string(),
        ));
    }

    if config.orchestrator.network.is_empty() {
        return Err(ConfigError::ValidationError(
            "orchestrator.network cannot be empty".to_string(),
        ));
    }

    if config.runtime.image.is_empty() {
        return Err(ConfigError::ValidationError(
            "runtime.image cannot be empty".to_string(),
        ));
    }

    if config.uploads.max_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "uploads.max_size_bytes cannot be 0".to_string(),
        ));
    }

    Ok(())
}
