/**
 * LOGS - Initialisation de tracing
 *
 * RÔLE : installe le subscriber `fmt` avec un `EnvFilter`.
 * `RUST_LOG` l'emporte s'il est défini, sinon `--log.level` ; `fatal` reste
 * accepté pour compatibilité et correspond à `error`.
 */

use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Traduit `--log.level` en directive de niveau tracing
pub fn level_directive(level: &str) -> Result<&'static str, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "fatal" => Ok("error"),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    let directive = level_directive(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}
