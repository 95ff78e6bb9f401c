use std::path::{Path, PathBuf};

use crate::config::schema::{Config, WorkerMode};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads the config file if one is given (defaults otherwise), then applies
/// environment overrides and validates the result.
pub fn load_config_with_env(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Applies `DB_PATH`, `WORKSPACE_ROOT`, `FORK_MODE`, `FORK_OWNER`, `FORK_ORG`
/// and `AI_COMMAND` as returned by `lookup`. Empty values are ignored.
pub fn apply_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(path) = get("DB_PATH") {
        config.database_path = Some(PathBuf::from(path));
    }
    if let Some(root) = get("WORKSPACE_ROOT") {
        config.workspace_root = PathBuf::from(root);
    }
    if let Some(mode) = get("FORK_MODE") {
        config.fork.enabled = parse_flag("FORK_MODE", &mode)?;
    }
    if let Some(owner) = get("FORK_OWNER") {
        config.fork.owner = Some(owner);
    }
    if let Some(org) = get("FORK_ORG") {
        config.fork.org = Some(org);
    }
    if let Some(command) = get("AI_COMMAND") {
        config.worker.mode = WorkerMode::Command;
        config.worker.command = Some(command);
    }
    Ok(())
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Validation {
            message: format!("{} must be a boolean, got '{}'", key, other),
        }),
    }
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.scheduler.interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "scheduler.intervalMs must be positive".to_string(),
        });
    }

    if config.worker.mode == WorkerMode::Command
        && config
            .worker
            .command
            .as_deref()
            .map_or(true, |c| c.trim().is_empty())
    {
        return Err(ConfigError::Validation {
            message: "worker.command is required when worker.mode is 'command'".to_string(),
        });
    }

    if tracing_subscriber::EnvFilter::try_new(&config.logging.level).is_err() {
        return Err(ConfigError::Validation {
            message: format!("Invalid log level: {}", config.logging.level),
        });
    }

    Ok(())
}
