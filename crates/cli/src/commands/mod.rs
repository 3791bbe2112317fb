pub mod config;
pub mod doctor;
pub mod resolve;
pub mod simulate;

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use showings_core::config::{AppConfig, ConfigError, LoadOptions};

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_PAYLOAD: u8 = 3;
pub const EXIT_RUNTIME: u8 = 4;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Successful outcome carrying a structured report instead of a message.
    pub fn report(report: &impl Serialize) -> Self {
        match serde_json::to_string_pretty(report) {
            Ok(output) => Self { exit_code: 0, output },
            Err(error) => Self::failure("report", "serialization", error.to_string(), EXIT_RUNTIME),
        }
    }
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error: ConfigError| {
        CommandResult::failure(command, "config_validation", error.to_string(), EXIT_CONFIG)
    })
}

/// Reads a webhook body from disk. Invalid JSON is still a payload: the
/// webhook answers it with a spoken error, so the commands do too.
pub(crate) fn read_payload(command: &str, path: &Path) -> Result<Value, CommandResult> {
    let raw = fs::read_to_string(path).map_err(|error| {
        CommandResult::failure(
            command,
            "payload_unreadable",
            format!("cannot read `{}`: {error}", path.display()),
            EXIT_PAYLOAD,
        )
    })?;
    Ok(serde_json::from_str(&raw).unwrap_or(Value::Null))
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
