pub mod claims;
pub mod config;
pub mod migrate;
pub mod roles;
pub mod seed;
pub mod stores;

use claimdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use claimdesk_core::errors::{CoreError, InterfaceError};
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_SEED_VERIFICATION: u8 = 6;
pub const EXIT_INVALID_INPUT: u8 = 7;
pub const EXIT_REMOTE_SETUP: u8 = 8;

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
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message.into(), None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::ok(command, message.into(), Some(value)),
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }

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
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Maps a service error onto its interface class; the user-facing message never leaks
    /// store internals, the detail goes to the log.
    pub fn from_core_error(command: &str, error: CoreError, correlation_id: &str) -> Self {
        let class = error.class();
        let exit_code = core_exit_code(&error);
        tracing::warn!(
            event_name = "cli.command_failed",
            command,
            correlation_id,
            error_class = class,
            error = %error,
            "command failed"
        );
        let interface = error.into_interface(correlation_id);
        let message = match &interface {
            InterfaceError::ServiceUnavailable { .. } | InterfaceError::Unauthenticated { .. } => {
                interface.user_message().to_string()
            }
            _ => interface.to_string(),
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(class.to_string()),
            message,
            correlation_id: Some(interface.correlation_id().to_string()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn ok(command: &str, message: String, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

/// Failure raised while preparing or running a command.
#[derive(Debug)]
pub struct Failure {
    pub class: &'static str,
    pub message: String,
    pub exit_code: u8,
}

impl Failure {
    pub fn new(class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { class, message: message.into(), exit_code }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message, EXIT_INVALID_INPUT)
    }

    pub fn into_result(self, command: &str) -> CommandResult {
        CommandResult::failure(command, self.class, self.message, self.exit_code)
    }
}

pub fn core_exit_code(error: &CoreError) -> u8 {
    match error {
        CoreError::Validation(_) => 10,
        CoreError::Authorization(_) => 11,
        CoreError::State(_) => 12,
        CoreError::NotFound { .. } => 13,
        CoreError::Conflict(_) => 14,
        CoreError::Remote(_) => 15,
        CoreError::SessionExpired => 16,
    }
}

pub fn load_config(options: &LoadOptions) -> Result<AppConfig, Failure> {
    AppConfig::load(options.clone()).map_err(|error: ConfigError| {
        Failure::new("config_validation", format!("configuration issue: {error}"), EXIT_CONFIG)
    })
}

pub fn runtime() -> Result<tokio::runtime::Runtime, Failure> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        Failure::new(
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
