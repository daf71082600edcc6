pub mod analyze;
pub mod config;
pub mod doctor;

use std::fs;
use std::path::Path;

use dealcast_core::{validate_snapshot, ApplicationError, Opportunity};
use serde::Serialize;
use serde_json::Value;

/// Exit code for unreadable input, invalid snapshots and config failures.
pub const EXIT_INPUT: u8 = 2;
/// Exit code for failures after the snapshot was accepted.
pub const EXIT_ANALYSIS: u8 = 3;

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
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::report(command, message, None)
    }

    pub fn report(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            hint: None,
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
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
            hint: None,
            correlation_id: None,
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Failure envelope carrying the detailed message plus the user-safe hint and
    /// correlation id of the interface-level error.
    pub fn from_error(command: &str, error: ApplicationError, correlation_id: &str) -> Self {
        let exit_code = match error {
            ApplicationError::Analysis(_) => EXIT_ANALYSIS,
            _ => EXIT_INPUT,
        };
        let error_class = error.error_class();
        let message = error.to_string();
        let interface = error.into_interface(correlation_id);

        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message,
            hint: Some(interface.user_message().to_string()),
            correlation_id: Some(interface.correlation_id().to_string()),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Reads a JSON array of opportunities and checks the snapshot invariants.
pub fn load_snapshot(path: &Path) -> Result<Vec<Opportunity>, ApplicationError> {
    let raw = fs::read_to_string(path).map_err(|error| {
        ApplicationError::Input(format!("could not read snapshot `{}`: {error}", path.display()))
    })?;

    let opportunities: Vec<Opportunity> = serde_json::from_str(&raw).map_err(|error| {
        ApplicationError::Input(format!("could not parse snapshot `{}`: {error}", path.display()))
    })?;

    validate_snapshot(&opportunities)?;
    Ok(opportunities)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
