use serde_json::{json, Map, Value};

use crate::kernel::controller::ListenStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartListening,
    StopListening,
    GetStatus,
    Unknown(String),
}

impl Command {
    /// Reads the `command` key. A missing key is an empty command name.
    pub fn parse(request: &Map<String, Value>) -> Self {
        let name = match request.get("command") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        match name.as_str() {
            "start_listening" => Self::StartListening,
            "stop_listening" => Self::StopListening,
            "get_status" => Self::GetStatus,
            _ => Self::Unknown(name),
        }
    }
}

pub fn status_response(label: &str) -> Map<String, Value> {
    into_map(json!({ "status": label }))
}

pub fn error_response(message: impl Into<String>) -> Map<String, Value> {
    into_map(json!({ "error": message.into() }))
}

pub fn unknown_command(name: &str) -> Map<String, Value> {
    error_response(format!("Unknown command: {}", name))
}

pub fn listen_status(status: &ListenStatus) -> Map<String, Value> {
    into_map(json!({
        "is_listening": status.is_listening,
        "has_reading": status.has_reading,
        "reading_expiration_seconds": status.expiration_window.as_secs(),
    }))
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
