//! Normalization of the job service's response bodies.
//!
//! The service answers `/status/{id}` and `/generate_image` with either a JSON
//! object, a JSON string, or plain text. Everything past this module sees only
//! [`StatusReport`] or a request id.

use serde_json::Value;

use crate::{
    errors::{AppError, Result},
    models::{JobStatus, StatusReport},
};

pub fn normalize_status_body(body: &str) -> Result<StatusReport> {
    let text = body.trim();
    if text.is_empty() {
        return Ok(StatusReport {
            status: None,
            completion_percentage: None,
            message: None,
        });
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(StatusReport {
            status: map
                .get("status")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(JobStatus::parse),
            completion_percentage: map.get("completion_percentage").and_then(parse_percentage),
            message: map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        Ok(Value::String(message)) => Ok(bare_message(&message)),
        Ok(Value::Null) => Ok(StatusReport {
            status: None,
            completion_percentage: None,
            message: None,
        }),
        Ok(_) => Err(AppError::remote(None, "Invalid response format from server")),
        Err(_) => Ok(bare_message(text)),
    }
}

/// Request id from a submission response: `{"request_id": ..}`, a JSON string, or plain text.
pub fn extract_request_id(body: &str) -> Result<String> {
    let text = body.trim();
    let id = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map.get("request_id").and_then(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        Ok(Value::String(s)) => Some(s.trim().to_string()),
        Ok(_) => None,
        Err(_) => Some(text.to_string()),
    };

    id.filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::remote(None, "Job service response is missing a request id"))
}

/// Error message from a non-2xx body, falling back to the status code.
pub fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "details", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP error! status: {}", status))
}

fn bare_message(message: &str) -> StatusReport {
    let message = message.trim();
    StatusReport {
        status: None,
        completion_percentage: None,
        message: (!message.is_empty()).then(|| message.to_string()),
    }
}

fn parse_percentage(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}
