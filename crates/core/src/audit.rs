use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Serialize)]
pub struct AuditEvent {
    pub timestamp: i64,
    pub event_type: String,
    pub subject: String,
    pub details: Value,
}

/// Emit one JSON line on the `audit` target.
pub fn log_audit(event_type: &str, subject: &str, details: Value) {
    let event = AuditEvent {
        timestamp: Utc::now().timestamp_millis(),
        event_type: event_type.to_string(),
        subject: subject.to_string(),
        details,
    };

    // The subscriber receives the serialized event as the message, so the
    // audit file stays one clean JSON object per line.
    if let Ok(json_str) = serde_json::to_string(&event) {
        info!(target: "audit", "{}", json_str);
    }
}
