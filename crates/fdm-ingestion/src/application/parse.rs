//! Queue message body decoding.

use fdm_core::error::IngestError;
use serde_json::Value;

/// Decodes a queue message body into the raw CloudEvent JSON.
///
/// Bodies relayed through a notification topic arrive wrapped as
/// `{"Message": "<json>"}`; the inner string is the event. Any other JSON
/// body is the event itself.
///
/// # Errors
///
/// Returns `IngestError::Parse` if the body, or the wrapped message, is not
/// valid JSON.
pub fn parse_message_body(body: &str) -> Result<Value, IngestError> {
    let outer: Value =
        serde_json::from_str(body).map_err(|e| IngestError::Parse(e.to_string()))?;

    match outer.get("Message").and_then(Value::as_str) {
        Some(inner) => {
            serde_json::from_str(inner).map_err(|e| IngestError::Parse(e.to_string()))
        }
        None => Ok(outer),
    }
}
