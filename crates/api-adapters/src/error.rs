//! Boundary error normalization.
//!
//! The content service reports failures with whatever body its handler
//! happened to write: `{"msg": ..}`, `{"message": ..}`, `{"error": ..}`,
//! `{"error": {"message": ..}}`, plain text, or nothing. All of it becomes an
//! [`AppError`] here, keyed by status code.

use domains::{AppError, ErrorKind};
use serde_json::Value;

const MESSAGE_FIELDS: [&str; 3] = ["msg", "message", "error"];

pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        400 | 409 | 422 => ErrorKind::ValidationError,
        _ => ErrorKind::RequestFailed,
    }
}

/// Pulls a human-readable message out of an error body, if there is one.
pub fn extract_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => message_in(&value),
        // Short plain-text bodies are messages; HTML error pages are not.
        Err(_) if !trimmed.starts_with('<') && trimmed.len() <= 200 => Some(trimmed.to_string()),
        Err(_) => None,
    }
}

fn message_in(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => MESSAGE_FIELDS
            .iter()
            .filter_map(|field| map.get(*field))
            .find_map(message_in),
        _ => None,
    }
}

/// Turns a non-success response into the error taxonomy.
pub fn normalize(status: u16, body: &str) -> AppError {
    let message = extract_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    AppError::from_kind(kind_for_status(status), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(kind_for_status(401), ErrorKind::Unauthorized);
        assert_eq!(kind_for_status(403), ErrorKind::Forbidden);
        assert_eq!(kind_for_status(404), ErrorKind::NotFound);
        assert_eq!(kind_for_status(422), ErrorKind::ValidationError);
        assert_eq!(kind_for_status(500), ErrorKind::RequestFailed);
        assert_eq!(kind_for_status(502), ErrorKind::RequestFailed);
    }

    #[test]
    fn message_is_found_in_any_of_the_usual_fields() {
        assert_eq!(extract_message(r#"{"msg":"Post not found"}"#).as_deref(), Some("Post not found"));
        assert_eq!(extract_message(r#"{"message":"Bad input"}"#).as_deref(), Some("Bad input"));
        assert_eq!(
            extract_message(r#"{"error":{"message":"nested"}}"#).as_deref(),
            Some("nested")
        );
        assert_eq!(extract_message("Unauthorized - No Token Provided").as_deref(), Some("Unauthorized - No Token Provided"));
    }

    #[test]
    fn html_and_empty_bodies_fall_back_to_the_status() {
        let err = normalize(502, "<html><body>Bad Gateway</body></html>");
        assert_eq!(err, AppError::request_failed("HTTP 502"));

        let err = normalize(404, "");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
