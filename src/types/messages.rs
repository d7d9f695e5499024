//! NATS message envelopes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip_camel_case() {
        let json = r#"{"id":"00000000-0000-0000-0000-000000000000","timestamp":"2025-01-02T10:00:00Z","payload":{"x":1}}"#;
        let req: Request<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(req.id.is_nil());
        assert_eq!(req.payload["x"], 1);
    }

    #[test]
    fn test_error_response_omits_empty_details() {
        let err = ErrorResponse::new(Uuid::nil(), "PARSE_ERROR", "O arquivo não contém linhas");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"code\":\"PARSE_ERROR\""));
        assert!(!json.contains("details"));

        let json = serde_json::to_string(&err.with_details(serde_json::json!(["name"]))).unwrap();
        assert!(json.contains("\"details\":[\"name\"]"));
    }
}
