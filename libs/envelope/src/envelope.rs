//! The wire envelope and the request/response naming convention.

use serde::{Deserialize, Serialize};
use switchyard_id::{DomainName, RequestId};

use crate::error::EnvelopeError;

/// Suffix marking a message type as a response.
pub const RESPONSE_SUFFIX: &str = "_response";

/// Suffix conventionally marking a message type as a request.
///
/// Only [`RESPONSE_SUFFIX`] is significant for classification; a type
/// without either suffix is still a request.
pub const REQUEST_SUFFIX: &str = "_request";

/// Returns true if `message_type` names a response.
pub fn is_response_type(message_type: &str) -> bool {
    message_type.ends_with(RESPONSE_SUFFIX)
}

/// Returns the response type paired with a request type.
///
/// `user_index_request` becomes `user_index_response`; a non-conforming
/// `ping` becomes `ping_response`.
pub fn response_type_for(request_type: &str) -> String {
    let stem = request_type
        .strip_suffix(REQUEST_SUFFIX)
        .unwrap_or(request_type);
    format!("{stem}{RESPONSE_SUFFIX}")
}

/// Returns the request type paired with a response type.
///
/// Returns `None` if `response_type` does not end in [`RESPONSE_SUFFIX`].
pub fn request_type_for(response_type: &str) -> Option<String> {
    response_type
        .strip_suffix(RESPONSE_SUFFIX)
        .map(|stem| format!("{stem}{REQUEST_SUFFIX}"))
}

/// One addressed, correlated unit of data on a domain channel.
///
/// `success` and `error` are only meaningful on responses and are omitted
/// from requests on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Logical name of the worker domain.
    pub domain: DomainName,

    /// Message type, classified by suffix.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Opaque payload owned by the business layer.
    #[serde(default)]
    pub payload: String,

    /// Correlation token.
    pub request_id: RequestId,

    /// Whether the handler succeeded (responses only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    /// Handler error message (responses only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageEnvelope {
    /// Creates a request envelope.
    pub fn request(
        domain: DomainName,
        message_type: impl Into<String>,
        payload: impl Into<String>,
        request_id: RequestId,
    ) -> Self {
        Self {
            domain,
            message_type: message_type.into(),
            payload: payload.into(),
            request_id,
            success: None,
            error: None,
        }
    }

    /// Returns true if this envelope is a response by naming convention.
    pub fn is_response(&self) -> bool {
        is_response_type(&self.message_type)
    }

    /// Decodes an envelope from JSON text.
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decodes an envelope from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| EnvelopeError::NotUtf8)?;
        Self::from_json(text)
    }

    /// Encodes the envelope as JSON text.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user_index_response", true)]
    #[case("user_index_request", false)]
    #[case("ping", false)]
    #[case("response", false)]
    #[case("_response", true)]
    #[case("user_response_request", false)]
    fn test_response_classification(#[case] message_type: &str, #[case] expected: bool) {
        assert_eq!(is_response_type(message_type), expected);
    }

    #[rstest]
    #[case("user_index_request", "user_index_response")]
    #[case("ping", "ping_response")]
    #[case("order_create", "order_create_response")]
    fn test_response_type_for(#[case] request: &str, #[case] expected: &str) {
        assert_eq!(response_type_for(request), expected);
    }

    #[test]
    fn test_request_type_for() {
        assert_eq!(
            request_type_for("user_index_response").as_deref(),
            Some("user_index_request")
        );
        assert_eq!(request_type_for("user_index_request"), None);
    }

    #[test]
    fn test_request_omits_response_fields() {
        let envelope = MessageEnvelope::request(
            DomainName::new("users").unwrap(),
            "user_index_request",
            "{}",
            RequestId::new("a1").unwrap(),
        );
        let json = envelope.to_json().unwrap();
        assert!(json.contains("\"type\":\"user_index_request\""));
        assert!(json.contains("\"requestId\":\"a1\""));
        assert!(!json.contains("success"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_decode_response() {
        let envelope = MessageEnvelope::from_json(
            r#"{"domain":"users","type":"user_index_response","payload":"[]","requestId":"a1","success":true}"#,
        )
        .unwrap();
        assert!(envelope.is_response());
        assert_eq!(envelope.payload, "[]");
        assert_eq!(envelope.success, Some(true));
        assert_eq!(envelope.error, None);
    }

    #[test]
    fn test_decode_missing_payload_defaults_empty() {
        let envelope =
            MessageEnvelope::from_json(r#"{"domain":"users","type":"ping","requestId":"r"}"#)
                .unwrap();
        assert_eq!(envelope.payload, "");
    }

    #[test]
    fn test_decode_rejects_missing_request_id() {
        let result = MessageEnvelope::from_json(r#"{"domain":"users","type":"ping"}"#);
        assert!(matches!(result, Err(EnvelopeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let result = MessageEnvelope::from_slice(&[0xff, 0xfe]);
        assert!(matches!(result, Err(EnvelopeError::NotUtf8)));
    }
}
