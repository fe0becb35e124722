//! Tagged request/response view of an envelope.

use switchyard_id::{DomainName, RequestId};

use crate::envelope::{is_response_type, response_type_for, MessageEnvelope};
use crate::error::EnvelopeError;

/// An inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub domain: DomainName,
    pub message_type: String,
    pub payload: String,
    pub request_id: RequestId,
}

impl Request {
    /// Builds the successful response to this request.
    pub fn reply(&self, payload: impl Into<String>) -> Response {
        Response {
            domain: self.domain.clone(),
            message_type: response_type_for(&self.message_type),
            payload: payload.into(),
            request_id: self.request_id.clone(),
            success: true,
            error: None,
        }
    }

    /// Builds an error-shaped response to this request.
    pub fn fail(&self, error: impl Into<String>) -> Response {
        Response {
            domain: self.domain.clone(),
            message_type: response_type_for(&self.message_type),
            payload: String::new(),
            request_id: self.request_id.clone(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// An inbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub domain: DomainName,
    pub message_type: String,
    pub payload: String,
    pub request_id: RequestId,
    pub success: bool,
    pub error: Option<String>,
}

/// An envelope classified by the response-suffix convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Request(Request),
    Response(Response),
}

impl Frame {
    /// Decodes a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        MessageEnvelope::from_json(text).map(Self::from)
    }

    /// Decodes a frame from raw bytes.
    pub fn decode_slice(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        MessageEnvelope::from_slice(bytes).map(Self::from)
    }

    /// Returns the domain the frame is addressed to or from.
    pub fn domain(&self) -> &DomainName {
        match self {
            Frame::Request(r) => &r.domain,
            Frame::Response(r) => &r.domain,
        }
    }

    /// Returns the frame's correlation token.
    pub fn request_id(&self) -> &RequestId {
        match self {
            Frame::Request(r) => &r.request_id,
            Frame::Response(r) => &r.request_id,
        }
    }

    /// Returns the frame's message type.
    pub fn message_type(&self) -> &str {
        match self {
            Frame::Request(r) => &r.message_type,
            Frame::Response(r) => &r.message_type,
        }
    }
}

impl From<MessageEnvelope> for Frame {
    fn from(envelope: MessageEnvelope) -> Self {
        if is_response_type(&envelope.message_type) {
            // A response without an explicit flag is successful unless it
            // carries an error.
            let success = envelope.success.unwrap_or(envelope.error.is_none());
            Frame::Response(Response {
                domain: envelope.domain,
                message_type: envelope.message_type,
                payload: envelope.payload,
                request_id: envelope.request_id,
                success,
                error: envelope.error,
            })
        } else {
            Frame::Request(Request {
                domain: envelope.domain,
                message_type: envelope.message_type,
                payload: envelope.payload,
                request_id: envelope.request_id,
            })
        }
    }
}

impl From<Request> for MessageEnvelope {
    fn from(request: Request) -> Self {
        MessageEnvelope {
            domain: request.domain,
            message_type: request.message_type,
            payload: request.payload,
            request_id: request.request_id,
            success: None,
            error: None,
        }
    }
}

impl From<Response> for MessageEnvelope {
    fn from(response: Response) -> Self {
        MessageEnvelope {
            domain: response.domain,
            message_type: response.message_type,
            payload: response.payload,
            request_id: response.request_id,
            success: Some(response.success),
            error: response.error,
        }
    }
}

impl From<Frame> for MessageEnvelope {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Request(r) => r.into(),
            Frame::Response(r) => r.into(),
        }
    }
}
