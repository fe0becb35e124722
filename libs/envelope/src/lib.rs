//! # switchyard-envelope
//!
//! The unit of data exchanged between the control plane and its workers,
//! and the pieces both sides share to act on it.
//!
//! ## Wire Format
//!
//! Every frame is one JSON object:
//!
//! ```json
//! {"domain":"users","type":"user_index_request","payload":"{}","requestId":"req_01HV..."}
//! {"domain":"users","type":"user_index_response","payload":"[]","requestId":"req_01HV...","success":true}
//! ```
//!
//! Requests and responses are paired purely by naming convention: a type
//! ending in `_response` is a response, anything else is a request. The
//! convention lives only at the edge. Frames are decoded into [`Frame`]
//! immediately after receipt, so nothing downstream inspects suffixes.
//!
//! ## Field Restrictions
//!
//! `domain` must be 1 to 64 characters from `[A-Za-z0-9._-]` and
//! `requestId` must be 1 to 256 bytes. A frame violating either cannot be
//! addressed or correlated, so it fails to decode and the receiving side
//! drops it with a warning instead of answering it.
//!
//! ## Modules
//!
//! - [`envelope`]: the wire struct and the naming convention
//! - [`frame`]: the tagged request/response view
//! - [`handler`]: the handler table invoked for inbound requests
//! - [`transport`]: frame reader/writer traits and an in-memory pair

pub mod envelope;
mod error;
pub mod frame;
pub mod handler;
pub mod transport;

pub use envelope::{
    is_response_type, request_type_for, response_type_for, MessageEnvelope, REQUEST_SUFFIX,
    RESPONSE_SUFFIX,
};
pub use error::{EnvelopeError, HandlerError, TransportError};
pub use frame::{Frame, Request, Response};
pub use handler::{Handler, HandlerTable, RequestContext};
pub use transport::{FrameReader, FrameWriter};

pub use switchyard_id::{ConnectionId, DomainName, RequestId};
