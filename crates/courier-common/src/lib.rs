//! Shared wire types for Courier
//!
//! Everything that crosses the HTTP boundary between `courier-server` and
//! `courier-client` lives here so both sides agree on the JSON shape.

pub mod api;
pub mod error;
pub mod event;
pub mod ids;
pub mod message;
pub mod paths;

pub use api::{
    ConnectRequest, ConnectResponse, ErrorBody, PollQuery, PollResponse, SendMessageRequest,
    UserRequest,
};
pub use error::{ProtocolError, Result};
pub use event::{ErrorPayload, Event, EventPayload, EventType, MembershipChange, ReadReceipt, Welcome};
pub use message::{Attachment, Identity, Message, SenderSnapshot};
