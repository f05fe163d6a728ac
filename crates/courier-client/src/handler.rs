//! Callbacks invoked by the transport
//!
//! Every method has a no-op default so embedders implement only what they
//! render. [`ChannelHandler`] forwards everything onto an unbounded channel.

use crate::transport::ConnectionState;
use courier_common::{MembershipChange, Message, ReadReceipt};
use tokio::sync::mpsc;

pub trait EventHandler: Send + Sync + 'static {
    /// A new message, either delivered by a poll or the local optimistic
    /// copy of one being sent (its id starts with `temp-`).
    fn on_message(&self, _message: &Message) {}

    /// The authoritative copy of a message previously shown under `temp_id`.
    fn on_reconciled(&self, _temp_id: &str, _message: &Message) {}

    /// Sending the optimistic message `temp_id` failed; it will not be
    /// reconciled.
    fn on_send_failed(&self, _temp_id: &str, _error: &str) {}

    fn on_read(&self, _receipt: &ReadReceipt) {}

    fn on_joined(&self, _change: &MembershipChange) {}

    fn on_left(&self, _change: &MembershipChange) {}

    fn on_error(&self, _message: &str) {}

    fn on_state_change(&self, _state: ConnectionState) {}
}

/// Handler that ignores everything.
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Message),
    Reconciled { temp_id: String, message: Message },
    SendFailed { temp_id: String, error: String },
    Read(ReadReceipt),
    Joined(MembershipChange),
    Left(MembershipChange),
    Error(String),
    State(ConnectionState),
}

pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TransportEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl EventHandler for ChannelHandler {
    fn on_message(&self, message: &Message) {
        self.send(TransportEvent::Message(message.clone()));
    }

    fn on_reconciled(&self, temp_id: &str, message: &Message) {
        self.send(TransportEvent::Reconciled {
            temp_id: temp_id.to_string(),
            message: message.clone(),
        });
    }

    fn on_send_failed(&self, temp_id: &str, error: &str) {
        self.send(TransportEvent::SendFailed {
            temp_id: temp_id.to_string(),
            error: error.to_string(),
        });
    }

    fn on_read(&self, receipt: &ReadReceipt) {
        self.send(TransportEvent::Read(receipt.clone()));
    }

    fn on_joined(&self, change: &MembershipChange) {
        self.send(TransportEvent::Joined(change.clone()));
    }

    fn on_left(&self, change: &MembershipChange) {
        self.send(TransportEvent::Left(change.clone()));
    }

    fn on_error(&self, message: &str) {
        self.send(TransportEvent::Error(message.to_string()));
    }

    fn on_state_change(&self, state: ConnectionState) {
        self.send(TransportEvent::State(state));
    }
}
