//! Shared draw receiver state
//!
//! Written by the receive thread, polled by the UI / CLI.

use std::net::SocketAddr;

/// Draw receiver lifecycle state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiverState {
    Binding,
    Listening(SocketAddr),
    /// The port could not be bound; drawing is off for this run
    Disabled(String),
    Stopped,
}

impl ReceiverState {
    pub fn is_listening(&self) -> bool {
        matches!(self, ReceiverState::Listening(_))
    }
}
