//! Outbound packet queue shared by handlers and the notifier.
//!
//! Packets are addressed by the session id they carry. The driver drains the
//! queue after each dispatch, seals each packet on its session, and drops
//! packets whose session is gone or not active.
//!
//! FIFO order is the ordering guarantee: a handler queues its response
//! before publishing events, so the notifier's pushes always land behind
//! the response on the same session.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use renju_proto::Packet;

/// Shared FIFO of outbound packets.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Arc<Mutex<VecDeque<Packet>>>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet for the session in its `session_id` field.
    pub fn push(&self, packet: Packet) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push_back(packet);
    }

    /// Take everything queued so far, in FIFO order.
    #[must_use]
    pub fn drain(&self) -> Vec<Packet> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect()
    }

    /// Number of queued packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
