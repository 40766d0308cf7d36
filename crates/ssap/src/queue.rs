//! FIFO of outbound requests with a single in-flight slot.
//!
//! The head of the queue is the request on the wire. It stays there until
//! a response (or error) arrives; only then is the next one sent.

use std::collections::VecDeque;

use ssap_protocol::MessageType;

/// An encoded request, waiting to be sent or awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedRequest {
    pub(crate) message_type: MessageType,
    pub(crate) payload: Vec<u8>,
}

#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    pending: VecDeque<QueuedRequest>,
}

impl RequestQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a request. Returns `true` if it became the head and must be
    /// sent now.
    pub(crate) fn push(&mut self, request: QueuedRequest) -> bool {
        self.pending.push_back(request);
        self.pending.len() == 1
    }

    /// The in-flight request, if any.
    pub(crate) fn head(&self) -> Option<&QueuedRequest> {
        self.pending.front()
    }

    /// Removes the in-flight request once its response arrived.
    pub(crate) fn complete_head(&mut self) -> Option<QueuedRequest> {
        self.pending.pop_front()
    }

    /// Undoes a [`push`](Self::push) whose send failed.
    pub(crate) fn retract_last(&mut self) -> Option<QueuedRequest> {
        self.pending.pop_back()
    }

    /// Drops everything. Returns how many requests were discarded.
    pub(crate) fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
