//! FIFO request serializer for one upload session.
//!
//! Requests are handed out strictly one at a time. The caller takes the head
//! with [`RequestQueue::next`], awaits it, runs its completion, and only then
//! asks for the next one. Each session builds its own queue, so two sessions
//! never share pending requests.
//!
//! # Usage
//!
//! ```ignore
//! let mut queue = RequestQueue::new();
//! for batch in batches {
//!     queue.enqueue(batch);
//! }
//!
//! while let Some(batch) = queue.next() {
//!     let outcome = transport.submit(&batch).await;
//!     merge(outcome); // completes before the next request is issued
//! }
//! ```

use std::collections::VecDeque;

use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// RequestQueue
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RequestQueue<T> {
    /// Requests not yet issued, head first.
    pending: VecDeque<T>,
    /// Set by `stop`; a stopped queue hands out nothing.
    stopped: bool,
    /// Requests issued so far.
    dispatched: usize,
}

impl<T> Default for RequestQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            stopped: false,
            dispatched: 0,
        }
    }

    /// Appends a request. Returns false (and drops it) if the queue is stopped.
    pub fn enqueue(&mut self, request: T) -> bool {
        if self.stopped {
            return false;
        }
        self.pending.push_back(request);
        true
    }

    /// Takes the head-of-queue request for dispatch.
    ///
    /// Because this borrows the queue mutably, the previous request's
    /// completion must have returned before the next one can be taken.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<T> {
        if self.stopped {
            return None;
        }
        let request = self.pending.pop_front()?;
        self.dispatched += 1;
        Some(request)
    }

    /// Stops the queue and drops every pending request.
    ///
    /// Returns the number of requests dropped.
    pub fn stop(&mut self) -> usize {
        self.stopped = true;
        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            debug!("[QUEUE] Stopped with {} request(s) pending", dropped);
        }
        dropped
    }

    /// Number of requests waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Number of requests handed out so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
