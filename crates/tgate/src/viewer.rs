// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The outbound handle a viewer's WebSocket write task is reached through.
//!
//! A [`ViewerHandle`] is cheap to clone and is what the agent registry's
//! `attached_viewers` sets and the router's `ActiveSession` table actually
//! store — never the socket itself. This keeps both C2 and C6 free of any
//! direct dependency on the axum WebSocket type.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identifies one viewer connection for the lifetime of its socket.
pub type ViewerId = u64;

fn next_viewer_id() -> ViewerId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A pre-serialized frame queued for a viewer's write task, plus the byte
/// count to release from the backpressure budget once it is actually
/// flushed (not merely enqueued).
pub struct QueuedFrame {
    pub text: Arc<str>,
}

/// A send handle to a single viewer's WebSocket write task, with a
/// byte-budget gate so a slow browser cannot grow this queue without bound.
#[derive(Clone)]
pub struct ViewerHandle {
    pub id: ViewerId,
    tx: mpsc::UnboundedSender<QueuedFrame>,
    pending_bytes: Arc<AtomicUsize>,
    high_water_mark: usize,
    /// Cancelled the instant a send exceeds `high_water_mark`, so the
    /// socket's read/write loop tears itself down instead of silently
    /// discarding every subsequent frame for a viewer pinned at budget.
    cancel: CancellationToken,
}

impl ViewerHandle {
    /// Create a new handle and the receiver its write task should drain.
    pub fn new(high_water_mark: usize) -> (Self, mpsc::UnboundedReceiver<QueuedFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: next_viewer_id(),
            tx,
            pending_bytes: Arc::new(AtomicUsize::new(0)),
            high_water_mark,
            cancel: CancellationToken::new(),
        };
        (handle, rx)
    }

    /// Queue a frame for delivery. Returns `false` (and queues nothing) if
    /// doing so would exceed the configured high-water mark, and cancels
    /// this viewer's socket loop — the caller must treat `false` as "this
    /// viewer is being dropped with a disconnect," not just "drop this
    /// frame."
    pub fn try_send(&self, text: Arc<str>) -> bool {
        let len = text.len();
        let prev = self.pending_bytes.fetch_add(len, Ordering::SeqCst);
        if prev + len > self.high_water_mark {
            self.pending_bytes.fetch_sub(len, Ordering::SeqCst);
            self.cancel.cancel();
            return false;
        }
        if self.tx.send(QueuedFrame { text }).is_err() {
            self.pending_bytes.fetch_sub(len, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Release `len` bytes from the backpressure budget. Called by the
    /// write task after a frame has actually been flushed to the socket.
    pub fn release(&self, len: usize) {
        self.pending_bytes.fetch_sub(len, Ordering::SeqCst);
    }

    /// Token this viewer's socket loop selects on to know when to tear
    /// itself down because of a backpressure drop.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for ViewerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerHandle").field("id", &self.id).finish()
    }
}

impl PartialEq for ViewerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ViewerHandle {}

impl std::hash::Hash for ViewerHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
#[path = "viewer_tests.rs"]
mod tests;
