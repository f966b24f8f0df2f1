//! Matching inbound packets to tasks awaiting a reply.
//!
//! A task that expects a specific packet (a keep-alive echo, a teleport
//! confirmation) registers a waiter keyed by packet name. The read loop
//! offers every decoded frame here first; the oldest live waiter for that
//! name receives the payload and the frame is consumed.

use std::collections::{HashMap, VecDeque};

use basalt_mc::{Frame, PacketName};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Option<Bytes>>;

#[derive(Default)]
struct Waiters {
    by_name: HashMap<PacketName, VecDeque<Waiter>>,
    closed: bool,
}

/// A registered waiter that has not been awaited yet.
///
/// Registering before sending the request means a reply that arrives
/// before the caller starts waiting is not lost.
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Option<Bytes>>,
}

impl PendingReply {
    /// Wait for the payload. `None` means the connection closed first.
    pub async fn wait(self) -> Option<Bytes> {
        self.rx.await.ok().flatten()
    }
}

/// Per-connection table of waiters.
#[derive(Default)]
pub struct Correlator {
    inner: Mutex<Waiters>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in the next packet named `name`.
    ///
    /// After [`close`](Self::close) the waiter resolves to `None` at once.
    pub fn register(&self, name: PacketName) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if inner.closed {
            let _ = tx.send(None);
        } else {
            inner.by_name.entry(name).or_default().push_back(tx);
        }
        PendingReply { rx }
    }

    /// Wait for the next packet named `name`.
    pub async fn wait_for_packet(&self, name: PacketName) -> Option<Bytes> {
        self.register(name).wait().await
    }

    /// Hand `frame` to the oldest live waiter for its name.
    ///
    /// Returns the frame back if nobody took it. Waiters whose receiving
    /// side was dropped are discarded on the way.
    pub fn offer(&self, frame: Frame) -> Option<Frame> {
        let mut inner = self.inner.lock();
        let Some(queue) = inner.by_name.get_mut(&frame.name) else {
            return Some(frame);
        };

        let mut delivered = false;
        while let Some(waiter) = queue.pop_front() {
            if waiter.send(Some(frame.payload.clone())).is_ok() {
                delivered = true;
                break;
            }
        }

        if queue.is_empty() {
            inner.by_name.remove(&frame.name);
        }

        if delivered { None } else { Some(frame) }
    }

    /// Resolve every pending waiter with `None` and refuse new ones.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        for (_, queue) in inner.by_name.drain() {
            for waiter in queue {
                let _ = waiter.send(None);
            }
        }
    }

    /// Number of live waiters.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .by_name
            .values()
            .flatten()
            .filter(|waiter| !waiter.is_closed())
            .count()
    }
}
