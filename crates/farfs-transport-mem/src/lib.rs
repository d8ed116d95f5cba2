#![deny(unsafe_code)]

//! farfs-transport-mem: In-process channel pair for farfs.
//!
//! This is the semantic reference channel: messages cross as decoded values
//! with no serialization, but the endpoint still behaves exactly like a
//! remote one (closing, draining, out-of-order delivery of independently
//! produced responses). Tests also lean on its frame counters to prove that
//! an operation did or did not touch the channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, mpsc};

use farfs_session::{ChannelError, MessageChannel};
use farfs_wire::Message;

const QUEUE_DEPTH: usize = 64;

/// One endpoint of an in-process channel pair.
pub struct MemChannel {
    /// Send side; taken on close so the peer's recv drains and ends.
    tx: SyncMutex<Option<mpsc::Sender<Message>>>,
    /// Receive side behind an async mutex so `recv(&self)` works; the
    /// session's demux loop is the only steady-state caller.
    rx: Mutex<mpsc::Receiver<Message>>,
    sent: AtomicU64,
    received: AtomicU64,
}

impl MemChannel {
    fn endpoint(tx: mpsc::Sender<Message>, rx: mpsc::Receiver<Message>) -> MemChannel {
        MemChannel {
            tx: SyncMutex::new(Some(tx)),
            rx: Mutex::new(rx),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
        }
    }

    /// Create a connected pair of endpoints.
    pub fn pair() -> (MemChannel, MemChannel) {
        let (a_tx, b_rx) = mpsc::channel(QUEUE_DEPTH);
        let (b_tx, a_rx) = mpsc::channel(QUEUE_DEPTH);
        (Self::endpoint(a_tx, a_rx), Self::endpoint(b_tx, b_rx))
    }

    /// Create a connected pair already wrapped in `Arc`.
    pub fn arc_pair() -> (Arc<MemChannel>, Arc<MemChannel>) {
        let (a, b) = Self::pair();
        (Arc::new(a), Arc::new(b))
    }

    /// Messages sent through this endpoint so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Messages received on this endpoint so far.
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl MessageChannel for MemChannel {
    async fn send(&self, msg: Message) -> Result<(), ChannelError> {
        let tx = self.tx.lock().clone().ok_or(ChannelError::Closed)?;
        tx.send(msg).await.map_err(|_| ChannelError::Closed)?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recv(&self) -> Result<Message, ChannelError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(msg) => {
                self.received.fetch_add(1, Ordering::Relaxed);
                Ok(msg)
            }
            None => Err(ChannelError::Closed),
        }
    }

    async fn close(&self) -> Result<(), ChannelError> {
        // Drop the sender so the peer drains and sees Closed; close our
        // receiver so the peer's sends start failing.
        self.tx.lock().take();
        self.rx.lock().await.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farfs_wire::{Call, FsCall, Reply};

    fn request(id: u64) -> Message {
        Message::Request {
            id,
            origin: String::new(),
            call: Call::Fs(FsCall::Sync),
        }
    }

    #[tokio::test]
    async fn pair_delivers_in_order_per_direction() {
        let (a, b) = MemChannel::pair();
        a.send(request(1)).await.unwrap();
        a.send(request(2)).await.unwrap();

        assert_eq!(b.recv().await.unwrap().id(), 1);
        assert_eq!(b.recv().await.unwrap().id(), 2);
        assert_eq!(a.sent_count(), 2);
        assert_eq!(b.received_count(), 2);
    }

    #[tokio::test]
    async fn both_directions_are_independent() {
        let (a, b) = MemChannel::pair();
        a.send(request(1)).await.unwrap();
        b.send(Message::Response {
            id: 1,
            result: Ok(Reply::Unit),
        })
        .await
        .unwrap();

        assert_eq!(b.recv().await.unwrap().id(), 1);
        assert_eq!(a.recv().await.unwrap().id(), 1);
    }

    #[tokio::test]
    async fn dropping_an_endpoint_closes_the_peer() {
        let (a, b) = MemChannel::pair();
        drop(b);
        assert_eq!(a.send(request(1)).await, Err(ChannelError::Closed));
        assert_eq!(a.recv().await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn close_drains_buffered_messages_first() {
        let (a, b) = MemChannel::pair();
        a.send(request(1)).await.unwrap();
        a.close().await.unwrap();

        assert_eq!(b.recv().await.unwrap().id(), 1);
        assert_eq!(b.recv().await, Err(ChannelError::Closed));
        assert_eq!(b.send(request(2)).await, Err(ChannelError::Closed));
    }
}
