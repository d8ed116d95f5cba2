//! Message channel abstraction.
//!
//! Concrete channels deliver messages in different native shapes: an
//! in-process queue pair hands over decoded values, a byte stream needs
//! length-prefixed framing, a socket brings its own message boundaries.
//! This trait is the single seam they all adapt behind; the session never
//! branches on the channel's native delivery style.

use std::fmt;
use std::future::Future;

use farfs_wire::Message;

/// Failure of the channel itself, as opposed to a failure reported by the
/// remote filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The peer is gone or the channel was closed.
    Closed,
    /// The channel failed to carry or decode a message.
    Io(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Closed => write!(f, "channel closed"),
            ChannelError::Io(msg) => write!(f, "channel i/o: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// A bidirectional, asynchronous message channel.
///
/// Methods take `&self` so one endpoint can be shared between the demux
/// loop (the sole `recv` caller) and concurrent senders; implementations
/// use interior mutability for their receive side.
pub trait MessageChannel: Send + Sync {
    /// Send a message to the peer.
    fn send(&self, msg: Message) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Receive the next message from the peer.
    ///
    /// Returns [`ChannelError::Closed`] once the peer is gone and every
    /// buffered message has been delivered.
    fn recv(&self) -> impl Future<Output = Result<Message, ChannelError>> + Send;

    /// Close this endpoint. Subsequent sends fail; the peer's `recv`
    /// drains and then reports [`ChannelError::Closed`].
    fn close(&self) -> impl Future<Output = Result<(), ChannelError>> + Send;
}
