#![deny(unsafe_code)]

//! farfs: a filesystem consumed transparently across an async message
//! channel.
//!
//! One side serves a [`Vfs`] through an [`FsDispatcher`]; the other side
//! talks to a [`RemoteFs`] stub that implements the same [`Vfs`] trait, so
//! calling code cannot tell the two apart. In between sits an
//! [`RpcSession`] per side, correlating calls and responses over any
//! [`MessageChannel`].
//!
//! This crate re-exports the whole surface; the per-concern crates can also
//! be depended on individually.

pub use farfs_client::{RemoteFile, RemoteFs};
pub use farfs_server::FsDispatcher;
pub use farfs_session::{
    ChannelError, DEFAULT_CALL_TIMEOUT, MessageChannel, RpcSession, StatsSnapshot,
};
pub use farfs_transport_mem::MemChannel;
pub use farfs_transport_stream::FramedChannel;
pub use farfs_vfs::{Vfs, VfsFile};
pub use farfs_wire::{
    Call, DirEntry, ErrorCode, FileCall, FileKind, FsCall, FsError, FsResult, HandleDescriptor,
    Message, Metadata, OpenOptions, Reply, WireError, decode, encode,
};
