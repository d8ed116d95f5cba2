//! The message envelope and typed call payloads.
//!
//! Variant order is wire-significant (postcard enum discriminants). Adding
//! variants at the end is compatible; reordering is a wire break.

use serde::{Deserialize, Serialize};

use crate::{DirEntry, FsError, Metadata, OpenOptions};

/// Protocol message exchanged over a channel.
///
/// A `Request` with correlation id `id` is answered by exactly one
/// `Response` carrying the same `id`. Responses may arrive in any order;
/// correlation is by id alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// A call issued by the stub side.
    ///
    /// `origin` is the caller's captured backtrace text, carried so a
    /// failure can be reported with both sides of the story. Empty when
    /// backtraces are disabled.
    Request {
        id: u64,
        origin: String,
        call: Call,
    },

    /// The reply to an earlier `Request` with the same `id`.
    Response {
        id: u64,
        result: Result<Reply, FsError>,
    },
}

impl Message {
    /// Correlation id of this envelope.
    pub fn id(&self) -> u64 {
        match self {
            Message::Request { id, .. } => *id,
            Message::Response { id, .. } => *id,
        }
    }
}

/// A call, addressed either to the filesystem root or to one open handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Call {
    /// Operation on the filesystem itself.
    Fs(FsCall),
    /// Operation on a previously opened file, addressed by its descriptor.
    File { fd: u64, call: FileCall },
}

/// Operations on the filesystem root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FsCall {
    Open { path: String, opts: OpenOptions },
    Stat { path: String },
    Lstat { path: String },
    Exists { path: String },
    ReadDir { path: String },
    Mkdir { path: String, mode: u32 },
    Rmdir { path: String },
    Unlink { path: String },
    Link { src: String, dst: String },
    Symlink { target: String, link: String },
    ReadLink { path: String },
    Rename { from: String, to: String },
    Truncate { path: String, len: u64 },
    Chmod { path: String, mode: u32 },
    Utimes { path: String, atime_ms: u64, mtime_ms: u64 },
    Sync,
}

impl FsCall {
    /// Name of the operation, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            FsCall::Open { .. } => "open",
            FsCall::Stat { .. } => "stat",
            FsCall::Lstat { .. } => "lstat",
            FsCall::Exists { .. } => "exists",
            FsCall::ReadDir { .. } => "readdir",
            FsCall::Mkdir { .. } => "mkdir",
            FsCall::Rmdir { .. } => "rmdir",
            FsCall::Unlink { .. } => "unlink",
            FsCall::Link { .. } => "link",
            FsCall::Symlink { .. } => "symlink",
            FsCall::ReadLink { .. } => "readlink",
            FsCall::Rename { .. } => "rename",
            FsCall::Truncate { .. } => "truncate",
            FsCall::Chmod { .. } => "chmod",
            FsCall::Utimes { .. } => "utimes",
            FsCall::Sync => "sync",
        }
    }
}

/// Operations on one open file.
///
/// Reads and writes carry an explicit position so the protocol itself is
/// stateless about cursors; the proxy on the stub side keeps the cursor and
/// computes `pos` locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileCall {
    Read { pos: u64, len: u32 },
    ReadVectored { pos: u64, lens: Vec<u32> },
    Write { pos: u64, data: Vec<u8> },
    WriteVectored { pos: u64, bufs: Vec<Vec<u8>> },
    Truncate { len: u64 },
    Sync,
    Datasync,
    Chmod { mode: u32 },
    Chown { uid: u32, gid: u32 },
    Utimes { atime_ms: u64, mtime_ms: u64 },
    Stat,
    Close,
}

impl FileCall {
    /// Name of the operation, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            FileCall::Read { .. } => "read",
            FileCall::ReadVectored { .. } => "readv",
            FileCall::Write { .. } => "write",
            FileCall::WriteVectored { .. } => "writev",
            FileCall::Truncate { .. } => "truncate",
            FileCall::Sync => "sync",
            FileCall::Datasync => "datasync",
            FileCall::Chmod { .. } => "chmod",
            FileCall::Chown { .. } => "chown",
            FileCall::Utimes { .. } => "utimes",
            FileCall::Stat => "stat",
            FileCall::Close => "close",
        }
    }
}

impl Call {
    /// Name of the operation, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Call::Fs(call) => call.name(),
            Call::File { call, .. } => call.name(),
        }
    }
}

/// Successful result of a call.
///
/// A live file handle cannot travel; `Open` answers with a
/// [`HandleDescriptor`] and the stub side reconstructs a proxy from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Unit,
    Flag(bool),
    Handle(HandleDescriptor),
    Data(Vec<u8>),
    DataVec(Vec<Vec<u8>>),
    Written(u64),
    Metadata(Metadata),
    Entries(Vec<DirEntry>),
    Target(String),
}

/// The serializable summary of an open file on the remote side.
///
/// `fd` uniquely identifies the handle in the dispatcher's table for as long
/// as the remote side considers it open. `position` is the cursor at the
/// time the descriptor was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleDescriptor {
    pub fd: u64,
    pub path: String,
    pub position: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_id_is_uniform() {
        let req = Message::Request {
            id: 7,
            origin: String::new(),
            call: Call::Fs(FsCall::Sync),
        };
        let resp = Message::Response {
            id: 7,
            result: Ok(Reply::Unit),
        };
        assert_eq!(req.id(), 7);
        assert_eq!(resp.id(), 7);
    }

    #[test]
    fn call_names_cover_both_scopes() {
        let fs = Call::Fs(FsCall::Stat { path: "/".into() });
        assert_eq!(fs.name(), "stat");

        let file = Call::File {
            fd: 3,
            call: FileCall::Read { pos: 0, len: 10 },
        };
        assert_eq!(file.name(), "read");
    }
}
