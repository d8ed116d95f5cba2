//! RemoteFile: the file handle proxy.

use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use farfs_session::{MessageChannel, RpcSession};
use farfs_vfs::VfsFile;
use farfs_wire::{Call, FileCall, FsError, FsResult, HandleDescriptor, Metadata, Reply};

use crate::{expect_unit, unexpected_reply};

/// An open file whose authoritative state lives on the remote side.
///
/// The proxy holds the wire descriptor (`fd`, `path`) plus a locally cached
/// cursor, so sequential [`read`](RemoteFile::read)/[`write`](RemoteFile::write)
/// never round-trip just to learn their offset. The cursor advances only
/// after a successful call; interleaving sequential calls on one handle
/// races the cursor exactly as it would a kernel file offset.
///
/// Close is terminal: once a close round trip succeeds, every further
/// operation on this proxy fails locally without contacting the channel.
pub struct RemoteFile<C: MessageChannel> {
    session: Arc<RpcSession<C>>,
    fd: u64,
    path: String,
    position: AtomicU64,
    closed: AtomicBool,
}

impl<C: MessageChannel> std::fmt::Debug for RemoteFile<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("fd", &self.fd)
            .field("path", &self.path)
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<C: MessageChannel + 'static> RemoteFile<C> {
    /// Reconstruct a proxy from the wire descriptor of an open handle.
    pub fn from_descriptor(session: Arc<RpcSession<C>>, desc: HandleDescriptor) -> Self {
        RemoteFile {
            session,
            fd: desc.fd,
            path: desc.path,
            position: AtomicU64::new(desc.position),
            closed: AtomicBool::new(false),
        }
    }

    /// The handle's identifier on the remote side.
    pub fn fd(&self) -> u64 {
        self.fd
    }

    /// The path this handle was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The cached cursor.
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Whether this proxy has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    fn ensure_open(&self) -> FsResult<()> {
        if self.is_closed() {
            Err(FsError::handle_closed(&self.path))
        } else {
            Ok(())
        }
    }

    async fn call(&self, call: FileCall) -> FsResult<Reply> {
        self.ensure_open()?;
        self.session
            .call(Call::File { fd: self.fd, call })
            .await
    }

    /// Read up to `len` bytes at the cached cursor and advance it by what
    /// actually arrived.
    pub async fn read(&self, len: u32) -> FsResult<Vec<u8>> {
        let pos = self.position();
        let data = self.read_at(pos, len).await?;
        self.position
            .store(pos + data.len() as u64, Ordering::Relaxed);
        Ok(data)
    }

    /// Write `data` at the cached cursor and advance it by what was
    /// written.
    pub async fn write(&self, data: &[u8]) -> FsResult<u64> {
        let pos = self.position();
        let written = self.write_at(pos, data).await?;
        self.position.store(pos + written, Ordering::Relaxed);
        Ok(written)
    }

    /// Write a batch of buffers contiguously at the cached cursor and
    /// advance it by the total written.
    pub async fn write_vectored(&self, bufs: &[Vec<u8>]) -> FsResult<u64> {
        let pos = self.position();
        let written = self.write_vectored_at(pos, bufs).await?;
        self.position.store(pos + written, Ordering::Relaxed);
        Ok(written)
    }

    /// Move the cached cursor. `Start` and `Current` resolve locally;
    /// `End` costs one remote stat to learn the current size.
    pub async fn seek(&self, from: SeekFrom) -> FsResult<u64> {
        self.ensure_open()?;
        let new_pos = match from {
            SeekFrom::Start(pos) => pos,
            SeekFrom::Current(delta) => offset_by(self.position(), delta)?,
            SeekFrom::End(delta) => {
                let meta = self.stat().await?;
                offset_by(meta.size, delta)?
            }
        };
        self.position.store(new_pos, Ordering::Relaxed);
        Ok(new_pos)
    }
}

fn offset_by(base: u64, delta: i64) -> FsResult<u64> {
    base.checked_add_signed(delta)
        .ok_or_else(|| FsError::invalid_argument("seek before start of file"))
}

impl<C: MessageChannel + 'static> VfsFile for RemoteFile<C> {
    async fn read_at(&self, pos: u64, len: u32) -> FsResult<Vec<u8>> {
        match self.call(FileCall::Read { pos, len }).await? {
            Reply::Data(data) => Ok(data),
            other => Err(unexpected_reply("data", &other)),
        }
    }

    async fn read_vectored_at(&self, pos: u64, lens: &[u32]) -> FsResult<Vec<Vec<u8>>> {
        let call = FileCall::ReadVectored {
            pos,
            lens: lens.to_vec(),
        };
        match self.call(call).await? {
            Reply::DataVec(bufs) => Ok(bufs),
            other => Err(unexpected_reply("data vector", &other)),
        }
    }

    async fn write_at(&self, pos: u64, data: &[u8]) -> FsResult<u64> {
        let call = FileCall::Write {
            pos,
            data: data.to_vec(),
        };
        match self.call(call).await? {
            Reply::Written(written) => Ok(written),
            other => Err(unexpected_reply("written", &other)),
        }
    }

    async fn write_vectored_at(&self, pos: u64, bufs: &[Vec<u8>]) -> FsResult<u64> {
        let call = FileCall::WriteVectored {
            pos,
            bufs: bufs.to_vec(),
        };
        match self.call(call).await? {
            Reply::Written(written) => Ok(written),
            other => Err(unexpected_reply("written", &other)),
        }
    }

    async fn truncate(&self, len: u64) -> FsResult<()> {
        expect_unit(self.call(FileCall::Truncate { len }).await?)
    }

    async fn sync(&self) -> FsResult<()> {
        expect_unit(self.call(FileCall::Sync).await?)
    }

    async fn datasync(&self) -> FsResult<()> {
        expect_unit(self.call(FileCall::Datasync).await?)
    }

    async fn chmod(&self, mode: u32) -> FsResult<()> {
        expect_unit(self.call(FileCall::Chmod { mode }).await?)
    }

    async fn chown(&self, uid: u32, gid: u32) -> FsResult<()> {
        expect_unit(self.call(FileCall::Chown { uid, gid }).await?)
    }

    async fn utimes(&self, atime_ms: u64, mtime_ms: u64) -> FsResult<()> {
        expect_unit(self.call(FileCall::Utimes { atime_ms, mtime_ms }).await?)
    }

    async fn stat(&self) -> FsResult<Metadata> {
        match self.call(FileCall::Stat).await? {
            Reply::Metadata(meta) => Ok(meta),
            other => Err(unexpected_reply("metadata", &other)),
        }
    }

    async fn close(&self) -> FsResult<()> {
        expect_unit(self.call(FileCall::Close).await?)?;
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}
