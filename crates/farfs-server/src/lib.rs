#![deny(unsafe_code)]

//! farfs-server: dispatches incoming calls onto a [`Vfs`] implementation.
//!
//! The [`FsDispatcher`] is the serving half of a farfs channel. Attached to
//! an [`RpcSession`], it decodes each incoming [`Call`] into the matching
//! [`Vfs`] or [`VfsFile`] method, and owns the handle table that maps wire
//! descriptors to live open files. Live handles never travel: `open` answers
//! with a [`HandleDescriptor`] and every later file call addresses the table
//! by descriptor.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use farfs_session::{MessageChannel, RpcSession};
use farfs_vfs::{Vfs, VfsFile};
use farfs_wire::{Call, FileCall, FsCall, FsError, FsResult, HandleDescriptor, Reply};

/// Descriptors 0..2 are left unassigned, like a process's stdio triple, so a
/// descriptor of 0 in a message is always a bug rather than a valid handle.
const FIRST_FD: u64 = 3;

/// One open file in the dispatcher's table.
struct FileEntry<F> {
    file: F,
    path: String,

    /// Last position implied by a read or write on this handle: the request
    /// offset plus the bytes actually transferred. Bookkeeping only; the
    /// protocol itself addresses every transfer by explicit position.
    position: AtomicU64,
}

/// The serving side of a farfs channel: a [`Vfs`] plus the table of handles
/// opened through it.
///
/// Handles are added by `open` and removed by `close`; any file call naming
/// a descriptor not in the table fails with `BadDescriptor`.
pub struct FsDispatcher<F: Vfs> {
    fs: Arc<F>,
    files: Mutex<HashMap<u64, Arc<FileEntry<F::File>>>>,
    next_fd: AtomicU64,
}

impl<F: Vfs + 'static> FsDispatcher<F> {
    pub fn new(fs: Arc<F>) -> Arc<Self> {
        Arc::new(Self {
            fs,
            files: Mutex::new(HashMap::new()),
            next_fd: AtomicU64::new(FIRST_FD),
        })
    }

    /// Install this dispatcher on a session. Incoming requests on the
    /// session are answered by [`FsDispatcher::dispatch`] from then on.
    pub fn attach<C: MessageChannel + 'static>(self: &Arc<Self>, session: &RpcSession<C>) {
        let this = self.clone();
        session.set_dispatcher(move |call| {
            let this = this.clone();
            async move { this.dispatch(call).await }
        });
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.files.lock().len()
    }

    /// Last recorded position of an open handle, if the descriptor is live.
    pub fn recorded_position(&self, fd: u64) -> Option<u64> {
        self.files
            .lock()
            .get(&fd)
            .map(|entry| entry.position.load(Ordering::Relaxed))
    }

    /// Handle one decoded call against the filesystem or the handle table.
    pub async fn dispatch(&self, call: Call) -> FsResult<Reply> {
        match call {
            Call::Fs(call) => self.handle_fs(call).await,
            Call::File { fd, call } => self.handle_file(fd, call).await,
        }
    }

    async fn handle_fs(&self, call: FsCall) -> FsResult<Reply> {
        match call {
            FsCall::Open { path, opts } => {
                let file = self.fs.open(&path, opts).await?;
                let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
                let entry = Arc::new(FileEntry {
                    file,
                    path: path.clone(),
                    position: AtomicU64::new(0),
                });
                self.files.lock().insert(fd, entry);
                debug!(fd, path = %path, "opened handle");
                Ok(Reply::Handle(HandleDescriptor {
                    fd,
                    path,
                    position: 0,
                }))
            }
            FsCall::Stat { path } => Ok(Reply::Metadata(self.fs.stat(&path).await?)),
            FsCall::Lstat { path } => Ok(Reply::Metadata(self.fs.lstat(&path).await?)),
            FsCall::Exists { path } => Ok(Reply::Flag(self.fs.exists(&path).await?)),
            FsCall::ReadDir { path } => Ok(Reply::Entries(self.fs.read_dir(&path).await?)),
            FsCall::Mkdir { path, mode } => {
                self.fs.mkdir(&path, mode).await?;
                Ok(Reply::Unit)
            }
            FsCall::Rmdir { path } => {
                self.fs.rmdir(&path).await?;
                Ok(Reply::Unit)
            }
            FsCall::Unlink { path } => {
                self.fs.unlink(&path).await?;
                Ok(Reply::Unit)
            }
            FsCall::Link { src, dst } => {
                self.fs.link(&src, &dst).await?;
                Ok(Reply::Unit)
            }
            FsCall::Symlink { target, link } => {
                self.fs.symlink(&target, &link).await?;
                Ok(Reply::Unit)
            }
            FsCall::ReadLink { path } => Ok(Reply::Target(self.fs.read_link(&path).await?)),
            FsCall::Rename { from, to } => {
                self.fs.rename(&from, &to).await?;
                Ok(Reply::Unit)
            }
            FsCall::Truncate { path, len } => {
                self.fs.truncate(&path, len).await?;
                Ok(Reply::Unit)
            }
            FsCall::Chmod { path, mode } => {
                self.fs.chmod(&path, mode).await?;
                Ok(Reply::Unit)
            }
            FsCall::Utimes {
                path,
                atime_ms,
                mtime_ms,
            } => {
                self.fs.utimes(&path, atime_ms, mtime_ms).await?;
                Ok(Reply::Unit)
            }
            FsCall::Sync => {
                self.fs.sync().await?;
                Ok(Reply::Unit)
            }
        }
    }

    async fn handle_file(&self, fd: u64, call: FileCall) -> FsResult<Reply> {
        // Clone the entry out of the lock so slow file I/O never holds up
        // other handles.
        let entry = self
            .files
            .lock()
            .get(&fd)
            .cloned()
            .ok_or_else(|| FsError::bad_descriptor(fd))?;

        match call {
            FileCall::Read { pos, len } => {
                let data = entry.file.read_at(pos, len).await?;
                entry
                    .position
                    .store(pos + data.len() as u64, Ordering::Relaxed);
                Ok(Reply::Data(data))
            }
            FileCall::ReadVectored { pos, lens } => {
                let bufs = entry.file.read_vectored_at(pos, &lens).await?;
                let total: u64 = bufs.iter().map(|b| b.len() as u64).sum();
                entry.position.store(pos + total, Ordering::Relaxed);
                Ok(Reply::DataVec(bufs))
            }
            FileCall::Write { pos, data } => {
                let written = entry.file.write_at(pos, &data).await?;
                entry.position.store(pos + written, Ordering::Relaxed);
                Ok(Reply::Written(written))
            }
            FileCall::WriteVectored { pos, bufs } => {
                let written = entry.file.write_vectored_at(pos, &bufs).await?;
                entry.position.store(pos + written, Ordering::Relaxed);
                Ok(Reply::Written(written))
            }
            FileCall::Truncate { len } => {
                entry.file.truncate(len).await?;
                Ok(Reply::Unit)
            }
            FileCall::Sync => {
                entry.file.sync().await?;
                Ok(Reply::Unit)
            }
            FileCall::Datasync => {
                entry.file.datasync().await?;
                Ok(Reply::Unit)
            }
            FileCall::Chmod { mode } => {
                entry.file.chmod(mode).await?;
                Ok(Reply::Unit)
            }
            FileCall::Chown { uid, gid } => {
                entry.file.chown(uid, gid).await?;
                Ok(Reply::Unit)
            }
            FileCall::Utimes { atime_ms, mtime_ms } => {
                entry.file.utimes(atime_ms, mtime_ms).await?;
                Ok(Reply::Unit)
            }
            FileCall::Stat => Ok(Reply::Metadata(entry.file.stat().await?)),
            FileCall::Close => {
                // Remove first: even if the close itself fails, the
                // descriptor is spent and must not be reused.
                self.files.lock().remove(&fd);
                entry.file.close().await?;
                debug!(fd, path = %entry.path, "closed handle");
                Ok(Reply::Unit)
            }
        }
    }
}
