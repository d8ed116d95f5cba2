//! RemoteFs: the filesystem stub.

use std::sync::Arc;

use farfs_session::{MessageChannel, RpcSession};
use farfs_vfs::Vfs;
use farfs_wire::{Call, DirEntry, FsCall, FsResult, Metadata, OpenOptions, Reply};

use crate::{RemoteFile, expect_unit, unexpected_reply};

/// A filesystem whose real state lives on the other side of a channel.
///
/// Every method is one correlated call; nothing happens locally, and any
/// rejection from the session (remote failure, deadline, closed channel)
/// propagates unchanged to the caller. This type adds no retry and no
/// fallback.
pub struct RemoteFs<C: MessageChannel> {
    session: Arc<RpcSession<C>>,
}

impl<C: MessageChannel + 'static> RemoteFs<C> {
    /// Bind a stub to a session. The session's demux loop must be running
    /// for calls to resolve.
    pub fn new(session: Arc<RpcSession<C>>) -> Self {
        RemoteFs { session }
    }

    /// Get the underlying session.
    pub fn session(&self) -> &Arc<RpcSession<C>> {
        &self.session
    }

    async fn call(&self, call: FsCall) -> FsResult<Reply> {
        self.session.call(Call::Fs(call)).await
    }
}

impl<C: MessageChannel + 'static> Vfs for RemoteFs<C> {
    type File = RemoteFile<C>;

    async fn open(&self, path: &str, opts: OpenOptions) -> FsResult<RemoteFile<C>> {
        let reply = self
            .call(FsCall::Open {
                path: path.into(),
                opts,
            })
            .await?;
        match reply {
            Reply::Handle(desc) => Ok(RemoteFile::from_descriptor(self.session.clone(), desc)),
            other => Err(unexpected_reply("handle", &other)),
        }
    }

    async fn stat(&self, path: &str) -> FsResult<Metadata> {
        match self.call(FsCall::Stat { path: path.into() }).await? {
            Reply::Metadata(meta) => Ok(meta),
            other => Err(unexpected_reply("metadata", &other)),
        }
    }

    async fn lstat(&self, path: &str) -> FsResult<Metadata> {
        match self.call(FsCall::Lstat { path: path.into() }).await? {
            Reply::Metadata(meta) => Ok(meta),
            other => Err(unexpected_reply("metadata", &other)),
        }
    }

    async fn exists(&self, path: &str) -> FsResult<bool> {
        match self.call(FsCall::Exists { path: path.into() }).await? {
            Reply::Flag(flag) => Ok(flag),
            other => Err(unexpected_reply("flag", &other)),
        }
    }

    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        match self.call(FsCall::ReadDir { path: path.into() }).await? {
            Reply::Entries(entries) => Ok(entries),
            other => Err(unexpected_reply("entries", &other)),
        }
    }

    async fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        expect_unit(
            self.call(FsCall::Mkdir {
                path: path.into(),
                mode,
            })
            .await?,
        )
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        expect_unit(self.call(FsCall::Rmdir { path: path.into() }).await?)
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        expect_unit(self.call(FsCall::Unlink { path: path.into() }).await?)
    }

    async fn link(&self, src: &str, dst: &str) -> FsResult<()> {
        expect_unit(
            self.call(FsCall::Link {
                src: src.into(),
                dst: dst.into(),
            })
            .await?,
        )
    }

    async fn symlink(&self, target: &str, link: &str) -> FsResult<()> {
        expect_unit(
            self.call(FsCall::Symlink {
                target: target.into(),
                link: link.into(),
            })
            .await?,
        )
    }

    async fn read_link(&self, path: &str) -> FsResult<String> {
        match self.call(FsCall::ReadLink { path: path.into() }).await? {
            Reply::Target(target) => Ok(target),
            other => Err(unexpected_reply("target", &other)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        expect_unit(
            self.call(FsCall::Rename {
                from: from.into(),
                to: to.into(),
            })
            .await?,
        )
    }

    async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        expect_unit(
            self.call(FsCall::Truncate {
                path: path.into(),
                len,
            })
            .await?,
        )
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        expect_unit(
            self.call(FsCall::Chmod {
                path: path.into(),
                mode,
            })
            .await?,
        )
    }

    async fn utimes(&self, path: &str, atime_ms: u64, mtime_ms: u64) -> FsResult<()> {
        expect_unit(
            self.call(FsCall::Utimes {
                path: path.into(),
                atime_ms,
                mtime_ms,
            })
            .await?,
        )
    }

    async fn sync(&self) -> FsResult<()> {
        expect_unit(self.call(FsCall::Sync).await?)
    }
}
