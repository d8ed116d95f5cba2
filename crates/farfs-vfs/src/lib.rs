#![deny(unsafe_code)]

//! farfs-vfs: The generic filesystem capability interface.
//!
//! Both sides of a farfs channel program against these traits: the server
//! dispatches incoming calls onto a real [`Vfs`] implementation, and the
//! client's stub implements [`Vfs`] itself so remote and local filesystems
//! are interchangeable to calling code.
//!
//! Methods take `&self`; implementations use interior mutability. All file
//! I/O is positional (`read_at`/`write_at`) so the traits carry no cursor
//! state; sequential access with a cached cursor is layered on top by the
//! client's handle proxy.

use std::future::Future;

use farfs_wire::{DirEntry, FsResult, Metadata, OpenOptions};

/// A filesystem capability: the operations a farfs channel can carry.
///
/// Paths are absolute, `/`-separated strings. Implementations decide their
/// own normalization and what subset of the surface they support; an
/// unsupported operation fails with `ErrorCode::Unsupported`.
pub trait Vfs: Send + Sync {
    /// The open-file type produced by [`Vfs::open`].
    type File: VfsFile;

    /// Open a file, creating it if `opts` allows.
    fn open(
        &self,
        path: &str,
        opts: OpenOptions,
    ) -> impl Future<Output = FsResult<Self::File>> + Send;

    /// Stat a path, following symlinks.
    fn stat(&self, path: &str) -> impl Future<Output = FsResult<Metadata>> + Send;

    /// Stat a path without following a final symlink.
    fn lstat(&self, path: &str) -> impl Future<Output = FsResult<Metadata>> + Send;

    /// Whether a path exists.
    fn exists(&self, path: &str) -> impl Future<Output = FsResult<bool>> + Send;

    /// List a directory. Entry order is implementation-defined.
    fn read_dir(&self, path: &str) -> impl Future<Output = FsResult<Vec<DirEntry>>> + Send;

    /// Create a directory. The parent must already exist.
    fn mkdir(&self, path: &str, mode: u32) -> impl Future<Output = FsResult<()>> + Send;

    /// Remove an empty directory.
    fn rmdir(&self, path: &str) -> impl Future<Output = FsResult<()>> + Send;

    /// Remove a file or symlink.
    fn unlink(&self, path: &str) -> impl Future<Output = FsResult<()>> + Send;

    /// Create a hard link `dst` pointing at the file `src`.
    fn link(&self, src: &str, dst: &str) -> impl Future<Output = FsResult<()>> + Send;

    /// Create a symlink at `link` whose target text is `target`.
    fn symlink(&self, target: &str, link: &str) -> impl Future<Output = FsResult<()>> + Send;

    /// Read the target text of a symlink.
    fn read_link(&self, path: &str) -> impl Future<Output = FsResult<String>> + Send;

    /// Rename `from` to `to`, replacing `to` if it is a file.
    fn rename(&self, from: &str, to: &str) -> impl Future<Output = FsResult<()>> + Send;

    /// Truncate or extend the file at `path` to `len` bytes.
    fn truncate(&self, path: &str, len: u64) -> impl Future<Output = FsResult<()>> + Send;

    /// Change permission bits.
    fn chmod(&self, path: &str, mode: u32) -> impl Future<Output = FsResult<()>> + Send;

    /// Set access and modification times (milliseconds since the epoch).
    fn utimes(
        &self,
        path: &str,
        atime_ms: u64,
        mtime_ms: u64,
    ) -> impl Future<Output = FsResult<()>> + Send;

    /// Flush everything the filesystem has buffered.
    fn sync(&self) -> impl Future<Output = FsResult<()>> + Send;
}

/// An open file.
///
/// `close` is terminal: behavior of any call after a successful `close` is
/// implementation-defined, except that it must fail rather than touch the
/// file.
pub trait VfsFile: Send + Sync {
    /// Read up to `len` bytes at `pos`. A short (or empty) result means the
    /// read hit end of file.
    fn read_at(&self, pos: u64, len: u32) -> impl Future<Output = FsResult<Vec<u8>>> + Send;

    /// Read a sequence of buffers starting at `pos`, one per requested
    /// length, stopping early at end of file.
    fn read_vectored_at(
        &self,
        pos: u64,
        lens: &[u32],
    ) -> impl Future<Output = FsResult<Vec<Vec<u8>>>> + Send;

    /// Write `data` at `pos`, extending the file as needed. Returns the
    /// number of bytes written.
    fn write_at(&self, pos: u64, data: &[u8]) -> impl Future<Output = FsResult<u64>> + Send;

    /// Write a sequence of buffers contiguously starting at `pos`. Returns
    /// the total number of bytes written.
    fn write_vectored_at(
        &self,
        pos: u64,
        bufs: &[Vec<u8>],
    ) -> impl Future<Output = FsResult<u64>> + Send;

    /// Truncate or extend the file to `len` bytes.
    fn truncate(&self, len: u64) -> impl Future<Output = FsResult<()>> + Send;

    /// Flush data and metadata.
    fn sync(&self) -> impl Future<Output = FsResult<()>> + Send;

    /// Flush data only.
    fn datasync(&self) -> impl Future<Output = FsResult<()>> + Send;

    /// Change permission bits.
    fn chmod(&self, mode: u32) -> impl Future<Output = FsResult<()>> + Send;

    /// Change ownership.
    fn chown(&self, uid: u32, gid: u32) -> impl Future<Output = FsResult<()>> + Send;

    /// Set access and modification times (milliseconds since the epoch).
    fn utimes(&self, atime_ms: u64, mtime_ms: u64) -> impl Future<Output = FsResult<()>> + Send;

    /// Stat this handle.
    fn stat(&self) -> impl Future<Output = FsResult<Metadata>> + Send;

    /// Close the handle.
    fn close(&self) -> impl Future<Output = FsResult<()>> + Send;
}
