//! Filesystem metadata types shared by both sides of the channel.

use serde::{Deserialize, Serialize};

/// What kind of node a path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

impl FileKind {
    pub fn is_file(self) -> bool {
        self == FileKind::File
    }

    pub fn is_dir(self) -> bool {
        self == FileKind::Directory
    }

    pub fn is_symlink(self) -> bool {
        self == FileKind::Symlink
    }
}

/// How to open a file.
///
/// Mirrors `std::fs::OpenOptions`, restricted to what travels well on the
/// wire. `mode` is the permission bits applied when the open creates a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub create_new: bool,
    pub truncate: bool,
    pub mode: u32,
}

impl OpenOptions {
    /// Open for reading only.
    pub fn read_only() -> Self {
        OpenOptions {
            read: true,
            write: false,
            append: false,
            create: false,
            create_new: false,
            truncate: false,
            mode: 0o666,
        }
    }

    /// Open for reading and writing, creating the file if absent.
    pub fn read_write() -> Self {
        OpenOptions {
            read: true,
            write: true,
            append: false,
            create: true,
            create_new: false,
            truncate: false,
            mode: 0o666,
        }
    }

    /// Open for writing, creating the file and truncating any previous contents.
    pub fn write_truncate() -> Self {
        OpenOptions {
            read: false,
            write: true,
            append: false,
            create: true,
            create_new: false,
            truncate: true,
            mode: 0o666,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_create_new(mut self, create_new: bool) -> Self {
        self.create_new = create_new;
        self
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Whether this open is allowed to create the file.
    pub fn may_create(&self) -> bool {
        self.create || self.create_new
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions::read_only()
    }
}

/// Stat result for a path or an open handle.
///
/// Timestamps are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub kind: FileKind,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub atime_ms: u64,
    pub mtime_ms: u64,
    pub ctime_ms: u64,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    pub fn is_symlink(&self) -> bool {
        self.kind.is_symlink()
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}
