//! Error codes and the wire error type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes for filesystem operations (0-99) plus protocol-level codes (100+).
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // ===== Filesystem codes (0-99) =====

    /// Path does not exist
    NotFound = 1,
    /// Path already exists
    AlreadyExists = 2,
    /// Caller lacks permission
    PermissionDenied = 3,
    /// A path component that must be a directory is not one
    NotADirectory = 4,
    /// Operation requires a regular file but found a directory
    IsADirectory = 5,
    /// Directory is not empty
    DirectoryNotEmpty = 6,
    /// Malformed argument
    InvalidArgument = 7,
    /// Malformed or unnormalizable path
    InvalidPath = 8,
    /// File descriptor not known to the remote side
    BadDescriptor = 9,
    /// Operation on a handle that was already closed
    HandleClosed = 10,
    /// Operation not supported by the backing filesystem
    Unsupported = 11,
    /// Underlying I/O failure
    Io = 12,

    // ===== Protocol codes (100+) =====

    /// Malformed envelope or unexpected reply shape
    Protocol = 100,
    /// No response arrived within the configured deadline
    DeadlineExceeded = 101,
    /// The channel closed while the call was outstanding
    ChannelClosed = 102,
}

impl ErrorCode {
    /// Convert from a u32 wire value.
    /// Returns None if the value doesn't match a known error code.
    pub fn from_u32(val: u32) -> Option<Self> {
        Some(match val {
            1 => ErrorCode::NotFound,
            2 => ErrorCode::AlreadyExists,
            3 => ErrorCode::PermissionDenied,
            4 => ErrorCode::NotADirectory,
            5 => ErrorCode::IsADirectory,
            6 => ErrorCode::DirectoryNotEmpty,
            7 => ErrorCode::InvalidArgument,
            8 => ErrorCode::InvalidPath,
            9 => ErrorCode::BadDescriptor,
            10 => ErrorCode::HandleClosed,
            11 => ErrorCode::Unsupported,
            12 => ErrorCode::Io,
            100 => ErrorCode::Protocol,
            101 => ErrorCode::DeadlineExceeded,
            102 => ErrorCode::ChannelClosed,
            _ => return None,
        })
    }

    /// Convert to u32 for wire transmission.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if this code describes a failure of the filesystem operation
    /// itself, as opposed to a failure of the RPC machinery around it.
    pub fn is_fs_error(self) -> bool {
        (self as u32) < 100
    }

    /// Check if this code describes a protocol-level failure (timeout,
    /// closed channel, malformed envelope).
    pub fn is_protocol_error(self) -> bool {
        (self as u32) >= 100
    }

    /// Get a human-readable description of this error code.
    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "no such file or directory",
            ErrorCode::AlreadyExists => "file exists",
            ErrorCode::PermissionDenied => "permission denied",
            ErrorCode::NotADirectory => "not a directory",
            ErrorCode::IsADirectory => "is a directory",
            ErrorCode::DirectoryNotEmpty => "directory not empty",
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::InvalidPath => "invalid path",
            ErrorCode::BadDescriptor => "bad file descriptor",
            ErrorCode::HandleClosed => "file handle is closed",
            ErrorCode::Unsupported => "operation not supported",
            ErrorCode::Io => "i/o error",
            ErrorCode::Protocol => "protocol error",
            ErrorCode::DeadlineExceeded => "deadline exceeded",
            ErrorCode::ChannelClosed => "channel closed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_u32())
    }
}

impl From<ErrorCode> for u32 {
    fn from(code: ErrorCode) -> u32 {
        code.as_u32()
    }
}

/// A filesystem/RPC error with code, message, and an optional origin trail.
///
/// `origin` accumulates captured backtrace text as the error crosses the
/// channel boundary: the remote side records where the operation failed, and
/// the local side appends where the call was issued. It is diagnostic only
/// and never participates in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsError {
    code: ErrorCode,
    message: String,
    origin: Option<String>,
}

impl FsError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        FsError {
            code,
            message: message.into(),
            origin: None,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the accumulated origin trail, if any.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Append a segment to the origin trail.
    ///
    /// Earlier segments are closer to the failure site; later segments are
    /// closer to the original caller.
    pub fn push_origin(mut self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        if segment.is_empty() {
            return self;
        }
        self.origin = Some(match self.origin.take() {
            Some(existing) => format!("{existing}\n{segment}"),
            None => segment,
        });
        self
    }
}

impl PartialEq for FsError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(origin) = &self.origin {
            write!(f, "\norigin:\n{origin}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FsError {}

// Convenience constructors for common error shapes

impl FsError {
    /// Create a NotFound error for the given path.
    pub fn not_found(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::NotFound, path.as_ref())
    }

    /// Create an AlreadyExists error for the given path.
    pub fn already_exists(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::AlreadyExists, path.as_ref())
    }

    /// Create a PermissionDenied error for the given path.
    pub fn permission_denied(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::PermissionDenied, path.as_ref())
    }

    /// Create a NotADirectory error for the given path.
    pub fn not_a_directory(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::NotADirectory, path.as_ref())
    }

    /// Create an IsADirectory error for the given path.
    pub fn is_a_directory(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::IsADirectory, path.as_ref())
    }

    /// Create a DirectoryNotEmpty error for the given path.
    pub fn not_empty(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::DirectoryNotEmpty, path.as_ref())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        FsError::new(ErrorCode::InvalidArgument, message)
    }

    /// Create an InvalidPath error for the given path.
    pub fn invalid_path(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::InvalidPath, path.as_ref())
    }

    /// Create a BadDescriptor error for the given fd.
    pub fn bad_descriptor(fd: u64) -> Self {
        FsError::new(ErrorCode::BadDescriptor, format!("fd {fd}"))
    }

    /// Create a HandleClosed error for the given path.
    pub fn handle_closed(path: impl AsRef<str>) -> Self {
        FsError::new(ErrorCode::HandleClosed, path.as_ref())
    }

    /// Create an Unsupported error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        FsError::new(ErrorCode::Unsupported, message)
    }

    /// Create a Protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        FsError::new(ErrorCode::Protocol, message)
    }

    /// Create a DeadlineExceeded error naming the correlation id.
    pub fn deadline_exceeded(id: u64) -> Self {
        FsError::new(
            ErrorCode::DeadlineExceeded,
            format!("no response for call {id} within the deadline"),
        )
    }

    /// Create a ChannelClosed error.
    pub fn channel_closed() -> Self {
        FsError::new(ErrorCode::ChannelClosed, "channel closed")
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let code = match err.kind() {
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::AlreadyExists => ErrorCode::AlreadyExists,
            ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            ErrorKind::NotADirectory => ErrorCode::NotADirectory,
            ErrorKind::IsADirectory => ErrorCode::IsADirectory,
            ErrorKind::DirectoryNotEmpty => ErrorCode::DirectoryNotEmpty,
            ErrorKind::InvalidInput => ErrorCode::InvalidArgument,
            ErrorKind::TimedOut => ErrorCode::DeadlineExceeded,
            ErrorKind::Unsupported => ErrorCode::Unsupported,
            _ => ErrorCode::Io,
        };
        FsError::new(code, err.to_string())
    }
}

impl From<FsError> for std::io::Error {
    fn from(err: FsError) -> Self {
        use std::io::ErrorKind;
        let kind = match err.code() {
            ErrorCode::NotFound => ErrorKind::NotFound,
            ErrorCode::AlreadyExists => ErrorKind::AlreadyExists,
            ErrorCode::PermissionDenied => ErrorKind::PermissionDenied,
            ErrorCode::NotADirectory => ErrorKind::NotADirectory,
            ErrorCode::IsADirectory => ErrorKind::IsADirectory,
            ErrorCode::DirectoryNotEmpty => ErrorKind::DirectoryNotEmpty,
            ErrorCode::InvalidArgument | ErrorCode::InvalidPath => ErrorKind::InvalidInput,
            ErrorCode::DeadlineExceeded => ErrorKind::TimedOut,
            ErrorCode::Unsupported => ErrorKind::Unsupported,
            ErrorCode::ChannelClosed => ErrorKind::BrokenPipe,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err.to_string())
    }
}
