#![deny(unsafe_code)]

//! farfs-wire: Wire protocol types for the farfs remote filesystem.
//!
//! This crate defines:
//! - The message envelope ([`Message`]) exchanged between the two sides
//! - Typed call payloads ([`Call`], [`FsCall`], [`FileCall`]) and results ([`Reply`])
//! - The serializable summary of an open file ([`HandleDescriptor`])
//! - Filesystem metadata types ([`Metadata`], [`DirEntry`], [`OpenOptions`])
//! - Error codes and the wire error type ([`ErrorCode`], [`FsError`])
//! - Postcard encode/decode helpers ([`encode`], [`decode`])

mod codec;
mod error;
mod message;
mod types;

pub use codec::*;
pub use error::*;
pub use message::*;
pub use types::*;

/// Result type alias for filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;
