#![deny(unsafe_code)]

//! farfs-client: The calling side of a farfs channel.
//!
//! [`RemoteFs`] implements the [`Vfs`] capability by turning every method
//! into one correlated call through an [`RpcSession`]; code written against
//! `Vfs` cannot tell a remote filesystem from a local one. An open file
//! comes back as a [`RemoteFile`] proxy reconstructed from the wire
//! descriptor, bound to the same session.

mod file;
mod fs;

pub use file::RemoteFile;
pub use fs::RemoteFs;

use farfs_wire::{FsError, Reply};

/// The remote side answered with a reply shape the operation never
/// produces. This is a protocol violation, not a filesystem failure.
pub(crate) fn unexpected_reply(expected: &str, got: &Reply) -> FsError {
    FsError::protocol(format!("expected {expected} reply, got {got:?}"))
}

pub(crate) fn expect_unit(reply: Reply) -> Result<(), FsError> {
    match reply {
        Reply::Unit => Ok(()),
        other => Err(unexpected_reply("unit", &other)),
    }
}
