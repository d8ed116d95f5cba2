#![deny(unsafe_code)]

//! farfs-testkit: everything a farfs test needs to stand up a working
//! channel without touching a real filesystem or a real socket.
//!
//! [`MemFs`] is a complete in-memory [`farfs_vfs::Vfs`]; [`connected_pair`]
//! wires a [`farfs_client::RemoteFs`] stub to a [`farfs_server::FsDispatcher`]
//! over an in-process channel, with both demux loops running.
//!
//! Cross-crate behavior tests live here and in the `farfs` umbrella crate so
//! the lower crates stay free of circular dev-dependencies.

mod memfs;
mod pair;

pub use memfs::{MemFile, MemFs};
pub use pair::{Harness, connected_pair, connected_pair_with_timeout};

use std::sync::Once;

/// Install a tracing subscriber for test output. Safe to call from every
/// test; only the first call does anything.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}
