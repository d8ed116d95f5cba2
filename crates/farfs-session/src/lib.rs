#![deny(unsafe_code)]

//! farfs-session: The RPC correlation engine.
//!
//! An [`RpcSession`] owns one side of a message channel and multiplexes
//! calls over it. Issuing a call registers a waiter keyed by a correlation
//! id; the demux loop matches each incoming response to its waiter, so any
//! number of calls can be in flight and responses may arrive in any order.
//! The mirror side installs a dispatcher to execute incoming requests.

mod channel;
mod session;
mod stats;

pub use channel::*;
pub use session::*;
pub use stats::*;
