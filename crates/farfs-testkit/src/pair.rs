//! A fully wired client/server pair over an in-process channel.

use std::sync::Arc;
use std::time::Duration;

use farfs_client::RemoteFs;
use farfs_server::FsDispatcher;
use farfs_session::{DEFAULT_CALL_TIMEOUT, RpcSession};
use farfs_transport_mem::MemChannel;

use crate::MemFs;

/// Both ends of a connected channel, plus handles on everything in between.
///
/// The demux loops are already spawned; calls on `remote` resolve against
/// `fs`. Dropping the harness closes nothing by itself; close a session's
/// channel to exercise shutdown paths.
pub struct Harness {
    /// The filesystem being served.
    pub fs: Arc<MemFs>,
    /// The stub, bound to the client session.
    pub remote: RemoteFs<MemChannel>,
    /// The serving dispatcher, for handle-table assertions.
    pub dispatcher: Arc<FsDispatcher<MemFs>>,
    pub client_session: Arc<RpcSession<MemChannel>>,
    pub server_session: Arc<RpcSession<MemChannel>>,
}

/// Wire a stub to a served [`MemFs`] with the default call deadline.
///
/// Must run inside a tokio runtime; the demux loops are spawned as tasks.
pub fn connected_pair() -> Harness {
    connected_pair_with_timeout(DEFAULT_CALL_TIMEOUT)
}

/// Wire a stub to a served [`MemFs`] with a custom call deadline.
pub fn connected_pair_with_timeout(call_timeout: Duration) -> Harness {
    let (client_end, server_end) = MemChannel::arc_pair();

    let client_session = Arc::new(RpcSession::with_timeout(client_end, call_timeout));
    let server_session = Arc::new(RpcSession::with_timeout(server_end, call_timeout));

    let fs = Arc::new(MemFs::new());
    let dispatcher = FsDispatcher::new(fs.clone());
    dispatcher.attach(&server_session);

    tokio::spawn(client_session.clone().run());
    tokio::spawn(server_session.clone().run());

    Harness {
        fs,
        remote: RemoteFs::new(client_session.clone()),
        dispatcher,
        client_session,
        server_session,
    }
}
