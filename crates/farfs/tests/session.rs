//! Correlation engine behavior over a live in-process channel.

use std::sync::Arc;
use std::time::Duration;

use farfs::{
    Call, ErrorCode, FsCall, FsError, MemChannel, Message, MessageChannel, Reply, RpcSession,
};

fn session_with_timeout(ms: u64) -> (Arc<RpcSession<MemChannel>>, Arc<MemChannel>) {
    let (local, peer) = MemChannel::arc_pair();
    let session = Arc::new(RpcSession::with_timeout(local, Duration::from_millis(ms)));
    tokio::spawn(session.clone().run());
    (session, peer)
}

fn sync_call() -> Call {
    Call::Fs(FsCall::Sync)
}

#[tokio::test]
async fn a_mute_peer_means_deadline_exceeded() {
    farfs_testkit::init_tracing();
    let (session, _peer) = session_with_timeout(50);

    let err = session.call(sync_call()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DeadlineExceeded);
    // The rejection names the correlation id of the abandoned call.
    assert!(err.message().contains("call 1"), "message: {}", err.message());
}

#[tokio::test]
async fn a_late_response_is_counted_not_delivered() {
    let (session, peer) = session_with_timeout(50);

    let err = session.call(sync_call()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DeadlineExceeded);

    // The peer finally answers the abandoned call. Nothing is waiting for
    // it anymore; the demux loop must shrug it off and keep serving.
    let late = peer.recv().await.unwrap();
    peer.send(Message::Response {
        id: late.id(),
        result: Ok(Reply::Unit),
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(session.stats().unknown_responses, 1);

    // A fresh call on the same session still resolves.
    tokio::spawn({
        let peer = peer.clone();
        async move {
            let msg = peer.recv().await.unwrap();
            peer.send(Message::Response {
                id: msg.id(),
                result: Ok(Reply::Unit),
            })
            .await
            .unwrap();
        }
    });
    assert_eq!(session.call(sync_call()).await.unwrap(), Reply::Unit);
}

#[tokio::test]
async fn responses_resolve_out_of_order() {
    let (session, peer) = session_with_timeout(1000);

    const CALLS: usize = 8;

    // Collect every request, then answer them newest-first, echoing the
    // correlation id into the payload.
    tokio::spawn(async move {
        let mut ids = Vec::with_capacity(CALLS);
        for _ in 0..CALLS {
            ids.push(peer.recv().await.unwrap().id());
        }
        for id in ids.into_iter().rev() {
            peer.send(Message::Response {
                id,
                result: Ok(Reply::Written(id)),
            })
            .await
            .unwrap();
        }
    });

    let calls = (0..CALLS).map(|_| session.call(sync_call()));
    let replies = futures::future::join_all(calls).await;

    for (idx, reply) in replies.into_iter().enumerate() {
        // Ids are allocated in call order, starting at 1.
        assert_eq!(reply.unwrap(), Reply::Written(idx as u64 + 1));
    }
    assert_eq!(session.stats().unknown_responses, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_reply_racing_the_deadline_is_never_misreported() {
    // The peer answers right on the deadline, so either side can win the
    // race. Whichever does, the caller's outcome must be the reply or a
    // deadline rejection; a healthy channel must never be reported closed.
    for _ in 0..50 {
        let (session, peer) = session_with_timeout(5);

        tokio::spawn(async move {
            let msg = peer.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = peer
                .send(Message::Response {
                    id: msg.id(),
                    result: Ok(Reply::Unit),
                })
                .await;
        });

        match session.call(sync_call()).await {
            Ok(reply) => assert_eq!(reply, Reply::Unit),
            Err(err) => assert_eq!(err.code(), ErrorCode::DeadlineExceeded),
        }
    }
}

#[tokio::test]
async fn closing_the_channel_fails_every_pending_call() {
    let (session, peer) = session_with_timeout(5000);

    let pending = tokio::spawn({
        let session = session.clone();
        async move { session.call(sync_call()).await }
    });

    // Wait for the request to actually be in flight, then hang up.
    let _ = peer.recv().await.unwrap();
    peer.close().await.unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err.code(), ErrorCode::ChannelClosed);
}

#[tokio::test]
async fn a_session_without_a_dispatcher_answers_unsupported() {
    let (_session, peer) = session_with_timeout(1000);

    peer.send(Message::Request {
        id: 42,
        origin: String::new(),
        call: sync_call(),
    })
    .await
    .unwrap();

    match peer.recv().await.unwrap() {
        Message::Response { id, result } => {
            assert_eq!(id, 42);
            let err = result.unwrap_err();
            assert_eq!(err.code(), ErrorCode::Unsupported);
        }
        other => panic!("expected a response, got {other:?}"),
    }
}

#[tokio::test]
async fn remote_failures_come_back_as_the_remote_error() {
    let (session, peer) = session_with_timeout(1000);

    tokio::spawn(async move {
        let msg = peer.recv().await.unwrap();
        peer.send(Message::Response {
            id: msg.id(),
            result: Err(FsError::not_found("/nope")),
        })
        .await
        .unwrap();
    });

    let err = session.call(sync_call()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(err.message(), "/nope");
}
