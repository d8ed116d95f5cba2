//! RpcSession: correlation of calls and responses over one channel.
//!
//! # Key invariant
//!
//! Only [`RpcSession::run`] calls `channel.recv()`. All routing happens
//! through the pending table, so concurrent callers never compete for
//! incoming messages.
//!
//! Every call has exactly one terminal outcome: the matching response, or a
//! deadline rejection. Whichever side wins removes the pending record, and
//! the record is removed exactly once; a response that loses the race
//! against the deadline finds no record and is counted as unknown.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use farfs_wire::{Call, FsError, FsResult, Message, Reply};

use crate::{ChannelError, MessageChannel, SessionStats, StatsSnapshot};

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Type alias for a boxed async dispatch function.
pub type BoxedDispatcher =
    Box<dyn Fn(Call) -> Pin<Box<dyn Future<Output = FsResult<Reply>> + Send>> + Send + Sync>;

/// One side of a farfs channel: issues correlated calls, and optionally
/// dispatches incoming ones.
pub struct RpcSession<C: MessageChannel> {
    channel: Arc<C>,

    /// Pending response waiters: correlation id -> oneshot sender.
    /// A caller registers a waiter before sending its request; the demux
    /// loop finds the waiter when the response arrives and delivers.
    pending: Mutex<HashMap<u64, oneshot::Sender<FsResult<Reply>>>>,

    /// Optional dispatcher for incoming requests. Without one, every
    /// incoming request is answered with an Unsupported error.
    dispatcher: Mutex<Option<BoxedDispatcher>>,

    /// Monotonic correlation id allocator. Ids are unique for the lifetime
    /// of the session, which makes them trivially unique among outstanding
    /// calls.
    next_id: AtomicU64,

    call_timeout: Duration,

    stats: SessionStats,
}

impl<C: MessageChannel + 'static> RpcSession<C> {
    /// Create a session with the default per-call deadline.
    pub fn new(channel: Arc<C>) -> Self {
        Self::with_timeout(channel, DEFAULT_CALL_TIMEOUT)
    }

    /// Create a session with a custom per-call deadline.
    pub fn with_timeout(channel: Arc<C>, call_timeout: Duration) -> Self {
        Self {
            channel,
            pending: Mutex::new(HashMap::new()),
            dispatcher: Mutex::new(None),
            next_id: AtomicU64::new(1),
            call_timeout,
            stats: SessionStats::default(),
        }
    }

    /// Get a reference to the underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Snapshot the session counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Allocate the next correlation id.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a dispatcher for incoming requests.
    ///
    /// The dispatcher receives the decoded call and returns its result; the
    /// demux loop takes care of pairing it with the right correlation id.
    pub fn set_dispatcher<F, Fut>(&self, dispatcher: F)
    where
        F: Fn(Call) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FsResult<Reply>> + Send + 'static,
    {
        let boxed: BoxedDispatcher = Box::new(move |call| Box::pin(dispatcher(call)));
        *self.dispatcher.lock() = Some(boxed);
    }

    /// Register a pending waiter for the given correlation id.
    fn register_pending(&self, id: u64) -> oneshot::Receiver<FsResult<Reply>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        rx
    }

    /// Issue a call and wait for its outcome.
    ///
    /// The call either fully succeeds or fully fails; there is no retry and
    /// no partial completion. A remote failure comes back as the remote
    /// error with this caller's origin appended; a missed deadline becomes
    /// a `DeadlineExceeded` error naming the correlation id.
    pub async fn call(&self, call: Call) -> FsResult<Reply> {
        let id = self.next_id();
        let origin = capture_origin();

        // Register the waiter before sending so a fast response cannot
        // slip past it.
        let mut rx = self.register_pending(id);

        let request = Message::Request {
            id,
            origin: origin.clone(),
            call,
        };
        if let Err(err) = self.channel.send(request).await {
            self.pending.lock().remove(&id);
            return Err(FsError::from(err).push_origin(origin));
        }
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);

        match tokio::time::timeout(self.call_timeout, &mut rx).await {
            Ok(Ok(result)) => settle(result, origin),
            // The demux loop dropped the waiter: channel is gone.
            Ok(Err(_)) => Err(FsError::channel_closed().push_origin(origin)),
            Err(_elapsed) => {
                // Removing the record is the rejection: once it is gone, a
                // late response cannot resolve this caller anymore.
                if self.pending.lock().remove(&id).is_some() {
                    Err(FsError::deadline_exceeded(id).push_origin(origin))
                } else {
                    // The response won the race against the timer. The
                    // sender half is now held by code that imminently sends
                    // or drops it, so awaiting here resolves promptly; a
                    // non-blocking peek could still miss a delivery that is
                    // mid-flight on another thread.
                    match (&mut rx).await {
                        Ok(result) => settle(result, origin),
                        Err(_) => Err(FsError::channel_closed().push_origin(origin)),
                    }
                }
            }
        }
    }

    /// Fail every outstanding call (channel closing).
    fn fail_pending(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(FsError::channel_closed()));
        }
    }

    /// Run the demux loop.
    ///
    /// Routes responses to their waiters and spawns the dispatcher for
    /// incoming requests, so the loop itself never blocks on a handler.
    /// Every received request is answered exactly once, dispatcher or not.
    ///
    /// Runs until the channel closes; outstanding calls are failed on the
    /// way out.
    pub async fn run(self: Arc<Self>) -> Result<(), ChannelError> {
        loop {
            let msg = match self.channel.recv().await {
                Ok(msg) => msg,
                Err(ChannelError::Closed) => {
                    self.fail_pending();
                    return Ok(());
                }
                Err(err) => {
                    self.fail_pending();
                    return Err(err);
                }
            };

            match msg {
                Message::Response { id, result } => {
                    self.stats.responses_received.fetch_add(1, Ordering::Relaxed);
                    let waiter = self.pending.lock().remove(&id);
                    match waiter {
                        Some(tx) => {
                            // The caller may have raced the deadline and
                            // given up between removal and here; that is
                            // its loss, not an error.
                            let _ = tx.send(result);
                        }
                        None => {
                            self.stats.unknown_responses.fetch_add(1, Ordering::Relaxed);
                            warn!(id, "response with no pending call");
                        }
                    }
                }
                Message::Request { id, origin, call } => {
                    self.stats
                        .requests_dispatched
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(id, op = call.name(), "dispatching request");

                    // Build the future while holding the lock, run it in a
                    // task so the demux loop keeps draining the channel.
                    let response_future = {
                        let guard = self.dispatcher.lock();
                        guard.as_ref().map(|dispatcher| dispatcher(call))
                    };

                    let channel = self.channel.clone();
                    tokio::spawn(async move {
                        let result = match response_future {
                            Some(fut) => fut.await,
                            None => Err(FsError::unsupported("no dispatcher attached")),
                        };
                        if let Err(err) = &result {
                            debug!(id, %err, caller_origin = %origin, "request failed");
                        }
                        let _ = channel.send(Message::Response { id, result }).await;
                    });
                }
            }
        }
    }
}

/// Turn a waiter outcome into the caller's result, appending the caller's
/// origin to any failure so the error carries both sides of the story.
fn settle(result: FsResult<Reply>, origin: String) -> FsResult<Reply> {
    result.map_err(|err| err.push_origin(origin))
}

/// Capture the caller's backtrace text, or an empty string when backtraces
/// are disabled.
fn capture_origin() -> String {
    let bt = Backtrace::capture();
    match bt.status() {
        BacktraceStatus::Captured => bt.to_string(),
        _ => String::new(),
    }
}

impl From<ChannelError> for FsError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Closed => FsError::channel_closed(),
            ChannelError::Io(msg) => FsError::protocol(format!("channel i/o: {msg}")),
        }
    }
}

// Session behavior tests live in the farfs umbrella crate (crates/farfs/tests)
// to avoid a circular dev-dependency with farfs-transport-mem.
