use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use ab_core::session_cache::SessionCache;

use crate::protocol::{Envelope, InboundMessage, OutboundMessage, ResponseKind};
use crate::transport::{BridgeTransport, TransportError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("bridge channel closed before a response arrived")]
    ChannelClosed,

    #[error("no response after {0}ms")]
    Timeout(u64),
}

pub type Result<T> = std::result::Result<T, RequestError>;

// ---------------------------------------------------------------------------
// Pending requests
// ---------------------------------------------------------------------------

struct PendingRequest {
    id: Uuid,
    message: OutboundMessage,
    expect: ResponseKind,
    completion: oneshot::Sender<InboundMessage>,
    dispatched: bool,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped_untrusted: AtomicU64,
    dropped_undecodable: AtomicU64,
    dropped_unmatched: AtomicU64,
}

/// Snapshot of channel activity counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub dropped_untrusted: u64,
    pub dropped_undecodable: u64,
    pub dropped_unmatched: u64,
}

// ---------------------------------------------------------------------------
// BridgeChannel
// ---------------------------------------------------------------------------

/// The trusted RPC-like channel to the authentication authority.
///
/// Owns the transport, the readiness state, and the pending-request
/// queue. Created once per process; requests issued before the remote
/// frame signals readiness are queued and flushed in insertion order the
/// moment the `auth-bridge-ready` signal arrives.
///
/// Readiness transitions `false -> true` exactly once and never reverts;
/// repeated readiness signals are no-ops. Responses resolve the oldest
/// pending request expecting their kind, so concurrent same-kind
/// requests complete in submission order.
pub struct BridgeChannel {
    transport: Arc<dyn BridgeTransport>,
    cache: Arc<SessionCache>,
    trusted_origin: String,
    request_timeout: Option<Duration>,
    booted: AtomicBool,
    ready_tx: watch::Sender<bool>,
    pending: Mutex<VecDeque<PendingRequest>>,
    counters: Counters,
}

impl BridgeChannel {
    pub fn new(
        transport: Arc<dyn BridgeTransport>,
        cache: Arc<SessionCache>,
        trusted_origin: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Arc<Self> {
        let (ready_tx, _) = watch::channel(false);
        Arc::new(Self {
            transport,
            cache,
            trusted_origin: trusted_origin.into(),
            request_timeout,
            booted: AtomicBool::new(false),
            ready_tx,
            pending: Mutex::new(VecDeque::new()),
            counters: Counters::default(),
        })
    }

    /// Start listening for inbound envelopes.
    ///
    /// Single-shot: the channel owns exactly one transport, so a second
    /// call is ignored with a warning rather than spawning a duplicate
    /// receive loop over the same frame.
    pub fn boot(self: &Arc<Self>) {
        if self.booted.swap(true, Ordering::SeqCst) {
            tracing::warn!("bridge channel already booted; ignoring");
            return;
        }
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match channel.transport.recv().await {
                    Ok(envelope) => channel.handle_envelope(envelope).await,
                    Err(e) => {
                        tracing::debug!(error = %e, "bridge transport closed; receive loop ending");
                        break;
                    }
                }
            }
        });
    }

    /// Whether the remote frame has signaled readiness.
    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Resolve `true` once the channel is ready, or `false` when
    /// `timeout` elapses first. Event-driven; every caller is resolved
    /// exactly once.
    pub async fn await_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.ready_tx.subscribe();
        if *rx.borrow() {
            return true;
        }
        tokio::time::timeout(timeout, async move {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return;
                }
            }
            // Sender gone without ever becoming ready: wait out the deadline.
            std::future::pending::<()>().await;
        })
        .await
        .is_ok()
    }

    /// Enqueue a request and await the inbound message that resolves it.
    ///
    /// Dispatches over the transport immediately when ready, otherwise
    /// leaves the message queued for the readiness flush. With no
    /// configured request timeout an unanswered request stays pending
    /// indefinitely, matching the behavior of the remote contract.
    pub async fn request(
        &self,
        message: OutboundMessage,
        expect: ResponseKind,
    ) -> Result<InboundMessage> {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        // Readiness is sampled under the queue lock: the flush also takes
        // this lock after the watch flips, so an entry is either marked
        // dispatched here or picked up by the flush, never both or neither.
        let dispatch_now = {
            let mut pending = self.pending.lock().expect("pending queue lock poisoned");
            let ready = *self.ready_tx.borrow();
            pending.push_back(PendingRequest {
                id,
                message: message.clone(),
                expect,
                completion: tx,
                dispatched: ready,
            });
            ready
        };
        tracing::debug!(request_id = %id, kind = %expect, dispatch_now, "request enqueued");

        if dispatch_now {
            if let Err(e) = self.transport.send(&message).await {
                self.remove_pending(id);
                return Err(e.into());
            }
            self.counters.sent.fetch_add(1, Ordering::Relaxed);
        }

        match self.request_timeout {
            None => rx.await.map_err(|_| RequestError::ChannelClosed),
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(result) => result.map_err(|_| RequestError::ChannelClosed),
                Err(_) => {
                    self.remove_pending(id);
                    Err(RequestError::Timeout(deadline.as_millis() as u64))
                }
            },
        }
    }

    /// Number of requests still awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending queue lock poisoned").len()
    }

    /// Snapshot of the activity counters.
    pub fn metrics(&self) -> ChannelMetrics {
        ChannelMetrics {
            messages_sent: self.counters.sent.load(Ordering::Relaxed),
            messages_received: self.counters.received.load(Ordering::Relaxed),
            dropped_untrusted: self.counters.dropped_untrusted.load(Ordering::Relaxed),
            dropped_undecodable: self.counters.dropped_undecodable.load(Ordering::Relaxed),
            dropped_unmatched: self.counters.dropped_unmatched.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------
    // Inbound routing
    // ------------------------------------------------------------------

    async fn handle_envelope(&self, envelope: Envelope) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let message = match envelope.decode_trusted(&self.trusted_origin) {
            Some(message) => message,
            None if envelope.origin != self.trusted_origin => {
                self.counters.dropped_untrusted.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(origin = %envelope.origin, "dropped envelope from untrusted origin");
                return;
            }
            None => {
                self.counters.dropped_undecodable.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("dropped undecodable envelope from trusted origin");
                return;
            }
        };

        match message {
            InboundMessage::AuthBridgeReady => self.handle_ready().await,
            response => self.handle_response(response),
        }
    }

    async fn handle_ready(&self) {
        let was_ready = self.ready_tx.send_replace(true);
        if !was_ready {
            tracing::info!("bridge ready");
        }

        // Collect everything to dispatch while holding the lock, then send
        // after releasing it: queue mutation must be complete before any
        // dispatch can feed back into the channel.
        let to_send: Vec<(Uuid, OutboundMessage)> = {
            let mut pending = self.pending.lock().expect("pending queue lock poisoned");
            pending
                .iter_mut()
                .filter(|entry| !entry.dispatched)
                .map(|entry| {
                    entry.dispatched = true;
                    (entry.id, entry.message.clone())
                })
                .collect()
        };

        for (id, message) in to_send {
            match self.transport.send(&message).await {
                Ok(()) => {
                    self.counters.sent.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(request_id = %id, "queued request flushed");
                }
                Err(e) => {
                    tracing::warn!(request_id = %id, error = %e, "failed to flush queued request");
                }
            }
        }
    }

    fn handle_response(&self, message: InboundMessage) {
        // Cache write-through runs regardless of correlation: a successful
        // authenticated response updates the session even when no request
        // is waiting for it.
        if let Some(session) = message.auth_session() {
            if let Err(e) = self.cache.store_session(&session) {
                tracing::warn!(error = %e, "failed to persist auth session");
            }
        }

        let Some(kind) = message.response_kind() else {
            return;
        };

        let entry = {
            let mut pending = self.pending.lock().expect("pending queue lock poisoned");
            pending
                .iter()
                .position(|entry| entry.expect == kind)
                .and_then(|idx| pending.remove(idx))
        };

        match entry {
            Some(entry) => {
                tracing::debug!(request_id = %entry.id, kind = %kind, "response correlated");
                // The caller may have timed out and dropped its receiver.
                let _ = entry.completion.send(message);
            }
            None => {
                self.counters.dropped_unmatched.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(kind = %kind, "dropped response with no pending request");
            }
        }
    }

    fn remove_pending(&self, id: Uuid) {
        let mut pending = self.pending.lock().expect("pending queue lock poisoned");
        pending.retain(|entry| entry.id != id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
