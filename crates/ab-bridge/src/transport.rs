use async_trait::async_trait;

use crate::protocol::{Envelope, InboundMessage, OutboundMessage};

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

// ---------------------------------------------------------------------------
// BridgeTransport trait — the seam to the embedded frame
// ---------------------------------------------------------------------------

/// The message-sending capability of the embedded authority frame.
///
/// The channel never talks to a concrete frame implementation directly;
/// it goes through this trait so the frame can be swapped for an
/// in-process pair in tests. Outbound messages are typed; inbound
/// messages arrive as raw [`Envelope`]s because nothing about them is
/// trusted until the origin check has run.
#[async_trait]
pub trait BridgeTransport: Send + Sync + 'static {
    /// Send a message to the frame.
    async fn send(&self, msg: &OutboundMessage) -> Result<()>;

    /// Receive the next inbound envelope. Blocks (async) until one arrives.
    async fn recv(&self) -> Result<Envelope>;
}

// ---------------------------------------------------------------------------
// InProcessTransport — for testing and in-memory use
// ---------------------------------------------------------------------------

/// An in-process transport backed by flume channels, paired with an
/// [`AuthorityStub`] standing in for the remote frame.
pub struct InProcessTransport {
    tx: flume::Sender<OutboundMessage>,
    rx: flume::Receiver<Envelope>,
}

impl InProcessTransport {
    /// Create a connected transport/stub pair. `origin` is the origin the
    /// stub declares on envelopes sent through [`AuthorityStub::send_message`].
    pub fn pair(origin: impl Into<String>) -> (Self, AuthorityStub) {
        let (out_tx, out_rx) = flume::unbounded();
        let (in_tx, in_rx) = flume::unbounded();

        let transport = Self {
            tx: out_tx,
            rx: in_rx,
        };
        let stub = AuthorityStub {
            origin: origin.into(),
            tx: in_tx,
            rx: out_rx,
        };
        (transport, stub)
    }
}

#[async_trait]
impl BridgeTransport for InProcessTransport {
    async fn send(&self, msg: &OutboundMessage) -> Result<()> {
        self.tx
            .send_async(msg.clone())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Result<Envelope> {
        self.rx.recv_async().await.map_err(|_| TransportError::Closed)
    }
}

// ---------------------------------------------------------------------------
// AuthorityStub — the fake remote frame
// ---------------------------------------------------------------------------

/// The remote half of an [`InProcessTransport::pair`].
///
/// Lets a test play the authority: read what the channel dispatched and
/// inject envelopes with any declared origin, including spoofed ones.
pub struct AuthorityStub {
    origin: String,
    tx: flume::Sender<Envelope>,
    rx: flume::Receiver<OutboundMessage>,
}

impl AuthorityStub {
    /// The origin this stub declares on [`send_message`](Self::send_message).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Deliver a protocol message under the stub's own origin.
    pub fn send_message(&self, msg: &InboundMessage) {
        let payload = serde_json::to_value(msg).expect("serialize inbound message");
        self.send_envelope_from(self.origin.clone(), payload);
    }

    /// Deliver a raw envelope from an arbitrary origin.
    pub fn send_envelope_from(&self, origin: impl Into<String>, payload: serde_json::Value) {
        let _ = self.tx.send(Envelope::new(origin, payload));
    }

    /// Await the next message the channel dispatched.
    pub async fn recv_outbound(&self) -> Result<OutboundMessage> {
        self.rx.recv_async().await.map_err(|_| TransportError::Closed)
    }

    /// Non-blocking read of the next dispatched message, if any.
    pub fn try_recv_outbound(&self) -> Option<OutboundMessage> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
