//! Trusted asynchronous channel to a cross-origin authentication authority.
//!
//! The authority is reachable only through an embedded frame; the frame's
//! messaging surface is fire-and-forget, so this crate supplies the
//! protocol machinery that makes it usable as RPC:
//! - readiness handshake before anything is dispatched
//! - FIFO correlation of responses back to pending requests
//! - origin-trust enforcement (one fixed origin, everything else dropped)
//! - write-through of authenticated responses into the local session cache
//!
//! Key modules:
//! - [`protocol`] — wire message types and origin-checked decoding
//! - [`transport`] — the transport seam plus an in-process pair for tests
//! - [`channel`] — the [`channel::BridgeChannel`] state machine
//! - [`facade`] — the small public surface ([`facade::AuthFacade`])

pub mod channel;
pub mod facade;
pub mod protocol;
pub mod transport;

pub use channel::{BridgeChannel, ChannelMetrics, RequestError};
pub use facade::{AuthFacade, LogoutOutcome};
pub use protocol::{Envelope, InboundMessage, OutboundMessage, ResponseKind};
pub use transport::{AuthorityStub, BridgeTransport, InProcessTransport, TransportError};
