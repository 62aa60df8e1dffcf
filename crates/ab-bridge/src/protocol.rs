use serde::{Deserialize, Serialize};

use ab_core::types::{AuthSession, Profile, User};

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// Messages sent to the authority frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case")]
pub enum OutboundMessage {
    GetAuth,
    ClearAuth,
}

/// Messages received from the authority frame.
///
/// A closed set discriminated by the `type` field; anything that does not
/// decode into one of these variants is dropped before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "kebab-case")]
pub enum InboundMessage {
    AuthBridgeReady,
    AuthResponse {
        authenticated: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<User>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<Profile>,
    },
    AuthClearResponse {
        success: bool,
    },
}

impl InboundMessage {
    /// Which pending-request kind this message resolves, if any.
    /// The readiness signal correlates with nothing.
    pub fn response_kind(&self) -> Option<ResponseKind> {
        match self {
            InboundMessage::AuthBridgeReady => None,
            InboundMessage::AuthResponse { .. } => Some(ResponseKind::AuthResponse),
            InboundMessage::AuthClearResponse { .. } => Some(ResponseKind::AuthClearResponse),
        }
    }

    /// The session to cache, when this is a successful authenticated
    /// response. Token and user must both be present; a partial response
    /// yields nothing rather than a partial cache write.
    pub fn auth_session(&self) -> Option<AuthSession> {
        match self {
            InboundMessage::AuthResponse {
                authenticated: true,
                token: Some(token),
                user: Some(user),
                profile,
            } => Some(AuthSession {
                token: token.clone(),
                user: user.clone(),
                profile: profile.clone(),
            }),
            _ => None,
        }
    }
}

/// Tag identifying which inbound message type resolves a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseKind {
    AuthResponse,
    AuthClearResponse,
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseKind::AuthResponse => write!(f, "auth-response"),
            ResponseKind::AuthClearResponse => write!(f, "auth-clear-response"),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope — what the transport actually delivers
// ---------------------------------------------------------------------------

/// A raw inbound message together with the origin its sender declared.
///
/// The origin is metadata stamped by the messaging surface, not part of
/// the payload, so it cannot be forged from inside the payload itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub origin: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(origin: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            payload,
        }
    }

    /// Origin-checked decode: the sole trust boundary of the protocol.
    ///
    /// The origin comparison is exact equality and happens before the
    /// payload is even looked at. Untrusted or undecodable envelopes
    /// yield `None` and are expected to be dropped silently.
    pub fn decode_trusted(&self, trusted_origin: &str) -> Option<InboundMessage> {
        if self.origin != trusted_origin {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
