use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ab_core::config::BridgeConfig;
use ab_core::session_cache::SessionCache;
use ab_core::types::{AuthResult, Profile, User};

use crate::channel::BridgeChannel;
use crate::protocol::{InboundMessage, OutboundMessage, ResponseKind};
use crate::transport::BridgeTransport;

/// Error tag reported when the remote frame never signals readiness.
pub const BRIDGE_TIMEOUT_ERROR: &str = "Bridge timeout";

/// Outcome of a logout. `success` reflects the remote clear; the local
/// cache is always cleared regardless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoutOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The public surface over [`BridgeChannel`] and the local session cache.
///
/// Every operation resolves to a value; protocol failures come back as
/// non-authenticated results with an error tag, never as panics or
/// unhandled errors.
pub struct AuthFacade {
    channel: Arc<BridgeChannel>,
    cache: Arc<SessionCache>,
    authority_url: String,
    default_return_url: String,
    ready_timeout: Duration,
}

impl AuthFacade {
    /// Wire a facade over an existing channel and cache.
    pub fn new(
        channel: Arc<BridgeChannel>,
        cache: Arc<SessionCache>,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            channel,
            cache,
            authority_url: config.authority_url.clone(),
            default_return_url: config.default_return_url.clone(),
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
        }
    }

    /// Build the channel, cache, and facade from config and a transport.
    pub fn with_transport(transport: Arc<dyn BridgeTransport>, config: &ab_core::config::Config) -> Self {
        let cache = Arc::new(SessionCache::from_config(&config.cache));
        let channel = BridgeChannel::new(
            transport,
            Arc::clone(&cache),
            config.bridge.trusted_origin.clone(),
            config.bridge.request_timeout_ms.map(Duration::from_millis),
        );
        Self::new(channel, cache, &config.bridge)
    }

    /// Boot the channel, wait for readiness, then fetch the current auth
    /// state. When readiness never arrives the result is a
    /// non-authenticated value tagged [`BRIDGE_TIMEOUT_ERROR`] and no
    /// request is issued at all.
    pub async fn init(&self) -> AuthResult {
        self.channel.boot();
        if !self.channel.await_ready(self.ready_timeout).await {
            tracing::warn!(
                timeout_ms = self.ready_timeout.as_millis() as u64,
                "bridge readiness timed out"
            );
            return AuthResult::failure(BRIDGE_TIMEOUT_ERROR);
        }
        self.get_auth().await
    }

    /// Issue a `get-auth` request and normalize the response.
    ///
    /// Does not check readiness itself; an early call simply queues
    /// behind the channel's readiness flush. Concurrent calls stay
    /// independent — each gets its own request on the wire.
    pub async fn get_auth(&self) -> AuthResult {
        match self
            .channel
            .request(OutboundMessage::GetAuth, ResponseKind::AuthResponse)
            .await
        {
            Ok(InboundMessage::AuthResponse {
                authenticated,
                token,
                user,
                profile,
            }) => AuthResult {
                authenticated,
                token,
                user,
                profile,
                error: None,
            },
            Ok(other) => {
                tracing::debug!(?other, "unexpected response kind for get-auth");
                AuthResult::failure("unexpected response")
            }
            Err(e) => AuthResult::failure(e.to_string()),
        }
    }

    /// The login redirect URL:
    /// `<authority-root>/?login=1&return=<urlencoded return url>`.
    ///
    /// Falls back to the configured default return URL when the caller
    /// supplies none. Performing the navigation is the embedding shell's
    /// job; from the library's perspective login is a terminal action.
    pub fn login_url(&self, return_url: Option<&str>) -> String {
        let return_to = return_url.unwrap_or(&self.default_return_url);
        format!(
            "{}/?login=1&return={}",
            self.authority_url.trim_end_matches('/'),
            urlencoding::encode(return_to)
        )
    }

    /// Clear the local session and ask the authority to do the same.
    ///
    /// The local clear is synchronous and unconditional — it has already
    /// happened by the time the remote `clear-auth` request is even
    /// issued, so a hung or failed remote clear leaves the caller signed
    /// out locally.
    pub async fn logout(&self) -> LogoutOutcome {
        self.cache.clear();
        match self
            .channel
            .request(OutboundMessage::ClearAuth, ResponseKind::AuthClearResponse)
            .await
        {
            Ok(InboundMessage::AuthClearResponse { success }) => LogoutOutcome {
                success,
                error: None,
            },
            Ok(other) => {
                tracing::debug!(?other, "unexpected response kind for clear-auth");
                LogoutOutcome {
                    success: false,
                    error: Some("unexpected response".into()),
                }
            }
            Err(e) => LogoutOutcome {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    /// True iff a token is cached locally. May be stale relative to the
    /// authority.
    pub fn is_authenticated(&self) -> bool {
        self.cache.is_authenticated()
    }

    /// The cached user record, if any.
    pub fn user(&self) -> Option<User> {
        self.cache.user()
    }

    /// The cached profile record, if any.
    pub fn profile(&self) -> Option<Profile> {
        self.cache.profile()
    }

    /// The cached opaque token, if any.
    pub fn token(&self) -> Option<String> {
        self.cache.token()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AuthorityStub, InProcessTransport};
    use ab_core::types::AuthSession;
    use serde_json::json;
    use tokio::time::{sleep, timeout, Instant};

    const ORIGIN: &str = "https://id.example.com";

    fn bridge_config(ready_timeout_ms: u64, request_timeout_ms: Option<u64>) -> BridgeConfig {
        BridgeConfig {
            trusted_origin: ORIGIN.into(),
            bridge_url: format!("{ORIGIN}/bridge"),
            authority_url: ORIGIN.into(),
            ready_timeout_ms,
            request_timeout_ms,
            default_return_url: "https://app.example.com/".into(),
        }
    }

    fn make_facade(
        ready_timeout_ms: u64,
        request_timeout_ms: Option<u64>,
    ) -> (AuthFacade, AuthorityStub, Arc<SessionCache>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let cache = Arc::new(SessionCache::new(dir.path()));
        let (transport, stub) = InProcessTransport::pair(ORIGIN);
        let config = bridge_config(ready_timeout_ms, request_timeout_ms);
        let channel = BridgeChannel::new(
            Arc::new(transport),
            Arc::clone(&cache),
            config.trusted_origin.clone(),
            config.request_timeout_ms.map(Duration::from_millis),
        );
        let facade = AuthFacade::new(channel, Arc::clone(&cache), &config);
        (facade, stub, cache, dir)
    }

    /// Play the authority: signal readiness, then answer each get-auth
    /// with the given response payload.
    fn run_authority(stub: AuthorityStub, response: serde_json::Value) {
        tokio::spawn(async move {
            stub.send_message(&InboundMessage::AuthBridgeReady);
            while let Ok(msg) = stub.recv_outbound().await {
                match msg {
                    OutboundMessage::GetAuth => {
                        stub.send_envelope_from(ORIGIN, response.clone());
                    }
                    OutboundMessage::ClearAuth => {
                        stub.send_message(&InboundMessage::AuthClearResponse { success: true });
                    }
                }
            }
        });
    }

    #[tokio::test]
    async fn init_returns_timeout_failure_without_issuing_request() {
        let (facade, stub, _cache, _dir) = make_facade(100, None);

        let start = Instant::now();
        let result = facade.init().await;

        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(!result.authenticated);
        assert_eq!(result.error.as_deref(), Some("Bridge timeout"));
        // The get-auth request was never issued.
        assert!(stub.try_recv_outbound().is_none());
    }

    #[tokio::test]
    async fn init_fetches_and_caches_auth_state() {
        let (facade, stub, cache, _dir) = make_facade(1000, None);
        run_authority(
            stub,
            json!({
                "type": "auth-response",
                "authenticated": true,
                "token": "T",
                "user": {"login": "u"},
                "profile": {"display_name": "U"}
            }),
        );

        assert!(!facade.is_authenticated());
        assert!(facade.user().is_none());
        assert!(facade.token().is_none());

        let result = facade.init().await;
        assert!(result.authenticated);
        assert_eq!(result.token.as_deref(), Some("T"));
        assert_eq!(result.user.as_ref().unwrap().login, "u");

        assert!(facade.is_authenticated());
        assert_eq!(facade.token().as_deref(), Some("T"));
        assert_eq!(facade.user().unwrap().login, "u");
        assert_eq!(facade.profile().unwrap().display_name.as_deref(), Some("U"));
        assert!(cache.is_authenticated());
    }

    #[tokio::test]
    async fn init_with_unauthenticated_response() {
        let (facade, stub, _cache, _dir) = make_facade(1000, None);
        run_authority(
            stub,
            json!({"type": "auth-response", "authenticated": false}),
        );

        let result = facade.init().await;
        assert!(!result.authenticated);
        assert!(result.error.is_none());
        assert!(!facade.is_authenticated());
    }

    #[tokio::test]
    async fn concurrent_get_auth_requests_stay_independent() {
        let (facade, stub, _cache, _dir) = make_facade(1000, None);
        facade.channel.boot();
        let facade = Arc::new(facade);

        stub.send_message(&InboundMessage::AuthBridgeReady);

        let a = {
            let facade = Arc::clone(&facade);
            tokio::spawn(async move { facade.get_auth().await })
        };
        let b = {
            let facade = Arc::clone(&facade);
            tokio::spawn(async move { facade.get_auth().await })
        };

        // Two callers, two requests on the wire — no coalescing.
        let first = timeout(Duration::from_secs(1), stub.recv_outbound())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(1), stub.recv_outbound())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, OutboundMessage::GetAuth);
        assert_eq!(second, OutboundMessage::GetAuth);

        stub.send_envelope_from(
            ORIGIN,
            json!({"type": "auth-response", "authenticated": false}),
        );
        stub.send_envelope_from(
            ORIGIN,
            json!({"type": "auth-response", "authenticated": false}),
        );
        assert!(!a.await.unwrap().authenticated);
        assert!(!b.await.unwrap().authenticated);
    }

    #[tokio::test]
    async fn logout_clears_locally_even_when_remote_never_answers() {
        let (facade, stub, cache, _dir) = make_facade(1000, None);
        facade.channel.boot();
        stub.send_message(&InboundMessage::AuthBridgeReady);

        cache
            .store_session(&AuthSession {
                token: "T".into(),
                user: User {
                    login: "u".into(),
                    id: None,
                    name: None,
                    email: None,
                    avatar_url: None,
                },
                profile: None,
            })
            .unwrap();
        assert!(facade.is_authenticated());

        let facade = Arc::new(facade);
        let logout = {
            let facade = Arc::clone(&facade);
            tokio::spawn(async move { facade.logout().await })
        };

        // The local clear is immediate; the remote clear-auth request goes
        // out but is never answered, so the logout future stays pending.
        sleep(Duration::from_millis(50)).await;
        assert!(!facade.is_authenticated());
        assert!(facade.token().is_none());
        assert!(facade.user().is_none());
        assert!(!logout.is_finished());
        logout.abort();
    }

    #[tokio::test]
    async fn logout_reports_remote_success() {
        let (facade, stub, cache, _dir) = make_facade(1000, None);
        run_authority(
            stub,
            json!({"type": "auth-response", "authenticated": false}),
        );
        facade.channel.boot();

        cache
            .store_session(&AuthSession {
                token: "T".into(),
                user: User {
                    login: "u".into(),
                    id: None,
                    name: None,
                    email: None,
                    avatar_url: None,
                },
                profile: None,
            })
            .unwrap();

        let outcome = facade.logout().await;
        assert!(outcome.success);
        assert!(outcome.error.is_none());
        assert!(!facade.is_authenticated());
    }

    #[tokio::test]
    async fn with_transport_builds_cache_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ab_core::config::Config::default();
        config.bridge = bridge_config(1000, None);
        config.cache.dir = dir.path().to_string_lossy().into_owned();

        let (transport, stub) = InProcessTransport::pair(ORIGIN);
        let facade = AuthFacade::with_transport(Arc::new(transport), &config);
        run_authority(
            stub,
            json!({
                "type": "auth-response",
                "authenticated": true,
                "token": "T",
                "user": {"login": "u"}
            }),
        );

        let result = facade.init().await;
        assert!(result.authenticated);
        // The session landed in the configured cache directory.
        assert!(dir.path().join("token").exists());
        assert!(dir.path().join("user.json").exists());
    }

    #[test]
    fn login_url_encodes_return_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SessionCache::new(dir.path()));
        let (transport, _stub) = InProcessTransport::pair(ORIGIN);
        let config = bridge_config(5000, None);
        let channel = BridgeChannel::new(Arc::new(transport), Arc::clone(&cache), ORIGIN, None);
        let facade = AuthFacade::new(channel, cache, &config);

        assert_eq!(
            facade.login_url(Some("https://app.example.com/dash?tab=1")),
            "https://id.example.com/?login=1&return=https%3A%2F%2Fapp.example.com%2Fdash%3Ftab%3D1"
        );
        // No explicit return URL: the configured default is used.
        assert_eq!(
            facade.login_url(None),
            "https://id.example.com/?login=1&return=https%3A%2F%2Fapp.example.com%2F"
        );
    }
}
