use std::path::PathBuf;

use crate::config::CacheConfig;
use crate::types::{AuthSession, Profile, User};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// SessionCache
// ---------------------------------------------------------------------------

const TOKEN_ENTRY: &str = "token";
const USER_ENTRY: &str = "user.json";
const PROFILE_ENTRY: &str = "profile.json";

/// File-system-backed cache of the current sign-in session.
///
/// The three entries are stored independently under a configurable
/// directory (defaults to `~/.auth-bridge/session/`): the opaque token as
/// a plain file, user and profile as JSON records.
///
/// Write ordering is the consistency mechanism: `store_session` persists
/// user (and profile) before the token, and `clear` removes the token
/// first. A reader that keys on the token therefore never observes a
/// token without its user record.
pub struct SessionCache {
    base_dir: PathBuf,
}

impl SessionCache {
    /// Create a cache with the default directory (`~/.auth-bridge/session/`).
    pub fn default_path() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".auth-bridge")
            .join("session");
        Self { base_dir: base }
    }

    /// Create a cache backed by a custom directory (useful for testing).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create a cache from config, expanding a leading `~/` against the
    /// home directory.
    pub fn from_config(config: &CacheConfig) -> Self {
        let dir = &config.dir;
        let base = match dir.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(rest),
            None => PathBuf::from(dir),
        };
        Self { base_dir: base }
    }

    fn ensure_dir(&self) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Persist a session reported by the authority.
    ///
    /// User and profile land before the token; profile is written only
    /// when the response carried one (an existing profile entry is left
    /// in place otherwise, matching what the authority chose to omit).
    pub fn store_session(&self, session: &AuthSession) -> Result<(), CacheError> {
        self.ensure_dir()?;
        let user_json = serde_json::to_string(&session.user)?;
        std::fs::write(self.entry_path(USER_ENTRY), user_json)?;
        if let Some(profile) = &session.profile {
            let profile_json = serde_json::to_string(profile)?;
            std::fs::write(self.entry_path(PROFILE_ENTRY), profile_json)?;
        }
        // Token last: its presence is what marks the session authenticated.
        std::fs::write(self.entry_path(TOKEN_ENTRY), &session.token)?;
        tracing::debug!(login = %session.user.login, "auth session cached");
        Ok(())
    }

    /// Remove all three entries. Best-effort and unconditional: missing
    /// entries and removal failures are not errors, and the token goes
    /// first so no observer sees a token outliving its user record.
    pub fn clear(&self) {
        for name in [TOKEN_ENTRY, USER_ENTRY, PROFILE_ENTRY] {
            let path = self.entry_path(name);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(entry = name, error = %e, "failed to clear cache entry");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// The cached opaque token, if any.
    pub fn token(&self) -> Option<String> {
        std::fs::read_to_string(self.entry_path(TOKEN_ENTRY)).ok()
    }

    /// The cached user record. A malformed entry reads as absent.
    pub fn user(&self) -> Option<User> {
        self.read_json(USER_ENTRY)
    }

    /// The cached profile record. A malformed entry reads as absent.
    pub fn profile(&self) -> Option<Profile> {
        self.read_json(PROFILE_ENTRY)
    }

    /// True iff a token is cached. Purely local and possibly stale
    /// relative to the authority.
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        let data = std::fs::read_to_string(self.entry_path(name)).ok()?;
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(entry = name, error = %e, "malformed cache entry treated as absent");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
