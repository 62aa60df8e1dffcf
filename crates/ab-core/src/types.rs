use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity records
// ---------------------------------------------------------------------------

/// The identity record reported by the authentication authority.
///
/// Only `login` is guaranteed; everything else depends on what the
/// authority chooses to include in its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Extended identity record, present only when the authority supplies one.
///
/// The shape is authority-defined beyond the two common fields, so
/// unrecognized fields are preserved through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// AuthSession
// ---------------------------------------------------------------------------

/// The locally cached sign-in state as last reported by the authority.
///
/// `token` and `user` always travel together; `profile` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

// ---------------------------------------------------------------------------
// AuthResult
// ---------------------------------------------------------------------------

/// Normalized outcome of `init`/`get_auth`, always delivered as a value.
///
/// Protocol failures (readiness timeout, closed channel) surface here via
/// `error` with `authenticated == false`; they are never raised as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthResult {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthResult {
    /// A non-authenticated result carrying an error tag.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_tolerates_unknown_fields() {
        let user: User = serde_json::from_value(json!({
            "login": "octocat",
            "plan": "free",
            "two_factor": true
        }))
        .unwrap();
        assert_eq!(user.login, "octocat");
        assert!(user.email.is_none());
    }

    #[test]
    fn profile_preserves_extra_fields() {
        let profile: Profile = serde_json::from_value(json!({
            "display_name": "Octo",
            "locale": "en-US"
        }))
        .unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Octo"));
        assert_eq!(profile.extra.get("locale").unwrap(), "en-US");

        let back = serde_json::to_value(&profile).unwrap();
        assert_eq!(back.get("locale").unwrap(), "en-US");
    }

    #[test]
    fn failure_result_shape() {
        let result = AuthResult::failure("Bridge timeout");
        assert!(!result.authenticated);
        assert_eq!(result.error.as_deref(), Some("Bridge timeout"));
        assert!(result.token.is_none());
        assert!(result.user.is_none());
    }

    #[test]
    fn auth_result_serializes_without_absent_fields() {
        let value = serde_json::to_value(AuthResult::failure("nope")).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj.get("authenticated").unwrap(), false);
        assert_eq!(obj.get("error").unwrap(), "nope");
    }
}
