use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use serde::Deserialize;
use tr_simulation::Mode;

use crate::error::{GatewayError, GatewayResult};

/// Shared secret header used in training and testing.
pub const AUTH_SECRET_HEADER: &str = "auth-secret";
/// Base64 JSON identity forwarded by the API gateway.
pub const USERINFO_HEADER: &str = "x-endpoint-api-userinfo";
/// Model name header used when connecting a remote model.
pub const MODEL_NAME_HEADER: &str = "model-name";

/// Secret accepted by the mock identity provider.
pub const MOCK_SECRET: &str = "MOCK-SECRET";
/// User the mock secret authenticates as.
pub const MOCK_USER_ID: &str = "MOCK-UID";

/// Request metadata with case-insensitive keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: HashMap<String, String>,
}

impl Metadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key`, replacing any earlier value.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_ascii_lowercase(), value.into());
    }

    /// The value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.insert(key.as_ref(), value);
        }
        metadata
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    /// Stable user id; owns agents and model sessions.
    #[serde(rename = "id")]
    pub user_id: String,
    /// Informational only.
    #[serde(default)]
    pub email: Option<String>,
    /// Informational only.
    #[serde(default)]
    pub issuer: Option<String>,
    /// `admin` unlocks world operations in prod.
    #[serde(default)]
    pub role: Option<String>,
}

impl Identity {
    /// An identity with only a user id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            issuer: None,
            role: None,
        }
    }

    /// Attach a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Whether the role is `admin`.
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some("admin")
    }
}

/// Establishes who is calling from request metadata.
pub trait IdentityProvider: fmt::Debug + Send + Sync {
    /// Resolve the caller, or fail with `Unauthenticated`.
    fn authenticate(&self, metadata: &Metadata) -> GatewayResult<Identity>;
}

/// Accepts one shared secret and maps it to a fixed user.
#[derive(Debug, Clone)]
pub struct MockIdentityProvider {
    secret: String,
    identity: Identity,
}

impl Default for MockIdentityProvider {
    fn default() -> Self {
        Self {
            secret: MOCK_SECRET.to_string(),
            identity: Identity::new(MOCK_USER_ID),
        }
    }
}

impl MockIdentityProvider {
    /// A provider accepting `secret` as `identity`.
    pub fn new(secret: impl Into<String>, identity: Identity) -> Self {
        Self {
            secret: secret.into(),
            identity,
        }
    }
}

impl IdentityProvider for MockIdentityProvider {
    fn authenticate(&self, metadata: &Metadata) -> GatewayResult<Identity> {
        match metadata.get(AUTH_SECRET_HEADER) {
            Some(secret) if secret == self.secret => Ok(self.identity.clone()),
            Some(_) => Err(GatewayError::Unauthenticated("unknown secret".to_string())),
            None => Err(GatewayError::Unauthenticated(format!(
                "missing {AUTH_SECRET_HEADER} header"
            ))),
        }
    }
}

/// Trusts the identity the API gateway forwards after verifying the token:
/// base64-encoded JSON `{id, email, issuer}` in `x-endpoint-api-userinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserInfoProvider;

impl UserInfoProvider {
    fn decode(raw: &str) -> Option<Vec<u8>> {
        let raw = raw.trim();
        STANDARD
            .decode(raw)
            .or_else(|_| URL_SAFE_NO_PAD.decode(raw))
            .or_else(|_| URL_SAFE.decode(raw))
            .ok()
    }
}

impl IdentityProvider for UserInfoProvider {
    fn authenticate(&self, metadata: &Metadata) -> GatewayResult<Identity> {
        let raw = metadata.get(USERINFO_HEADER).ok_or_else(|| {
            GatewayError::Unauthenticated(format!("missing {USERINFO_HEADER} header"))
        })?;
        let bytes = Self::decode(raw)
            .ok_or_else(|| GatewayError::Unauthenticated("userinfo is not base64".to_string()))?;
        let identity: Identity = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::Unauthenticated(format!("userinfo is not valid: {e}")))?;
        if identity.user_id.is_empty() {
            return Err(GatewayError::Unauthenticated("userinfo has an empty id".to_string()));
        }
        Ok(identity)
    }
}

/// The identity backend for a deployment mode.
pub fn provider_for(mode: Mode) -> Arc<dyn IdentityProvider> {
    if mode.uses_mock_identity() {
        Arc::new(MockIdentityProvider::default())
    } else {
        Arc::new(UserInfoProvider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn userinfo(json: &str) -> Metadata {
        Metadata::new().with(USERINFO_HEADER, STANDARD.encode(json))
    }

    #[test]
    fn metadata_keys_are_case_insensitive() {
        let metadata = Metadata::from_iter([("Auth-Secret", "x")]);
        assert_eq!(metadata.get("auth-secret"), Some("x"));
        assert_eq!(metadata.get("AUTH-SECRET"), Some("x"));
    }

    #[test]
    fn mock_secret_maps_to_mock_user() {
        let provider = MockIdentityProvider::default();
        let identity = provider
            .authenticate(&Metadata::new().with(AUTH_SECRET_HEADER, MOCK_SECRET))
            .unwrap();
        assert_eq!(identity.user_id, MOCK_USER_ID);
        assert!(!identity.is_admin());
    }

    #[test]
    fn mock_rejects_wrong_or_missing_secret() {
        let provider = MockIdentityProvider::default();
        let wrong = provider.authenticate(&Metadata::new().with(AUTH_SECRET_HEADER, "nope"));
        assert!(matches!(wrong, Err(GatewayError::Unauthenticated(_))));
        assert!(provider.authenticate(&Metadata::new()).is_err());
    }

    #[test]
    fn userinfo_decodes_identity() {
        let identity = UserInfoProvider
            .authenticate(&userinfo(
                r#"{"id":"MOCK-UID","email":"a@example.com","issuer":"https://issuer"}"#,
            ))
            .unwrap();
        assert_eq!(identity.user_id, "MOCK-UID");
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
        assert_eq!(identity.issuer.as_deref(), Some("https://issuer"));
    }

    #[test]
    fn userinfo_accepts_url_safe_without_padding() {
        let encoded = URL_SAFE_NO_PAD.encode(r#"{"id":"u1","role":"admin"}"#);
        let identity = UserInfoProvider
            .authenticate(&Metadata::new().with(USERINFO_HEADER, encoded))
            .unwrap();
        assert!(identity.is_admin());
    }

    #[test]
    fn userinfo_rejects_garbage() {
        let not_base64 = Metadata::new().with(USERINFO_HEADER, "***");
        assert!(UserInfoProvider.authenticate(&not_base64).is_err());
        assert!(UserInfoProvider.authenticate(&userinfo("{}")).is_err());
        assert!(UserInfoProvider.authenticate(&userinfo(r#"{"id":""}"#)).is_err());
        assert!(UserInfoProvider.authenticate(&Metadata::new()).is_err());
    }

    #[test]
    fn provider_follows_mode() {
        let training = provider_for(Mode::Training);
        let secret = Metadata::new().with(AUTH_SECRET_HEADER, MOCK_SECRET);
        assert!(training.authenticate(&secret).is_ok());
        let prod = provider_for(Mode::Prod);
        assert!(prod.authenticate(&secret).is_err());
    }
}
