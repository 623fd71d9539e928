//! Token cache persistence
//!
//! [`TokenStore`] is the in-memory view of the identity cache (signed-in
//! account, refresh token, current access token). It serializes to an opaque
//! blob that [`TokenCache`] writes to `~/.m365-assistant/token_cache.json`.

use std::fmt;
use std::path::PathBuf;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::Result;
use super::provider::TokenGrant;

/// Access tokens are treated as expired this long before their real expiry.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Bearer token for Microsoft Graph. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// The signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
}

impl Account {
    /// Build the account from an ID token's `preferred_username` claim.
    ///
    /// The token is only decoded, not validated; it came straight from the
    /// token endpoint over TLS.
    pub fn from_id_token(id_token: Option<&str>) -> Self {
        let username = id_token
            .and_then(|t| t.split('.').nth(1))
            .and_then(|payload| {
                base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .decode(payload.trim_end_matches('='))
                    .ok()
            })
            .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok())
            .and_then(|claims| {
                claims
                    .get("preferred_username")
                    .or_else(|| claims.get("email"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "unknown".to_string());

        Self { username }
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct CachedAccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl CachedAccessToken {
    fn is_expired(&self) -> bool {
        Utc::now() + chrono::Duration::minutes(EXPIRY_BUFFER_MINUTES) >= self.expires_at
    }
}

/// Identity cache contents with change tracking.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TokenStore {
    #[serde(default)]
    account: Option<Account>,

    #[serde(default)]
    refresh_token: Option<String>,

    #[serde(default)]
    access_token: Option<CachedAccessToken>,

    #[serde(skip)]
    state_changed: bool,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("account", &self.account)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_access_token", &self.access_token.is_some())
            .field("state_changed", &self.state_changed)
            .finish()
    }
}

impl TokenStore {
    /// Restore a store from a cache blob. Anything unreadable is an empty store.
    pub fn from_blob(blob: &str) -> Self {
        if blob.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<TokenStore>(blob) {
            Ok(store) => store,
            Err(e) => {
                warn!("Ignoring unreadable token cache: {}", e);
                Self::default()
            }
        }
    }

    /// Serialize for persistence and reset the change flag.
    pub fn to_blob(&mut self) -> Result<String> {
        let blob = serde_json::to_string(self)?;
        self.state_changed = false;
        Ok(blob)
    }

    pub fn has_state_changed(&self) -> bool {
        self.state_changed
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// The cached access token, if it is still comfortably valid.
    pub fn cached_access_token(&self) -> Option<AccessToken> {
        self.access_token
            .as_ref()
            .filter(|t| !t.is_expired())
            .map(|t| AccessToken::new(t.secret.clone()))
    }

    /// Record a token grant from the provider and return its access token.
    ///
    /// A grant without a refresh token keeps the previous one, and a grant
    /// without an ID token keeps the previous account.
    pub fn store_grant(&mut self, grant: TokenGrant) -> AccessToken {
        let expires_in = grant.expires_in.unwrap_or(3600);
        self.access_token = Some(CachedAccessToken {
            secret: grant.access_token.clone(),
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        });

        if let Some(refresh) = grant.refresh_token {
            self.refresh_token = Some(refresh);
        }

        if grant.id_token.is_some() || self.account.is_none() {
            self.account = Some(Account::from_id_token(grant.id_token.as_deref()));
        }

        self.state_changed = true;
        AccessToken::new(grant.access_token)
    }

    /// Forget the signed-in account and all its tokens.
    pub fn remove_account(&mut self) {
        if self.account.is_some() || self.refresh_token.is_some() || self.access_token.is_some() {
            self.account = None;
            self.refresh_token = None;
            self.access_token = None;
            self.state_changed = true;
        }
    }
}

/// On-disk home of the serialized [`TokenStore`].
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the cache blob. A missing or unreadable file is an empty cache.
    pub fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(blob) => {
                debug!("Loaded token cache from {:?}", self.path);
                Some(blob)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read token cache {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Write the cache blob. Failures are logged, never returned.
    pub fn save(&self, blob: &str) {
        if let Err(e) = self.write(blob) {
            warn!("Failed to write token cache {:?}: {}", self.path, e);
        }
    }

    fn write(&self, blob: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&self.path, blob)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }

        debug!("Saved token cache to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn grant(access_token: &str, expires_in: i64) -> TokenGrant {
    TokenGrant {
        access_token: access_token.to_string(),
        refresh_token: Some("rt-1".to_string()),
        expires_in: Some(expires_in),
        id_token: None,
        scope: None,
    }
}
