//! AuthCoordinator - the device-code authentication state machine
//!
//! States: no flow, flow pending, authenticated. Every call to
//! [`AuthCoordinator::acquire_credential`] tries, in order:
//!
//! 1. silent acquisition from the token store (cached token, then refresh token)
//! 2. one poll of the pending device flow, if there is one
//! 3. starting a new device flow
//!
//! The whole evaluation runs under one async mutex, so concurrent callers
//! observe and reuse the same pending flow.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::Result;
use crate::error::Error;
use super::cache::{AccessToken, TokenCache, TokenStore};
use super::provider::{
    DeviceFlow, DevicePoll, IdentityProvider, MicrosoftIdentity, RefreshOutcome, SLOW_DOWN_STEP_SECS,
};

const PENDING_MESSAGE: &str = "Authentication still pending. Please complete login.";
const REQUIRED_MESSAGE: &str = "Please authenticate, then call the tool again.";

/// Status tag carried in an [`AuthPrompt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    AuthenticationRequired,
    AuthenticationPending,
}

/// User-actionable sign-in instructions.
///
/// Serialized verbatim into tool results so the model and the user see the
/// same code and URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthPrompt {
    pub status: AuthStatus,
    pub verification_uri: String,
    pub user_code: String,
    pub message: String,
}

impl AuthPrompt {
    fn required(flow: &DeviceFlow) -> Self {
        Self {
            status: AuthStatus::AuthenticationRequired,
            verification_uri: flow.verification_uri.clone(),
            user_code: flow.user_code.clone(),
            message: flow.message.clone().unwrap_or_else(|| REQUIRED_MESSAGE.to_string()),
        }
    }

    fn pending(flow: &DeviceFlow) -> Self {
        Self {
            status: AuthStatus::AuthenticationPending,
            verification_uri: flow.verification_uri.clone(),
            user_code: flow.user_code.clone(),
            message: PENDING_MESSAGE.to_string(),
        }
    }

    /// JSON form handed to the model.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "verification_uri": self.verification_uri,
            "user_code": self.user_code,
            "message": self.message,
        })
    }
}

/// Outcome of [`AuthCoordinator::acquire_credential`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Success(AccessToken),
    /// A device flow is in progress; the user has not finished yet.
    Pending(AuthPrompt),
    /// A device flow was just started.
    Required(AuthPrompt),
}

impl Credential {
    /// The sign-in instructions, unless the credential is usable.
    pub fn prompt(&self) -> Option<&AuthPrompt> {
        match self {
            Credential::Success(_) => None,
            Credential::Pending(prompt) | Credential::Required(prompt) => Some(prompt),
        }
    }
}

/// Sign-in state as reported by `status`, without touching the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInState {
    SignedIn { username: String },
    FlowPending { user_code: String, verification_uri: String },
    SignedOut,
}

struct AuthState {
    store: TokenStore,
    pending: Option<DeviceFlow>,
}

/// Owns the identity provider, the token cache and at most one device flow.
pub struct AuthCoordinator {
    provider: Arc<dyn IdentityProvider>,
    cache: TokenCache,
    scopes: Vec<String>,
    state: Mutex<AuthState>,
}

impl AuthCoordinator {
    /// Create a coordinator, reading the persisted cache once.
    pub fn new(provider: Arc<dyn IdentityProvider>, cache: TokenCache, scopes: Vec<String>) -> Self {
        let store = cache
            .load()
            .map(|blob| TokenStore::from_blob(&blob))
            .unwrap_or_default();

        Self {
            provider,
            cache,
            scopes,
            state: Mutex::new(AuthState { store, pending: None }),
        }
    }

    /// Build the Microsoft identity coordinator described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = MicrosoftIdentity::new(&config.client_id, &config.authority)?;
        Ok(Self::new(
            Arc::new(provider),
            TokenCache::new(&config.token_cache_path),
            config.scopes.clone(),
        ))
    }

    /// Get a credential for Microsoft Graph. Safe to call once per request.
    pub async fn acquire_credential(&self) -> Result<Credential> {
        let mut state = self.state.lock().await;

        if let Some(token) = self.acquire_silent(&mut state).await? {
            return Ok(Credential::Success(token));
        }

        if let Some(flow) = state.pending.clone() {
            if flow.is_expired() {
                info!("Device flow expired, starting a new one");
                state.pending = None;
            } else {
                match self.provider.poll_device_flow(&flow).await? {
                    DevicePoll::Complete(grant) => {
                        info!("Device flow completed");
                        let token = state.store.store_grant(grant);
                        state.pending = None;
                        self.flush(&mut state.store);
                        return Ok(Credential::Success(token));
                    }
                    DevicePoll::Pending => {
                        debug!("Device flow still pending");
                        return Ok(Credential::Pending(AuthPrompt::pending(&flow)));
                    }
                    DevicePoll::SlowDown => {
                        if let Some(pending) = state.pending.as_mut() {
                            pending.interval += SLOW_DOWN_STEP_SECS;
                        }
                        return Ok(Credential::Pending(AuthPrompt::pending(&flow)));
                    }
                    DevicePoll::Abandoned(reason) => {
                        warn!("Device flow abandoned ({}), starting a new one", reason);
                        state.pending = None;
                    }
                }
            }
        }

        let flow = self.provider.initiate_device_flow(&self.scopes).await?;
        if flow.user_code.is_empty() {
            return Err(Error::AuthConfiguration("Failed to initiate device flow".to_string()));
        }

        info!("Started device flow, user code {}", flow.user_code);
        let prompt = AuthPrompt::required(&flow);
        state.pending = Some(flow);
        Ok(Credential::Required(prompt))
    }

    /// Cached access token, else refresh token. `None` means interaction is needed.
    async fn acquire_silent(&self, state: &mut AuthState) -> Result<Option<AccessToken>> {
        if state.store.account().is_none() {
            return Ok(None);
        }

        if let Some(token) = state.store.cached_access_token() {
            debug!("Using cached access token");
            return Ok(Some(token));
        }

        let Some(refresh_token) = state.store.refresh_token().map(str::to_string) else {
            return Ok(None);
        };

        match self.provider.refresh(&refresh_token, &self.scopes).await? {
            RefreshOutcome::Refreshed(grant) => {
                debug!("Access token refreshed");
                let token = state.store.store_grant(grant);
                self.flush(&mut state.store);
                Ok(Some(token))
            }
            RefreshOutcome::Rejected(reason) => {
                warn!("Refresh token rejected ({}), sign-in required", reason);
                state.store.remove_account();
                self.flush(&mut state.store);
                Ok(None)
            }
        }
    }

    /// Persist the store, only if the provider state actually changed.
    fn flush(&self, store: &mut TokenStore) {
        if !store.has_state_changed() {
            return;
        }
        match store.to_blob() {
            Ok(blob) => self.cache.save(&blob),
            Err(e) => warn!("Failed to serialize token cache: {}", e),
        }
    }

    /// Drive the device flow to completion, sleeping between polls.
    ///
    /// `on_prompt` runs whenever a new flow is started.
    pub async fn wait_for_login<F>(&self, on_prompt: F) -> Result<AccessToken>
    where
        F: Fn(&AuthPrompt),
    {
        loop {
            match self.acquire_credential().await? {
                Credential::Success(token) => return Ok(token),
                Credential::Required(prompt) => on_prompt(&prompt),
                Credential::Pending(_) => {}
            }
            tokio::time::sleep(self.poll_interval().await).await;
        }
    }

    async fn poll_interval(&self) -> Duration {
        let state = self.state.lock().await;
        let secs = state.pending.as_ref().map(|f| f.interval).unwrap_or(5);
        Duration::from_secs(secs)
    }

    /// Forget the signed-in account and any pending flow.
    pub async fn logout(&self) {
        let mut state = self.state.lock().await;
        state.pending = None;
        state.store.remove_account();
        self.flush(&mut state.store);
    }

    pub async fn status(&self) -> SignInState {
        let state = self.state.lock().await;
        if let Some(account) = state.store.account() {
            return SignInState::SignedIn {
                username: account.username.clone(),
            };
        }
        match &state.pending {
            Some(flow) => SignInState::FlowPending {
                user_code: flow.user_code.clone(),
                verification_uri: flow.verification_uri.clone(),
            },
            None => SignInState::SignedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cache::grant;
    use crate::auth::provider::FakeIdentityProvider;

    fn scopes() -> Vec<String> {
        vec!["offline_access".to_string(), "Mail.Read".to_string()]
    }

    fn coordinator(provider: Arc<FakeIdentityProvider>, dir: &tempfile::TempDir) -> AuthCoordinator {
        let cache = TokenCache::new(dir.path().join("token_cache.json"));
        AuthCoordinator::new(provider, cache, scopes())
    }

    fn seed_cache(dir: &tempfile::TempDir, access_token: &str, expires_in: i64) {
        let mut store = TokenStore::default();
        store.store_grant(grant(access_token, expires_in));
        let blob = store.to_blob().unwrap();
        TokenCache::new(dir.path().join("token_cache.json")).save(&blob);
    }

    #[tokio::test]
    async fn test_first_call_requires_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = coordinator(provider.clone(), &dir);

        match auth.acquire_credential().await.unwrap() {
            Credential::Required(prompt) => {
                assert_eq!(prompt.user_code, "ABC-123");
                assert_eq!(prompt.verification_uri, "https://microsoft.com/devicelogin");
                assert_eq!(prompt.status, AuthStatus::AuthenticationRequired);
            }
            other => panic!("expected Required, got {:?}", other),
        }
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 1);
    }

    #[tokio::test]
    async fn test_full_device_flow_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = coordinator(provider.clone(), &dir);

        assert!(matches!(auth.acquire_credential().await.unwrap(), Credential::Required(_)));

        for _ in 0..3 {
            match auth.acquire_credential().await.unwrap() {
                Credential::Pending(prompt) => {
                    assert_eq!(prompt.user_code, "ABC-123");
                    assert_eq!(prompt.status, AuthStatus::AuthenticationPending);
                }
                other => panic!("expected Pending, got {:?}", other),
            }
        }
        assert!(matches!(auth.status().await, SignInState::FlowPending { .. }));

        provider.approve();

        let first = auth.acquire_credential().await.unwrap();
        assert_eq!(first, Credential::Success(AccessToken::new("tok-device")));
        let polls_after_completion = FakeIdentityProvider::count(&provider.polls);

        for _ in 0..3 {
            let next = auth.acquire_credential().await.unwrap();
            assert_eq!(next, Credential::Success(AccessToken::new("tok-device")));
        }

        // Later successes are silent: no more polls, no new flows
        assert_eq!(FakeIdentityProvider::count(&provider.polls), polls_after_completion);
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 1);
        assert!(dir.path().join("token_cache.json").exists());
    }

    #[tokio::test]
    async fn test_silent_acquisition_from_cached_token() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(&dir, "tok1", 3600);
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = coordinator(provider.clone(), &dir);

        let credential = auth.acquire_credential().await.unwrap();

        assert_eq!(credential, Credential::Success(AccessToken::new("tok1")));
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 0);
        assert_eq!(FakeIdentityProvider::count(&provider.refreshes), 0);
    }

    #[tokio::test]
    async fn test_silent_acquisition_by_refresh() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(&dir, "stale", 0);
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123").refreshing_to("tok1"));
        let auth = coordinator(provider.clone(), &dir);

        let credential = auth.acquire_credential().await.unwrap();

        assert_eq!(credential, Credential::Success(AccessToken::new("tok1")));
        assert_eq!(FakeIdentityProvider::count(&provider.refreshes), 1);
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 0);

        // The refreshed token was persisted
        let blob = std::fs::read_to_string(dir.path().join("token_cache.json")).unwrap();
        let store = TokenStore::from_blob(&blob);
        assert_eq!(store.cached_access_token(), Some(AccessToken::new("tok1")));
    }

    #[tokio::test]
    async fn test_rejected_refresh_returns_to_device_flow() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(&dir, "stale", 0);
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = coordinator(provider.clone(), &dir);

        let credential = auth.acquire_credential().await.unwrap();

        assert!(matches!(credential, Credential::Required(_)));
        assert_eq!(FakeIdentityProvider::count(&provider.refreshes), 1);
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 1);
    }

    #[tokio::test]
    async fn test_authenticated_calls_never_touch_pending_flow() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(&dir, "tok1", 3600);
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = coordinator(provider.clone(), &dir);

        for _ in 0..5 {
            auth.acquire_credential().await.unwrap();
        }

        assert!(matches!(auth.status().await, SignInState::SignedIn { .. }));
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 0);
        assert_eq!(FakeIdentityProvider::count(&provider.polls), 0);
    }

    #[tokio::test]
    async fn test_expired_flow_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123").with_expired_flows());
        let auth = coordinator(provider.clone(), &dir);

        assert!(matches!(auth.acquire_credential().await.unwrap(), Credential::Required(_)));
        assert!(matches!(auth.acquire_credential().await.unwrap(), Credential::Required(_)));

        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 2);
        assert_eq!(FakeIdentityProvider::count(&provider.polls), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_flow() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = Arc::new(coordinator(provider.clone(), &dir));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move { auth.acquire_credential().await })
            })
            .collect();

        let mut required = 0;
        for handle in handles {
            let credential = handle.await.unwrap().unwrap();
            let prompt = credential.prompt().expect("no token was ever granted");
            assert_eq!(prompt.user_code, "ABC-123");
            if matches!(credential, Credential::Required(_)) {
                required += 1;
            }
        }

        assert_eq!(required, 1);
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 1);
    }

    #[tokio::test]
    async fn test_cache_not_written_without_state_change() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = coordinator(provider, &dir);

        auth.acquire_credential().await.unwrap();
        auth.acquire_credential().await.unwrap();

        assert!(!dir.path().join("token_cache.json").exists());
    }

    #[tokio::test]
    async fn test_logout_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(&dir, "tok1", 3600);
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = coordinator(provider.clone(), &dir);

        auth.logout().await;

        assert_eq!(auth.status().await, SignInState::SignedOut);
        let blob = std::fs::read_to_string(dir.path().join("token_cache.json")).unwrap();
        assert!(TokenStore::from_blob(&blob).account().is_none());
        assert!(matches!(auth.acquire_credential().await.unwrap(), Credential::Required(_)));
    }

    #[tokio::test]
    async fn test_wait_for_login_prompts_once() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        provider.approve();
        let auth = coordinator(provider.clone(), &dir);

        let prompts = std::sync::atomic::AtomicUsize::new(0);
        let token = auth
            .wait_for_login(|_| {
                prompts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(token.secret(), "tok-device");
        assert_eq!(prompts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_down_widens_interval_and_keeps_code() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeIdentityProvider::new("ABC-123").polls_answered_with(vec![DevicePoll::SlowDown]),
        );
        let auth = coordinator(provider.clone(), &dir);

        assert!(matches!(auth.acquire_credential().await.unwrap(), Credential::Required(_)));
        assert_eq!(auth.poll_interval().await, Duration::from_secs(1));

        match auth.acquire_credential().await.unwrap() {
            Credential::Pending(prompt) => assert_eq!(prompt.user_code, "ABC-123"),
            other => panic!("expected Pending, got {:?}", other),
        }
        assert_eq!(auth.poll_interval().await, Duration::from_secs(1 + SLOW_DOWN_STEP_SECS));
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 1);
    }

    #[tokio::test]
    async fn test_abandoned_flow_restarts_in_same_call() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            FakeIdentityProvider::new("ABC-123")
                .polls_answered_with(vec![DevicePoll::Abandoned("authorization_declined".to_string())]),
        );
        let auth = coordinator(provider.clone(), &dir);

        assert!(matches!(auth.acquire_credential().await.unwrap(), Credential::Required(_)));
        match auth.acquire_credential().await.unwrap() {
            Credential::Required(prompt) => {
                assert_eq!(prompt.status, AuthStatus::AuthenticationRequired)
            }
            other => panic!("expected a fresh Required, got {:?}", other),
        }

        assert_eq!(FakeIdentityProvider::count(&provider.polls), 1);
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 2);
    }

    #[tokio::test]
    async fn test_refresh_outage_keeps_account() {
        let dir = tempfile::tempdir().unwrap();
        seed_cache(&dir, "stale", 0);
        let provider = Arc::new(FakeIdentityProvider::new("ABC-123").with_refresh_outage());
        let auth = coordinator(provider.clone(), &dir);

        let err = auth.acquire_credential().await.unwrap_err();

        assert!(matches!(err, Error::Auth(_)));
        assert!(matches!(auth.status().await, SignInState::SignedIn { .. }));
        assert_eq!(FakeIdentityProvider::count(&provider.initiated), 0);
        let blob = std::fs::read_to_string(dir.path().join("token_cache.json")).unwrap();
        assert_eq!(TokenStore::from_blob(&blob).refresh_token(), Some("rt-1"));
    }

    #[test]
    fn test_prompt_json_shape() {
        let flow = DeviceFlow {
            device_code: "dc".to_string(),
            user_code: "ABC-123".to_string(),
            verification_uri: "https://microsoft.com/devicelogin".to_string(),
            message: None,
            expires_at: chrono::Utc::now(),
            interval: 5,
        };
        let json = AuthPrompt::pending(&flow).to_json();
        assert_eq!(json["status"], "authentication_pending");
        assert_eq!(json["user_code"], "ABC-123");
    }
}
