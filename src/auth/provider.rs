//! Identity provider - Microsoft identity platform device-code and refresh grants
//!
//! [`IdentityProvider`] is the seam the [`AuthCoordinator`](super::AuthCoordinator)
//! talks through. Every method performs at most one HTTP round trip; polling
//! cadence is the caller's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::Result;
use crate::error::Error;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Token endpoint errors meaning the refresh token can never be redeemed.
const REFRESH_REJECTIONS: &[&str] = &["invalid_grant", "interaction_required"];

/// Seconds added to the poll interval when the provider answers `slow_down`.
pub const SLOW_DOWN_STEP_SECS: u64 = 5;

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// An in-flight device authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFlow {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
    /// Seconds to wait between polls
    pub interval: u64,
}

impl DeviceFlow {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Result of a single device-flow poll
#[derive(Debug, Clone)]
pub enum DevicePoll {
    /// The user finished signing in.
    Complete(TokenGrant),
    /// `authorization_pending`
    Pending,
    /// `slow_down`: still pending, poll less often.
    SlowDown,
    /// The flow can never complete (expired, declined, bad code).
    Abandoned(String),
}

/// Result of redeeming a refresh token
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed(TokenGrant),
    /// The provider refused the refresh token; the user must sign in again.
    Rejected(String),
}

/// Identity provider trait - swappable for tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a device authorization for the given scopes.
    async fn initiate_device_flow(&self, scopes: &[String]) -> Result<DeviceFlow>;

    /// Poll the token endpoint once for a pending flow.
    async fn poll_device_flow(&self, flow: &DeviceFlow) -> Result<DevicePoll>;

    /// Redeem a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str, scopes: &[String]) -> Result<RefreshOutcome>;
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    #[serde(default)]
    device_code: Option<String>,
    #[serde(default)]
    user_code: Option<String>,
    #[serde(default)]
    verification_uri: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Public-client device-code authentication against `login.microsoftonline.com`.
#[derive(Clone)]
pub struct MicrosoftIdentity {
    client_id: String,
    device_code_url: Url,
    token_url: Url,
    http_client: Client,
}

impl MicrosoftIdentity {
    /// Create a provider for a client ID and authority such as
    /// `https://login.microsoftonline.com/common`.
    pub fn new(client_id: &str, authority: &str) -> Result<Self> {
        if client_id.trim().is_empty() {
            return Err(Error::AuthConfiguration("client ID is empty".to_string()));
        }

        let base = Url::parse(&format!("{}/", authority.trim_end_matches('/')))
            .map_err(|e| Error::AuthConfiguration(format!("Invalid authority: {}", e)))?;
        let device_code_url = base
            .join("oauth2/v2.0/devicecode")
            .map_err(|e| Error::AuthConfiguration(format!("Invalid authority: {}", e)))?;
        let token_url = base
            .join("oauth2/v2.0/token")
            .map_err(|e| Error::AuthConfiguration(format!("Invalid authority: {}", e)))?;

        Ok(Self {
            client_id: client_id.to_string(),
            device_code_url,
            token_url,
            http_client: Client::new(),
        })
    }

    async fn token_error(response: reqwest::Response) -> TokenErrorResponse {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        serde_json::from_str(&text).unwrap_or(TokenErrorResponse {
            error: format!("http_{}", status.as_u16()),
            error_description: Some(text),
        })
    }
}

#[async_trait]
impl IdentityProvider for MicrosoftIdentity {
    async fn initiate_device_flow(&self, scopes: &[String]) -> Result<DeviceFlow> {
        let scope = scopes.join(" ");
        let response = self
            .http_client
            .post(self.device_code_url.clone())
            .form(&[("client_id", self.client_id.as_str()), ("scope", scope.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::token_error(response).await;
            return Err(Error::AuthConfiguration(format!(
                "Failed to initiate device flow: {} {}",
                err.error,
                err.error_description.unwrap_or_default()
            )));
        }

        let body: DeviceCodeResponse = response.json().await?;

        let user_code = body
            .user_code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::AuthConfiguration("Failed to initiate device flow".to_string()))?;
        let device_code = body
            .device_code
            .ok_or_else(|| Error::AuthConfiguration("Device flow response has no device code".to_string()))?;

        debug!("Device flow initiated, expires in {:?}s", body.expires_in);

        Ok(DeviceFlow {
            device_code,
            user_code,
            verification_uri: body
                .verification_uri
                .unwrap_or_else(|| "https://microsoft.com/devicelogin".to_string()),
            message: body.message,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in.unwrap_or(900)),
            interval: body.interval.unwrap_or(5),
        })
    }

    async fn poll_device_flow(&self, flow: &DeviceFlow) -> Result<DevicePoll> {
        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT),
                ("client_id", self.client_id.as_str()),
                ("device_code", flow.device_code.as_str()),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(DevicePoll::Complete(response.json().await?));
        }

        let err = Self::token_error(response).await;
        debug!("Device flow poll: {}", err.error);

        match err.error.as_str() {
            "authorization_pending" => Ok(DevicePoll::Pending),
            "slow_down" => Ok(DevicePoll::SlowDown),
            code @ ("expired_token" | "authorization_declined" | "bad_verification_code" | "code_expired") => {
                Ok(DevicePoll::Abandoned(code.to_string()))
            }
            other => Err(Error::Auth(format!(
                "Device flow poll failed: {} {}",
                other,
                err.error_description.unwrap_or_default()
            ))),
        }
    }

    async fn refresh(&self, refresh_token: &str, scopes: &[String]) -> Result<RefreshOutcome> {
        let scope = scopes.join(" ");
        let response = self
            .http_client
            .post(self.token_url.clone())
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(RefreshOutcome::Refreshed(response.json().await?));
        }

        let status = response.status();
        let err = Self::token_error(response).await;

        // Only a refused grant ends the session; throttling and outages are retried later
        if REFRESH_REJECTIONS.contains(&err.error.as_str()) {
            Ok(RefreshOutcome::Rejected(err.error))
        } else {
            Err(Error::Auth(format!("Token refresh failed: {} ({})", err.error, status)))
        }
    }
}

/// Scripted identity provider for tests.
#[cfg(test)]
pub struct FakeIdentityProvider {
    user_code: String,
    flow_ttl_secs: i64,
    approved: std::sync::atomic::AtomicBool,
    refresh_with: std::sync::Mutex<Option<String>>,
    refresh_outage: std::sync::atomic::AtomicBool,
    poll_script: std::sync::Mutex<std::collections::VecDeque<DevicePoll>>,
    pub initiated: std::sync::atomic::AtomicUsize,
    pub polls: std::sync::atomic::AtomicUsize,
    pub refreshes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl FakeIdentityProvider {
    /// A provider that always grants device flows with `user_code`.
    pub fn new(user_code: &str) -> Self {
        Self {
            user_code: user_code.to_string(),
            flow_ttl_secs: 900,
            approved: std::sync::atomic::AtomicBool::new(false),
            refresh_with: std::sync::Mutex::new(None),
            refresh_outage: std::sync::atomic::AtomicBool::new(false),
            poll_script: std::sync::Mutex::new(std::collections::VecDeque::new()),
            initiated: Default::default(),
            polls: Default::default(),
            refreshes: Default::default(),
        }
    }

    /// Device flows that are already expired when issued.
    pub fn with_expired_flows(mut self) -> Self {
        self.flow_ttl_secs = -1;
        self
    }

    /// Refresh tokens are redeemed for `access_token`.
    pub fn refreshing_to(self, access_token: &str) -> Self {
        *self.refresh_with.lock().unwrap() = Some(access_token.to_string());
        self
    }

    /// The token endpoint fails with a transient error on refresh.
    pub fn with_refresh_outage(self) -> Self {
        self.refresh_outage.store(true, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Answer the next polls with `outcomes`, in order, before falling back
    /// to pending or approved.
    pub fn polls_answered_with(self, outcomes: Vec<DevicePoll>) -> Self {
        self.poll_script.lock().unwrap().extend(outcomes);
        self
    }

    /// Simulate the user completing sign-in in the browser.
    pub fn approve(&self) {
        self.approved.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn count(counter: &std::sync::atomic::AtomicUsize) -> usize {
        counter.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn initiate_device_flow(&self, _scopes: &[String]) -> Result<DeviceFlow> {
        use std::sync::atomic::Ordering;

        tokio::task::yield_now().await;
        let n = self.initiated.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DeviceFlow {
            device_code: format!("device-{}", n),
            user_code: self.user_code.clone(),
            verification_uri: "https://microsoft.com/devicelogin".to_string(),
            message: None,
            expires_at: Utc::now() + chrono::Duration::seconds(self.flow_ttl_secs),
            interval: 1,
        })
    }

    async fn poll_device_flow(&self, _flow: &DeviceFlow) -> Result<DevicePoll> {
        use std::sync::atomic::Ordering;

        self.polls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.poll_script.lock().unwrap().pop_front() {
            return Ok(outcome);
        }
        if self.approved.load(Ordering::SeqCst) {
            Ok(DevicePoll::Complete(super::cache::grant("tok-device", 3600)))
        } else {
            Ok(DevicePoll::Pending)
        }
    }

    async fn refresh(&self, _refresh_token: &str, _scopes: &[String]) -> Result<RefreshOutcome> {
        use std::sync::atomic::Ordering;

        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.refresh_outage.load(Ordering::SeqCst) {
            return Err(Error::Auth("Token refresh failed: temporarily_unavailable (503)".to_string()));
        }
        match self.refresh_with.lock().unwrap().clone() {
            Some(token) => Ok(RefreshOutcome::Refreshed(super::cache::grant(&token, 3600))),
            None => Ok(RefreshOutcome::Rejected("invalid_grant".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes() -> Vec<String> {
        vec!["offline_access".to_string(), "Mail.Read".to_string()]
    }

    #[test]
    fn test_rejects_empty_client_id() {
        let err = MicrosoftIdentity::new("  ", "https://login.microsoftonline.com/common")
            .err()
            .unwrap();
        assert!(matches!(err, Error::AuthConfiguration(_)));
    }

    #[test]
    fn test_endpoints_keep_tenant_segment() {
        let idp = MicrosoftIdentity::new("client", "https://login.microsoftonline.com/common").unwrap();
        assert_eq!(
            idp.token_url.as_str(),
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );
        assert_eq!(
            idp.device_code_url.as_str(),
            "https://login.microsoftonline.com/common/oauth2/v2.0/devicecode"
        );
    }

    #[tokio::test]
    async fn test_initiate_device_flow() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/common/oauth2/v2.0/devicecode")
            .with_status(200)
            .with_body(
                r#"{"device_code":"dc","user_code":"ABC-123","verification_uri":"https://microsoft.com/devicelogin","expires_in":900,"interval":5,"message":"Go sign in"}"#,
            )
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        let flow = idp.initiate_device_flow(&scopes()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(flow.user_code, "ABC-123");
        assert_eq!(flow.interval, 5);
        assert!(!flow.is_expired());
    }

    #[tokio::test]
    async fn test_initiate_without_user_code_is_configuration_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/common/oauth2/v2.0/devicecode")
            .with_status(200)
            .with_body(r#"{"device_code":"dc"}"#)
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        let err = idp.initiate_device_flow(&scopes()).await.unwrap_err();
        assert!(matches!(err, Error::AuthConfiguration(_)));
    }

    fn pending_flow() -> DeviceFlow {
        DeviceFlow {
            device_code: "dc".to_string(),
            user_code: "ABC-123".to_string(),
            verification_uri: "https://microsoft.com/devicelogin".to_string(),
            message: None,
            expires_at: Utc::now() + chrono::Duration::seconds(900),
            interval: 5,
        }
    }

    #[tokio::test]
    async fn test_poll_pending() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error":"authorization_pending"}"#)
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        assert!(matches!(
            idp.poll_device_flow(&pending_flow()).await.unwrap(),
            DevicePoll::Pending
        ));
    }

    #[tokio::test]
    async fn test_poll_complete() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(200)
            .with_body(r#"{"access_token":"tok1","refresh_token":"rt","expires_in":3600}"#)
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        match idp.poll_device_flow(&pending_flow()).await.unwrap() {
            DevicePoll::Complete(grant) => assert_eq!(grant.access_token, "tok1"),
            other => panic!("unexpected poll result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_expired_code_abandons_flow() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error":"expired_token"}"#)
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        assert!(matches!(
            idp.poll_device_flow(&pending_flow()).await.unwrap(),
            DevicePoll::Abandoned(_)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"AADSTS70000"}"#)
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        match idp.refresh("rt", &scopes()).await.unwrap() {
            RefreshOutcome::Rejected(reason) => assert_eq!(reason, "invalid_grant"),
            other => panic!("unexpected refresh result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_throttled_is_error_not_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(429)
            .with_body(r#"{"error":"temporarily_unavailable"}"#)
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        let err = idp.refresh("rt", &scopes()).await.unwrap_err();
        assert!(matches!(err, Error::Auth(msg) if msg.contains("temporarily_unavailable")));
    }

    #[tokio::test]
    async fn test_refresh_interaction_required_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/common/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error":"interaction_required"}"#)
            .create_async()
            .await;

        let idp = MicrosoftIdentity::new("client", &format!("{}/common", server.url())).unwrap();
        assert!(matches!(
            idp.refresh("rt", &scopes()).await.unwrap(),
            RefreshOutcome::Rejected(_)
        ));
    }
}
