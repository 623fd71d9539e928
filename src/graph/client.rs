//! Graph client - authenticated HTTP access to Microsoft Graph

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::auth::{AuthCoordinator, AuthPrompt, Credential};
use crate::Result;
use crate::error::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Either the result of an authenticated operation, or the sign-in
/// instructions that stood in the way.
///
/// A pending sign-in is an expected state, not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorized<T> {
    Done(T),
    Pending(AuthPrompt),
}

impl<T> Authorized<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Authorized<U> {
        match self {
            Authorized::Done(value) => Authorized::Done(f(value)),
            Authorized::Pending(prompt) => Authorized::Pending(prompt),
        }
    }
}

/// Microsoft Graph client that attaches the current bearer token to every call.
#[derive(Clone)]
pub struct GraphClient {
    auth: Arc<AuthCoordinator>,
    base_url: String,
    http_client: Client,
}

impl GraphClient {
    pub fn new(auth: Arc<AuthCoordinator>, base_url: &str) -> Result<Self> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            auth,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Authorization headers for a Graph call, or the pending sign-in prompt.
    ///
    /// This is the only place the bearer header is built.
    pub async fn headers(&self) -> Result<Authorized<HeaderMap>> {
        let token = match self.auth.acquire_credential().await? {
            Credential::Success(token) => token,
            Credential::Pending(prompt) | Credential::Required(prompt) => {
                return Ok(Authorized::Pending(prompt));
            }
        };

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.secret()))
            .map_err(|_| Error::Auth("Access token is not a valid header value".to_string()))?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Authorized::Done(headers))
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Authorized<Value>> {
        self.send(Method::GET, path, |req| req.query(query)).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Authorized<Value>> {
        self.send(Method::POST, path, |req| req.json(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Authorized<Value>> {
        self.send(Method::PATCH, path, |req| req.json(body)).await
    }

    async fn send<F>(&self, method: Method, path: &str, build: F) -> Result<Authorized<Value>>
    where
        F: FnOnce(RequestBuilder) -> RequestBuilder,
    {
        let headers = match self.headers().await? {
            Authorized::Done(headers) => headers,
            Authorized::Pending(prompt) => return Ok(Authorized::Pending(prompt)),
        };

        let url = format!("{}{}", self.base_url, path);
        debug!("Graph {} {}", method, url);

        let request = self.http_client.request(method, &url).headers(headers);
        let response = build(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Request {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Authorized::Done(Value::Null));
        }
        Ok(Authorized::Done(serde_json::from_str(&text)?))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::auth::{FakeIdentityProvider, TokenCache, TokenGrant, TokenStore};

    /// A Graph client pointed at `base_url` whose coordinator is either
    /// signed in with `tok1` or has never signed in.
    pub fn graph_client(base_url: &str, signed_in: bool) -> (GraphClient, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = TokenCache::new(dir.path().join("token_cache.json"));

        if signed_in {
            let mut store = TokenStore::default();
            store.store_grant(TokenGrant {
                access_token: "tok1".to_string(),
                refresh_token: Some("rt".to_string()),
                expires_in: Some(3600),
                id_token: None,
                scope: None,
            });
            cache.save(&store.to_blob().unwrap());
        }

        let provider = Arc::new(FakeIdentityProvider::new("ABC-123"));
        let auth = Arc::new(AuthCoordinator::new(provider, cache, vec!["Mail.Read".to_string()]));
        (GraphClient::new(auth, base_url).unwrap(), dir)
    }
}
