//! Authenticated HTTP plumbing.
//!
//! The refresh credential lives in an HTTP-only cookie managed by the
//! proxy; this client only ever sees the short-lived access token it
//! mints through `/api/auth/refresh`.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::token::TokenStore;

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
    access_token: Option<String>,
    token: Option<String>,
}

impl RefreshResponse {
    // The backend has answered with all three field names over time.
    fn into_token(self) -> Option<String> {
        self.access.or(self.access_token).or(self.token)
    }
}

pub struct AuthClient {
    http: Client,
    base_url: String,
    tokens: TokenStore,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            tokens: TokenStore::new(),
        })
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange the refresh cookie for a new access token and store it.
    pub async fn refresh(&self) -> Result<String, ClientError> {
        debug!("refreshing access token");
        let response = self
            .http
            .post(self.url("/api/auth/refresh"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::RefreshFailed(format!(
                "refresh endpoint returned {status}"
            )));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Payload(e.to_string()))?;
        let access = body
            .into_token()
            .ok_or_else(|| ClientError::RefreshFailed("no token in refresh response".into()))?;

        // set() rejects refresh-typed and undecodable tokens, so a
        // backend that hands back the wrong credential fails here
        // instead of poisoning the store.
        self.tokens.set(&access)?;
        Ok(access)
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&str>,
    ) -> RequestBuilder {
        let mut request = self.http.request(method, self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
    }

    /// Issue a request with the current access token. A 401 triggers
    /// exactly one refresh-and-retry cycle; if the refresh fails the
    /// original 401 response is handed back to the caller.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ClientError> {
        let token = match self.tokens.get() {
            Some(token) => Some(token),
            None => self.refresh().await.ok(),
        };

        let response = self
            .build(method.clone(), path, body, token.as_deref())
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(path, "got 401, attempting refresh");
        match self.refresh().await {
            Ok(new_token) => {
                let retried = self
                    .build(method, path, body, Some(&new_token))
                    .send()
                    .await?;
                Ok(retried)
            }
            Err(e) => {
                warn!(error = %e, "refresh failed, returning original 401");
                Ok(response)
            }
        }
    }

    /// POST a JSON body and decode a JSON response, surfacing non-2xx
    /// statuses as errors.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ClientError>
    where
        B: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Payload(e.to_string()))?;
        let response = self.request(Method::POST, path, Some(&body)).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Payload(e.to_string()))
    }

    /// Drop the session: tell the proxy to clear the refresh cookie and
    /// forget the access token either way.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = self
            .http
            .post(self.url("/api/auth/logout"))
            .send()
            .await;
        self.tokens.clear();
        result?;
        Ok(())
    }
}
