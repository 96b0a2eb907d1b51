use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use claimdesk_core::config::ApiConfig;
use claimdesk_core::store::StoreError;

use crate::session::Session;

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid api base url `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("could not build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Thin JSON client for the claims collaborator. Every call carries the session's bearer
/// token and maps transport and status failures onto [`StoreError`].
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<Session>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error", alias = "mensaje")]
    message: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        session: Arc<Session>,
        timeout: Duration,
    ) -> Result<Self, ClientBuildError> {
        let mut parsed = Url::parse(base_url.trim()).map_err(|error| {
            ClientBuildError::InvalidBaseUrl { url: base_url.to_string(), reason: error.to_string() }
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ClientBuildError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "url cannot carry a path".to_string(),
            });
        }
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: parsed, session, timeout })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ClientBuildError> {
        Self::new(
            &config.base_url,
            Arc::new(Session::new(config.token.clone())),
            config.request_timeout(),
        )
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        entity: &'static str,
        segments: &[&str],
    ) -> Result<T, StoreError> {
        let response = self.send::<()>(Method::GET, entity, segments, None).await?;
        decode(response).await
    }

    pub async fn send_json<B, T>(
        &self,
        method: Method,
        entity: &'static str,
        segments: &[&str],
        body: &B,
    ) -> Result<T, StoreError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(method, entity, segments, Some(body)).await?;
        decode(response).await
    }

    pub async fn delete(&self, entity: &'static str, segments: &[&str]) -> Result<(), StoreError> {
        self.send::<()>(Method::DELETE, entity, segments, None).await?;
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StoreError::Backend(format!("api base url `{}` cannot carry a path", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send<B>(
        &self,
        method: Method,
        entity: &'static str,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<reqwest::Response, StoreError>
    where
        B: Serialize + ?Sized,
    {
        let Some(token) = self.session.bearer() else {
            return Err(StoreError::Unauthorized);
        };
        let url = self.endpoint(segments)?;
        debug!(event_name = "remote.request", method = %method, url = %url, "sending request");

        let mut request =
            self.http.request(method.clone(), url.clone()).bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|error| self.transport_error(&url, error))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => {
                self.session.clear();
                warn!(
                    event_name = "remote.session_expired",
                    method = %method,
                    url = %url,
                    "collaborator rejected the bearer token; session cleared"
                );
                Err(StoreError::Unauthorized)
            }
            StatusCode::NOT_FOUND => {
                Err(StoreError::not_found(entity, segments.get(1).copied().unwrap_or_default()))
            }
            _ => {
                let message = error_message(response).await;
                warn!(
                    event_name = "remote.request_failed",
                    method = %method,
                    url = %url,
                    status = status.as_u16(),
                    error = %message,
                    "collaborator returned an error"
                );
                Err(StoreError::Backend(format!("{} {}: {message}", status.as_u16(), url.path())))
            }
        }
    }

    fn transport_error(&self, url: &Url, error: reqwest::Error) -> StoreError {
        if error.is_timeout() {
            warn!(event_name = "remote.timeout", url = %url, "request timed out");
            return StoreError::Timeout { seconds: self.timeout.as_secs() };
        }
        warn!(event_name = "remote.transport_failed", url = %url, error = %error, "request failed");
        StoreError::Backend(format!("request to {} failed: {error}", url.path()))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|error| StoreError::Backend(format!("could not read response body: {error}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|error| StoreError::Backend(format!("unexpected response payload: {error}")))
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{ApiClient, ClientBuildError};
    use crate::session::Session;

    fn client(base: &str) -> Result<ApiClient, ClientBuildError> {
        ApiClient::new(base, Arc::new(Session::default()), Duration::from_secs(1))
    }

    #[test]
    fn endpoints_append_encoded_segments_to_the_base_path() {
        let client = client("http://localhost:3000/api").expect("client");
        let url = client.endpoint(&["gastos", "GST 1", "aprobar"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:3000/api/gastos/GST%201/aprobar");
    }

    #[test]
    fn base_url_with_trailing_slash_is_equivalent() {
        let client = client("http://localhost:3000/api/").expect("client");
        let url = client.endpoint(&["usuarios"]).expect("url");
        assert_eq!(url.as_str(), "http://localhost:3000/api/usuarios");
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        assert!(matches!(client("not a url"), Err(ClientBuildError::InvalidBaseUrl { .. })));
    }
}
