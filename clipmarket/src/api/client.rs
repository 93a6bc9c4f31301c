//! Authenticated HTTP client for the marketplace backend.

use super::{
    envelope::ApiResponse,
    errors::{ApiError, ApiResult},
};
use crate::{auth::CredentialSource, config::ApiConfig};
use reqwest::{
    Method,
    header::{ACCEPT, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// HTTP client producing [`ApiResponse`] envelopes.
///
/// Every request carries `Authorization: Bearer <token>` when the credential
/// source has a token at the time of the call.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    credentials: Option<Arc<dyn CredentialSource>>,
}

#[derive(Debug, Default, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

impl ApiClient {
    /// Create a client that authenticates through `credentials`
    pub fn new(config: &ApiConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::build(config, Some(credentials))
    }

    /// Create a client that never sends credentials
    pub fn anonymous(config: &ApiConfig) -> Self {
        Self::build(config, None)
    }

    fn build(config: &ApiConfig, credentials: Option<Arc<dyn CredentialSource>>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build HTTP client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Perform a request and wrap the outcome in an envelope.
    ///
    /// The body is decoded as an envelope when it has that shape, otherwise
    /// as a bare `T` wrapped in a successful envelope. An empty 2xx body
    /// yields a success with no data.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        match self.try_request(method.clone(), path, body).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("{} {} failed: {}", method, path, err);
                err.into()
            }
        }
    }

    async fn try_request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> ApiResult<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self
            .client
            .request(method, self.url(path))
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(token) = self
            .credentials
            .as_ref()
            .and_then(|credentials| credentials.access_token())
        {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let parsed = serde_json::from_slice::<ErrorBody>(&bytes).unwrap_or_default();
            let message = parsed
                .message
                .or(parsed.error)
                .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
                errors: parsed.errors,
            });
        }

        decode_success(&bytes)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> ApiResponse<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResponse<T> {
        self.request::<T, ()>(Method::DELETE, path, None).await
    }
}

fn decode_success<T: DeserializeOwned>(bytes: &[u8]) -> ApiResult<ApiResponse<T>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(ApiResponse::empty());
    }

    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ApiError::Decode(e.to_string()))?;

    if value.get("success").is_some_and(serde_json::Value::is_boolean) {
        return serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()));
    }

    serde_json::from_value(value)
        .map(ApiResponse::ok)
        .map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Bounty {
        id: u32,
        title: String,
    }

    #[test]
    fn test_decode_envelope() {
        let response: ApiResponse<Bounty> =
            decode_success(br#"{"success":true,"data":{"id":1,"title":"Clip my stream"}}"#).unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap().id, 1);
    }

    #[test]
    fn test_decode_bare_body() {
        let response: ApiResponse<Vec<Bounty>> =
            decode_success(br#"[{"id":2,"title":"Highlights"}]"#).unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap()[0].title, "Highlights");
    }

    #[test]
    fn test_decode_empty_body() {
        let response: ApiResponse<Bounty> = decode_success(b"").unwrap();
        assert!(response.success);
        assert!(response.data.is_none());
    }

    #[test]
    fn test_decode_wrong_shape() {
        let result: ApiResult<ApiResponse<Bounty>> = decode_success(br#"{"id":"x"}"#);
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }

    #[test]
    fn test_url_join() {
        let client = ApiClient::anonymous(&ApiConfig {
            base_url: "http://localhost:3001/api/".to_string(),
            ..Default::default()
        });
        assert_eq!(client.url("/bounties"), "http://localhost:3001/api/bounties");
        assert_eq!(client.url("bounties/7"), "http://localhost:3001/api/bounties/7");
        assert_eq!(client.url("https://cdn.clipmarket.dev/x"), "https://cdn.clipmarket.dev/x");
    }
}
