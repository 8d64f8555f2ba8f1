//! Directus API client
//!
//! One client instance is constructed per transfer run and passed by
//! reference to every extractor and loader. Every request funnels through
//! the shared scheduler and the fixed-delay retry policy; callers see a
//! parsed JSON payload or a typed [`ApiError`] after retries are
//! exhausted.

use std::sync::RwLock;

use anyhow::{Context, Result};
use log::{debug, info};
use reqwest::Method;
use serde_json::{Value, json};

use super::config::ResilienceConfig;
use super::error::ApiError;
use super::retry::RetryPolicy;
use super::scheduler::Scheduler;

/// Authenticated, rate-limited, retrying HTTP client for one Directus
/// instance.
pub struct DirectusClient {
    base_url: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
    scheduler: Scheduler,
    retry: RetryPolicy,
}

impl DirectusClient {
    /// Create a client for `base_url`. Fails on an unparseable URL; the
    /// session is not verified until [`Self::login`] or the first call.
    pub fn new(base_url: &str, config: ResilienceConfig) -> Result<Self> {
        let url = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid base URL: {}", base_url))?;

        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            token: RwLock::new(None),
            scheduler: Scheduler::new(config.scheduler),
            retry: RetryPolicy::new(&config.retry),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Use a static API token for all subsequent requests
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().expect("token lock poisoned") = Some(token.into());
    }

    /// The token currently in use, if any
    pub fn current_token(&self) -> Option<String> {
        self.token.read().expect("token lock poisoned").clone()
    }

    /// Exchange email/password for a session token. Failure here is fatal
    /// to the run; no partial work is possible without a valid session.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let body = json!({ "email": email, "password": password });
        let data = self
            .request(Method::POST, "/auth/login", None, Some(&body))
            .await
            .context("Authentication failed")?;

        let token = data
            .get("access_token")
            .and_then(|t| t.as_str())
            .context("Login response did not contain an access token")?;
        self.set_token(token);
        info!("Authenticated against {}", self.base_url);
        Ok(())
    }

    /// Fetch the currently-authenticated user, including its role ID.
    /// Doubles as a session check after token auth.
    pub async fn me(&self) -> Result<Value, ApiError> {
        self.get_with_query("/users/me", &[("fields", "id,email,role")])
            .await
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None, None).await
    }

    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        self.request(Method::GET, path, Some(query), None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, None, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PATCH, path, None, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, path, None, None).await
    }

    /// Download a binary asset by file ID
    pub async fn download_asset(&self, file_id: &str) -> Result<Vec<u8>, ApiError> {
        let path = format!("/assets/{}", urlencoding::encode(file_id));
        let url = format!("{}{}", self.base_url, path);

        self.retry
            .run(&format!("GET {}", path), || async {
                let _slot = self.scheduler.acquire().await;
                let response = self
                    .authorized(self.http.get(&url))
                    .send()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.json::<Value>().await.unwrap_or(Value::Null);
                    return Err(ApiError::from_body(status.as_u16(), &body));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))?;
                Ok(bytes.to_vec())
            })
            .await
    }

    /// Upload a file entity as multipart form data: JSON metadata fields
    /// first, then the binary part, as the files endpoint requires.
    pub async fn upload_file(
        &self,
        metadata: &Value,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}/files", self.base_url);

        self.retry
            .run("POST /files", || async {
                let _slot = self.scheduler.acquire().await;

                let mut form = reqwest::multipart::Form::new();
                if let Some(fields) = metadata.as_object() {
                    for (key, value) in fields {
                        if value.is_null() {
                            continue;
                        }
                        let text = match value.as_str() {
                            Some(s) => s.to_string(),
                            None => value.to_string(),
                        };
                        form = form.text(key.clone(), text);
                    }
                }
                let part = reqwest::multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.to_string());
                form = form.part("file", part);

                let response = self
                    .authorized(self.http.post(&url))
                    .multipart(form)
                    .send()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))?;

                Self::parse_response(response).await
            })
            .await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().expect("token lock poisoned").as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, path);

        self.retry
            .run(&format!("{} {}", method, path), || async {
                let _slot = self.scheduler.acquire().await;

                let mut request = self.authorized(self.http.request(method.clone(), &url));
                if let Some(query) = query {
                    request = request.query(query);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| ApiError::Transport(e.to_string()))?;

                Self::parse_response(response).await
            })
            .await
    }

    /// Parse a response body, unwrapping the `data` envelope Directus puts
    /// around successful payloads. 204s and empty bodies yield `Null`.
    async fn parse_response(response: reqwest::Response) -> Result<Value, ApiError> {
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let parsed: Value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            return Err(ApiError::from_body(status.as_u16(), &parsed));
        }

        match parsed {
            Value::Object(mut map) if map.contains_key("data") => {
                Ok(map.remove("data").unwrap_or(Value::Null))
            }
            other => Ok(other),
        }
    }
}

/// Build an item path like `/items/articles/42` with the ID segment
/// percent-encoded.
pub fn item_path(api_path: &str, id: &str) -> String {
    format!("{}/{}", api_path, urlencoding::encode(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_base_url() {
        assert!(DirectusClient::new("not a url", ResilienceConfig::disabled()).is_err());
    }

    #[test]
    fn test_new_normalizes_trailing_slash() {
        let client =
            DirectusClient::new("http://localhost:8055/", ResilienceConfig::disabled()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8055");
    }

    #[test]
    fn test_item_path_encodes_id() {
        assert_eq!(item_path("/items/articles", "42"), "/items/articles/42");
        assert_eq!(item_path("/roles", "a b/c"), "/roles/a%20b%2Fc");
    }
}
