//! Small REST client backing the REPL's `api_*` commands.
//!
//! - Default headers, basic auth, and bearer tokens set once and reused
//! - Captures the last response for inspection (`api_info`) and saving
//! - Never logs secret values; only the auth kind is recorded
//!
//! Structured `tracing` events are emitted for request start, completion,
//! and failures.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("invalid header: {0}")]
    Header(String),
    #[error("request build failed: {0}")]
    Build(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("no response captured yet")]
    NoResponse,
    #[error("response is not JSON: {0}")]
    NotJson(String),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Basic-auth credentials kept for subsequent requests.
#[derive(Clone)]
struct BasicAuth {
    username: String,
    password: String,
}

/// The most recent response, kept for `api_info`/`api_save`.
#[derive(Debug, Clone)]
pub struct LastResponse {
    pub url: String,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: String,
}

impl LastResponse {
    pub fn json(&self) -> Result<serde_json::Value, HttpError> {
        serde_json::from_str(&self.body).map_err(|e| HttpError::NotJson(e.to_string()))
    }

    /// Multi-line summary for the REPL.
    pub fn describe(&self) -> String {
        format!(
            "url: {}\nstatus: {}\ncontent-type: {}\nbody: {} bytes",
            self.url,
            self.status,
            self.content_type.as_deref().unwrap_or("-"),
            self.body.len()
        )
    }
}

/// Stateful API client: headers and auth persist across requests.
pub struct ApiClient {
    inner: reqwest::Client,
    headers: HeaderMap,
    basic_auth: Option<BasicAuth>,
    last: Option<LastResponse>,
}

impl ApiClient {
    pub fn new() -> Result<Self, HttpError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            inner,
            headers: HeaderMap::new(),
            basic_auth: None,
            last: None,
        })
    }

    /// Set a default header applied to every subsequent request.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::Header(e.to_string()))?;
        let value = HeaderValue::from_str(value).map_err(|e| HttpError::Header(e.to_string()))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn set_auth_basic(&mut self, username: &str, password: &str) {
        self.basic_auth = Some(BasicAuth {
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    /// Bearer-token auth via the Authorization header.
    pub fn set_auth_token(&mut self, token: &str) -> Result<(), HttpError> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|e| HttpError::Header(e.to_string()))?;
        self.headers.insert(reqwest::header::AUTHORIZATION, value);
        Ok(())
    }

    pub async fn get(&mut self, url: &str) -> Result<LastResponse, HttpError> {
        self.request(Method::GET, url, None).await
    }

    pub async fn post_json(
        &mut self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<LastResponse, HttpError> {
        self.request(Method::POST, url, Some(body)).await
    }

    pub fn last(&self) -> Option<&LastResponse> {
        self.last.as_ref()
    }

    /// Write the last response body to `<dir>/<filename>.json`, pretty
    /// printed when it parses as JSON. The filename defaults to the final
    /// segment of the request URL path.
    pub async fn save_last(
        &self,
        dir: &Path,
        filename: Option<&str>,
    ) -> Result<PathBuf, HttpError> {
        let last = self.last.as_ref().ok_or(HttpError::NoResponse)?;

        let name = match filename {
            Some(name) => name.to_string(),
            None => derive_filename(&last.url),
        };
        let name = if name.ends_with(".json") {
            name
        } else {
            format!("{name}.json")
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(name);
        let contents = match last.json() {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| last.body.clone()),
            Err(_) => last.body.clone(),
        };
        tokio::fs::write(&path, contents).await?;
        debug!(path = %path.display(), "api.response.saved");
        Ok(path)
    }

    async fn request(
        &mut self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<LastResponse, HttpError> {
        let parsed = Url::parse(url).map_err(|e| HttpError::Url(e.to_string()))?;

        let auth_kind = if self.basic_auth.is_some() {
            "basic"
        } else if self.headers.contains_key(reqwest::header::AUTHORIZATION) {
            "bearer"
        } else {
            "none"
        };
        debug!(
            method = %method,
            host_path = %format!("{}{}", parsed.domain().unwrap_or("-"), parsed.path()),
            auth_kind,
            has_body = body.is_some(),
            "api.request.start"
        );

        let mut rb = self
            .inner
            .request(method, parsed.clone())
            .headers(self.headers.clone());
        if let Some(auth) = &self.basic_auth {
            rb = rb.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(body) = &body {
            rb = rb.json(body);
        }

        let response = rb.send().await.map_err(|e| {
            warn!(error = %e, "api.request.network_error");
            HttpError::Network(e.to_string())
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::Network(e.to_string()))?;

        debug!(%status, body_len = body.len(), "api.request.finished");
        let last = LastResponse {
            url: parsed.to_string(),
            status,
            content_type,
            body,
        };
        self.last = Some(last.clone());
        Ok(last)
    }
}

fn derive_filename(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "api_response".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_derives_from_url_path() {
        assert_eq!(derive_filename("https://api.example.org/v1/items"), "items");
        assert_eq!(derive_filename("https://api.example.org/"), "api_response");
        assert_eq!(derive_filename("not a url"), "api_response");
    }

    #[test]
    fn invalid_header_names_are_rejected() {
        let mut client = ApiClient::new().unwrap();
        assert!(client.set_header("X-Ok", "1").is_ok());
        assert!(client.set_header("bad header", "1").is_err());
    }
}
