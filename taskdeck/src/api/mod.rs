//! Resilient HTTP client for the task service.
//!
//! [`ApiClient::send`] performs one request with:
//! - a per-request time bound, reported as [`ApiError::Timeout`]
//! - content-type inspection before any parsing, so HTML error pages
//!   become [`ApiError::Protocol`] instead of decode failures
//! - uniform extraction of server error payloads ([`ApiError::from_status`])
//! - bearer injection only when a token is supplied
//!
//! Typed endpoint wrappers live in [`endpoints`].

pub mod endpoints;
mod error;

pub use error::{ApiError, STARTING_UP};

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use taskdeck_proto::error::FieldError;
use url::Url;

use crate::config::{ApiConfig, ConfigError, UpdateMethod};

/// Client for the task service REST API.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
    health_timeout: Duration,
    /// Resolved update method; `Auto` until a PATCH finds no route.
    update_method: Mutex<UpdateMethod>,
}

impl ApiClient {
    /// Builds a client for the validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when the HTTP stack cannot be
    /// initialized (for example, no TLS roots available).
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("taskdeck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network {
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            request_timeout: config.request_timeout,
            health_timeout: config.health_timeout,
            update_method: Mutex::new(config.update_method),
        })
    }

    /// The configured base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The update method currently in effect.
    #[must_use]
    pub fn update_method(&self) -> UpdateMethod {
        *self.update_method.lock()
    }

    fn remember_update_method(&self, method: UpdateMethod) {
        *self.update_method.lock() = method;
    }

    /// Appends `segments` to the base URL, keeping any base path prefix
    /// (`https://host/api/v1` + `["tasks", "user"]` =
    /// `https://host/api/v1/tasks/user`).
    ///
    /// Each segment is percent-encoded on its own, so an id holding `/`,
    /// `?` or `#` stays inside its segment.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for an empty or dot-only segment,
    /// and [`ApiError::Configuration`] when the base URL cannot take a path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        if let Some(bad) = segments.iter().find(|s| s.chars().all(|c| c == '.')) {
            return Err(ApiError::Validation {
                status: None,
                fields: vec![FieldError::new("id", format!("Invalid id: {bad:?}"))],
            });
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ApiError::Configuration(ConfigError::InvalidApiUrl {
                    url: self.base_url.to_string(),
                    reason: "cannot carry a path".to_string(),
                })
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends one request and decodes the JSON response into `T`.
    ///
    /// A 2xx with an empty body decodes from `null`, so `T = ()` and
    /// `T = Option<_>` work for endpoints that return nothing.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] describing the failure category.
    pub async fn send<T, B>(
        &self,
        method: Method,
        path: &[&str],
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let value = self.send_value(method, path, body, token).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode {
            reason: e.to_string(),
        })
    }

    /// Like [`ApiClient::send`], returning the raw JSON value.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] describing the failure category.
    pub async fn send_value<B>(
        &self,
        method: Method,
        path: &[&str],
        body: Option<&B>,
        token: Option<&str>,
    ) -> Result<Value, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        let path = url.path().to_string();
        tracing::debug!(
            method = %method,
            path = %path,
            authenticated = token.is_some(),
            "request"
        );

        let mut request = self
            .http
            .request(method.clone(), url)
            .timeout(self.request_timeout)
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let result = async {
            let response = request
                .send()
                .await
                .map_err(|e| ApiError::classify_reqwest(&e))?;
            read_response(response).await
        }
        .await;

        match &result {
            Ok(_) => tracing::debug!(method = %method, path = %path, "request succeeded"),
            Err(e) => tracing::warn!(
                method = %method,
                path = %path,
                status = e.status(),
                error = %e,
                "request failed"
            ),
        }
        result
    }

    /// Sends a GET with the health time bound and checks the answer is a
    /// 2xx JSON response. The body is not decoded.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Timeout`], [`ApiError::Network`],
    /// [`ApiError::Protocol`] for a non-JSON answer, or the status error.
    pub async fn probe(&self, path: &[&str]) -> Result<(), ApiError> {
        let url = self.endpoint(path)?;
        let response = self
            .http
            .get(url)
            .timeout(self.health_timeout)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ApiError::classify_reqwest(&e))?;

        let status = response.status();
        if status.is_success() && is_json(response.headers()) {
            return Ok(());
        }
        let json = is_json(response.headers());
        let text = response.text().await.unwrap_or_default();
        if json {
            let body = serde_json::from_str::<Value>(&text).ok();
            Err(ApiError::from_status(status.as_u16(), body.as_ref()))
        } else {
            Err(ApiError::non_json(status.as_u16(), &text))
        }
    }
}

/// Validates and decodes a response.
async fn read_response(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return Ok(Value::Null);
    }
    let json = is_json(response.headers());
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::classify_reqwest(&e))?;

    if !json {
        if status.is_success() && text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return Err(ApiError::non_json(status.as_u16(), &text));
    }

    let parsed = if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str::<Value>(&text)
    };

    if status.is_success() {
        parsed.map_err(|e| ApiError::Decode {
            reason: e.to_string(),
        })
    } else {
        Err(ApiError::from_status(status.as_u16(), parsed.ok().as_ref()))
    }
}

/// Whether the declared content type is JSON (`application/json`,
/// `application/problem+json`, with or without parameters).
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}

/// Maps a resolved update method to the HTTP method it uses first.
fn first_update_method(method: UpdateMethod) -> Method {
    match method {
        UpdateMethod::Put => Method::PUT,
        UpdateMethod::Patch | UpdateMethod::Auto => Method::PATCH,
    }
}
