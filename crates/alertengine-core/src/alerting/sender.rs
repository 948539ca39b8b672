//! Outbound HTTP transport shared by all notifiers

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Longest response body echoed back in delivery errors
const MAX_ERROR_BODY: usize = 256;

/// A fully built outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub basic_auth: Option<(String, String)>,
}

impl WebhookRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            body: Vec::new(),
            basic_auth: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Serialize `payload` as the JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        self.body = serde_json::to_vec(payload)?;
        Ok(self.header("Content-Type", "application/json"))
    }

    /// Encode `fields` as an `application/x-www-form-urlencoded` body
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.body = encoded.into_bytes();
        self.header("Content-Type", "application/x-www-form-urlencoded")
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((username.into(), password.into()));
        self
    }

    /// Body parsed as JSON, mostly useful when inspecting recorded requests
    pub fn json_body(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Host part of the URL for logs and errors, never the full URL since it may carry secrets
    pub fn target(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "webhook".to_string())
    }
}

/// Delivers a request to a remote endpoint
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Send the request, failing on transport errors, non-2xx answers or cancellation
    async fn send(&self, request: WebhookRequest, cancel: &CancellationToken) -> Result<()>;
}

/// [`WebhookSender`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpWebhookSender {
    client: Client,
}

impl HttpWebhookSender {
    /// Create a sender whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("alertengine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, request: WebhookRequest, cancel: &CancellationToken) -> Result<()> {
        let target = request.target();

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(Error::delivery(target, "cancelled"));
            }
            response = builder.send() => response.map_err(|e| Error::delivery(&target, e))?,
        };

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(Error::delivery(
                target,
                format!("remote returned {status}: {body}"),
            ));
        }

        debug!(target = %target, status = %status, "Webhook delivered");
        Ok(())
    }
}
