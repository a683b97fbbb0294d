//! Blocking JSON-over-HTTP transport shared by the service clients.

use std::thread;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::error::ClientError;

const AUTH_HEADER: &str = "X-Auth-Token";

/// Authenticated client for one service base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        config: &ProviderConfig,
        extra_headers: &[(&'static str, &str)],
    ) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in [(AUTH_HEADER, config.token.as_str())]
            .iter()
            .chain(extra_headers)
        {
            headers.insert(header_name(name)?, header_value(name, value)?);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET, retried on 500/503/504.
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let mut attempt = 0;
        loop {
            match self.send(Method::GET, path, None::<&()>) {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(path, attempt, error = %e, "Retrying GET");
                    thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(e),
                Ok(body) => return Ok(serde_json::from_str(&body)?),
            }
        }
    }

    pub fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = self.send(Method::POST, path, Some(body))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST whose response body is ignored.
    pub fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        self.send(Method::POST, path, Some(body)).map(drop)
    }

    pub fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        self.send(Method::PUT, path, Some(body)).map(drop)
    }

    pub fn patch<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ClientError> {
        self.send(Method::PATCH, path, Some(body)).map(drop)
    }

    pub fn delete(&self, path: &str) -> Result<(), ClientError> {
        self.send(Method::DELETE, path, None::<&()>).map(drop)
    }

    fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<String, ClientError> {
        let url = self.url(path);
        debug!(%method, %url, "Sending request");

        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                method: method.to_string(),
                url,
                body: text,
            });
        }
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                method: method.to_string(),
                url,
                body: text,
            });
        }
        Ok(text)
    }
}

fn header_name(name: &str) -> Result<HeaderName, ClientError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ClientError::Endpoint(format!("invalid header name {name}")))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::Endpoint(format!("invalid value for header {name}")))
}
