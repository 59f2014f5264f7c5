//! HTTP session shared by the extractor and its adapter
//!
//! This module handles all HTTP requests of a crawl, including:
//! - Building the HTTP client with the configured user agent and timeouts
//! - The response cache keyed by `(url, params, headers)`
//! - Refusing to serve a non-cached request key twice (`CycleDetected`)
//! - Retry with exponential backoff for transient failures

use crate::config::SessionConfig;
use crate::{ForumError, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// A GET request as seen by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Keep the response until evicted, and serve repeats from memory
    pub cache: bool,
    /// Retry transient failures; when false, one attempt and any status is returned
    pub retry: bool,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
            cache: false,
            retry: true,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn cached(mut self) -> Self {
        self.cache = true;
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            url: self.url.clone(),
            params: self.params.clone(),
            headers: self.headers.clone(),
        }
    }
}

/// Identity of a request for caching and cycle detection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Vec<u8>,
}

impl Response {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.content)?)
    }

    /// First header named `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of a single attempt
enum Attempt {
    Done(Response),
    Retry(String),
    Fail(ForumError),
}

/// Memoizing, retrying HTTP access layer
pub struct Session {
    client: Client,
    max_attempts: u32,
    backoff: Duration,
    print_urls: bool,
    cache: Mutex<HashMap<RequestKey, Response>>,
    served: Mutex<HashSet<RequestKey>>,
}

impl Session {
    /// Builds a session from its configuration
    ///
    /// # Arguments
    ///
    /// * `config` - User agent, retry budget and timeouts
    ///
    /// # Returns
    ///
    /// * `Ok(Session)` - Ready to issue requests
    /// * `Err(ForumError)` - The HTTP client could not be built
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let client = build_http_client(config)?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            backoff: Duration::from_millis(config.backoff_ms),
            print_urls: config.print_urls,
            cache: Mutex::new(HashMap::new()),
            served: Mutex::new(HashSet::new()),
        })
    }

    /// Plain GET: not cached, retried
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.request(Request::new(url)).await
    }

    /// GET whose response is kept for later identical requests
    pub async fn get_cached(&self, url: &str) -> Result<Response> {
        self.request(Request::new(url).cached()).await
    }

    /// Issues a request through the cache and cycle guard
    pub async fn request(&self, request: Request) -> Result<Response> {
        let key = request.key();

        if request.cache {
            if let Some(hit) = self.cached(&key) {
                tracing::debug!("Cache hit for {}", request.url);
                return Ok(hit);
            }
        } else if let Some(hit) = self.evict(&key) {
            // A plain request consumes the cached entry; the next one is a cycle
            tracing::debug!("Cache hit for {} (evicted)", request.url);
            return Ok(hit);
        } else if self.was_served(&key) {
            return Err(ForumError::CycleDetected { url: request.url });
        }

        if self.print_urls {
            println!("{}", request.url);
        } else {
            tracing::info!("GET {}", request.url);
        }

        let response = self.send_with_retry(&request).await?;

        if let Ok(mut served) = self.served.lock() {
            served.insert(key.clone());
        }
        if request.cache {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(key, response.clone());
            }
        }

        Ok(response)
    }

    /// Drops a cached response; a later cached request refetches it
    pub fn evict(&self, key: &RequestKey) -> Option<Response> {
        self.cache.lock().ok()?.remove(key)
    }

    pub fn cached(&self, key: &RequestKey) -> Option<Response> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    pub fn was_served(&self, key: &RequestKey) -> bool {
        self.served
            .lock()
            .map(|served| served.contains(key))
            .unwrap_or(false)
    }

    async fn send_with_retry(&self, request: &Request) -> Result<Response> {
        let attempts = if request.retry { self.max_attempts } else { 1 };
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.backoff, attempt - 1);
                tracing::warn!(
                    "Retrying {} in {:?} (attempt {}/{}): {}",
                    request.url,
                    delay,
                    attempt + 1,
                    attempts,
                    last_error
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(request).await {
                Attempt::Done(response) => return Ok(response),
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry(reason) => last_error = reason,
            }
        }

        Err(ForumError::Transport {
            url: request.url.clone(),
            attempts,
            message: last_error,
        })
    }

    /// One round trip, classified per the retry rules
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx, 403 | Return the response |
    /// | 429, 5xx | Retry |
    /// | Other 4xx | Fail with `HttpStatus` |
    /// | Timeout, connection error | Retry |
    /// | Other client error | Fail |
    ///
    /// With retries disabled every status is returned as is.
    async fn attempt(&self, request: &Request) -> Attempt {
        let mut builder = self.client.get(&request.url);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if request.retry && (e.is_timeout() || e.is_connect()) => {
                return Attempt::Retry(e.to_string());
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                return Attempt::Fail(ForumError::Transport {
                    url: request.url.clone(),
                    attempts: 1,
                    message: e.to_string(),
                });
            }
            Err(e) => return Attempt::Fail(e.into()),
        };

        let status = response.status();

        if request.retry {
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Attempt::Retry(format!("HTTP {}", status.as_u16()));
            }

            if status.is_client_error() && status != StatusCode::FORBIDDEN {
                return Attempt::Fail(ForumError::HttpStatus {
                    url: request.url.clone(),
                    status: status.as_u16(),
                });
            }
        }

        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        match response.bytes().await {
            Ok(body) => Attempt::Done(Response {
                url,
                status: status.as_u16(),
                headers,
                content: body.to_vec(),
            }),
            Err(e) if request.retry => Attempt::Retry(e.to_string()),
            Err(e) => Attempt::Fail(e.into()),
        }
    }
}

/// Builds the HTTP client of a session
///
/// Redirects are followed (forum software redirects liberally between canonical
/// URLs); the final URL is reported on each `Response`.
pub fn build_http_client(config: &SessionConfig) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
        .gzip(true)
        .brotli(true)
        .build()?)
}

/// Delay before retry number `retry` (0-based): `base * 2^retry`, capped at 60s
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}
