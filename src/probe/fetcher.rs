use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::{thread_rng, Rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cli::config::RequestSettings;

/// A page body received with its final status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status_code: u16,

    /// URL after redirects
    pub final_url: String,

    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn body_bytes(&self) -> usize {
        self.body.len()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Per-target fetch failures. None of these abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error {status_code}")]
    Http { status_code: u16 },

    #[error("Body too small ({body_bytes} bytes, expected at least {min_bytes}); possible soft block")]
    TooSmall { body_bytes: usize, min_bytes: usize },

    #[error("Unexpected error ({type_name}): {message}")]
    Unknown { type_name: String, message: String },
}

/// Tag of a [`FetchError`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Tls,
    Connection,
    Http,
    TooSmall,
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Tls => "TLS error",
            FailureKind::Connection => "connection error",
            FailureKind::Http => "HTTP error",
            FailureKind::TooSmall => "body too small",
            FailureKind::Unknown => "unknown error",
        };
        f.write_str(label)
    }
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Timeout { .. } => FailureKind::Timeout,
            FetchError::Tls(_) => FailureKind::Tls,
            FetchError::Connection(_) => FailureKind::Connection,
            FetchError::Http { .. } => FailureKind::Http,
            FetchError::TooSmall { .. } => FailureKind::TooSmall,
            FetchError::Unknown { .. } => FailureKind::Unknown,
        }
    }
}

pub type FetchOutcome = std::result::Result<FetchedPage, FetchError>;

/// Issues the single request made for a target
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Produces the delay awaited before each fetch
pub trait Pacing: Send + Sync {
    fn next_delay(&self) -> Duration;
}

/// Uniformly random delay between two bounds
#[derive(Debug, Clone)]
pub struct RandomPacing {
    min: Duration,
    max: Duration,
}

impl RandomPacing {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis((min, max): (u64, u64)) -> Self {
        Self::new(Duration::from_millis(min), Duration::from_millis(max))
    }
}

impl Pacing for RandomPacing {
    fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let mut rng = thread_rng();
        let ms = rng.gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }
}

/// Always the same delay
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPacing(pub Duration);

impl Pacing for FixedPacing {
    fn next_delay(&self) -> Duration {
        self.0
    }
}

/// reqwest based fetcher presenting itself as a desktop browser
pub struct HttpFetcher {
    settings: RequestSettings,
    headers: HeaderMap,
    pacing: Box<dyn Pacing>,
}

impl HttpFetcher {
    pub fn new(settings: RequestSettings, pacing: Box<dyn Pacing>) -> Result<Self> {
        let headers = build_headers(&settings)?;

        if let Some(proxy) = &settings.proxy {
            reqwest::Proxy::all(proxy)
                .context(format!("Invalid proxy url: {}", proxy))?;
        }

        Ok(Self {
            settings,
            headers,
            pacing,
        })
    }

    /// Fetcher paced by the delay bounds in the settings; equal bounds give a fixed delay
    pub fn from_settings(settings: RequestSettings) -> Result<Self> {
        let (min, max) = settings.pacing_delay_ms;
        let pacing: Box<dyn Pacing> = if min == max {
            Box::new(FixedPacing(Duration::from_millis(min)))
        } else {
            Box::new(RandomPacing::from_millis((min, max)))
        };
        Self::new(settings, pacing)
    }

    /// A client lives for exactly one fetch, so no connection outlives its target
    fn build_client(&self) -> std::result::Result<Client, reqwest::Error> {
        let redirect_policy = if self.settings.follow_redirects {
            redirect::Policy::limited(self.settings.max_redirects)
        } else {
            redirect::Policy::none()
        };

        let mut builder = Client::builder()
            .default_headers(self.headers.clone())
            .cookie_store(true)
            .redirect(redirect_policy)
            .timeout(Duration::from_secs(self.settings.timeout_secs));

        if let Some(proxy) = &self.settings.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        builder.build()
    }

    async fn request(&self, client: &Client, url: &str) -> FetchOutcome {
        let response = client.get(url)
            .send()
            .await
            .map_err(|e| classify_error(&e, self.settings.timeout_secs))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status != StatusCode::OK {
            return Err(FetchError::Http { status_code: status.as_u16() });
        }

        let body = response.bytes()
            .await
            .map_err(|e| classify_error(&e, self.settings.timeout_secs))?;

        Ok(FetchedPage {
            status_code: status.as_u16(),
            final_url,
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let delay = self.pacing.next_delay();
        debug!("Waiting {} ms before requesting {}", delay.as_millis(), url);
        sleep(delay).await;

        let client = self.build_client().map_err(|e| FetchError::Unknown {
            type_name: std::any::type_name::<reqwest::Error>().to_string(),
            message: e.to_string(),
        })?;

        debug!("GET {}", url);
        let outcome = self.request(&client, url).await;
        drop(client);

        match &outcome {
            Ok(page) => debug!("Received {} bytes from {}", page.body_bytes(), page.final_url),
            Err(e) => warn!("Fetch of {} failed: {}", url, e),
        }

        outcome
    }
}

fn build_headers(settings: &RequestSettings) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in &settings.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .context(format!("Invalid header name: {}", name))?;
        let header_value = HeaderValue::from_str(value)
            .context(format!("Invalid value for header {}", name))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Map a transport error onto the failure taxonomy
fn classify_error(error: &reqwest::Error, timeout_secs: u64) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout { timeout_secs }
    } else if error.source().map_or(false, is_tls_failure) {
        FetchError::Tls(error_chain(error))
    } else if error.is_connect() || error.is_request() || error.is_body() || error.is_redirect() {
        FetchError::Connection(error_chain(error))
    } else {
        FetchError::Unknown {
            type_name: std::any::type_name::<reqwest::Error>().to_string(),
            message: error_chain(error),
        }
    }
}

const TLS_MARKERS: &[&str] = &["certificate", "tls", "ssl", "handshake"];

/// reqwest does not expose TLS failures directly; look through the source chain.
/// The top-level reqwest message embeds the url, so callers start from its source.
fn is_tls_failure(error: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        let message = err.to_string().to_lowercase();
        if TLS_MARKERS.iter().any(|marker| message.contains(marker)) {
            return true;
        }
        current = err.source();
    }
    false
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut current = error.source();
    while let Some(err) = current {
        parts.push(err.to_string());
        current = err.source();
    }
    parts.join(": ")
}
