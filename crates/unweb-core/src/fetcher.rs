//! HTTP fetching contract used by discovery, registry, and matching.
//!
//! The contract deliberately mirrors how the rest of the pipeline wants to
//! consume responses: HTTP error statuses are *successful* fetches with
//! `ok == false`, and only transport-level failures raise, wrapped into
//! the closed [`NetworkErrorKind`] code set. Redirects are followed and the
//! final URL is surfaced on the response.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::{Error, NetworkErrorKind, Result};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cooperative cancellation signal for in-flight fetches.
///
/// Cloneable; every clone observes the same abort. Dropping the paired
/// [`AbortHandle`] without aborting leaves the signal inert.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Whether the abort has already fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when the abort fires (or never, if the handle is dropped
    /// without aborting).
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        // An Err means the sender is gone without ever aborting; park
        // forever so the select! below always resolves via the request arm.
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

/// Owner side of an [`AbortSignal`].
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Fire the abort. Idempotent.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a connected abort handle/signal pair.
#[must_use]
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra request headers, name/value.
    pub headers: Vec<(String, String)>,
    /// Override of the fetcher's default timeout.
    pub timeout: Option<Duration>,
    /// Cooperative cancellation; aborting fails the request recoverably.
    pub abort: Option<AbortSignal>,
}

/// A completed HTTP exchange.
///
/// `ok` mirrors a 2xx status; error statuses do not raise.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Whether the status is 2xx.
    pub ok: bool,
    /// Status code.
    pub status: u16,
    /// Canonical reason phrase for the status.
    pub status_text: String,
    /// Response headers, names lowercased.
    pub headers: HashMap<String, String>,
    /// URL after redirects.
    pub final_url: String,
    body: Vec<u8>,
}

impl FetchResponse {
    /// Assemble a response from parts. The fetcher builds these itself;
    /// this is for alternative transports implementing the same contract
    /// and for tests.
    #[must_use]
    pub fn from_parts(
        status: u16,
        headers: HashMap<String, String>,
        final_url: impl Into<String>,
        body: Vec<u8>,
    ) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status,
            status_text: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("")
                .to_string(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            final_url: final_url.into(),
            body,
        }
    }

    /// Raw response body.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as UTF-8 text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }

    /// Header lookup by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// HTTP client wrapper implementing the pipeline's fetch contract.
pub struct Fetcher {
    client: Client,
    default_timeout: Duration,
}

impl Fetcher {
    /// Fetcher with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Fetcher with a custom default timeout (primarily for tests).
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("unweb/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Network {
                kind: NetworkErrorKind::Failed,
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// GET a URL under the fetch contract.
    ///
    /// # Errors
    ///
    /// Only transport failures raise, as [`Error::Network`] carrying a
    /// [`NetworkErrorKind`]. HTTP error statuses return `ok == false`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        self.run(reqwest::Method::GET, url, options).await
    }

    /// HEAD a URL; same contract as [`fetch`](Self::fetch).
    pub async fn head(&self, url: &str, options: &FetchOptions) -> Result<FetchResponse> {
        self.run(reqwest::Method::HEAD, url, options).await
    }

    async fn run(
        &self,
        method: reqwest::Method,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let mut request = self.client.request(method, url).timeout(timeout);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }

        let send = request.send();
        let response = match &options.abort {
            Some(signal) => {
                tokio::select! {
                    result = send => result,
                    () = signal.aborted() => {
                        debug!("fetch aborted by caller");
                        return Err(Error::Network {
                            kind: NetworkErrorKind::Timeout,
                            url: url.to_string(),
                            message: "request aborted by caller".to_string(),
                        });
                    },
                }
            },
            None => send.await,
        };

        let response = response.map_err(|e| Error::Network {
            kind: NetworkErrorKind::from_reqwest(&e),
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|e| Error::Network {
            kind: NetworkErrorKind::from_reqwest(&e),
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!(status = status.as_u16(), bytes = body.len(), "fetched");

        Ok(FetchResponse {
            ok: status.is_success(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            final_url,
            body: body.to_vec(),
        })
    }
}
