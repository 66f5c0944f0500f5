//! Error types and handling for unweb-core operations.
//!
//! Two kinds of failure flow through this crate and they are deliberately
//! kept apart:
//!
//! - [`Error`] is the crate-level error returned by operations that cannot
//!   produce a partial result: transport failures, unreadable root JSON,
//!   undecodable base64, storage setup problems.
//! - Source-map *validation* findings are data, not errors. They accumulate
//!   into a [`ValidationReport`](crate::sourcemap::ValidationReport) and the
//!   surrounding call still succeeds.
//!
//! Network failures carry a [`NetworkErrorKind`] from a closed set of codes
//! so callers can map them to user-facing messages or exit statuses without
//! string matching.

use thiserror::Error;

/// Closed set of transport-level failure codes.
///
/// HTTP error *statuses* are not in this set: a 404 or 500 response is a
/// successful fetch with `ok == false`. These codes cover the cases where no
/// response was obtained at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    /// Generic transport failure not covered by a more specific code.
    Failed,
    /// The request exceeded its timeout or was aborted by the caller.
    Timeout,
    /// DNS resolution failed for the target host.
    Dns,
    /// The remote host actively refused the connection.
    ConnectionRefused,
    /// The connection was reset mid-flight.
    ConnectionReset,
    /// TLS negotiation or certificate validation failed.
    Ssl,
}

impl NetworkErrorKind {
    /// Stable identifier for this failure kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Failed => "FETCH_FAILED",
            Self::Timeout => "FETCH_TIMEOUT",
            Self::Dns => "FETCH_DNS_ERROR",
            Self::ConnectionRefused => "FETCH_CONNECTION_REFUSED",
            Self::ConnectionReset => "FETCH_CONNECTION_RESET",
            Self::Ssl => "FETCH_SSL_ERROR",
        }
    }

    /// Classify a `reqwest` transport error into this closed set.
    ///
    /// The mapping inspects the error chain: hyper and std::io details are
    /// nested several sources deep depending on the TLS backend.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionRefused => return Self::ConnectionRefused,
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
                        return Self::ConnectionReset;
                    },
                    std::io::ErrorKind::TimedOut => return Self::Timeout,
                    _ => {},
                }
            }
            let text = inner.to_string();
            if text.contains("dns") || text.contains("resolve") {
                return Self::Dns;
            }
            if text.contains("certificate") || text.contains("tls") || text.contains("ssl") {
                return Self::Ssl;
            }
            source = std::error::Error::source(inner);
        }
        if err.is_connect() {
            return Self::ConnectionRefused;
        }
        Self::Failed
    }
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Fatal parse failure codes for source-map payloads.
///
/// These are the only parser failures that raise instead of accumulating:
/// when the root JSON or a data-URI envelope is unreadable there is no
/// partial result to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalParseCode {
    /// The payload is not valid JSON.
    InvalidJson,
    /// A base64 data-URI body failed to decode.
    InvalidBase64,
    /// A `data:` URI is malformed (missing comma, wrong media type).
    InvalidDataUri,
}

impl FatalParseCode {
    /// Stable identifier for this failure.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidJson => "INVALID_JSON",
            Self::InvalidBase64 => "INVALID_BASE64",
            Self::InvalidDataUri => "INVALID_DATA_URI",
        }
    }
}

/// The main error type for unweb-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed outside the cache (the cache swallows its own).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level network failure; no HTTP response was obtained.
    #[error("Network error ({}) for '{url}': {message}", kind.code())]
    Network {
        /// Which closed-set failure occurred.
        kind: NetworkErrorKind,
        /// The URL being fetched.
        url: String,
        /// Human-readable detail from the transport layer.
        message: String,
    },

    /// An HTTP error status where the operation required success.
    #[error("HTTP error {status} for '{url}'")]
    Http {
        /// Response status code.
        status: u16,
        /// The URL that returned the error status.
        url: String,
    },

    /// Root JSON or data-URI decoding failed; bound to the source-map URL
    /// because no partial validation result is possible.
    #[error("{} for '{url}': {message}", code.code())]
    SourceMapParse {
        /// Which fatal parse failure occurred.
        code: FatalParseCode,
        /// The source-map URL (or a synthetic label for inline payloads).
        url: String,
        /// Detail from the JSON or base64 decoder.
        message: String,
    },

    /// A source map exceeded the configured size ceiling.
    #[error("SOURCE_MAP_TOO_LARGE: '{url}' is {size} bytes (limit {limit})")]
    SourceMapTooLarge {
        /// The source-map URL.
        url: String,
        /// Observed payload size in bytes.
        size: u64,
        /// Configured ceiling in bytes.
        limit: u64,
    },

    /// Reconstruction or cache-root setup failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL is malformed or not absolute HTTP(S).
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Timeouts, resets, and refused connections are transient; parse and
    /// configuration failures are permanent.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network { kind, .. } => matches!(
                kind,
                NetworkErrorKind::Timeout
                    | NetworkErrorKind::ConnectionRefused
                    | NetworkErrorKind::ConnectionReset
            ),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Error category identifier for logging and metrics.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network { .. } => "network",
            Self::Http { .. } => "http",
            Self::SourceMapParse { .. } => "parse",
            Self::SourceMapTooLarge { .. } => "size",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
