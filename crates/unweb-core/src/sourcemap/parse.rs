//! Source-map payload decoding: raw JSON, `data:` URIs, auto-dispatch.
//!
//! Decoding failures here are the only fatal errors in the parsing stack:
//! when the root JSON or the data-URI envelope is unreadable there is no
//! partial result, so the failure raises as [`Error::SourceMapParse`] bound
//! to the payload's URL. Everything structural accumulates into the
//! [`ValidationReport`] instead.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

use crate::sourcemap::types::{ParsedSourceMap, ValidationReport};
use crate::sourcemap::validate::validate_document;
use crate::{Error, FatalParseCode, Result};

/// Default ceiling for source-map payloads (bytes).
///
/// Maps past this size are overwhelmingly build artifacts gone wrong;
/// refusing them early keeps memory bounded.
pub const DEFAULT_MAX_MAP_BYTES: usize = 128 * 1024 * 1024;

/// Outcome of parsing one payload.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// The materialized map, present iff the report is valid.
    pub map: Option<ParsedSourceMap>,
    /// Structural findings and warnings.
    pub report: ValidationReport,
}

/// Parser for source-map payloads.
///
/// Stateless apart from its size ceiling; construct once and reuse.
#[derive(Debug, Clone)]
pub struct SourceMapParser {
    max_bytes: usize,
}

impl Default for SourceMapParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceMapParser {
    /// Parser with the default size ceiling.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_MAP_BYTES,
        }
    }

    /// Override the payload size ceiling.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Parse raw JSON bytes.
    ///
    /// # Errors
    ///
    /// [`Error::SourceMapTooLarge`] past the ceiling;
    /// [`Error::SourceMapParse`] with [`FatalParseCode::InvalidJson`] when
    /// the bytes are not a JSON document.
    pub fn parse_bytes(&self, bytes: &[u8], url: &str) -> Result<ParseOutcome> {
        self.check_size(bytes.len(), url)?;

        let document: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::SourceMapParse {
                code: FatalParseCode::InvalidJson,
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let (map, report) = validate_document(&document);
        debug!(
            url,
            valid = report.valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "parsed source map"
        );
        Ok(ParseOutcome { map, report })
    }

    /// Parse a `data:application/json[;base64],…` URI.
    ///
    /// Non-base64 bodies are percent-decoded per the data-URI scheme.
    ///
    /// # Errors
    ///
    /// [`FatalParseCode::InvalidDataUri`] for a malformed envelope,
    /// [`FatalParseCode::InvalidBase64`] for an undecodable body, plus
    /// everything [`parse_bytes`](Self::parse_bytes) raises.
    pub fn parse_data_uri(&self, uri: &str, url: &str) -> Result<ParseOutcome> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| data_uri_error(url, "missing 'data:' scheme"))?;
        let (header, body) = rest
            .split_once(',')
            .ok_or_else(|| data_uri_error(url, "missing ',' separator"))?;

        let mut media_type = header;
        let mut is_base64 = false;
        if let Some(stripped) = header.strip_suffix(";base64") {
            media_type = stripped;
            is_base64 = true;
        }
        let essence = media_type.split(';').next().unwrap_or_default();
        if !essence.is_empty() && essence != "application/json" {
            return Err(data_uri_error(
                url,
                &format!("unsupported media type '{essence}'"),
            ));
        }

        let bytes = if is_base64 {
            STANDARD
                .decode(body.trim())
                .map_err(|e| Error::SourceMapParse {
                    code: FatalParseCode::InvalidBase64,
                    url: url.to_string(),
                    message: e.to_string(),
                })?
        } else {
            percent_decode(body)
        };

        self.parse_bytes(&bytes, url)
    }

    /// Dispatch by payload shape: `data:` URIs go through the URI path,
    /// anything else is treated as raw JSON.
    pub fn parse_auto(&self, input: &[u8], url: &str) -> Result<ParseOutcome> {
        let head = input
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(0);
        if input[head..].starts_with(b"data:") {
            let text = std::str::from_utf8(&input[head..]).map_err(|e| Error::SourceMapParse {
                code: FatalParseCode::InvalidDataUri,
                url: url.to_string(),
                message: format!("data URI is not UTF-8: {e}"),
            })?;
            self.parse_data_uri(text, url)
        } else {
            self.parse_bytes(input, url)
        }
    }

    fn check_size(&self, size: usize, url: &str) -> Result<()> {
        if size > self.max_bytes {
            return Err(Error::SourceMapTooLarge {
                url: url.to_string(),
                size: size as u64,
                limit: self.max_bytes as u64,
            });
        }
        Ok(())
    }
}

fn data_uri_error(url: &str, message: &str) -> Error {
    Error::SourceMapParse {
        code: FatalParseCode::InvalidDataUri,
        url: url.to_string(),
        message: message.to_string(),
    }
}

/// Minimal percent-decoding for non-base64 data-URI bodies.
fn percent_decode(body: &str) -> Vec<u8> {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            if let Ok(byte) = u8::from_str_radix(&body[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}
