//! Raw response captured from one endpoint

use std::time::Duration;

use crate::HeaderMap;

/// Everything captured from a successful HTTP exchange
///
/// 4xx and 5xx responses are successful exchanges too; only transport
/// failures prevent a `RawResponse` from existing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Final URL of the response
    pub url: String,
    pub status_code: u16,
    /// Response headers with lowercase names
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Declared charset, if any
    pub encoding: Option<String>,
    /// Time from sending the request until the body was read
    pub elapsed: Duration,
}

impl RawResponse {
    pub fn new(url: impl Into<String>, status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status_code,
            headers: HeaderMap::new(),
            body: body.into(),
            encoding: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Set the content-type header and derive the encoding from its charset
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.headers
            .insert("content-type".to_string(), content_type.to_string());
        self.encoding = charset(content_type);
        self
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Content type stripped of its parameters
    pub fn mime_type(&self) -> Option<String> {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|mime| mime.trim().to_ascii_lowercase())
            .filter(|mime| !mime.is_empty())
    }

    pub fn byte_count(&self) -> u64 {
        self.body.len() as u64
    }

    /// Elapsed seconds rounded to two decimals
    pub fn response_sec(&self) -> f64 {
        round_secs(self.elapsed)
    }

    /// Body as text when it is valid UTF-8
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Seconds of a duration rounded to two decimal places
pub fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

/// Extract the `charset` parameter of a content type
pub(crate) fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
