//! Logical request dispatched to both endpoints

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Query parameters; a key may repeat, so each maps to an ordered list
pub type QueryMap = IndexMap<String, Vec<String>>;

/// Request headers
pub type HeaderMap = IndexMap<String, String>;

/// One logical request produced by the request pipeline
///
/// A request has no content identity: two requests with equal fields are
/// still distinct trials, identified by their sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Request {
    /// Optional human-readable name; trials fall back to their seq
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Path appended to the endpoint host (e.g. "/api/items")
    pub path: String,

    /// Query parameters in insertion order
    #[serde(default)]
    pub qs: QueryMap,

    /// Headers sent with both calls
    #[serde(default)]
    pub headers: HeaderMap,
}

impl Request {
    /// Create a request for a path with no query and no headers
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parse a `path?query` line into a request
    pub fn from_path_and_query(line: &str) -> Self {
        match line.split_once('?') {
            Some((path, query)) => Self::new(path).with_query_string(query),
            None => Self::new(line),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a value to a query key
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qs.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Append every pair of an urlencoded query string
    pub fn with_query_string(mut self, query: &str) -> Self {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            self.qs
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Render the query as an urlencoded string, repeating keys per value
    pub fn query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, values) in &self.qs {
            for value in values {
                serializer.append_pair(key, value);
            }
        }
        serializer.finish()
    }

    /// Name used for the trial, defaulting to the sequence number
    pub fn display_name(&self, seq: u64) -> String {
        self.name.clone().unwrap_or_else(|| seq.to_string())
    }
}
