//! The two compared endpoints

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Request;

/// Base URL and optional proxy of one compared service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Base URL, e.g. "http://localhost:8080/v1"
    pub host: String,

    /// Proxy host; `host:port` is treated as `http://host:port`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl EndpointSpec {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            name: None,
            host: host.into(),
            proxy: None,
        }
    }

    /// Render the full URL of a request against this endpoint
    pub fn render_url(&self, request: &Request) -> String {
        let query = request.query_string();
        if query.is_empty() {
            format!("{}{}", self.host, request.path)
        } else {
            format!("{}{}?{}", self.host, request.path, query)
        }
    }

    /// Proxy URL with a scheme, if a proxy is configured
    pub fn proxy_url(&self) -> Option<String> {
        self.proxy.as_ref().map(|proxy| {
            if proxy.contains("://") {
                proxy.clone()
            } else {
                format!("http://{}", proxy)
            }
        })
    }
}

/// Which side of the comparison a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Which {
    One,
    Other,
}

impl Which {
    pub fn as_str(&self) -> &'static str {
        match self {
            Which::One => "one",
            Which::Other => "other",
        }
    }
}

impl fmt::Display for Which {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
