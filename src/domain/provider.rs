// Provider detection and credential placement
use super::widget::{ApiKeyLocation, Credentials};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    AlphaVantage,
    Finnhub,
    Unknown,
}

impl ApiProvider {
    /// Match a URL against known provider hostnames.
    pub fn detect(url: &str) -> Self {
        if url.contains("alphavantage.co") {
            ApiProvider::AlphaVantage
        } else if url.contains("finnhub.io") {
            ApiProvider::Finnhub
        } else {
            ApiProvider::Unknown
        }
    }

    /// Query parameter the provider expects its key under.
    pub fn default_key_param(self) -> &'static str {
        match self {
            ApiProvider::Finnhub => "token",
            ApiProvider::AlphaVantage | ApiProvider::Unknown => "apikey",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "alphavantage" => Some(ApiProvider::AlphaVantage),
            "finnhub" => Some(ApiProvider::Finnhub),
            _ => None,
        }
    }
}

/// A URL plus headers ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Place the key either in the query string or in a header.
///
/// A header named exactly `Authorization` carries `Bearer <key>`; any other
/// header name carries the raw key.
pub fn apply_credentials(endpoint: &str, credentials: &Credentials) -> AuthorizedRequest {
    let Some(key) = credentials.key.as_deref() else {
        return AuthorizedRequest {
            url: endpoint.to_string(),
            headers: Vec::new(),
        };
    };

    match credentials.location {
        ApiKeyLocation::Header => {
            let value = if credentials.header_name == "Authorization" {
                format!("Bearer {}", key)
            } else {
                key.to_string()
            };
            AuthorizedRequest {
                url: endpoint.to_string(),
                headers: vec![(credentials.header_name.clone(), value)],
            }
        }
        ApiKeyLocation::Query => AuthorizedRequest {
            url: append_query_param(endpoint, &credentials.param_name, key),
            headers: Vec::new(),
        },
    }
}

pub fn append_query_param(url: &str, name: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, name, value)
}
