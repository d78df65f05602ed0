//! Request construction for endpoint checks

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::target::Target;

/// Hard timeout applied to every single attempt
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Caller-supplied headers for a check, keyed by header name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, builder style
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A fully built GET request, reused for every attempt of a check
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub url: Url,

    /// Authority override. Kept apart from `headers` so a `Host` entry
    /// never ends up as an ordinary header.
    pub host: Option<HeaderValue>,

    pub headers: HeaderMap,

    pub timeout: Duration,
}

impl ProbeRequest {
    /// Build a GET request for `target` with `headers` applied
    pub fn get(target: &Target, headers: &Headers) -> E2eResult<Self> {
        let invalid = |reason: String| E2eError::InvalidRequest {
            target: target.to_string(),
            reason,
        };

        let url = Url::parse(target.as_str()).map_err(|e| invalid(e.to_string()))?;

        let mut host = None;
        let mut header_map = HeaderMap::new();
        for (name, value) in headers.iter() {
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("header {}: {}", name, e)))?;

            if name.eq_ignore_ascii_case("host") {
                host = Some(header_value);
                continue;
            }

            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("header {}: {}", name, e)))?;
            header_map.insert(header_name, header_value);
        }

        Ok(Self {
            url,
            host,
            headers: header_map,
            timeout: ATTEMPT_TIMEOUT,
        })
    }

    /// The authority the request is routed as: the `Host` override if
    /// present, otherwise the URL's own host and port.
    pub fn authority(&self) -> Option<String> {
        if let Some(host) = &self.host {
            return host.to_str().ok().map(str::to_string);
        }
        self.url.host_str().map(|h| match self.url.port() {
            Some(port) => format!("{}:{}", h, port),
            None => h.to_string(),
        })
    }
}
