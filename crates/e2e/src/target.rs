//! Endpoint targets derived from stack outputs

use std::fmt;

use serde_json::Value;

use crate::error::{E2eError, E2eResult};

/// A network address under test, normalized to carry an HTTP(S) scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: String,
}

impl Target {
    /// Build a target from an address string, prefixing `http://` when no
    /// HTTP(S) scheme is present.
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let url = if address.starts_with("http://") || address.starts_with("https://") {
            address
        } else {
            format!("http://{}", address)
        };
        Self { url }
    }

    /// Build a target from a stack output. Anything but a JSON string is
    /// rejected before any request is made.
    pub fn from_output(output: &Value) -> E2eResult<Self> {
        match output {
            Value::String(address) => Ok(Self::new(address.as_str())),
            other => Err(E2eError::TargetNotString(other.clone())),
        }
    }

    /// Append a path to the target, e.g. `/echoserver`
    pub fn join(&self, path: &str) -> Self {
        Self {
            url: format!("{}{}", self.url, path),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}
