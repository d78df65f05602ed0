//! Suite configuration.
//!
//! Cloud regions and locations fall back to documented defaults when the
//! corresponding environment variable is unset. Tests build the config
//! from an injected lookup instead of the process environment.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::validator::DEFAULT_MAX_WAIT;

pub const DEFAULT_AWS_REGION: &str = "us-west-1";
pub const DEFAULT_AZURE_ENVIRONMENT: &str = "public";
pub const DEFAULT_AZURE_LOCATION: &str = "westus";

/// Span collector the provisioning runs report to
pub const DEFAULT_TRACING_ENDPOINT: &str =
    "https://tracing.pulumi-engineering.com/collector/api/v1/spans";

/// Wait used after edit steps, where rolling updates take longer
pub const DEFAULT_EDIT_MAX_WAIT: Duration = Duration::from_secs(10 * 60);

/// Configuration shared by every example case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Region for AWS examples
    pub aws_region: String,

    /// Azure cloud environment (public, usgovernment, ...)
    pub azure_environment: String,

    /// Azure location for examples that take one
    pub azure_location: String,

    /// Package overrides handed to the provisioning framework
    #[serde(default)]
    pub node_overrides: BTreeMap<String, String>,

    /// Trace collector for provisioning runs
    #[serde(default)]
    pub tracing_endpoint: Option<String>,

    /// Skip long-running cases
    #[serde(default)]
    pub short: bool,

    /// Directory holding the example programs
    pub examples_root: PathBuf,

    /// Wait for checks after the initial deploy
    pub default_max_wait: Duration,

    /// Wait for checks after edit steps
    pub edit_max_wait: Duration,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            aws_region: DEFAULT_AWS_REGION.to_string(),
            azure_environment: DEFAULT_AZURE_ENVIRONMENT.to_string(),
            azure_location: DEFAULT_AZURE_LOCATION.to_string(),
            node_overrides: BTreeMap::new(),
            tracing_endpoint: Some(DEFAULT_TRACING_ENDPOINT.to_string()),
            short: false,
            examples_root: default_examples_root(),
            default_max_wait: DEFAULT_MAX_WAIT,
            edit_max_wait: DEFAULT_EDIT_MAX_WAIT,
        }
    }
}

impl SuiteConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> E2eResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `lookup`, which maps variable names to values
    pub fn from_lookup<F>(lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let aws_region = var("AWS_REGION").unwrap_or_else(|| {
            info!(
                "Defaulting AWS_REGION to '{}'. You can override using the AWS_REGION environment variable",
                DEFAULT_AWS_REGION
            );
            defaults.aws_region.clone()
        });

        let azure_environment = var("ARM_ENVIRONMENT").unwrap_or_else(|| {
            info!(
                "Defaulting ARM_ENVIRONMENT to '{}'. You can override using the ARM_ENVIRONMENT variable",
                DEFAULT_AZURE_ENVIRONMENT
            );
            defaults.azure_environment.clone()
        });

        let azure_location = var("ARM_LOCATION").unwrap_or_else(|| {
            info!(
                "Defaulting ARM_LOCATION to '{}'. You can override using the ARM_LOCATION variable",
                DEFAULT_AZURE_LOCATION
            );
            defaults.azure_location.clone()
        });

        let node_overrides = match var("PULUMI_TEST_NODE_OVERRIDES") {
            Some(raw) => decode_map_string(&raw)?,
            None => BTreeMap::new(),
        };

        let short = var("E2E_SHORT")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);

        let tracing_endpoint = var("E2E_TRACING_ENDPOINT").or(defaults.tracing_endpoint.clone());

        let examples_root = var("E2E_EXAMPLES_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.examples_root);

        Ok(Self {
            aws_region,
            azure_environment,
            azure_location,
            node_overrides,
            tracing_endpoint,
            short,
            examples_root,
            ..Self::default()
        })
    }

    /// Path of an example program, e.g. `aws-ts-eks-migrate-nodegroups`
    pub fn example_dir(&self, name: &str) -> PathBuf {
        self.examples_root.join(name)
    }
}

/// Parse `key1=value1:key2=value2`. An empty string is an empty map.
pub fn decode_map_string(raw: &str) -> E2eResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    if raw.is_empty() {
        return Ok(map);
    }

    for pair in raw.split(':') {
        let mut parts = pair.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(key), Some(value)) if !key.is_empty() => {
                map.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(E2eError::InvalidConfig(format!(
                    "could not decode override '{}', expected key=value",
                    pair
                )))
            }
        }
    }

    Ok(map)
}

/// Repository root: the workspace that contains `crates/e2e`
fn default_examples_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}
