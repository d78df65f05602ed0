//! Example suite: per-example program test options, the provisioning
//! seam, and the runner that aggregates results.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::SuiteConfig;
use crate::error::{E2eError, E2eResult};

/// Outputs of a deployed stack, handed to runtime validations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackInfo {
    pub name: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl StackInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add an output, builder style
    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    /// Parse the `outputs` object of a stack export
    pub fn from_outputs_json(name: impl Into<String>, json: &str) -> E2eResult<Self> {
        Ok(Self {
            name: name.into(),
            outputs: serde_json::from_str(json)?,
        })
    }

    /// Raw output value, `null` when the stack has no such output
    pub fn output(&self, key: &str) -> &Value {
        self.outputs.get(key).unwrap_or(&Value::Null)
    }

    /// Output that must be a string
    pub fn output_str(&self, key: &str) -> E2eResult<&str> {
        self.output(key)
            .as_str()
            .ok_or_else(|| E2eError::MissingOutput(key.to_string()))
    }
}

/// Check run against a stack after a deploy or edit step
pub type RuntimeValidation =
    Arc<dyn Fn(StackInfo) -> BoxFuture<'static, E2eResult<()>> + Send + Sync>;

/// Wrap an async closure as a [`RuntimeValidation`]
pub fn runtime_validation<F, Fut>(f: F) -> RuntimeValidation
where
    F: Fn(StackInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = E2eResult<()>> + Send + 'static,
{
    Arc::new(move |stack| f(stack).boxed())
}

async fn run_validation(validation: &Option<RuntimeValidation>, stack: StackInfo) -> E2eResult<()> {
    match validation {
        Some(validate) => validate(stack).await,
        None => Ok(()),
    }
}

/// An edit applied on top of a deployed example, followed by a redeploy
#[derive(Clone, Default)]
pub struct EditDir {
    pub dir: PathBuf,

    /// Overlay the directory onto the program instead of replacing it
    pub additive: bool,

    pub extra_runtime_validation: Option<RuntimeValidation>,
}

impl EditDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn additive(mut self) -> Self {
        self.additive = true;
        self
    }

    pub fn validate_with(mut self, validation: RuntimeValidation) -> Self {
        self.extra_runtime_validation = Some(validation);
        self
    }

    /// Run this edit's validation, if any, against `stack`
    pub async fn validate_stack(&self, stack: StackInfo) -> E2eResult<()> {
        run_validation(&self.extra_runtime_validation, stack).await
    }
}

impl fmt::Debug for EditDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditDir")
            .field("dir", &self.dir)
            .field("additive", &self.additive)
            .field("has_validation", &self.extra_runtime_validation.is_some())
            .finish()
    }
}

/// Everything the provisioning framework needs to test one example
#[derive(Clone, Default)]
pub struct ProgramTestOptions {
    pub dir: PathBuf,
    pub config: BTreeMap<String, String>,
    pub dependencies: Vec<String>,
    pub edit_dirs: Vec<EditDir>,
    pub extra_runtime_validation: Option<RuntimeValidation>,
    pub tracing: Option<String>,
    pub expect_refresh_changes: bool,
    pub overrides: BTreeMap<String, String>,
    pub quick: bool,
    pub skip_refresh: bool,
}

impl ProgramTestOptions {
    /// Layer `other` on top of `self`. Set fields in `other` win, maps are
    /// merged, lists are appended and flags are combined.
    pub fn with(&self, other: ProgramTestOptions) -> Self {
        let mut merged = self.clone();

        if !other.dir.as_os_str().is_empty() {
            merged.dir = other.dir;
        }
        merged.config.extend(other.config);
        merged.dependencies.extend(other.dependencies);
        merged.edit_dirs.extend(other.edit_dirs);
        if other.extra_runtime_validation.is_some() {
            merged.extra_runtime_validation = other.extra_runtime_validation;
        }
        if other.tracing.is_some() {
            merged.tracing = other.tracing;
        }
        merged.expect_refresh_changes |= other.expect_refresh_changes;
        merged.overrides.extend(other.overrides);
        merged.quick |= other.quick;
        merged.skip_refresh |= other.skip_refresh;

        merged
    }

    /// Test name: the last component of the example directory
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    /// Run the initial-deploy validation, if any, against `stack`
    pub async fn validate_stack(&self, stack: StackInfo) -> E2eResult<()> {
        run_validation(&self.extra_runtime_validation, stack).await
    }
}

impl fmt::Debug for ProgramTestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramTestOptions")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("dependencies", &self.dependencies)
            .field("edit_dirs", &self.edit_dirs)
            .field("has_validation", &self.extra_runtime_validation.is_some())
            .field("tracing", &self.tracing)
            .field("expect_refresh_changes", &self.expect_refresh_changes)
            .field("overrides", &self.overrides)
            .field("quick", &self.quick)
            .field("skip_refresh", &self.skip_refresh)
            .finish()
    }
}

/// The provisioning framework. An implementation deploys `options.dir`,
/// runs its validation, applies each edit dir with its validation, and
/// destroys the stack.
#[async_trait]
pub trait ProgramTester: Send + Sync {
    async fn run(&self, options: &ProgramTestOptions) -> E2eResult<()>;
}

/// One entry of the example table
#[derive(Debug, Clone)]
pub struct ExampleCase {
    pub options: ProgramTestOptions,

    /// Skipped in short mode
    pub long: bool,
}

impl ExampleCase {
    pub fn name(&self) -> String {
        self.options.name()
    }
}

/// Result of running a single example
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running the whole table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Table of example cases plus the config they were built from
#[derive(Debug, Clone)]
pub struct ExampleSuite {
    config: SuiteConfig,
    cases: Vec<ExampleCase>,
}

impl ExampleSuite {
    pub fn builder(config: SuiteConfig) -> SuiteBuilder {
        SuiteBuilder {
            config,
            base: ProgramTestOptions::default(),
            cases: Vec::new(),
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn cases(&self) -> &[ExampleCase] {
        &self.cases
    }

    /// Cases that will run under the current config
    pub fn selected(&self) -> Vec<&ExampleCase> {
        self.cases
            .iter()
            .filter(|c| !(c.long && self.config.short))
            .collect()
    }

    pub fn find(&self, name: &str) -> Option<&ExampleCase> {
        self.cases.iter().find(|c| c.name() == name)
    }

    /// Run every selected case through `tester`. A failing case does not
    /// stop the others.
    pub async fn run(&self, tester: &dyn ProgramTester) -> TestSuiteResult {
        let start = Instant::now();
        let selected = self.selected();
        let skipped = self.cases.len() - selected.len();

        info!("Running {} example(s), {} skipped...", selected.len(), skipped);

        let mut results = Vec::with_capacity(selected.len());
        for case in selected {
            results.push(run_case(tester, case).await);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        TestSuiteResult {
            total: self.cases.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        }
    }
}

async fn run_case(tester: &dyn ProgramTester, case: &ExampleCase) -> TestResult {
    let name = case.name();
    let start = Instant::now();
    debug!("Running example: {} ({})", name, case.options.dir.display());

    let outcome = tester.run(&case.options).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            info!("✓ {} ({} ms)", name, duration_ms);
            TestResult {
                name,
                success: true,
                duration_ms,
                error: None,
            }
        }
        Err(e) => {
            error!("✗ {} - {}", name, e);
            TestResult {
                name,
                success: false,
                duration_ms,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Builder for [`ExampleSuite`]
pub struct SuiteBuilder {
    config: SuiteConfig,
    base: ProgramTestOptions,
    cases: Vec<ExampleCase>,
}

impl SuiteBuilder {
    /// Options merged underneath every case added after this call
    pub fn base(mut self, base: ProgramTestOptions) -> Self {
        self.base = base;
        self
    }

    pub fn case(self, options: ProgramTestOptions) -> Self {
        self.push(options, false)
    }

    pub fn long_case(self, options: ProgramTestOptions) -> Self {
        self.push(options, true)
    }

    fn push(mut self, options: ProgramTestOptions, long: bool) -> Self {
        let options = self.base.with(options);
        self.cases.push(ExampleCase { options, long });
        self
    }

    /// Directory of an example under the configured root
    pub fn example_dir(&self, name: &str) -> PathBuf {
        self.config.example_dir(name)
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn build(self) -> ExampleSuite {
        ExampleSuite {
            config: self.config,
            cases: self.cases,
        }
    }
}

/// `<example>/steps/<step>` under `root`
pub fn step_dir(example: &Path, step: &str) -> PathBuf {
    example.join("steps").join(step)
}
