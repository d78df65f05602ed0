//! Examples E2E Test Harness
//!
//! Drives example infrastructure programs through deploy, edit, redeploy
//! and destroy, and checks the live endpoints they expose:
//! - Builds the table of example cases from an explicit suite config
//! - Hands each case to a provisioning framework behind a trait
//! - Polls endpoints with a capped linear backoff until they answer 200
//! - Validates the response body with a caller-supplied check
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Examples E2E Harness (Rust)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ExampleSuite                                                │
//! │    ├── builder(SuiteConfig) -> SuiteBuilder                 │
//! │    ├── selected() -> [ExampleCase]   (short mode filter)    │
//! │    └── run(&dyn ProgramTester) -> TestSuiteResult           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PollingValidator<Transport, Sleeper>                       │
//! │    ├── validate(output, headers, max_wait, check)           │
//! │    │     Attempting -> Backoff(10s, 20s, 30s, 30s, ...)     │
//! │    │                -> Succeeded | TimedOut | Failed        │
//! │    └── assert_http_result / assert_http_hello_world         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backoff;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod request;
pub mod suite;
pub mod target;
pub mod transport;
pub mod validator;

pub use config::SuiteConfig;
pub use error::{E2eError, E2eResult};
pub use request::Headers;
pub use suite::{ExampleSuite, ProgramTestOptions, ProgramTester, StackInfo};
pub use target::Target;
pub use validator::{PollReport, PollingValidator, DEFAULT_MAX_WAIT};
