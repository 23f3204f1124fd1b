//! Venom Harness: containerised runs of the Venom integration-testing CLI
//!
//! Two steps, both going through an injected
//! [`ContainerEngine`](venom_engine::ContainerEngine):
//!
//! 1. [`ToolImageBuilder`] fetches the Venom sources, reads the Go version
//!    from `go.mod`, builds the binary in `golang:<version>` for the target
//!    platform and installs it into a minimal image.
//! 2. [`TestRunner`] mounts a directory of YAML suites into a container
//!    from that image, runs the tool, and returns the results directory
//!    together with the tool's exit code.
//!
//! A non-zero exit code is a test outcome, not an error. Errors
//! ([`HarnessError`]) mean the orchestration itself failed.
//!
//! ```no_run
//! # async fn demo() -> venom_harness::Result<()> {
//! use venom_engine::Directory;
//! use venom_harness::{HarnessConfig, VenomHarness};
//!
//! let harness = VenomHarness::with_docker(HarnessConfig::from_env())?;
//! let results = harness.test(&Directory::new("./integration")).await?;
//! if !results.passed() {
//!     eprintln!("suites failed with exit code {}", results.exit_code);
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod discovery;
pub mod error;
pub mod export;
pub mod harness;
pub mod manifest;
pub mod phase;
pub mod report;
pub mod runner;
pub mod telemetry;

pub use builder::{ToolImage, ToolImageBuilder, BINARY_PATH};
pub use config::HarnessConfig;
pub use discovery::{discover_suites, SUITE_PATTERN};
pub use error::{HarnessError, Result, StepFailure};
pub use export::export_results;
pub use harness::VenomHarness;
pub use manifest::{parse_go_mod, GoModule, ManifestError, ToolchainVersion};
pub use phase::{PhaseTracker, RunPhase};
pub use report::TestReport;
pub use runner::{parse_exit_code, RunOptions, TestResults, TestRunner};
pub use telemetry::init_tracing;

/// venom-harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
