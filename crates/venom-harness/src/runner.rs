//! Running Venom suites in a fresh container and collecting the outcome.
//!
//! Layout inside the container:
//!
//! ```text
//! /workdir            per-run scratch directory (read-write)
//! /workdir/tests      caller's suites (read-only)
//! /workdir/results    written by the tool ($VENOM_OUTPUT_DIR)
//! /workdir/exit_code  tool exit status, written by the shell
//! ```
//!
//! The tool and the status capture run in one shell so that a failing suite
//! never aborts the run: the shell always goes on to record `$?`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use venom_engine::{ContainerEngine, ContainerSpec, Directory, EngineError, ExecOutcome};

use crate::builder::ToolImage;
use crate::config::HarnessConfig;
use crate::discovery::{discover_suites, SUITE_PATTERN};
use crate::error::{HarnessError, Result, StepFailure};
use crate::phase::{PhaseTracker, RunPhase};

pub const WORKDIR: &str = "/workdir";
pub const TESTS_DIR: &str = "tests";
pub const RESULTS_DIR: &str = "results";
/// Auxiliary library directory, relative to the tests directory
pub const LIB_DIR: &str = "lib";
pub const EXIT_CODE_FILE: &str = "exit_code";

pub const ENV_OUTPUT_DIR: &str = "VENOM_OUTPUT_DIR";
pub const ENV_LIB_DIR: &str = "VENOM_LIB_DIR";
pub const ENV_VERBOSE: &str = "VENOM_VERBOSE";

/// Outcome of one test invocation. A non-zero `exit_code` means suites
/// failed; deciding what that means is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    /// Directory the tool wrote its output to
    pub results_dir: Directory,
    /// Exit status of the tool
    pub exit_code: i32,
}

impl TestResults {
    /// Whether every suite passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Knobs for a test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub verbose: u8,
    pub html_report: bool,
    /// 0 = no limit
    pub timeout_secs: u64,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            verbose: 1,
            html_report: true,
            timeout_secs: 0,
        }
    }
}

impl From<&HarnessConfig> for RunOptions {
    fn from(config: &HarnessConfig) -> Self {
        RunOptions {
            verbose: config.verbose,
            html_report: config.html_report,
            timeout_secs: config.timeout_secs,
        }
    }
}

/// Runs suites against a [`ToolImage`] through an injected engine.
pub struct TestRunner {
    engine: Arc<dyn ContainerEngine>,
    options: RunOptions,
}

impl TestRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>, options: RunOptions) -> Self {
        TestRunner { engine, options }
    }

    /// Run every suite in `tests` with the tool in `image`.
    pub async fn run_tests(&self, image: &ToolImage, tests: &Directory) -> Result<TestResults> {
        let mut tracker = PhaseTracker::starting_at(Uuid::new_v4().to_string(), RunPhase::Built);
        self.run_tracked(image, tests, &mut tracker).await
    }

    /// Like [`run_tests`](Self::run_tests), recording phases on `tracker`,
    /// which must be at [`RunPhase::Built`].
    pub async fn run_tracked(
        &self,
        image: &ToolImage,
        tests: &Directory,
        tracker: &mut PhaseTracker,
    ) -> Result<TestResults> {
        let result = self.run_inner(image, tests, tracker).await;
        if let Err(e) = &result {
            tracker.fail(e);
        }
        result
    }

    async fn run_inner(
        &self,
        image: &ToolImage,
        tests: &Directory,
        tracker: &mut PhaseTracker,
    ) -> Result<TestResults> {
        let invalid = |source| HarnessError::InvalidTestsDirectory {
            path: tests.path().to_path_buf(),
            source,
        };
        let meta = std::fs::metadata(tests.path()).map_err(invalid)?;
        if !meta.is_dir() {
            return Err(invalid(std::io::Error::new(
                std::io::ErrorKind::Other,
                "not a directory",
            )));
        }
        let suites = discover_suites(tests.path()).map_err(invalid)?;
        if suites.is_empty() {
            warn!(run_id = %tracker.run_id(), tests = %tests, pattern = SUITE_PATTERN, "No suite files match; running anyway");
        } else {
            info!(run_id = %tracker.run_id(), suites = suites.len(), "Discovered suites");
        }

        let workspace = self
            .engine
            .scratch_dir("run")
            .await
            .map_err(|e| HarnessError::ContainerExecution { source: e.into() })?;

        let result = self.run_in(image, tests, &workspace, tracker).await;
        if result.is_err() {
            if let Err(e) = self.engine.discard(&workspace).await {
                warn!("Failed to discard run workspace {}: {}", workspace, e);
            }
        }
        result
    }

    async fn run_in(
        &self,
        image: &ToolImage,
        tests: &Directory,
        workspace: &Directory,
        tracker: &mut PhaseTracker,
    ) -> Result<TestResults> {
        let mut spec = container_spec(image, tests, workspace, &self.options);
        if self.options.timeout_secs > 0 {
            spec = spec.with_timeout(Duration::from_secs(self.options.timeout_secs));
        }
        tracker.advance(RunPhase::Mounted);
        debug!(run_id = %tracker.run_id(), command = ?spec.command, "Executing venom");

        let outcome = self.execute(&spec).await?;
        if !outcome.success() {
            return Err(HarnessError::ContainerExecution {
                source: StepFailure::NonZeroExit {
                    exit_code: outcome.exit_code,
                    stderr: outcome.stderr.trim().to_string(),
                },
            });
        }
        tracker.advance(RunPhase::Executed);

        let raw = self
            .engine
            .read_file(workspace, EXIT_CODE_FILE)
            .await
            .map_err(|e| HarnessError::ResultRetrieval {
                path: format!("{}/{}", WORKDIR, EXIT_CODE_FILE),
                source: e,
            })?;
        let exit_code = parse_exit_code(&raw)?;
        tracker.advance(RunPhase::ResultsCollected);

        let results = TestResults {
            results_dir: workspace.join(RESULTS_DIR),
            exit_code,
        };
        info!(
            run_id = %tracker.run_id(),
            exit_code,
            results = %results.results_dir,
            "Venom run finished"
        );
        Ok(results)
    }

    /// Run the container to completion. The engine enforces the time
    /// limit and has removed the container by the time it reports expiry.
    async fn execute(&self, spec: &ContainerSpec) -> Result<ExecOutcome> {
        self.engine
            .exec(spec)
            .await
            .map_err(|e| HarnessError::ContainerExecution {
                source: match e {
                    EngineError::TimedOut(secs) => StepFailure::TimedOut(secs),
                    other => other.into(),
                },
            })
    }
}

/// Container for one run: tool image, mounts, environment, and command.
pub fn container_spec(
    image: &ToolImage,
    tests: &Directory,
    workspace: &Directory,
    options: &RunOptions,
) -> ContainerSpec {
    let tests_path = format!("{}/{}", WORKDIR, TESTS_DIR);
    ContainerSpec::from_image(image.reference.as_str())
        .with_workdir(WORKDIR)
        .with_directory(WORKDIR, workspace)
        .with_mounted_directory(&tests_path, tests)
        .with_env_variable(ENV_OUTPUT_DIR, format!("{}/{}", WORKDIR, RESULTS_DIR))
        .with_env_variable(ENV_LIB_DIR, format!("{}/{}", tests_path, LIB_DIR))
        .with_env_variable(ENV_VERBOSE, options.verbose.to_string())
        .with_exec([
            "/bin/sh".to_string(),
            "-c".to_string(),
            tool_script(&image.binary_path, options.html_report),
        ])
}

/// Shell script that runs the tool then records its exit status.
pub fn tool_script(binary_path: &str, html_report: bool) -> String {
    let mut run = format!("{} run ./{}/{}", binary_path, TESTS_DIR, SUITE_PATTERN);
    if html_report {
        run.push_str(" --html-report");
    }
    format!("{}; printf '%d' $? > {}", run, EXIT_CODE_FILE)
}

/// Parse the captured exit status. Surrounding whitespace is tolerated.
pub fn parse_exit_code(raw: &str) -> Result<i32> {
    raw.trim()
        .parse::<i32>()
        .map_err(|source| HarnessError::InvalidExitCode {
            raw: raw.to_string(),
            source,
        })
}
