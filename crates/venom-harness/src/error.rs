//! Error types for venom-harness
//!
//! Each variant names the orchestration step that failed and keeps the
//! underlying cause. None of them is retried. A non-zero exit code from the
//! Venom CLI is never one of these: it is returned in
//! [`TestResults`](crate::TestResults).

use std::path::PathBuf;

use thiserror::Error;
use venom_engine::EngineError;

use crate::manifest::ManifestError;
use crate::phase::RunPhase;

/// Why a step that runs a container did not complete.
#[derive(Error, Debug)]
pub enum StepFailure {
    /// The engine could not run the container
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The command ran and exited non-zero
    #[error("command exited with status {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    /// The command succeeded but its expected output is missing
    #[error("expected artifact {0} was not produced")]
    MissingArtifact(String),

    /// The caller-configured time limit expired
    #[error("timed out after {0}s")]
    TimedOut(u64),
}

/// Errors that can occur while building the tool image or running suites
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Tool source could not be fetched
    #[error("error fetching venom source {url}: {source}")]
    Source {
        url: String,
        #[source]
        source: EngineError,
    },

    /// Dependency manifest could not be read
    #[error("error reading {path}: {source}")]
    ManifestRead {
        path: String,
        #[source]
        source: EngineError,
    },

    /// Dependency manifest could not be parsed
    #[error("error parsing {path}: {source}")]
    ManifestParse {
        path: String,
        #[source]
        source: ManifestError,
    },

    /// Building or packaging the tool failed
    #[error("error building venom image ({step}): {source}")]
    BuildExecution {
        step: &'static str,
        #[source]
        source: StepFailure,
    },

    /// The test container could not be run to completion
    #[error("unexpected error executing tests: {source}")]
    ContainerExecution {
        #[source]
        source: StepFailure,
    },

    /// The exit-code capture file could not be read back
    #[error("could not get exit code from test command ({path}): {source}")]
    ResultRetrieval {
        path: String,
        #[source]
        source: EngineError,
    },

    /// The captured exit code is not an integer
    #[error("invalid exit code for tests {raw:?}: {source}")]
    InvalidExitCode {
        raw: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// The caller's test directory is unusable
    #[error("tests directory {path:?} is unusable: {source}")]
    InvalidTestsDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Copying results out failed
    #[error("error exporting results to {path:?}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    /// The phase the run was in when this error occurred.
    pub fn failed_phase(&self) -> RunPhase {
        match self {
            HarnessError::Source { .. }
            | HarnessError::ManifestRead { .. }
            | HarnessError::ManifestParse { .. }
            | HarnessError::BuildExecution { .. }
            | HarnessError::Config(_) => RunPhase::Init,
            HarnessError::InvalidTestsDirectory { .. } => RunPhase::Built,
            HarnessError::ContainerExecution { .. } => RunPhase::Mounted,
            HarnessError::ResultRetrieval { .. } | HarnessError::InvalidExitCode { .. } => {
                RunPhase::Executed
            }
            HarnessError::Export { .. } => RunPhase::ResultsCollected,
        }
    }
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
