//! Error types for venom-engine

use thiserror::Error;

/// Errors surfaced by a [`ContainerEngine`](crate::ContainerEngine) backend.
///
/// A non-zero exit status of a containerised process is *not* an error:
/// it comes back as data in [`ExecOutcome`](crate::ExecOutcome).
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine binary (docker, git) could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Source tree could not be fetched
    #[error("Source fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The container runtime itself failed (daemon error, bad mount, ...)
    #[error("Container runtime error: {0}")]
    Runtime(String),

    /// Packaging an image failed
    #[error("Image build failed for {tag}: {reason}")]
    ImageBuild { tag: String, reason: String },

    /// The container outlived the limit set on its spec and was removed
    #[error("Container timed out after {0}s")]
    TimedOut(u64),

    /// A file or directory expected by the engine is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request handed to the engine is unusable
    #[error("Invalid container spec: {0}")]
    InvalidSpec(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
