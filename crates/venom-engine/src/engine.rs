//! The `ContainerEngine` trait: the only way the harness touches the
//! outside world.
//!
//! Every operation is a single attempt that either returns a value or an
//! [`EngineError`](crate::EngineError). Implementations hold no state
//! shared between calls beyond their configuration, so one engine can be
//! shared (behind an `Arc`) by concurrent invocations.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{ContainerSpec, Directory, ExecOutcome, FetchedSource, ImageRef, ImageSpec, SourceReference};

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Fetch a source tree, resolving its ref to a concrete revision.
    async fn fetch_source(&self, source: &SourceReference) -> EngineResult<FetchedSource>;

    /// Allocate a fresh, empty, uniquely named directory.
    async fn scratch_dir(&self, label: &str) -> EngineResult<Directory>;

    /// Read a UTF-8 file from a directory artifact.
    async fn read_file(&self, dir: &Directory, relative: &str) -> EngineResult<String>;

    /// Run one command in a fresh container and wait for it to exit.
    ///
    /// A non-zero exit status is returned in the outcome, never as an
    /// error. Errors mean the engine could not run the container at all.
    /// When `spec.timeout` expires the container is stopped and removed
    /// before [`EngineError::TimedOut`](crate::EngineError::TimedOut) is
    /// returned, so nothing writes to its mounts afterwards.
    async fn exec(&self, spec: &ContainerSpec) -> EngineResult<ExecOutcome>;

    /// Package files onto a base image.
    async fn build_image(&self, spec: &ImageSpec) -> EngineResult<ImageRef>;

    /// Release a directory artifact that is no longer needed.
    async fn discard(&self, dir: &Directory) -> EngineResult<()>;
}
