//! Venom Engine: the container build/execution seam for venom-harness
//!
//! The harness never talks to Docker or git directly. It goes through the
//! [`ContainerEngine`] trait, which an application injects:
//!
//! - [`DockerEngine`]: shells out to the `docker` and `git` CLIs
//! - [`fakes::FakeEngine`]: simulates the builder and the Venom CLI on
//!   host directories, for tests
//!
//! ## Modules
//!
//! - [`engine`]: the `ContainerEngine` trait
//! - [`types`]: `Directory`, `SourceReference`, `ContainerSpec`, `ImageSpec`, ...
//! - [`docker`]: CLI-backed engine
//! - [`platform`]: host OS/arch in Go spelling
//! - [`glob`]: shell wildcard matching
//! - [`fakes`]: test engine

pub mod docker;
pub mod engine;
pub mod error;
pub mod fakes;
pub mod glob;
pub mod platform;
pub mod types;

pub use docker::{DockerConfig, DockerEngine};
pub use engine::ContainerEngine;
pub use error::{EngineError, EngineResult};
pub use glob::wildcard_match;
pub use platform::Platform;
pub use types::{
    ContainerSpec, Directory, ExecOutcome, FetchedSource, GitRef, ImageFile, ImageRef, ImageSpec,
    Mount, SourceReference,
};
