//! Building the Venom CLI into a minimal runtime image.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use venom_engine::{
    ContainerEngine, ContainerSpec, Directory, FetchedSource, ImageRef, ImageSpec, Platform,
};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result, StepFailure};
use crate::manifest::{parse_go_mod, ToolchainVersion};

/// Dependency manifest at the root of the tool's source tree
pub const MANIFEST_FILE: &str = "go.mod";
/// Where the source tree is mounted in the builder container
pub const SOURCE_WORKDIR: &str = "/venom";
/// Build output directory, relative to the source tree
pub const BUILD_OUTPUT_DIR: &str = "dist";
/// Install path of the binary in the runtime image
pub const BINARY_PATH: &str = "/usr/local/venom";
/// Writable home for the build, which may run as an unprivileged host user
pub const BUILD_HOME: &str = "/tmp";

/// An image holding the compiled tool at [`BINARY_PATH`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolImage {
    pub reference: ImageRef,
    pub binary_path: String,
    /// Source commit the binary was built from
    pub revision: String,
    pub toolchain: ToolchainVersion,
    pub platform: Platform,
}

/// Builds [`ToolImage`]s through an injected engine.
pub struct ToolImageBuilder {
    engine: Arc<dyn ContainerEngine>,
    config: HarnessConfig,
}

impl ToolImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: HarnessConfig) -> Self {
        ToolImageBuilder { engine, config }
    }

    /// Fetch, build and package the tool. Single attempt; the fetched
    /// source tree is discarded whether or not the build succeeds.
    pub async fn build_tool_image(&self) -> Result<ToolImage> {
        let source = self.config.source_reference();
        let platform = self.config.target_platform();
        info!(source = %source, platform = %platform, "Building venom image");

        let fetched = self
            .engine
            .fetch_source(&source)
            .await
            .map_err(|e| HarnessError::Source {
                url: source.url.clone(),
                source: e,
            })?;
        debug!(revision = %fetched.revision, tree = %fetched.tree, "Fetched venom source");

        let result = self.build_from(&fetched, &platform).await;

        if let Err(e) = self.engine.discard(&fetched.tree).await {
            warn!("Failed to discard source tree {}: {}", fetched.tree, e);
        }

        match &result {
            Ok(image) => info!(image = %image.reference, toolchain = %image.toolchain, "Venom image ready"),
            Err(e) => warn!(error = %e, "Venom image build failed"),
        }
        result
    }

    async fn build_from(&self, fetched: &FetchedSource, platform: &Platform) -> Result<ToolImage> {
        let toolchain = self.read_toolchain(&fetched.tree).await?;
        let builder_image = toolchain.builder_image(&self.config.builder_image_prefix);
        info!(builder = %builder_image, "Resolved builder toolchain");

        let build = ContainerSpec::from_image(&builder_image)
            .with_directory(SOURCE_WORKDIR, &fetched.tree)
            .with_workdir(SOURCE_WORKDIR)
            .with_env_variable("HOME", BUILD_HOME)
            .with_env_variable("GOCACHE", format!("{}/.cache/go-build", BUILD_HOME))
            .with_exec(build_command(platform));

        let outcome = self
            .engine
            .exec(&build)
            .await
            .map_err(|e| build_error("make build", e.into()))?;
        if !outcome.success() {
            return Err(build_error(
                "make build",
                StepFailure::NonZeroExit {
                    exit_code: outcome.exit_code,
                    stderr: outcome.stderr.trim().to_string(),
                },
            ));
        }

        let artifact_name = binary_name(platform);
        let artifact = fetched.tree.join(BUILD_OUTPUT_DIR).file(&artifact_name);
        let produced = tokio::fs::try_exists(&artifact).await.unwrap_or(false);
        if !produced {
            return Err(build_error(
                "extract binary",
                StepFailure::MissingArtifact(format!("{}/{}", BUILD_OUTPUT_DIR, artifact_name)),
            ));
        }

        let tag = image_tag(
            &self.config.image_repository,
            &fetched.revision,
            &toolchain,
            platform,
        );
        let spec = ImageSpec::from_base(&self.config.runtime_base_image, tag)
            .with_file(BINARY_PATH, artifact);
        let reference = self
            .engine
            .build_image(&spec)
            .await
            .map_err(|e| build_error("package image", e.into()))?;

        Ok(ToolImage {
            reference,
            binary_path: BINARY_PATH.to_string(),
            revision: fetched.revision.clone(),
            toolchain,
            platform: platform.clone(),
        })
    }

    async fn read_toolchain(&self, tree: &Directory) -> Result<ToolchainVersion> {
        let contents = self
            .engine
            .read_file(tree, MANIFEST_FILE)
            .await
            .map_err(|e| HarnessError::ManifestRead {
                path: MANIFEST_FILE.to_string(),
                source: e,
            })?;

        let module = parse_go_mod(&contents).map_err(|e| HarnessError::ManifestParse {
            path: MANIFEST_FILE.to_string(),
            source: e,
        })?;
        Ok(module.go_version)
    }
}

fn build_error(step: &'static str, source: StepFailure) -> HarnessError {
    HarnessError::BuildExecution { step, source }
}

/// The tree's own build procedure, parameterised by target platform.
pub fn build_command(platform: &Platform) -> Vec<String> {
    vec![
        "make".to_string(),
        "build".to_string(),
        format!("OS={}", platform.os),
        format!("ARCH={}", platform.arch),
    ]
}

/// `venom.<os>-<arch>`, the name the build procedure gives its output.
pub fn binary_name(platform: &Platform) -> String {
    format!("venom.{}", platform.suffix())
}

/// Deterministic tag: same revision, toolchain and platform give the same
/// image reference.
pub fn image_tag(
    repository: &str,
    revision: &str,
    toolchain: &ToolchainVersion,
    platform: &Platform,
) -> String {
    let mut hasher = Sha256::new();
    for part in [revision, toolchain.as_str(), platform.os.as_str(), platform.arch.as_str()] {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}:{}", repository, &digest[..12])
}
