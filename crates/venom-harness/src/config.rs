//! Harness configuration
//!
//! Defaults come from the environment (`VENOM_HARNESS_*`), can be loaded
//! from a JSON file, and are finally overridden by CLI flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use venom_engine::{DockerConfig, GitRef, Platform, SourceReference};

use crate::error::{HarnessError, Result};

pub const DEFAULT_SOURCE_URL: &str = "https://github.com/ovh/venom";
pub const DEFAULT_BUILDER_IMAGE_PREFIX: &str = "golang";
pub const DEFAULT_RUNTIME_BASE_IMAGE: &str = "alpine:latest";
pub const DEFAULT_IMAGE_REPOSITORY: &str = "venom-harness/venom";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Repository holding the Venom sources
    pub source_url: String,
    /// Branch, `tags/<tag>`, or empty for remote HEAD
    pub source_ref: String,
    /// Builder image name; the toolchain version becomes its tag
    pub builder_image_prefix: String,
    /// Minimal image the binary is installed into
    pub runtime_base_image: String,
    /// Repository part of the produced image tag
    pub image_repository: String,
    /// Host directory for clones, run workspaces and image contexts
    pub scratch_dir: PathBuf,
    pub docker_bin: String,
    pub git_bin: String,
    /// Target platform; Linux on the host architecture when unset
    pub platform: Option<Platform>,
    /// Value of `VENOM_VERBOSE` in the test container
    pub verbose: u8,
    /// Pass `--html-report` to the tool
    pub html_report: bool,
    /// Wall-clock limit on a test run in seconds (0 = none)
    pub timeout_secs: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        HarnessConfig {
            source_url: env("VENOM_HARNESS_SOURCE_URL")
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            source_ref: env("VENOM_HARNESS_SOURCE_REF").unwrap_or_default(),
            builder_image_prefix: DEFAULT_BUILDER_IMAGE_PREFIX.to_string(),
            runtime_base_image: DEFAULT_RUNTIME_BASE_IMAGE.to_string(),
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            scratch_dir: env("VENOM_HARNESS_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("venom-harness")),
            docker_bin: env("VENOM_HARNESS_DOCKER").unwrap_or_else(|| "docker".to_string()),
            git_bin: "git".to_string(),
            platform: None,
            verbose: 1,
            html_report: true,
            timeout_secs: 0,
        }
    }
}

impl HarnessConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Load a JSON config file. Missing keys fall back to [`Default`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("cannot read {:?}: {}", path, e)))?;
        let config: HarnessConfig = serde_json::from_str(&raw)
            .map_err(|e| HarnessError::Config(format!("cannot parse {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Use a different source repository
    pub fn with_source(mut self, url: &str, git_ref: &str) -> Self {
        self.source_url = url.to_string();
        self.source_ref = git_ref.to_string();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("source_url", &self.source_url),
            ("builder_image_prefix", &self.builder_image_prefix),
            ("runtime_base_image", &self.runtime_base_image),
            ("image_repository", &self.image_repository),
            ("docker_bin", &self.docker_bin),
            ("git_bin", &self.git_bin),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(HarnessError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.image_repository.contains(':') {
            return Err(HarnessError::Config(
                "image_repository must not carry a tag".to_string(),
            ));
        }
        if let Some(platform) = &self.platform {
            if platform.os.is_empty() || platform.arch.is_empty() {
                return Err(HarnessError::Config(
                    "platform os and arch must both be set".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn source_reference(&self) -> SourceReference {
        SourceReference::head(&self.source_url).with_ref(GitRef::parse(&self.source_ref))
    }

    /// Configured platform, or Linux on the host architecture. The binary
    /// runs inside containers, never on the host itself.
    pub fn target_platform(&self) -> Platform {
        self.platform.clone().unwrap_or_else(Platform::container_host)
    }

    pub fn docker_config(&self) -> DockerConfig {
        DockerConfig {
            docker_bin: self.docker_bin.clone(),
            git_bin: self.git_bin.clone(),
            scratch_root: self.scratch_dir.clone(),
            ..DockerConfig::default()
        }
    }
}
