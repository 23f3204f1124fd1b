//! Value types exchanged with a container engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Handle to a directory artifact held by the engine.
///
/// Engines in this crate back every artifact with a host directory, so the
/// handle is a path. Callers should treat it as opaque and go through the
/// engine to read from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Host path backing this directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle to a subdirectory (not required to exist yet).
    pub fn join(&self, relative: impl AsRef<Path>) -> Directory {
        Directory::new(self.path.join(relative))
    }

    /// Host path of a file inside this directory.
    pub fn file(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.path.join(relative)
    }
}

impl std::fmt::Display for Directory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// Source references
// ---------------------------------------------------------------------------

/// Which revision of a repository to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum GitRef {
    /// Whatever the remote HEAD points at when fetched
    Head,
    Branch(String),
    Tag(String),
}

impl GitRef {
    /// Parse a user-supplied ref. Empty or `HEAD` means remote head; a
    /// `tags/` prefix selects a tag; anything else is a branch name.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("head") {
            GitRef::Head
        } else if let Some(tag) = raw.strip_prefix("tags/") {
            GitRef::Tag(tag.to_string())
        } else {
            GitRef::Branch(raw.to_string())
        }
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitRef::Head => write!(f, "HEAD"),
            GitRef::Branch(name) => write!(f, "{}", name),
            GitRef::Tag(name) => write!(f, "tags/{}", name),
        }
    }
}

/// Location of a source tree: repository URL plus ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceReference {
    pub url: String,
    pub git_ref: GitRef,
}

impl SourceReference {
    /// Reference to the latest head of `url`.
    pub fn head(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            git_ref: GitRef::Head,
        }
    }

    pub fn with_ref(mut self, git_ref: GitRef) -> Self {
        self.git_ref = git_ref;
        self
    }
}

impl std::fmt::Display for SourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.url, self.git_ref)
    }
}

/// A fetched source tree, pinned to the commit the ref resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedSource {
    pub reference: SourceReference,
    /// Full commit SHA
    pub revision: String,
    pub tree: Directory,
}

impl FetchedSource {
    /// Short revision (first 12 characters).
    pub fn short_revision(&self) -> &str {
        &self.revision[..12.min(self.revision.len())]
    }
}

// ---------------------------------------------------------------------------
// Container execution
// ---------------------------------------------------------------------------

/// A directory mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: Directory,
    /// Absolute path inside the container
    pub target: String,
    pub read_only: bool,
}

/// Everything needed to start one container and run one command in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub workdir: Option<String>,
    pub mounts: Vec<Mount>,
    pub env: BTreeMap<String, String>,
    /// First element is the executable
    pub command: Vec<String>,
    /// `uid:gid` to run as; engines may default it to the host user
    #[serde(default)]
    pub user: Option<String>,
    /// Wall-clock limit; the engine stops the container when it expires
    #[serde(default)]
    pub timeout: Option<Duration>,
}

impl ContainerSpec {
    /// Start a spec from an image reference.
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            workdir: None,
            mounts: Vec::new(),
            env: BTreeMap::new(),
            command: Vec::new(),
            user: None,
            timeout: None,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Mount `source` read-write at `target`.
    pub fn with_directory(mut self, target: impl Into<String>, source: &Directory) -> Self {
        self.mounts.push(Mount {
            source: source.clone(),
            target: target.into(),
            read_only: false,
        });
        self
    }

    /// Mount `source` read-only at `target`.
    pub fn with_mounted_directory(mut self, target: impl Into<String>, source: &Directory) -> Self {
        self.mounts.push(Mount {
            source: source.clone(),
            target: target.into(),
            read_only: true,
        });
        self
    }

    pub fn with_env_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_exec<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Reject container specs no engine could run.
    pub fn validate(&self) -> Result<(), String> {
        if self.image.trim().is_empty() {
            return Err("image reference is empty".to_string());
        }
        if self.command.is_empty() {
            return Err("command is empty".to_string());
        }
        if let Some(workdir) = &self.workdir {
            if !workdir.starts_with('/') {
                return Err(format!("workdir {} is not absolute", workdir));
            }
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err("timeout must be greater than zero".to_string());
        }
        for mount in &self.mounts {
            if !mount.target.starts_with('/') {
                return Err(format!("mount target {} is not absolute", mount.target));
            }
        }
        Ok(())
    }

    /// Map an absolute path inside the container to the host path backing
    /// it, using the most specific mount. `None` if no mount covers it.
    pub fn resolve_host_path(&self, container_path: &str) -> Option<PathBuf> {
        let container_path = normalize(container_path);
        self.mounts
            .iter()
            .filter_map(|mount| {
                let target = normalize(&mount.target);
                let rest = container_path.strip_prefix(&target).ok()?;
                Some((target.components().count(), mount.source.path().join(rest)))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, host)| host)
    }
}

/// Lexically clean a container path (`.` and `..` components).
fn normalize(path: &str) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                out.pop();
            }
            _ => {}
        }
    }
    out
}

/// Exit status and captured output of a containerised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    /// Process exit code (-1 when killed by a signal)
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// A host file to place into an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    pub source: PathBuf,
    /// Absolute path inside the image
    pub target: String,
}

/// A layered image: base plus files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub base: String,
    pub tag: String,
    pub files: Vec<ImageFile>,
}

impl ImageSpec {
    pub fn from_base(base: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            tag: tag.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, target: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        self.files.push(ImageFile {
            source: source.into(),
            target: target.into(),
        });
        self
    }
}

/// Reference to a built image, usable as [`ContainerSpec::image`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
