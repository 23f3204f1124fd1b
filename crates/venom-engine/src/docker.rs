//! Docker CLI engine
//!
//! Runs containers with `docker run`, packages images with `docker build`
//! and fetches sources with `git clone`. Every directory artifact lives
//! under a scratch root on the host and is bind-mounted into containers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::ContainerEngine;
use crate::error::{EngineError, EngineResult};
use crate::types::{
    ContainerSpec, Directory, ExecOutcome, FetchedSource, GitRef, ImageRef, ImageSpec, Mount,
    SourceReference,
};

/// Exit status `docker run` uses when the daemon, not the container, failed.
const DOCKER_RUN_FAILURE: i32 = 125;

/// Docker engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DockerConfig {
    /// docker executable
    pub docker_bin: String,
    /// git executable
    pub git_bin: String,
    /// Host directory under which all artifacts are created
    pub scratch_root: PathBuf,
    /// Run containers as the owner of `scratch_root` unless the spec
    /// names a user, so their output stays removable on the host
    #[serde(default = "default_map_host_user")]
    pub map_host_user: bool,
}

fn default_map_host_user() -> bool {
    true
}

impl Default for DockerConfig {
    fn default() -> Self {
        DockerConfig {
            docker_bin: "docker".to_string(),
            git_bin: "git".to_string(),
            scratch_root: std::env::temp_dir().join("venom-harness"),
            map_host_user: true,
        }
    }
}

/// Engine backed by the local `docker` and `git` CLIs.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    config: DockerConfig,
}

impl DockerEngine {
    pub fn new(config: DockerConfig) -> Self {
        DockerEngine { config }
    }

    pub fn config(&self) -> &DockerConfig {
        &self.config
    }

    /// Arguments for `docker run` (everything after the executable).
    pub fn run_args(spec: &ContainerSpec, name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];

        if let Some(user) = &spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }

        if let Some(workdir) = &spec.workdir {
            args.push("--workdir".to_string());
            args.push(workdir.clone());
        }

        for mount in &spec.mounts {
            args.push("--volume".to_string());
            args.push(volume_arg(mount));
        }

        for (name, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", name, value));
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }

    /// Dockerfile that layers `spec.files` onto `spec.base`. Each file is
    /// expected in the build context under its position index.
    pub fn dockerfile(spec: &ImageSpec) -> String {
        let mut lines = vec![format!("FROM {}", spec.base)];
        for (index, file) in spec.files.iter().enumerate() {
            lines.push(format!("COPY {} {}", context_name(index), file.target));
        }
        lines.join("\n") + "\n"
    }

    /// Spawn a process, wait for it, and capture its output. Only a spawn
    /// failure is an error; the exit status is returned as data.
    async fn run_command(
        &self,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> EngineResult<ExecOutcome> {
        let start = Instant::now();
        debug!(program, ?args, "Running command");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let child = command.spawn().map_err(|source| EngineError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let output = child.wait_with_output().await?;

        Ok(ExecOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Force-remove a container by name. Failures are only logged.
    async fn remove_container(&self, name: &str) {
        let args = vec!["rm".to_string(), "-f".to_string(), name.to_string()];
        match self.run_command(&self.config.docker_bin, &args, None).await {
            Ok(outcome) if outcome.success() => debug!(container = name, "Removed container"),
            Ok(outcome) => warn!(container = name, stderr = %outcome.stderr.trim(), "Failed to remove container"),
            Err(e) => warn!(container = name, "Failed to remove container: {}", e),
        }
    }

    /// `uid:gid` owning the scratch root, which is where every writable
    /// mount lives.
    #[cfg(unix)]
    async fn host_user(&self) -> Option<String> {
        use std::os::unix::fs::MetadataExt;

        tokio::fs::create_dir_all(&self.config.scratch_root).await.ok()?;
        let meta = tokio::fs::metadata(&self.config.scratch_root).await.ok()?;
        Some(format!("{}:{}", meta.uid(), meta.gid()))
    }

    #[cfg(not(unix))]
    async fn host_user(&self) -> Option<String> {
        None
    }

    /// Clone `source` into `tree` and return the resolved commit.
    async fn clone_into(&self, source: &SourceReference, tree: &Directory) -> EngineResult<String> {
        let mut args = vec!["clone".to_string(), "--depth".to_string(), "1".to_string()];
        match &source.git_ref {
            GitRef::Head => {}
            GitRef::Branch(name) | GitRef::Tag(name) => {
                args.push("--branch".to_string());
                args.push(name.clone());
            }
        }
        args.push(source.url.clone());
        args.push(tree.path().display().to_string());

        let clone = self.run_command(&self.config.git_bin, &args, None).await?;
        if !clone.success() {
            return Err(EngineError::Fetch {
                url: source.url.clone(),
                reason: clone.stderr.trim().to_string(),
            });
        }

        let rev_args = vec!["rev-parse".to_string(), "HEAD".to_string()];
        let rev = self
            .run_command(&self.config.git_bin, &rev_args, Some(tree.path()))
            .await?;
        if !rev.success() {
            return Err(EngineError::Fetch {
                url: source.url.clone(),
                reason: format!("could not resolve HEAD: {}", rev.stderr.trim()),
            });
        }
        Ok(rev.stdout.trim().to_string())
    }

    /// Bind mounts need absolute host paths that exist.
    async fn absolutize(&self, spec: &ContainerSpec) -> EngineResult<ContainerSpec> {
        let mut resolved = spec.clone();
        for mount in &mut resolved.mounts {
            let path = tokio::fs::canonicalize(mount.source.path())
                .await
                .map_err(|_| EngineError::NotFound(mount.source.to_string()))?;
            mount.source = Directory::new(path);
        }
        Ok(resolved)
    }
}

/// Removes a named container if `exec` is dropped before it finishes.
struct ContainerGuard {
    docker_bin: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker_bin: &str, name: &str) -> Self {
        ContainerGuard {
            docker_bin: docker_bin.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let docker_bin = self.docker_bin.clone();
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            let removed = Command::new(&docker_bin)
                .args(["rm", "-f", name.as_str()])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            if let Err(e) = removed {
                warn!(container = %name, "Failed to remove abandoned container: {}", e);
            }
        });
    }
}

fn volume_arg(mount: &Mount) -> String {
    let mut arg = format!("{}:{}", mount.source.path().display(), mount.target);
    if mount.read_only {
        arg.push_str(":ro");
    }
    arg
}

fn context_name(index: usize) -> String {
    format!("file-{}", index)
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn fetch_source(&self, source: &SourceReference) -> EngineResult<FetchedSource> {
        info!(source = %source, "Fetching source tree");
        let tree = self.scratch_dir("source").await?;

        let revision = match self.clone_into(source, &tree).await {
            Ok(revision) => revision,
            Err(e) => {
                if let Err(discard_err) = self.discard(&tree).await {
                    warn!("Failed to remove partial clone {}: {}", tree, discard_err);
                }
                return Err(e);
            }
        };

        debug!(revision = %revision, "Resolved source revision");
        Ok(FetchedSource {
            reference: source.clone(),
            revision,
            tree,
        })
    }

    async fn scratch_dir(&self, label: &str) -> EngineResult<Directory> {
        let path = self
            .config
            .scratch_root
            .join(format!("{}-{}", label, Uuid::new_v4()));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Directory::new(path))
    }

    async fn read_file(&self, dir: &Directory, relative: &str) -> EngineResult<String> {
        let path = dir.file(relative);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    async fn exec(&self, spec: &ContainerSpec) -> EngineResult<ExecOutcome> {
        spec.validate().map_err(EngineError::InvalidSpec)?;
        let mut spec = self.absolutize(spec).await?;
        if spec.user.is_none() && self.config.map_host_user {
            spec.user = self.host_user().await;
        }

        let name = format!("venom-{}", Uuid::new_v4());
        let args = Self::run_args(&spec, &name);
        let mut guard = ContainerGuard::new(&self.config.docker_bin, &name);

        let run = self.run_command(&self.config.docker_bin, &args, None);
        let result = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(container = %name, limit_secs = limit.as_secs(), "Container timed out");
                    self.remove_container(&name).await;
                    guard.disarm();
                    return Err(EngineError::TimedOut(limit.as_secs()));
                }
            },
            None => run.await,
        };
        guard.disarm();

        let outcome = result?;
        if outcome.exit_code == DOCKER_RUN_FAILURE {
            return Err(EngineError::Runtime(outcome.stderr.trim().to_string()));
        }
        Ok(outcome)
    }

    async fn build_image(&self, spec: &ImageSpec) -> EngineResult<ImageRef> {
        info!(tag = %spec.tag, base = %spec.base, "Building image");
        let context = self.scratch_dir("image").await?;

        for (index, file) in spec.files.iter().enumerate() {
            if !tokio::fs::try_exists(&file.source).await? {
                return Err(EngineError::NotFound(file.source.display().to_string()));
            }
            tokio::fs::copy(&file.source, context.file(context_name(index))).await?;
        }
        tokio::fs::write(context.file("Dockerfile"), Self::dockerfile(spec)).await?;

        let args = vec![
            "build".to_string(),
            "--tag".to_string(),
            spec.tag.clone(),
            context.path().display().to_string(),
        ];
        let result = self.run_command(&self.config.docker_bin, &args, None).await;

        if let Err(e) = self.discard(&context).await {
            warn!("Failed to remove image context {}: {}", context, e);
        }

        let outcome = result?;
        if !outcome.success() {
            return Err(EngineError::ImageBuild {
                tag: spec.tag.clone(),
                reason: outcome.stderr.trim().to_string(),
            });
        }
        Ok(ImageRef(spec.tag.clone()))
    }

    async fn discard(&self, dir: &Directory) -> EngineResult<()> {
        match tokio::fs::remove_dir_all(dir.path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}
