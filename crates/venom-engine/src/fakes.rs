//! In-process fake engine (testing only)
//!
//! `FakeEngine` satisfies the [`ContainerEngine`] contract without Docker,
//! git or network. It works on real host directories under a scratch root
//! and simulates the two commands the harness runs:
//!
//! - `make build OS=<os> ARCH=<arch>`: writes `dist/venom.<os>-<arch>` into
//!   the mounted working directory
//! - `/bin/sh -c "<venom> run ./<dir>/<glob> [--html-report]; printf '%d' $? > <file>"`:
//!   expands the glob the way `sh` would, writes one result file per suite
//!   (plus an HTML report) into `$VENOM_OUTPUT_DIR`, and writes the exit
//!   status into the capture file
//!
//! A suite fails when its contents include [`FAILING_SUITE_MARKER`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::engine::ContainerEngine;
use crate::error::{EngineError, EngineResult};
use crate::glob::wildcard_match;
use crate::types::{
    ContainerSpec, Directory, ExecOutcome, FetchedSource, ImageRef, ImageSpec, SourceReference,
};

/// Suites containing this text are reported as failed by the fake tool.
pub const FAILING_SUITE_MARKER: &str = "fake-venom: fail";

/// Exit status the fake tool reports when any suite fails.
pub const FAILED_SUITES_EXIT_CODE: i32 = 2;

const DEFAULT_GO_MOD: &str = "module github.com/ovh/venom\n\ngo 1.22.0\n";

/// What the fake shell writes to the exit-code capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCapture {
    /// The real exit status, as `printf '%d'` would
    Status,
    /// Nothing: the capture file is never created
    Missing,
    /// Arbitrary contents
    Contents(String),
}

/// Knobs for the fake's behaviour. `Default` is the happy path.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    /// `go.mod` contents of the fetched tree; `None` leaves it out
    pub go_mod: Option<String>,
    pub revision: String,
    /// Fail `fetch_source` with this reason
    pub fetch_error: Option<String>,
    /// Exit status of the simulated `make build`
    pub build_exit_code: i32,
    /// Whether `make build` leaves the binary in `dist/`
    pub produce_artifact: bool,
    /// Force the tool's exit status regardless of suite outcomes
    pub tool_exit_override: Option<i32>,
    pub exit_capture: ExitCapture,
    /// Fail `exec` outright, as if the runtime were unavailable
    pub runtime_error: Option<String>,
    /// Fail every `read_file` call
    pub fail_reads: bool,
    /// Time every `exec` takes before its command runs; a shorter
    /// `spec.timeout` cuts it off with [`EngineError::TimedOut`]
    pub exec_delay: Option<Duration>,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        FakeBehavior {
            go_mod: Some(DEFAULT_GO_MOD.to_string()),
            revision: "4d1c9a3b7e2f40f5a6b8c9d0e1f2a3b4c5d6e7f8".to_string(),
            fetch_error: None,
            build_exit_code: 0,
            produce_artifact: true,
            tool_exit_override: None,
            exit_capture: ExitCapture::Status,
            runtime_error: None,
            fail_reads: false,
            exec_delay: None,
        }
    }
}

/// Fake engine backed by host directories under `scratch_root`.
#[derive(Debug)]
pub struct FakeEngine {
    scratch_root: PathBuf,
    behavior: FakeBehavior,
    execs: Mutex<Vec<ContainerSpec>>,
    images: Mutex<Vec<ImageSpec>>,
    discarded: Mutex<Vec<Directory>>,
}

impl FakeEngine {
    pub fn new(scratch_root: impl Into<PathBuf>) -> Self {
        Self::with_behavior(scratch_root, FakeBehavior::default())
    }

    pub fn with_behavior(scratch_root: impl Into<PathBuf>, behavior: FakeBehavior) -> Self {
        FakeEngine {
            scratch_root: scratch_root.into(),
            behavior,
            execs: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
            discarded: Mutex::new(Vec::new()),
        }
    }

    /// Every container spec passed to `exec`, in call order.
    pub fn execs(&self) -> Vec<ContainerSpec> {
        self.execs.lock().unwrap().clone()
    }

    /// Every image successfully built.
    pub fn images(&self) -> Vec<ImageSpec> {
        self.images.lock().unwrap().clone()
    }

    /// Every directory passed to `discard`.
    pub fn discarded(&self) -> Vec<Directory> {
        self.discarded.lock().unwrap().clone()
    }

    fn simulate_build(&self, spec: &ContainerSpec) -> EngineResult<ExecOutcome> {
        if self.behavior.build_exit_code != 0 {
            return Ok(outcome(
                self.behavior.build_exit_code,
                "",
                "make: *** [Makefile:42: build] Error 1",
            ));
        }

        let arg = |key: &str| {
            spec.command
                .iter()
                .find_map(|a| a.strip_prefix(key).map(str::to_string))
        };
        let (os, arch) = match (arg("OS="), arg("ARCH=")) {
            (Some(os), Some(arch)) => (os, arch),
            _ => return Ok(outcome(2, "", "make: OS and ARCH must be set")),
        };

        let workdir = spec
            .workdir
            .as_deref()
            .and_then(|w| spec.resolve_host_path(w))
            .ok_or_else(|| EngineError::InvalidSpec("build workdir is not mounted".into()))?;

        if self.behavior.produce_artifact {
            let dist = workdir.join("dist");
            std::fs::create_dir_all(&dist)?;
            std::fs::write(
                dist.join(format!("venom.{}-{}", os, arch)),
                "#!/bin/sh\necho fake venom\n",
            )?;
        }
        Ok(outcome(0, "go build ok\n", ""))
    }

    fn simulate_tool(&self, spec: &ContainerSpec, script: &str) -> EngineResult<ExecOutcome> {
        let workdir = spec.workdir.clone().unwrap_or_else(|| "/".to_string());
        let in_container = |p: &str| {
            if p.starts_with('/') {
                p.to_string()
            } else {
                format!("{}/{}", workdir.trim_end_matches('/'), p.trim_start_matches("./"))
            }
        };

        let (run, capture) = script
            .split_once(';')
            .ok_or_else(|| EngineError::InvalidSpec(format!("unsupported script: {}", script)))?;
        let args: Vec<&str> = run.split_whitespace().collect();
        let pattern_arg = args
            .iter()
            .find(|a| a.contains('*'))
            .copied()
            .ok_or_else(|| EngineError::InvalidSpec(format!("no suite glob in: {}", run)))?;
        let (suite_dir, pattern) = pattern_arg
            .rsplit_once('/')
            .unwrap_or((".", pattern_arg));
        let html_report = args.contains(&"--html-report");

        let suites_host = spec
            .resolve_host_path(&in_container(suite_dir))
            .ok_or_else(|| EngineError::InvalidSpec(format!("{} is not mounted", suite_dir)))?;
        let suites = expand(&suites_host, pattern)?;

        let output_dir = spec
            .env
            .get("VENOM_OUTPUT_DIR")
            .map(|d| in_container(d.as_str()))
            .unwrap_or_else(|| workdir.clone());
        let output_host = spec
            .resolve_host_path(&output_dir)
            .ok_or_else(|| EngineError::InvalidSpec(format!("{} is not mounted", output_dir)))?;
        std::fs::create_dir_all(&output_host)?;

        let mut failed = 0;
        for suite in &suites {
            let contents = std::fs::read_to_string(suite)?;
            let passed = !contents.contains(FAILING_SUITE_MARKER);
            if !passed {
                failed += 1;
            }
            let name = suite
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let result = json!({
                "name": name,
                "status": if passed { "PASS" } else { "FAIL" },
            });
            std::fs::write(
                output_host.join(format!("test_results_{}.json", name)),
                serde_json::to_vec_pretty(&result).map_err(std::io::Error::other)?,
            )?;
        }
        if html_report {
            std::fs::write(
                output_host.join("test_results.html"),
                format!("<html><body>{} suites, {} failed</body></html>", suites.len(), failed),
            )?;
        }

        let tool_exit = self.behavior.tool_exit_override.unwrap_or(if failed > 0 {
            FAILED_SUITES_EXIT_CODE
        } else {
            0
        });

        if let Some((_, target)) = capture.rsplit_once('>') {
            let capture_host = spec
                .resolve_host_path(&in_container(target.trim()))
                .ok_or_else(|| EngineError::InvalidSpec(format!("{} is not mounted", target)))?;
            match &self.behavior.exit_capture {
                ExitCapture::Status => std::fs::write(capture_host, tool_exit.to_string())?,
                ExitCapture::Contents(raw) => std::fs::write(capture_host, raw)?,
                ExitCapture::Missing => {}
            }
        }

        // The shell's own status is that of its last command.
        Ok(outcome(
            0,
            &format!("• {} suite(s), {} failed\n", suites.len(), failed),
            "",
        ))
    }
}

fn outcome(exit_code: i32, stdout: &str, stderr: &str) -> ExecOutcome {
    ExecOutcome {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration_ms: 1,
    }
}

/// Expand a single-component glob like `sh` (sorted, hidden names skipped),
/// keeping only regular files since each match is read as a suite.
fn expand(dir: &Path, pattern: &str) -> EngineResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| wildcard_match(pattern, &n.to_string_lossy()))
                .unwrap_or(false)
        })
        .collect();
    matches.sort();
    Ok(matches)
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn fetch_source(&self, source: &SourceReference) -> EngineResult<FetchedSource> {
        if let Some(reason) = &self.behavior.fetch_error {
            return Err(EngineError::Fetch {
                url: source.url.clone(),
                reason: reason.clone(),
            });
        }

        let tree = self.scratch_dir("source").await?;
        std::fs::write(tree.file("Makefile"), "build:\n\tgo build ./cmd/venom\n")?;
        if let Some(go_mod) = &self.behavior.go_mod {
            std::fs::write(tree.file("go.mod"), go_mod)?;
        }

        Ok(FetchedSource {
            reference: source.clone(),
            revision: self.behavior.revision.clone(),
            tree,
        })
    }

    async fn scratch_dir(&self, label: &str) -> EngineResult<Directory> {
        let path = self.scratch_root.join(format!("{}-{}", label, Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Directory::new(path))
    }

    async fn read_file(&self, dir: &Directory, relative: &str) -> EngineResult<String> {
        let path = dir.file(relative);
        if self.behavior.fail_reads {
            return Err(EngineError::Runtime(format!(
                "container filesystem unavailable: {}",
                path.display()
            )));
        }
        std::fs::read_to_string(&path).map_err(|_| EngineError::NotFound(path.display().to_string()))
    }

    async fn exec(&self, spec: &ContainerSpec) -> EngineResult<ExecOutcome> {
        spec.validate().map_err(EngineError::InvalidSpec)?;
        self.execs.lock().unwrap().push(spec.clone());

        if let Some(reason) = &self.behavior.runtime_error {
            return Err(EngineError::Runtime(reason.clone()));
        }

        if let Some(delay) = self.behavior.exec_delay {
            match spec.timeout {
                Some(limit) => {
                    if tokio::time::timeout(limit, tokio::time::sleep(delay))
                        .await
                        .is_err()
                    {
                        return Err(EngineError::TimedOut(limit.as_secs()));
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }

        match spec.command.first().map(String::as_str) {
            Some("make") => self.simulate_build(spec),
            Some("/bin/sh") | Some("sh") if spec.command.len() == 3 && spec.command[1] == "-c" => {
                self.simulate_tool(spec, &spec.command[2])
            }
            Some(other) => Ok(outcome(127, "", &format!("sh: {}: not found", other))),
            None => Err(EngineError::InvalidSpec("command is empty".into())),
        }
    }

    async fn build_image(&self, spec: &ImageSpec) -> EngineResult<ImageRef> {
        for file in &spec.files {
            if !file.source.is_file() {
                return Err(EngineError::ImageBuild {
                    tag: spec.tag.clone(),
                    reason: format!("COPY failed: {} not found", file.source.display()),
                });
            }
        }
        self.images.lock().unwrap().push(spec.clone());
        Ok(ImageRef(spec.tag.clone()))
    }

    async fn discard(&self, dir: &Directory) -> EngineResult<()> {
        self.discarded.lock().unwrap().push(dir.clone());
        if dir.path().exists() {
            std::fs::remove_dir_all(dir.path())?;
        }
        Ok(())
    }
}
