//! Integration tests for the build-and-run flow with FakeEngine.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::{tempdir, TempDir};
use venom_engine::fakes::{
    ExitCapture, FakeBehavior, FakeEngine, FAILED_SUITES_EXIT_CODE, FAILING_SUITE_MARKER,
};
use venom_engine::{Directory, Platform};
use venom_harness::export::list_result_files;
use venom_harness::{
    export_results, HarnessConfig, HarnessError, PhaseTracker, RunOptions, RunPhase, StepFailure,
    TestRunner, VenomHarness,
};

struct Fixture {
    scratch: TempDir,
    suites: TempDir,
    engine: Arc<FakeEngine>,
    harness: VenomHarness,
}

impl Fixture {
    fn new(behavior: FakeBehavior) -> Self {
        let scratch = tempdir().unwrap();
        let suites = tempdir().unwrap();
        let engine = Arc::new(FakeEngine::with_behavior(scratch.path(), behavior));
        let config = HarnessConfig::default()
            .with_source("https://example.invalid/ovh/venom", "")
            .with_scratch_dir(scratch.path())
            .with_platform(Platform::new("linux", "amd64"));
        let harness = VenomHarness::new(engine.clone(), config);
        Fixture {
            scratch,
            suites,
            engine,
            harness,
        }
    }

    fn happy() -> Self {
        Self::new(FakeBehavior::default())
    }

    fn suite(&self, name: &str, contents: &str) {
        std::fs::write(self.suites.path().join(name), contents).unwrap();
    }

    fn tests(&self) -> Directory {
        Directory::new(self.suites.path())
    }
}

fn passing_suite() -> &'static str {
    "name: health\ntestcases:\n  - name: ping\n    steps:\n      - type: exec\n        script: echo ok\n"
}

fn failing_suite() -> String {
    format!("name: broken\n# {}\n", FAILING_SUITE_MARKER)
}

fn result_count(dir: &Path) -> usize {
    list_result_files(dir).unwrap().len()
}

/// Test: passing suites yield exit code 0 and a populated results directory
#[tokio::test]
async fn test_passing_suites() {
    let fx = Fixture::happy();
    fx.suite("health.yml", passing_suite());
    fx.suite("api.yaml", passing_suite());

    let results = fx.harness.test(&fx.tests()).await.expect("test run failed");

    assert_eq!(results.exit_code, 0);
    assert!(results.passed());
    assert!(results.results_dir.path().join("test_results_health.json").is_file());
    assert!(results.results_dir.path().join("test_results_api.json").is_file());
    assert!(results.results_dir.path().join("test_results.html").is_file());
}

/// Test: a failing suite is an outcome, not an error
#[tokio::test]
async fn test_failing_suite_returns_exit_code() {
    let fx = Fixture::happy();
    fx.suite("ok.yml", passing_suite());
    fx.suite("broken.yml", &failing_suite());

    let results = fx.harness.test(&fx.tests()).await.expect("test run failed");

    assert_eq!(results.exit_code, FAILED_SUITES_EXIT_CODE);
    assert!(!results.passed());
    assert_eq!(result_count(results.results_dir.path()), 3);
}

/// Test: the tool's exit status reaches the caller unchanged
#[tokio::test]
async fn test_exit_code_is_preserved() {
    for code in [0, 1, 255] {
        let fx = Fixture::new(FakeBehavior {
            tool_exit_override: Some(code),
            ..FakeBehavior::default()
        });
        fx.suite("health.yml", passing_suite());

        let results = fx.harness.test(&fx.tests()).await.unwrap();
        assert_eq!(results.exit_code, code, "exit code {} was not preserved", code);
    }
}

/// Test: only top-level *.y*ml files are handed to the tool
#[tokio::test]
async fn test_only_matching_suites_run() {
    let fx = Fixture::happy();
    fx.suite("health.yml", passing_suite());
    fx.suite("README.md", "not a suite");
    fx.suite(".hidden.yml", &failing_suite());
    std::fs::create_dir(fx.suites.path().join("lib")).unwrap();
    std::fs::write(fx.suites.path().join("lib/nested.yml"), failing_suite()).unwrap();

    let results = fx.harness.test(&fx.tests()).await.unwrap();

    assert_eq!(results.exit_code, 0);
    let files = list_result_files(results.results_dir.path()).unwrap();
    assert!(files.iter().any(|f| f.ends_with("test_results_health.json")));
    assert!(!files.iter().any(|f| f.to_string_lossy().contains("README")));
    assert!(!files.iter().any(|f| f.to_string_lossy().contains("nested")));
}

/// Test: an empty tests directory still produces a valid exit code
#[tokio::test]
async fn test_empty_tests_directory() {
    let fx = Fixture::happy();

    let results = fx.harness.test(&fx.tests()).await.unwrap();
    assert_eq!(results.exit_code, 0);
}

/// Test: the test container gets the documented mounts, env and command
#[tokio::test]
async fn test_container_layout() {
    let fx = Fixture::happy();
    fx.suite("health.yml", passing_suite());

    let (image, _, _) = fx.harness.test_with_report(&fx.tests()).await.unwrap();

    let execs = fx.engine.execs();
    assert_eq!(execs.len(), 2, "one build and one test container");

    let build = &execs[0];
    assert_eq!(build.image, "golang:1.22.0");
    assert_eq!(build.env["HOME"], "/tmp");
    assert_eq!(build.env["GOCACHE"], "/tmp/.cache/go-build");
    assert_eq!(build.command, vec!["make", "build", "OS=linux", "ARCH=amd64"]);

    let run = &execs[1];
    assert_eq!(run.image, image.reference.as_str());
    assert_eq!(run.workdir.as_deref(), Some("/workdir"));
    assert_eq!(run.env["VENOM_OUTPUT_DIR"], "/workdir/results");
    assert_eq!(run.env["VENOM_LIB_DIR"], "/workdir/tests/lib");
    assert_eq!(run.env["VENOM_VERBOSE"], "1");
    let tests_mount = run
        .mounts
        .iter()
        .find(|m| m.target == "/workdir/tests")
        .expect("tests mount missing");
    assert!(tests_mount.read_only);
    assert_eq!(tests_mount.source.path(), fx.suites.path());
    assert_eq!(
        run.command[2],
        "/usr/local/venom run ./tests/*.y*ml --html-report; printf '%d' $? > exit_code"
    );
}

/// Test: the image carries the built binary and a deterministic tag
#[tokio::test]
async fn test_build_produces_tool_image() {
    let fx = Fixture::happy();

    let first = fx.harness.build().await.unwrap();
    let second = fx.harness.build().await.unwrap();

    assert_eq!(first.reference, second.reference);
    assert_eq!(first.binary_path, "/usr/local/venom");
    assert_eq!(first.toolchain.as_str(), "1.22.0");
    assert_eq!(first.platform, Platform::new("linux", "amd64"));

    let images = fx.engine.images();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].base, "alpine:latest");
    assert_eq!(images[0].files[0].target, "/usr/local/venom");

    // Source trees are discarded after every build.
    assert_eq!(fx.engine.discarded().len(), 2);
    assert!(fx.engine.discarded().iter().all(|d| !d.path().exists()));
}

/// Test: the builder follows the toolchain declared by the source
#[tokio::test]
async fn test_builder_image_follows_go_mod() {
    let fx = Fixture::new(FakeBehavior {
        go_mod: Some("module github.com/ovh/venom\n\ngo 1.21\n\nrequire (\n\tgithub.com/a/b v1.0.0\n)\n".into()),
        ..FakeBehavior::default()
    });

    let image = fx.harness.build().await.unwrap();
    assert_eq!(image.toolchain.as_str(), "1.21");
    assert_eq!(fx.engine.execs()[0].image, "golang:1.21");
}

/// Test: a malformed manifest stops the build before any container runs
#[tokio::test]
async fn test_malformed_go_mod() {
    let fx = Fixture::new(FakeBehavior {
        go_mod: Some("module x\nrequire (\n".into()),
        ..FakeBehavior::default()
    });
    fx.suite("health.yml", passing_suite());

    let err = fx.harness.test(&fx.tests()).await.unwrap_err();

    assert!(matches!(err, HarnessError::ManifestParse { .. }), "got {:?}", err);
    assert!(fx.engine.execs().is_empty());
    assert!(fx.engine.images().is_empty());
}

/// Test: a missing manifest is a read error
#[tokio::test]
async fn test_missing_go_mod() {
    let fx = Fixture::new(FakeBehavior {
        go_mod: None,
        ..FakeBehavior::default()
    });

    let err = fx.harness.build().await.unwrap_err();
    assert!(matches!(err, HarnessError::ManifestRead { .. }), "got {:?}", err);
}

/// Test: a failing compile surfaces as a build error with its stderr
#[tokio::test]
async fn test_build_failure() {
    let fx = Fixture::new(FakeBehavior {
        build_exit_code: 2,
        ..FakeBehavior::default()
    });
    fx.suite("health.yml", passing_suite());

    let err = fx.harness.test(&fx.tests()).await.unwrap_err();

    match err {
        HarnessError::BuildExecution {
            step,
            source: StepFailure::NonZeroExit { exit_code, stderr },
        } => {
            assert_eq!(step, "make build");
            assert_eq!(exit_code, 2);
            assert!(stderr.contains("Error 1"));
        }
        other => panic!("expected BuildExecution, got {:?}", other),
    }
    assert_eq!(fx.engine.execs().len(), 1, "test container must not run");
}

/// Test: a build that leaves no binary is a build error
#[tokio::test]
async fn test_missing_artifact() {
    let fx = Fixture::new(FakeBehavior {
        produce_artifact: false,
        ..FakeBehavior::default()
    });

    let err = fx.harness.build().await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::BuildExecution {
            source: StepFailure::MissingArtifact(_),
            ..
        }
    ));
    assert!(fx.engine.images().is_empty());
}

/// Test: an unreachable source repository
#[tokio::test]
async fn test_fetch_failure() {
    let fx = Fixture::new(FakeBehavior {
        fetch_error: Some("could not resolve host".into()),
        ..FakeBehavior::default()
    });

    let err = fx.harness.build().await.unwrap_err();
    match err {
        HarnessError::Source { url, .. } => assert_eq!(url, "https://example.invalid/ovh/venom"),
        other => panic!("expected Source, got {:?}", other),
    }
}

/// Test: a missing capture file is a retrieval error, not exit code 0
#[tokio::test]
async fn test_missing_exit_code_file() {
    let fx = Fixture::new(FakeBehavior {
        exit_capture: ExitCapture::Missing,
        ..FakeBehavior::default()
    });
    fx.suite("health.yml", passing_suite());

    let err = fx.harness.test(&fx.tests()).await.unwrap_err();
    assert!(matches!(err, HarnessError::ResultRetrieval { .. }), "got {:?}", err);
}

/// Test: non-numeric capture contents are rejected
#[tokio::test]
async fn test_garbage_exit_code() {
    let fx = Fixture::new(FakeBehavior {
        exit_capture: ExitCapture::Contents("-n 0".into()),
        ..FakeBehavior::default()
    });
    fx.suite("health.yml", passing_suite());

    let err = fx.harness.test(&fx.tests()).await.unwrap_err();
    match err {
        HarnessError::InvalidExitCode { raw, .. } => assert_eq!(raw, "-n 0"),
        other => panic!("expected InvalidExitCode, got {:?}", other),
    }
}

/// Test: trailing whitespace in the capture file is tolerated
#[tokio::test]
async fn test_exit_code_with_newline() {
    let fx = Fixture::new(FakeBehavior {
        exit_capture: ExitCapture::Contents("1\n".into()),
        ..FakeBehavior::default()
    });
    fx.suite("health.yml", passing_suite());

    let results = fx.harness.test(&fx.tests()).await.unwrap();
    assert_eq!(results.exit_code, 1);
}

/// Test: an engine failure while running the tests
#[tokio::test]
async fn test_runtime_failure() {
    let fx = Fixture::happy();
    fx.suite("health.yml", passing_suite());
    let image = fx.harness.build().await.unwrap();

    let broken = Arc::new(FakeEngine::with_behavior(
        fx.scratch.path(),
        FakeBehavior {
            runtime_error: Some("Cannot connect to the Docker daemon".into()),
            ..FakeBehavior::default()
        },
    ));
    let runner = TestRunner::new(broken.clone(), RunOptions::default());
    let mut tracker = PhaseTracker::starting_at("run-1", RunPhase::Built);

    let err = runner
        .run_tracked(&image, &fx.tests(), &mut tracker)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::ContainerExecution {
            source: StepFailure::Engine(_)
        }
    ));
    assert!(matches!(tracker.current(), RunPhase::Failed { .. }));
    // No partial results are left behind.
    assert_eq!(broken.discarded().len(), 1);
    assert!(!broken.discarded()[0].path().exists());
}

/// Test: a missing tests directory is rejected before anything runs
#[tokio::test]
async fn test_missing_tests_directory() {
    let fx = Fixture::happy();
    let missing = Directory::new(fx.suites.path().join("does-not-exist"));

    let err = fx.harness.test(&missing).await.unwrap_err();
    match err {
        HarnessError::InvalidTestsDirectory { path, source } => {
            assert_eq!(path, fx.suites.path().join("does-not-exist"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected InvalidTestsDirectory, got {:?}", other),
    }
    assert_eq!(fx.engine.execs().len(), 1, "only the build ran");
}

/// Test: concurrent runs do not share workspaces
#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let fx = Fixture::happy();
    fx.suite("health.yml", passing_suite());
    let image = fx.harness.build().await.unwrap();

    let other = tempdir().unwrap();
    std::fs::write(other.path().join("broken.yml"), failing_suite()).unwrap();
    let other_tests = Directory::new(other.path());

    let runner = fx.harness.runner();
    let tests = fx.tests();
    let (a, b) = tokio::join!(
        runner.run_tests(&image, &tests),
        runner.run_tests(&image, &other_tests)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.results_dir, b.results_dir);
    assert_eq!(a.exit_code, 0);
    assert_eq!(b.exit_code, FAILED_SUITES_EXIT_CODE);
    assert!(a.results_dir.path().join("test_results_health.json").is_file());
    assert!(!a.results_dir.path().join("test_results_broken.json").exists());
}

/// Test: many runs in parallel against the same image
#[tokio::test]
async fn test_parallel_runs_all_complete() {
    let fx = Fixture::happy();
    fx.suite("health.yml", passing_suite());
    let image = fx.harness.build().await.unwrap();
    let runner = fx.harness.runner();
    let tests = fx.tests();

    let runs = (0..8).map(|_| runner.run_tests(&image, &tests));
    let all = futures::future::try_join_all(runs).await.unwrap();

    let mut dirs: Vec<_> = all.iter().map(|r| r.results_dir.clone()).collect();
    dirs.sort_by(|a, b| a.path().cmp(b.path()));
    dirs.dedup();
    assert_eq!(dirs.len(), 8);
}

/// Test: report and export of a finished run
#[tokio::test]
async fn test_report_and_export() {
    let fx = Fixture::happy();
    fx.suite("health.yml", passing_suite());
    fx.suite("broken.yml", &failing_suite());

    let (image, results, report) = fx.harness.test_with_report(&fx.tests()).await.unwrap();

    assert_eq!(report.suites, 2);
    assert_eq!(report.exit_code, FAILED_SUITES_EXIT_CODE);
    assert!(!report.passed);
    assert_eq!(report.image, image.reference);
    assert_eq!(report.platform, "linux/amd64");
    assert_eq!(report.result_files.len(), 3);
    assert!(report.finished_at >= report.started_at);

    let dest = tempdir().unwrap();
    let copied = export_results(&results, dest.path()).unwrap();
    assert_eq!(copied, 3);
    assert!(dest.path().join("test_results.html").is_file());
}

/// Test: a run that outlives its time limit fails and leaves nothing behind
#[tokio::test(start_paused = true)]
async fn test_timeout_fails_run_and_discards_workspace() {
    let fx = Fixture::new(FakeBehavior {
        exec_delay: Some(Duration::from_secs(600)),
        ..FakeBehavior::default()
    });
    fx.suite("health.yml", passing_suite());
    let image = fx.harness.build().await.unwrap();

    let options = RunOptions {
        timeout_secs: 30,
        ..RunOptions::default()
    };
    let runner = TestRunner::new(fx.engine.clone(), options);
    let mut tracker = PhaseTracker::starting_at("run-timeout", RunPhase::Built);

    let err = runner
        .run_tracked(&image, &fx.tests(), &mut tracker)
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            HarnessError::ContainerExecution {
                source: StepFailure::TimedOut(30)
            }
        ),
        "got {:?}",
        err
    );
    assert!(matches!(tracker.current(), RunPhase::Failed { .. }));

    let run_spec = fx.engine.execs().pop().unwrap();
    assert_eq!(run_spec.timeout, Some(Duration::from_secs(30)));
    let workspace = run_spec
        .mounts
        .iter()
        .find(|m| m.target == "/workdir")
        .unwrap()
        .source
        .clone();
    assert!(fx.engine.discarded().contains(&workspace));
    assert!(!workspace.path().exists());
}

/// Test: without an explicit platform the tool is built for Linux containers
#[tokio::test]
async fn test_default_platform_is_linux() {
    let scratch = tempdir().unwrap();
    let engine = Arc::new(FakeEngine::new(scratch.path()));
    let config = HarnessConfig::default().with_scratch_dir(scratch.path());
    let harness = VenomHarness::new(engine.clone(), config);

    let image = harness.build().await.unwrap();

    assert_eq!(image.platform.os, "linux");
    assert!(engine.execs()[0].command.contains(&"OS=linux".to_string()));
    assert!(engine.images()[0].files[0]
        .source
        .to_string_lossy()
        .contains("venom.linux-"));
}
