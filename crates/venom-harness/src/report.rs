//! Serializable summary of a test invocation, for `--json` output and CI
//! artifacts.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use venom_engine::ImageRef;

use crate::builder::ToolImage;
use crate::export::list_result_files;
use crate::runner::TestResults;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub run_id: String,
    pub image: ImageRef,
    pub revision: String,
    pub toolchain: String,
    pub platform: String,
    /// Suite files the glob matched
    pub suites: usize,
    pub exit_code: i32,
    pub passed: bool,
    pub results_dir: PathBuf,
    /// Files produced by the tool, relative to `results_dir`
    pub result_files: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TestReport {
    pub fn new(
        run_id: impl Into<String>,
        image: &ToolImage,
        results: &TestResults,
        suites: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        let finished_at = Utc::now();
        let results_dir = results.results_dir.path().to_path_buf();
        TestReport {
            run_id: run_id.into(),
            image: image.reference.clone(),
            revision: image.revision.clone(),
            toolchain: image.toolchain.to_string(),
            platform: image.platform.to_string(),
            suites,
            exit_code: results.exit_code,
            passed: results.passed(),
            result_files: list_result_files(&results_dir).unwrap_or_default(),
            results_dir,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ToolchainVersion;
    use tempfile::tempdir;
    use venom_engine::{Directory, Platform};

    #[test]
    fn test_report_from_results() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("test_results.html"), "<html/>").unwrap();

        let image = ToolImage {
            reference: ImageRef("venom-harness/venom:0123456789ab".into()),
            binary_path: "/usr/local/venom".into(),
            revision: "deadbeef".into(),
            toolchain: ToolchainVersion::parse("1.22.0").unwrap(),
            platform: Platform::new("linux", "amd64"),
        };
        let results = TestResults {
            results_dir: Directory::new(dir.path()),
            exit_code: 2,
        };

        let report = TestReport::new("run-1", &image, &results, 3, Utc::now());
        assert!(!report.passed);
        assert_eq!(report.exit_code, 2);
        assert_eq!(report.platform, "linux/amd64");
        assert_eq!(report.result_files, vec![PathBuf::from("test_results.html")]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["suites"], 3);
        assert_eq!(json["toolchain"], "1.22.0");
    }
}
