//! Host-side preview of which suite files the tool will be handed.
//!
//! The container shell expands `./tests/*.y*ml`; this applies the same
//! glob to the caller's directory so the harness can log the suite count
//! and the CLI can list suites without starting a container. Like `sh`,
//! only the top level is searched and hidden names are skipped. Unlike
//! `sh`, only regular files count: a directory named `x.yml` would be
//! expanded by the shell and handed to the tool, but is not a suite here.

use std::path::{Path, PathBuf};

use venom_engine::wildcard_match;

/// Suite file glob, relative to the tests directory
pub const SUITE_PATTERN: &str = "*.y*ml";

/// Whether a file name would be picked up by [`SUITE_PATTERN`].
pub fn is_suite_file(name: &str) -> bool {
    wildcard_match(SUITE_PATTERN, name)
}

/// Suite files directly under `dir`, sorted as the shell would sort them.
pub fn discover_suites(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut suites = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matched = path
            .file_name()
            .map(|n| is_suite_file(&n.to_string_lossy()))
            .unwrap_or(false);
        if matched {
            suites.push(path);
        }
    }
    suites.sort();
    Ok(suites)
}
