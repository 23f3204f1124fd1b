//! Venom Harness CLI
//!
//! The `venom-harness` command builds the Venom integration-testing tool
//! into a container image and runs YAML suites with it.
//!
//! ## Commands
//!
//! - `build`: Build the tool image and print its reference
//! - `test`: Build the tool, run every suite in a directory, report the exit code
//! - `discover`: List the suite files a test run would pick up

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use venom_engine::{Directory, Platform};
use venom_harness::{
    discover_suites, export_results, init_tracing, HarnessConfig, VenomHarness, SUITE_PATTERN,
};

#[derive(Parser)]
#[command(name = "venom-harness")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build the Venom CLI and run integration suites in containers", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON report
    #[arg(long, global = true)]
    json: bool,

    /// JSON config file (default: environment only)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Docker CLI binary
    #[arg(long, global = true, env = "VENOM_HARNESS_DOCKER")]
    docker: Option<String>,

    /// Venom source repository
    #[arg(long, global = true)]
    source_url: Option<String>,

    /// Branch or `tags/<tag>` to build (default: remote HEAD)
    #[arg(long, global = true)]
    source_ref: Option<String>,

    /// Target platform as `<os>/<arch>` (default: host)
    #[arg(long, global = true)]
    platform: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the Venom image
    Build,

    /// Build the Venom image and run the suites in a directory
    Test {
        /// Directory holding the *.y*ml suites
        #[arg(short, long, default_value = ".")]
        tests: PathBuf,

        /// Copy the results tree into this directory
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Exit with the tool's exit code instead of 0
        #[arg(long)]
        fail_on_error: bool,

        /// Time limit for the test container in seconds (0 = none)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List the suites a test run would execute
    Discover {
        /// Directory holding the *.y*ml suites
        #[arg(short, long, default_value = ".")]
        tests: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Build => {
            let harness = VenomHarness::with_docker(config).context("Invalid configuration")?;
            cmd_build(&harness, cli.json).await
        }
        Commands::Test {
            tests,
            export,
            fail_on_error,
            timeout,
        } => {
            let mut config = config;
            if let Some(secs) = timeout {
                config.timeout_secs = secs;
            }
            let harness = VenomHarness::with_docker(config).context("Invalid configuration")?;
            let exit_code = cmd_test(&harness, &tests, export.as_deref(), cli.json).await?;
            if fail_on_error && exit_code != 0 {
                std::process::exit(exit_code);
            }
            Ok(())
        }
        Commands::Discover { tests } => cmd_discover(&tests, cli.json),
    }
}

/// File or environment config, then command-line overrides.
fn load_config(cli: &Cli) -> Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => HarnessConfig::from_env(),
    };

    if let Some(docker) = &cli.docker {
        config.docker_bin = docker.clone();
    }
    if let Some(url) = &cli.source_url {
        config.source_url = url.clone();
    }
    if let Some(git_ref) = &cli.source_ref {
        config.source_ref = git_ref.clone();
    }
    if let Some(raw) = &cli.platform {
        config.platform = Some(parse_platform(raw)?);
    }
    if cli.verbose {
        config.verbose = config.verbose.max(2);
    }
    Ok(config)
}

fn parse_platform(raw: &str) -> Result<Platform> {
    match raw.split_once('/') {
        Some((os, arch)) if !os.is_empty() && !arch.is_empty() && !arch.contains('/') => {
            Ok(Platform::new(os, arch))
        }
        _ => anyhow::bail!("Invalid platform {:?}: expected <os>/<arch>", raw),
    }
}

/// Build the Venom image
async fn cmd_build(harness: &VenomHarness, json: bool) -> Result<()> {
    let image = harness
        .build()
        .await
        .context("Failed to build venom image")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&image)?);
    } else {
        println!("Image: {}", image.reference);
        println!("Revision: {}", image.revision);
        println!("Go toolchain: {}", image.toolchain);
        println!("Platform: {}", image.platform);
    }
    Ok(())
}

/// Build, run the suites, and return the tool's exit code
async fn cmd_test(
    harness: &VenomHarness,
    tests: &Path,
    export: Option<&Path>,
    json: bool,
) -> Result<i32> {
    let tests_dir = Directory::new(tests);
    let (_, results, report) = harness
        .test_with_report(&tests_dir)
        .await
        .context("Venom test run failed")?;

    if let Some(dest) = export {
        let copied = export_results(&results, dest)
            .with_context(|| format!("Failed to export results to {:?}", dest))?;
        info!(files = copied, "Results exported");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Run ID: {}", report.run_id);
        println!("Image: {}", report.image);
        println!("Suites: {}", report.suites);
        println!(
            "Status: {}",
            if report.passed { "✓ PASSED" } else { "✗ FAILED" }
        );
        println!("Exit code: {}", report.exit_code);
        println!("Duration: {}ms", report.duration_ms);
        println!("Results: {}", results.results_dir);
        if let Some(dest) = export {
            println!("Exported to: {}", dest.display());
        }
    }
    Ok(results.exit_code)
}

/// List the suites a test run would execute
fn cmd_discover(tests: &Path, json: bool) -> Result<()> {
    let suites =
        discover_suites(tests).with_context(|| format!("Failed to read {:?}", tests))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&suites)?);
        return Ok(());
    }
    if suites.is_empty() {
        println!("No suites matching {} in {}", SUITE_PATTERN, tests.display());
        return Ok(());
    }
    for suite in &suites {
        println!("{}", suite.display());
    }
    println!();
    println!("{} suite(s)", suites.len());
    Ok(())
}
