//! `VenomHarness`: build the tool, then run suites with it.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use venom_engine::{ContainerEngine, Directory, DockerEngine};

use crate::builder::{ToolImage, ToolImageBuilder};
use crate::config::HarnessConfig;
use crate::discovery::discover_suites;
use crate::error::Result;
use crate::phase::{PhaseTracker, RunPhase};
use crate::report::TestReport;
use crate::runner::{RunOptions, TestResults, TestRunner};

/// Entry point tying a [`ToolImageBuilder`] and a [`TestRunner`] to one
/// engine and one configuration. Cheap to share; each call is independent.
pub struct VenomHarness {
    engine: Arc<dyn ContainerEngine>,
    config: HarnessConfig,
}

impl VenomHarness {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: HarnessConfig) -> Self {
        VenomHarness { engine, config }
    }

    /// Harness backed by the local docker and git CLIs.
    pub fn with_docker(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(DockerEngine::new(config.docker_config()));
        Ok(Self::new(engine, config))
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn builder(&self) -> ToolImageBuilder {
        ToolImageBuilder::new(self.engine.clone(), self.config.clone())
    }

    pub fn runner(&self) -> TestRunner {
        TestRunner::new(self.engine.clone(), RunOptions::from(&self.config))
    }

    /// Build the tool image.
    pub async fn build(&self) -> Result<ToolImage> {
        self.builder().build_tool_image().await
    }

    /// Build the tool image and run every suite in `tests` with it.
    pub async fn test(&self, tests: &Directory) -> Result<TestResults> {
        let (_, results, _) = self.test_with_report(tests).await?;
        Ok(results)
    }

    /// [`test`](Self::test), also returning the image used and a report.
    pub async fn test_with_report(
        &self,
        tests: &Directory,
    ) -> Result<(ToolImage, TestResults, TestReport)> {
        let started_at = Utc::now();
        let mut tracker = PhaseTracker::new(Uuid::new_v4().to_string());
        info!(run_id = %tracker.run_id(), tests = %tests, "Starting venom test run");

        let image = match self.build().await {
            Ok(image) => image,
            Err(e) => {
                tracker.fail(&e);
                return Err(e);
            }
        };
        tracker.advance(RunPhase::Built);

        let results = self.runner().run_tracked(&image, tests, &mut tracker).await?;

        let suites = discover_suites(tests.path()).map(|s| s.len()).unwrap_or(0);
        let report = TestReport::new(tracker.run_id(), &image, &results, suites, started_at);
        Ok((image, results, report))
    }
}
