//! Build Pipeline - Single Entry Point
//!
//! Order is fixed: platform config, then shared strings, then stylesheet and
//! script per platform, then the bootstrap once both exist.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifact::BuildArtifact;
use crate::bootstrap::BootstrapGenerator;
use crate::config::{BuildConfig, Environment, Platform};
use crate::prepare::{compile_strings, generate_config};
use crate::script::ScriptBundleBuilder;
use crate::stylesheet::StylesheetBuilder;
use crate::transforms::{TransformError, Transforms};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact used before it was written: {0}")]
    Sequencing(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Aggregate(Box<AggregateBuildError>),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Build task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io { path: path.to_path_buf(), source }
    }

    /// Attach the file being processed to a transform failure
    pub fn transform(path: &Path, err: TransformError) -> Self {
        match err {
            TransformError::Syntax { file, line, message } => PipelineError::Parse {
                path: file.unwrap_or_else(|| path.to_path_buf()),
                message: format!("line {}: {}", line, message),
            },
            TransformError::Unresolved { from, spec } => PipelineError::Parse {
                path: from,
                message: format!("cannot resolve module '{}'", spec),
            },
            TransformError::Io { path, source } => PipelineError::Io { path, source },
            TransformError::Pattern(e) => PipelineError::Pattern(e),
            TransformError::Encode(e) => PipelineError::SerializationError(e),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildStage {
    Config,
    Strings,
    Templates,
    Script,
    Stylesheet,
    Bootstrap,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Config => "config",
            BuildStage::Strings => "strings",
            BuildStage::Templates => "templates",
            BuildStage::Script => "script",
            BuildStage::Stylesheet => "stylesheet",
            BuildStage::Bootstrap => "bootstrap",
        };
        f.write_str(name)
    }
}

/// One stage of one platform that did not complete
#[derive(Debug, Error)]
#[error("{platform} ({stage}): {error}")]
pub struct PlatformFailure {
    pub platform: String,
    pub stage: BuildStage,
    #[source]
    pub error: PipelineError,
}

impl PlatformFailure {
    pub fn new(platform: &Platform, stage: BuildStage, error: PipelineError) -> Self {
        Self { platform: platform.name.clone(), stage, error }
    }

    fn summary(&self) -> FailureSummary {
        FailureSummary { stage: self.stage, message: self.error.to_string() }
    }
}

/// Returned when at least one platform failed; the report still covers every platform.
#[derive(Debug)]
pub struct AggregateBuildError {
    pub report: BuildReport,
    pub failures: Vec<PlatformFailure>,
}

impl AggregateBuildError {
    pub fn all_failed(&self) -> bool {
        self.report.platforms.iter().all(|p| p.status == PlatformStatus::Failed)
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.report.succeeded()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.report.failed()
    }
}

impl fmt::Display for AggregateBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} platforms failed",
            self.failed().len(),
            self.report.platforms.len()
        )?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateBuildError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlatformStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureSummary {
    pub stage: BuildStage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformReport {
    pub platform: String,
    pub status: PlatformStatus,
    pub artifacts: Vec<BuildArtifact>,
    pub failures: Vec<FailureSummary>,
}

impl PlatformReport {
    pub fn artifact(&self, kind: crate::artifact::ArtifactKind) -> Option<&BuildArtifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: String,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub environment: Environment,
    pub shared: Vec<BuildArtifact>,
    pub platforms: Vec<PlatformReport>,
}

impl BuildReport {
    pub fn platform(&self, name: &str) -> Option<&PlatformReport> {
        self.platforms.iter().find(|p| p.platform == name)
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.names_with(PlatformStatus::Succeeded)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_with(PlatformStatus::Failed)
    }

    fn names_with(&self, status: PlatformStatus) -> Vec<&str> {
        self.platforms
            .iter()
            .filter(|p| p.status == status)
            .map(|p| p.platform.as_str())
            .collect()
    }
}

/// Everything a stage needs, shared read-only by all platform tasks
pub struct BuildContext {
    pub config: BuildConfig,
    pub transforms: Transforms,
}

/// The build pipeline - one run per call to `build`
pub struct BuildPipeline {
    ctx: Arc<BuildContext>,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig) -> Self {
        Self::with_transforms(config, Transforms::default())
    }

    pub fn with_transforms(config: BuildConfig, transforms: Transforms) -> Self {
        Self {
            ctx: Arc::new(BuildContext { config, transforms }),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.ctx.config
    }

    pub async fn build_all(&self) -> Result<BuildReport, PipelineError> {
        self.build(None).await
    }

    pub async fn build_platform(&self, platform: &str) -> Result<BuildReport, PipelineError> {
        self.build(Some(platform)).await
    }

    /// Build one platform, or every configured platform when `filter` is `None`.
    ///
    /// Config and strings failures abort the run. Platform failures are
    /// collected and returned together as `PipelineError::Aggregate`.
    pub async fn build(&self, filter: Option<&str>) -> Result<BuildReport, PipelineError> {
        let start = Instant::now();
        let started_at = Utc::now();
        let config = &self.ctx.config;
        let platforms = config.select(filter)?;

        info!(
            platforms = platforms.len(),
            environment = %config.environment,
            minify = config.minify_enabled(),
            "Starting build"
        );

        let mut configs = JoinSet::new();
        for platform in platforms.iter().cloned() {
            let ctx = Arc::clone(&self.ctx);
            configs.spawn(async move {
                let artifact = generate_config(&ctx.config, &platform).await?;
                Ok::<_, PipelineError>((platform.name, artifact))
            });
        }
        let mut config_artifacts = Vec::with_capacity(platforms.len());
        while let Some(joined) = configs.join_next().await {
            config_artifacts.push(joined??);
        }

        info!("Compiling strings");
        let strings = compile_strings(config).await?;

        info!("Building stylesheets and scripts");
        let mut tasks = JoinSet::new();
        for platform in platforms.iter().cloned() {
            let ctx = Arc::clone(&self.ctx);
            let config_artifact = config_artifacts
                .iter()
                .position(|(name, _)| *name == platform.name)
                .map(|i| config_artifacts.swap_remove(i).1);
            tasks.spawn(async move { build_platform_unit(&ctx, platform, config_artifact).await });
        }
        let mut outcomes = Vec::with_capacity(platforms.len());
        while let Some(joined) = tasks.join_next().await {
            outcomes.push(joined?);
        }
        outcomes.sort_by_key(|o| platforms.iter().position(|p| p.name == o.report.platform));

        let mut failures = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            failures.extend(outcome.failures);
            reports.push(outcome.report);
        }

        log_stat("build", start, Duration::from_millis(2000));

        let report = BuildReport {
            build_id: Uuid::new_v4().to_string(),
            engine_version: crate::ENGINE_VERSION.to_string(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            environment: config.environment,
            shared: vec![strings],
            platforms: reports,
        };

        if failures.is_empty() {
            Ok(report)
        } else {
            for failure in &failures {
                error!(platform = %failure.platform, stage = %failure.stage, "{}", failure.error);
            }
            Err(PipelineError::Aggregate(Box::new(AggregateBuildError { report, failures })))
        }
    }
}

struct PlatformOutcome {
    report: PlatformReport,
    failures: Vec<PlatformFailure>,
}

/// Stylesheet and script run together; the bootstrap only runs when both landed.
async fn build_platform_unit(
    ctx: &BuildContext,
    platform: Platform,
    config_artifact: Option<BuildArtifact>,
) -> PlatformOutcome {
    let bootstrap = BootstrapGenerator::new(ctx);
    let cleared = bootstrap.clear(&platform).await;

    let styles = StylesheetBuilder::new(ctx);
    let scripts = ScriptBundleBuilder::new(ctx);
    let (css, js) = tokio::join!(styles.build(&platform), scripts.build(&platform));

    let mut artifacts: Vec<BuildArtifact> = config_artifact.into_iter().collect();
    let mut failures = Vec::new();
    if let Err(failure) = cleared {
        failures.push(failure);
    }

    let css = match css {
        Ok(artifact) => Some(artifact),
        Err(failure) => {
            failures.push(failure);
            None
        }
    };
    let js = match js {
        Ok(output) => Some(output),
        Err(failure) => {
            failures.push(failure);
            None
        }
    };

    match (css, js) {
        (Some(mut css), Some(js)) if failures.is_empty() => {
            let mut script = js.script;
            artifacts.push(js.templates);
            match bootstrap.build(&platform).await {
                Ok(output) => {
                    script.fingerprint = Some(output.script);
                    css.fingerprint = Some(output.stylesheet);
                    artifacts.push(script);
                    artifacts.push(css);
                    artifacts.push(output.artifact);
                }
                Err(failure) => {
                    artifacts.push(script);
                    artifacts.push(css);
                    failures.push(failure);
                }
            }
        }
        (css, js) => {
            warn!(platform = %platform.name, "Skipping bootstrap, prerequisites failed");
            if let Some(js) = js {
                artifacts.push(js.templates);
                artifacts.push(js.script);
            }
            artifacts.extend(css);
        }
    }

    let status = if failures.is_empty() {
        PlatformStatus::Succeeded
    } else {
        PlatformStatus::Failed
    };

    PlatformOutcome {
        report: PlatformReport {
            platform: platform.name.clone(),
            status,
            artifacts,
            failures: failures.iter().map(PlatformFailure::summary).collect(),
        },
        failures,
    }
}

/// Log how long a stage took; slow stages are raised to a warning.
pub fn log_stat(label: &str, start: Instant, budget: Duration) {
    let elapsed = start.elapsed();
    let ms = elapsed.as_millis() as u64;
    if elapsed > budget {
        warn!(stage = label, elapsed_ms = ms, budget_ms = budget.as_millis() as u64, "Stage over budget");
    } else {
        info!(stage = label, elapsed_ms = ms, "Stage complete");
    }
}
