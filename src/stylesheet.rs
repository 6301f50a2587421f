//! Stylesheet Builder - main.less to app.css

use regex::Regex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{info, instrument};

use crate::artifact::{write_artifact, ArtifactKind, BuildArtifact};
use crate::config::Platform;
use crate::pipeline::{log_stat, BuildContext, BuildStage, PipelineError, PlatformFailure};
use crate::transforms::StylesheetOptions;

/// Root-relative `url(/...)` references, optionally quoted with `"`
const ROOT_URL_PATTERN: &str = r#"url\(/"?([\w/\-.?#@=&%]+)"?\)"#;

pub struct StylesheetBuilder<'a> {
    ctx: &'a BuildContext,
}

impl<'a> StylesheetBuilder<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }

    #[instrument(name = "build_styles", skip_all, fields(platform = %platform.name))]
    pub async fn build(&self, platform: &Platform) -> Result<BuildArtifact, PlatformFailure> {
        let start = Instant::now();
        let artifact = self
            .build_inner(platform)
            .await
            .map_err(|e| PlatformFailure::new(platform, BuildStage::Stylesheet, e))?;
        log_stat("build less", start, Duration::from_millis(200));
        Ok(artifact)
    }

    async fn build_inner(&self, platform: &Platform) -> Result<BuildArtifact, PipelineError> {
        let entry = platform.stylesheet_entry();
        let source = fs::read_to_string(&entry)
            .await
            .map_err(|e| PipelineError::io(&entry, e))?;

        let options = StylesheetOptions {
            include_paths: entry.parent().map(|p| vec![p.to_path_buf()]).unwrap_or_default(),
            filename: entry.clone(),
            compress: self.ctx.config.minify_enabled(),
        };
        let compiler = Arc::clone(&self.ctx.transforms.stylesheets);
        let compiled = tokio::task::spawn_blocking(move || compiler.compile(&source, &options))
            .await?
            .map_err(|e| PipelineError::transform(&entry, e))?;

        let css = rewrite_urls(&compiled, platform)?;
        let artifact = write_artifact(ArtifactKind::Stylesheet, &platform.stylesheet_output(), css).await?;
        info!(bytes = artifact.size, "Built stylesheet");
        Ok(artifact)
    }
}

/// The web platform serves from the site root; every other platform
/// serves from its own relative root, so the leading `/` goes.
pub fn rewrite_urls(css: &str, platform: &Platform) -> Result<String, PipelineError> {
    let pattern = Regex::new(ROOT_URL_PATTERN)?;
    let replacement = if platform.is_web() { "url(/$1)" } else { "url($1)" };
    Ok(pattern.replace_all(css, replacement).into_owned())
}
