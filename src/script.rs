//! Script Bundle Builder - templates.js and app.js
//!
//! app.js = vendor scripts (execution order) + templates.js + bundle body.
//! templates.js is written before the bundle is assembled.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::artifact::{write_artifact, ArtifactKind, BuildArtifact};
use crate::config::Platform;
use crate::pipeline::{log_stat, BuildContext, BuildStage, PipelineError, PlatformFailure};
use crate::templates::{TemplateId, TemplateSet};
use crate::transforms::BundleRequest;

/// Bare module names the runtime provides
pub const RUNTIME_EXTERNALS: [&str; 1] = ["util"];

pub struct ScriptOutput {
    pub templates: BuildArtifact,
    pub script: BuildArtifact,
}

pub struct ScriptBundleBuilder<'a> {
    ctx: &'a BuildContext,
}

impl<'a> ScriptBundleBuilder<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }

    #[instrument(name = "build_script", skip_all, fields(platform = %platform.name))]
    pub async fn build(&self, platform: &Platform) -> Result<ScriptOutput, PlatformFailure> {
        let start = Instant::now();
        let (templates, ignore) = self
            .compile_templates(platform)
            .await
            .map_err(|e| PlatformFailure::new(platform, BuildStage::Templates, e))?;
        let script = self
            .bundle(platform, &templates, ignore)
            .await
            .map_err(|e| PlatformFailure::new(platform, BuildStage::Script, e))?;
        log_stat("build js", start, Duration::from_millis(1000));
        Ok(ScriptOutput { templates, script })
    }

    /// Compile and persist templates.js. Returns the artifact and the module
    /// ids it defines, which the main bundle must leave alone.
    pub async fn compile_templates(
        &self,
        platform: &Platform,
    ) -> Result<(BuildArtifact, Vec<TemplateId>), PipelineError> {
        let set = TemplateSet::for_platform(platform).await?;
        debug!(sources = set.len(), "Resolved template set");

        let compiler = Arc::clone(&self.ctx.transforms.templates);
        let output = platform.templates_output();
        let compiled = tokio::task::spawn_blocking(move || compiler.compile(&set))
            .await?
            .map_err(|e| PipelineError::transform(&output, e))?;

        let artifact = write_artifact(ArtifactKind::Templates, &output, compiled.source).await?;
        Ok((artifact, compiled.dependencies))
    }

    /// Assemble, prepend, optionally minify, and persist app.js.
    pub async fn bundle(
        &self,
        platform: &Platform,
        templates: &BuildArtifact,
        ignore: Vec<TemplateId>,
    ) -> Result<BuildArtifact, PipelineError> {
        let config = &self.ctx.config;
        let entry = platform.script_entry();
        let request = BundleRequest {
            entry: entry.clone(),
            root: platform.assets.clone(),
            expose: vec![config.strings_output()],
            externals: RUNTIME_EXTERNALS.iter().map(|s| s.to_string()).collect(),
            ignore,
            debug: !config.environment.is_production(),
        };
        let bundler = Arc::clone(&self.ctx.transforms.bundler);
        let body = tokio::task::spawn_blocking(move || bundler.bundle(&request))
            .await?
            .map_err(|e| PipelineError::transform(&entry, e))?;

        let mut parts = Vec::with_capacity(config.vendor_manifest.len() + 2);
        // Sequential reads keep the concatenation order fixed
        for path in config.vendor_execution_order() {
            let vendor = fs::read_to_string(&path)
                .await
                .map_err(|e| PipelineError::io(&path, e))?;
            parts.push(vendor);
        }
        parts.push(templates.contents.clone());
        parts.push(body);

        let mut source = concat_scripts(&parts);
        if config.minify_enabled() {
            let minifier = Arc::clone(&self.ctx.transforms.minifier);
            let output = platform.script_output();
            source = tokio::task::spawn_blocking(move || minifier.minify(&source))
                .await?
                .map_err(|e| PipelineError::transform(&output, e))?;
        }

        let artifact = write_artifact(ArtifactKind::Script, &platform.script_output(), source).await?;
        info!(bytes = artifact.size, "Built script bundle");
        Ok(artifact)
    }
}

/// Join scripts so that each one starts on its own line
pub fn concat_scripts(parts: &[String]) -> String {
    let mut out = String::with_capacity(parts.iter().map(|p| p.len() + 2).sum());
    for part in parts {
        let part = part.trim_end();
        if part.is_empty() {
            continue;
        }
        out.push_str(part);
        if !part.ends_with(';') && !part.ends_with('}') {
            out.push(';');
        }
        out.push('\n');
    }
    out
}
