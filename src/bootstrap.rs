//! Bootstrap Generator - the loader document
//!
//! Production loaders point at fingerprinted URLs. Development loaders point
//! at the raw files and may carry live-reload and remote-inspector endpoints.

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::artifact::{write_artifact, ArtifactKind, BuildArtifact};
use crate::config::{BuildConfig, Environment, Platform};
use crate::fingerprint::{Fingerprint, FingerprintService};
use crate::pipeline::{BuildContext, BuildStage, PipelineError, PlatformFailure};

const SECTION_PATTERN: &str = r"(?s)\{\{#if\s+([\w.]+)\s*\}\}(.*?)\{\{/if\}\}";
const VARIABLE_PATTERN: &str = r"\{\{\{?\s*([\w.]+)\s*\}?\}\}";
const PORT_PATTERN: &str = r":\d+";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DevBootstrapVars {
    #[serde(rename = "JSURL")]
    pub js_url: String,
    #[serde(rename = "JSVersion")]
    pub js_version: String,
    #[serde(rename = "CSSURL")]
    pub css_url: String,
    #[serde(rename = "CSSVersion")]
    pub css_version: String,
    pub version: String,
    #[serde(rename = "versionCode")]
    pub version_code: u32,
    pub env: Environment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socketio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weinre: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProdBootstrapVars {
    #[serde(rename = "JSURL")]
    pub js_url: String,
    #[serde(rename = "JSVersion")]
    pub js_version: String,
    #[serde(rename = "CSSURL")]
    pub css_url: String,
    #[serde(rename = "CSSVersion")]
    pub css_version: String,
    pub version: String,
    #[serde(rename = "versionCode")]
    pub version_code: u32,
    pub env: Environment,
}

/// Loader variables; the variant decides which fields may exist.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BootstrapVars {
    Development(DevBootstrapVars),
    Production(ProdBootstrapVars),
}

impl BootstrapVars {
    pub fn new(
        config: &BuildConfig,
        platform: &Platform,
        script: &Fingerprint,
        stylesheet: &Fingerprint,
    ) -> Result<Self, PipelineError> {
        let raw_url = |file: &str| format!("{}/{}/{}", config.base_url(), platform.name, file);
        let vars = match config.environment {
            Environment::Development => BootstrapVars::Development(DevBootstrapVars {
                js_url: raw_url("app.js"),
                js_version: script.hash.clone(),
                css_url: raw_url("app.css"),
                css_version: stylesheet.hash.clone(),
                version: config.version.clone(),
                version_code: config.version_code,
                env: Environment::Development,
                socketio: if config.socketio {
                    Some(live_reload_url(config.base_url(), config.live_reload_port)?)
                } else {
                    None
                },
                weinre: config.weinre.clone().filter(|w| !w.is_empty()),
            }),
            Environment::Production => BootstrapVars::Production(ProdBootstrapVars {
                js_url: script.url.clone(),
                js_version: script.hash.clone(),
                css_url: stylesheet.url.clone(),
                css_version: stylesheet.hash.clone(),
                version: config.version.clone(),
                version_code: config.version_code,
                env: Environment::Production,
            }),
        };
        Ok(vars)
    }

    /// Flatten to template variables; omitted fields are simply absent.
    pub fn to_context(&self) -> Result<BTreeMap<String, String>, PipelineError> {
        let value = serde_json::to_value(self)?;
        let mut context = BTreeMap::new();
        if let Value::Object(map) = value {
            for (key, value) in map {
                let text = match value {
                    Value::Null => continue,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                context.insert(key, text);
            }
        }
        Ok(context)
    }
}

/// Base URL with its port removed and the live-reload port appended
pub fn live_reload_url(base_url: &str, port: u16) -> Result<String, PipelineError> {
    let pattern = Regex::new(PORT_PATTERN)?;
    let host = pattern.replace(base_url.trim_end_matches('/'), "");
    Ok(format!("{}:{}/", host, port))
}

/// Render `{{name}}` and `{{#if name}}..{{else}}..{{/if}}`.
pub fn render(template: &str, context: &BTreeMap<String, String>) -> Result<String, PipelineError> {
    let section = Regex::new(SECTION_PATTERN)?;
    let variable = Regex::new(VARIABLE_PATTERN)?;

    let with_sections = section.replace_all(template, |caps: &Captures| {
        let truthy = context.get(&caps[1]).map_or(false, |v| !v.is_empty() && v != "false");
        let body = &caps[2];
        let (then, otherwise) = match body.split_once("{{else}}") {
            Some((then, otherwise)) => (then, otherwise),
            None => (body, ""),
        };
        if truthy { then.to_string() } else { otherwise.to_string() }
    });

    if with_sections.contains("{{#if") || with_sections.contains("{{/if}}") {
        return Err(PipelineError::Config("Unbalanced {{#if}} section in loader template".into()));
    }

    let rendered = variable.replace_all(&with_sections, |caps: &Captures| {
        context.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(rendered.into_owned())
}

pub struct BootstrapOutput {
    pub artifact: BuildArtifact,
    pub script: Fingerprint,
    pub stylesheet: Fingerprint,
}

pub struct BootstrapGenerator<'a> {
    ctx: &'a BuildContext,
}

impl<'a> BootstrapGenerator<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Self { ctx }
    }

    /// Remove the loader left by an earlier run so a failed rebuild never
    /// leaves one pointing at replaced artifacts.
    pub async fn clear(&self, platform: &Platform) -> Result<(), PlatformFailure> {
        let path = platform.bootstrap_output();
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed previous bootstrap");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PlatformFailure::new(platform, BuildStage::Bootstrap, PipelineError::io(&path, e))),
        }
    }

    /// Both app.js and app.css must already be on disk.
    #[instrument(name = "build_bootstrap", skip_all, fields(platform = %platform.name))]
    pub async fn build(&self, platform: &Platform) -> Result<BootstrapOutput, PlatformFailure> {
        self.build_inner(platform)
            .await
            .map_err(|e| PlatformFailure::new(platform, BuildStage::Bootstrap, e))
    }

    async fn build_inner(&self, platform: &Platform) -> Result<BootstrapOutput, PipelineError> {
        let config = &self.ctx.config;
        let service = FingerprintService::from_config(config);
        let js_path = platform.script_output();
        let css_path = platform.stylesheet_output();
        let (script, stylesheet) = tokio::try_join!(service.fingerprint(&js_path), service.fingerprint(&css_path))?;

        let vars = BootstrapVars::new(config, platform, &script, &stylesheet)?;
        let template_path = platform.bootstrap_template();
        let template = fs::read_to_string(&template_path)
            .await
            .map_err(|e| PipelineError::io(&template_path, e))?;
        let rendered = render(&template, &vars.to_context()?).map_err(|e| match e {
            PipelineError::Config(message) => PipelineError::Parse { path: template_path.clone(), message },
            other => other,
        })?;

        let artifact = write_artifact(ArtifactKind::Bootstrap, &platform.bootstrap_output(), rendered).await?;
        info!(js = %script.url, css = %stylesheet.url, "Built bootstrap");
        Ok(BootstrapOutput { artifact, script, stylesheet })
    }
}
