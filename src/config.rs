//! Build Configuration - One Object Per Run
//!
//! Loaded once, validated once, then passed by reference to every stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::pipeline::PipelineError;

pub const DEFAULT_CONFIG_FILE: &str = "forgebundle.json";
pub const ENV_OVERRIDE: &str = "FORGEBUNDLE_ENV";
pub const MINIFY_OVERRIDE: &str = "FORGEBUNDLE_MINIFY";

/// The platform that serves assets from the site root
pub const WEB_PLATFORM: &str = "web";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(PipelineError::Config(format!("Unknown environment: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub platforms: Vec<String>,
    pub assets: PathBuf,
    #[serde(default)]
    pub vendor_dir: Option<PathBuf>,
    /// Declared in reverse of execution order
    #[serde(default = "default_vendor_manifest")]
    pub vendor_manifest: Vec<String>,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub minify: Option<bool>,
    pub base_url: String,
    pub version: String,
    pub version_code: u32,
    #[serde(default)]
    pub socketio: bool,
    #[serde(default)]
    pub weinre: Option<String>,
    #[serde(default = "default_live_reload_port")]
    pub live_reload_port: u16,
}

fn default_vendor_manifest() -> Vec<String> {
    vec![
        "backbone.js".to_string(),
        "polyfills.js".to_string(),
        "zepto.js".to_string(),
    ]
}

fn default_live_reload_port() -> u16 { 7002 }

impl BuildConfig {
    /// Minimal configuration; everything optional takes its default
    pub fn new(platforms: Vec<String>, assets: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            platforms,
            assets: assets.into(),
            vendor_dir: None,
            vendor_manifest: default_vendor_manifest(),
            environment: Environment::default(),
            minify: None,
            base_url: base_url.to_string(),
            version: "0.0.0".to_string(),
            version_code: 0,
            socketio: false,
            weinre: None,
            live_reload_port: default_live_reload_port(),
        }
    }

    /// Load from a JSON file, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let mut config: BuildConfig = serde_json::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup(ENV_OVERRIDE) {
            self.environment = env.parse()?;
        }
        if let Some(flag) = lookup(MINIFY_OVERRIDE) {
            self.minify = Some(parse_flag(MINIFY_OVERRIDE, &flag)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.platforms.is_empty() {
            return Err(PipelineError::Config("No platforms configured".into()));
        }
        for (i, name) in self.platforms.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(PipelineError::Config("Empty platform name".into()));
            }
            if self.platforms[..i].contains(name) {
                return Err(PipelineError::Config(format!("Duplicate platform: {}", name)));
            }
        }
        semver::Version::parse(&self.version)
            .map_err(|e| PipelineError::Config(format!("Invalid version {}: {}", self.version, e)))?;
        if self.base_url.trim().is_empty() {
            return Err(PipelineError::Config("Base URL is empty".into()));
        }
        Ok(())
    }

    /// Minification and CSS compression; explicit flag wins over environment
    pub fn minify_enabled(&self) -> bool {
        self.minify.unwrap_or_else(|| self.environment.is_production())
    }

    pub fn vendor_dir(&self) -> PathBuf {
        self.vendor_dir
            .clone()
            .unwrap_or_else(|| self.assets.join("..").join("vendor"))
    }

    /// Vendor script paths in the order they must execute
    pub fn vendor_execution_order(&self) -> Vec<PathBuf> {
        let dir = self.vendor_dir();
        self.vendor_manifest.iter().rev().map(|f| dir.join(f)).collect()
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn strings_source_dir(&self) -> PathBuf {
        self.assets.join("common").join("strings")
    }

    pub fn strings_output(&self) -> PathBuf {
        self.assets.join("common").join("js").join("strings.js")
    }

    /// Resolve one configured platform
    pub fn platform(&self, name: &str) -> Result<Platform, PipelineError> {
        if !self.platforms.iter().any(|p| p == name) {
            return Err(PipelineError::Config(format!("Unknown platform: {}", name)));
        }
        Ok(Platform::new(name, &self.assets))
    }

    /// Every platform selected by the filter, in configured order
    pub fn select(&self, filter: Option<&str>) -> Result<Vec<Platform>, PipelineError> {
        match filter {
            Some(name) => Ok(vec![self.platform(name)?]),
            None => self.platforms.iter().map(|p| self.platform(p)).collect(),
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, PipelineError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(PipelineError::Config(format!("{} must be a boolean, got {}", key, other))),
    }
}

/// A named build target and its asset layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub name: String,
    pub root: PathBuf,
    pub assets: PathBuf,
}

impl Platform {
    pub fn new(name: &str, assets: &Path) -> Self {
        Self {
            name: name.to_string(),
            root: assets.join(name),
            assets: assets.to_path_buf(),
        }
    }

    pub fn is_web(&self) -> bool {
        self.name == WEB_PLATFORM
    }

    pub fn script_entry(&self) -> PathBuf {
        self.root.join("js").join("main.js")
    }

    pub fn stylesheet_entry(&self) -> PathBuf {
        self.root.join("less").join("main.less")
    }

    pub fn bootstrap_template(&self) -> PathBuf {
        self.root.join("bootstrap.tpl")
    }

    pub fn config_output(&self) -> PathBuf {
        self.root.join("js").join("config.js")
    }

    pub fn templates_output(&self) -> PathBuf {
        self.root.join("templates.js")
    }

    pub fn script_output(&self) -> PathBuf {
        self.root.join("app.js")
    }

    pub fn stylesheet_output(&self) -> PathBuf {
        self.root.join("app.css")
    }

    pub fn bootstrap_output(&self) -> PathBuf {
        self.root.join("bootstrap.js")
    }
}
