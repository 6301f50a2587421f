//! Template Sets - What Goes Into templates.js

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::{Platform, WEB_PLATFORM};
use crate::pipeline::PipelineError;

/// Asset-root-relative, `/`-separated module id
pub type TemplateId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Template,
    Helper,
}

/// Source categories, in the order they are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateCategory {
    Common,
    CommonPartials,
    Platform,
    WebPartials,
    PlatformHelpers,
    CommonHelpers,
}

impl TemplateCategory {
    pub const ORDER: [TemplateCategory; 6] = [
        TemplateCategory::Common,
        TemplateCategory::CommonPartials,
        TemplateCategory::Platform,
        TemplateCategory::WebPartials,
        TemplateCategory::PlatformHelpers,
        TemplateCategory::CommonHelpers,
    ];

    fn dir(&self, platform: &Platform) -> PathBuf {
        let assets = &platform.assets;
        match self {
            TemplateCategory::Common => assets.join("common").join("templates"),
            TemplateCategory::CommonPartials => assets.join("common").join("templates").join("partials"),
            TemplateCategory::Platform => platform.root.join("templates"),
            TemplateCategory::WebPartials => assets.join(WEB_PLATFORM).join("templates").join("partials"),
            TemplateCategory::PlatformHelpers => platform.root.join("js").join("helpers"),
            TemplateCategory::CommonHelpers => assets.join("common").join("js").join("helpers"),
        }
    }

    fn kind(&self) -> SourceKind {
        match self {
            TemplateCategory::PlatformHelpers | TemplateCategory::CommonHelpers => SourceKind::Helper,
            _ => SourceKind::Template,
        }
    }

    fn extension(&self) -> &'static str {
        match self.kind() {
            SourceKind::Template => "html",
            SourceKind::Helper => "js",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSource {
    pub id: TemplateId,
    pub kind: SourceKind,
    pub path: PathBuf,
    pub source: String,
}

/// Ordered template and helper sources for one platform
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    sources: Vec<TemplateSource>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self { sources: Vec::new() }
    }

    /// Expand every category for the platform and read the files.
    pub async fn for_platform(platform: &Platform) -> Result<Self, PipelineError> {
        let mut set = Self::new();
        let mut seen = HashSet::new();
        for category in TemplateCategory::ORDER {
            let dir = category.dir(platform);
            for path in list_files(&dir, category.extension()).await? {
                if !seen.insert(path.clone()) {
                    continue;
                }
                let source = fs::read_to_string(&path)
                    .await
                    .map_err(|e| PipelineError::io(&path, e))?;
                let id = module_id(&platform.assets, &path);
                set.sources.push(TemplateSource { id, kind: category.kind(), path, source });
            }
        }
        Ok(set)
    }

    pub fn push(&mut self, source: TemplateSource) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[TemplateSource] {
        &self.sources
    }

    pub fn templates(&self) -> impl Iterator<Item = &TemplateSource> {
        self.sources.iter().filter(|s| s.kind == SourceKind::Template)
    }

    pub fn helpers(&self) -> impl Iterator<Item = &TemplateSource> {
        self.sources.iter().filter(|s| s.kind == SourceKind::Helper)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Files with the extension directly inside `dir`, sorted by path.
/// A missing directory is an empty category.
async fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(PipelineError::io(dir, e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(|e| PipelineError::io(dir, e))? {
        let path = entry.path();
        let is_file = entry.file_type().await.map_err(|e| PipelineError::io(&path, e))?.is_file();
        if is_file && path.extension().map_or(false, |e| e == extension) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Module id of a file relative to the asset root
pub fn module_id(assets: &Path, path: &Path) -> TemplateId {
    let relative = path.strip_prefix(assets).unwrap_or(path);
    normalize_id(&relative.to_string_lossy())
}

/// Collapse `.`/`..` segments and use `/` separators
pub fn normalize_id(raw: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split(|c: char| c == '/' || c == '\\') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}
