//! Build Artifacts - Written Once Per Run

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Config,
    Strings,
    Templates,
    Script,
    Stylesheet,
    Bootstrap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub size: usize,
    #[serde(skip)]
    pub contents: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

impl BuildArtifact {
    pub fn hash(&self) -> Option<&str> {
        self.fingerprint.as_ref().map(|f| f.hash.as_str())
    }
}

/// Persist the final bytes of an artifact, creating parent directories.
pub async fn write_artifact(
    kind: ArtifactKind,
    path: &Path,
    contents: String,
) -> Result<BuildArtifact, PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }
    fs::write(path, contents.as_bytes())
        .await
        .map_err(|e| PipelineError::io(path, e))?;
    debug!(kind = ?kind, path = %path.display(), bytes = contents.len(), "Wrote artifact");
    Ok(BuildArtifact {
        kind,
        path: path.to_path_buf(),
        size: contents.len(),
        contents,
        fingerprint: None,
    })
}
