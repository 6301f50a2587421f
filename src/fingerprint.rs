//! Fingerprint Service - Content Hash + Public URL

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::BuildConfig;
use crate::hashing::{sha256_hex, short_hash};
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: String,
    pub url: String,
}

pub struct FingerprintService {
    assets: PathBuf,
    base_url: String,
}

impl FingerprintService {
    pub fn new(assets: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            assets: assets.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(&config.assets, config.base_url())
    }

    /// Hash the artifact as stored on disk.
    ///
    /// A missing file means a stage ran before its input was written.
    pub async fn fingerprint(&self, path: &Path) -> Result<Fingerprint, PipelineError> {
        let bytes = fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PipelineError::Sequencing(path.to_path_buf()),
            _ => PipelineError::io(path, e),
        })?;
        let hash = sha256_hex(&bytes);
        let url = self.url_for(path, &hash)?;
        Ok(Fingerprint { hash, url })
    }

    /// `<base>/<dir>/<stem>.<hash12>.<ext>`
    pub fn url_for(&self, path: &Path, hash: &str) -> Result<String, PipelineError> {
        let relative = path.strip_prefix(&self.assets).map_err(|_| {
            PipelineError::Config(format!(
                "Artifact {} is outside the asset root {}",
                path.display(),
                self.assets.display()
            ))
        })?;
        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = match relative.extension() {
            Some(ext) => format!("{}.{}.{}", stem, short_hash(hash), ext.to_string_lossy()),
            None => format!("{}.{}", stem, short_hash(hash)),
        };
        let mut segments: Vec<String> = relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        segments.push(name);
        Ok(format!("{}/{}", self.base_url, segments.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fingerprint_url_and_determinism() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web").join("app.js");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "abc").unwrap();

        let service = FingerprintService::new(dir.path(), "http://cdn.example.com/");
        let a = service.fingerprint(&path).await.unwrap();
        let b = service.fingerprint(&path).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.url, "http://cdn.example.com/web/app.ba7816bf8f01.js");

        std::fs::write(&path, "abd").unwrap();
        let c = service.fingerprint(&path).await.unwrap();
        assert_ne!(a.hash, c.hash);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_sequencing_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = FingerprintService::new(dir.path(), "http://localhost");
        let err = service.fingerprint(&dir.path().join("web/app.css")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sequencing(_)));
    }

    #[test]
    fn test_outside_asset_root() {
        let service = FingerprintService::new("/srv/assets", "http://localhost");
        assert!(service.url_for(Path::new("/tmp/app.js"), "00").is_err());
    }
}
