//! Setup stages that every platform build depends on.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

use crate::artifact::{write_artifact, ArtifactKind, BuildArtifact};
use crate::config::{BuildConfig, Platform};
use crate::hashing::canonical_json;
use crate::pipeline::PipelineError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlatformSettings<'a> {
    platform: &'a str,
    env: &'a str,
    base_url: &'a str,
    version: &'a str,
    version_code: u32,
    minify: bool,
}

/// Write `<platform>/js/config.js` for the application bundle to require.
#[instrument(level = "debug", skip_all, fields(platform = %platform.name))]
pub async fn generate_config(
    config: &BuildConfig,
    platform: &Platform,
) -> Result<BuildArtifact, PipelineError> {
    let settings = PlatformSettings {
        platform: &platform.name,
        env: config.environment.as_str(),
        base_url: config.base_url(),
        version: &config.version,
        version_code: config.version_code,
        minify: config.minify_enabled(),
    };
    let contents = format!("module.exports = {};\n", canonical_json(&settings)?);
    write_artifact(ArtifactKind::Config, &platform.config_output(), contents).await
}

/// Merge `common/strings/<locale>.json` into `common/js/strings.js`.
#[instrument(level = "debug", skip_all)]
pub async fn compile_strings(config: &BuildConfig) -> Result<BuildArtifact, PipelineError> {
    let dir = config.strings_source_dir();
    let mut table = Map::new();
    for path in json_files(&dir).await? {
        let locale = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = fs::read_to_string(&path)
            .await
            .map_err(|e| PipelineError::io(&path, e))?;
        let value: Value = serde_json::from_str(&raw).map_err(|e| PipelineError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(PipelineError::Parse {
                path,
                message: "strings file must contain a JSON object".into(),
            });
        }
        table.insert(locale, value);
    }
    info!(locales = table.len(), "Compiled strings");
    let contents = format!("module.exports = {};\n", canonical_json(&Value::Object(table))?);
    write_artifact(ArtifactKind::Strings, &config.strings_output(), contents).await
}

async fn json_files(dir: &std::path::Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(PipelineError::io(dir, e)),
    };
    while let Some(entry) = entries.next_entry().await.map_err(|e| PipelineError::io(dir, e))? {
        let path = entry.path();
        if path.extension().map_or(false, |e| e == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(assets: &std::path::Path) -> BuildConfig {
        let mut c = BuildConfig::new(vec!["web".into()], assets, "http://localhost:8080");
        c.version = "2.1.0".into();
        c.version_code = 21;
        c
    }

    #[tokio::test]
    async fn test_compile_strings_sorted_by_locale() {
        let dir = tempfile::tempdir().unwrap();
        let strings = dir.path().join("common/strings");
        std::fs::create_dir_all(&strings).unwrap();
        std::fs::write(strings.join("fr.json"), r#"{"hello": "bonjour"}"#).unwrap();
        std::fs::write(strings.join("en.json"), r#"{"hello": "hello", "bye": "bye"}"#).unwrap();

        let artifact = compile_strings(&config(dir.path())).await.unwrap();
        assert_eq!(
            artifact.contents,
            "module.exports = {\"en\":{\"bye\":\"bye\",\"hello\":\"hello\"},\"fr\":{\"hello\":\"bonjour\"}};\n"
        );
        assert!(dir.path().join("common/js/strings.js").exists());
    }

    #[tokio::test]
    async fn test_compile_strings_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let strings = dir.path().join("common/strings");
        std::fs::create_dir_all(&strings).unwrap();
        std::fs::write(strings.join("en.json"), "[1, 2]").unwrap();
        assert!(matches!(
            compile_strings(&config(dir.path())).await,
            Err(PipelineError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_generate_config() {
        let dir = tempfile::tempdir().unwrap();
        let c = config(dir.path());
        let platform = c.platform("web").unwrap();
        let artifact = generate_config(&c, &platform).await.unwrap();
        assert_eq!(artifact.path, dir.path().join("web/js/config.js"));
        assert!(artifact.contents.contains(r#""versionCode":21"#));
        assert!(artifact.contents.contains(r#""env":"development""#));
    }
}
