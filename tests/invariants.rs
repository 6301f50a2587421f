//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use forgebundle_core::{
    transforms::{
        BundleRequest, LessLiteCompiler, LineMinifier, ModuleTemplateCompiler,
        ScriptBundler, TransformError, Transforms,
    },
    ArtifactKind, BuildConfig, BuildPipeline, BuildReport, BuildStage, Environment,
    FingerprintService, PipelineError, PlatformStatus, sha256_hex,
};
use tempfile::TempDir;

const BOOTSTRAP_TEMPLATE: &str = "(function () {\n  load('{{JSURL}}', '{{JSVersion}}');\n  css('{{CSSURL}}', '{{CSSVersion}}');\n  window.APP = { version: '{{version}}', code: {{versionCode}}, env: '{{env}}' };\n  {{#if socketio}}connect('{{socketio}}');{{/if}}\n  {{#if weinre}}inspect('{{weinre}}');{{/if}}\n})();\n";

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Self { dir };
        fixture.seed();
        fixture
    }

    fn assets(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.assets().join(relative)
    }

    fn seed(&self) {
        let vendor = self.dir.path().join("vendor");
        write(&vendor.join("a.js"), "window.VENDOR_A = true;\n");
        write(&vendor.join("b.js"), "window.VENDOR_B = true;\n");
        write(&vendor.join("c.js"), "window.VENDOR_C = true;\n");

        write(&self.path("common/strings/en.json"), r#"{"title": "Hello"}"#);
        write(&self.path("common/templates/header.html"), "<h1>TEMPLATE_HEADER {{title}}</h1>");
        write(&self.path("common/js/helpers/upper.js"), "module.exports = function (s) { return s.toUpperCase(); };\n");
        write(&self.path("web/templates/home.html"), "<main>home</main>");
        write(&self.path("web/templates/partials/nav.html"), "<nav></nav>");

        for platform in ["web", "android"] {
            let views = format!("{}/js/views/app.js", platform);
            write(&self.path(&views), "module.exports = function () { return 'APP_BODY_MARKER'; };\n");
            let main = if platform == "web" {
                "var strings = require('strings');\nvar config = require('./config');\nvar util = require('util');\nvar home = require('../templates/home.html');\nrequire('./views/app')();\n"
            } else {
                "var strings = require('strings');\nvar config = require('./config');\nrequire('./views/app')();\n"
            };
            write(&self.path(&format!("{}/js/main.js", platform)), main);
            write(&self.path(&format!("{}/less/vars.less", platform)), "@brand: #224466;\n");
            write(
                &self.path(&format!("{}/less/main.less", platform)),
                "@import \"vars\";\n.logo {\n  color: @brand;\n  background: url(/images/logo.png);\n}\n",
            );
            write(&self.path(&format!("{}/bootstrap.tpl", platform)), BOOTSTRAP_TEMPLATE);
        }
    }

    fn config(&self, environment: Environment) -> BuildConfig {
        let mut config = BuildConfig::new(
            vec!["web".to_string(), "android".to_string()],
            self.assets(),
            "http://localhost:8080",
        );
        config.environment = environment;
        config.vendor_dir = Some(self.dir.path().join("vendor"));
        config.vendor_manifest = vec!["a.js".into(), "b.js".into(), "c.js".into()];
        config.version = "3.2.1".into();
        config.version_code = 321;
        config
    }

    fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }
}

async fn build(config: BuildConfig) -> BuildReport {
    BuildPipeline::new(config).build_all().await.unwrap()
}

#[tokio::test]
async fn invariant_one_artifact_per_kind_per_platform() {
    let fixture = Fixture::new();
    let report = build(fixture.config(Environment::Development)).await;

    assert_eq!(report.succeeded(), vec!["web", "android"]);
    for platform in &report.platforms {
        assert_eq!(platform.status, PlatformStatus::Succeeded);
        for kind in [
            ArtifactKind::Config,
            ArtifactKind::Templates,
            ArtifactKind::Script,
            ArtifactKind::Stylesheet,
            ArtifactKind::Bootstrap,
        ] {
            let matching: Vec<_> = platform.artifacts.iter().filter(|a| a.kind == kind).collect();
            assert_eq!(matching.len(), 1, "{} {:?}", platform.platform, kind);
            assert!(matching[0].path.exists());
        }
    }
    assert_eq!(report.shared.len(), 1);
    assert_eq!(report.shared[0].kind, ArtifactKind::Strings);
}

#[tokio::test]
async fn invariant_vendor_scripts_precede_templates_and_body() {
    let fixture = Fixture::new();
    build(fixture.config(Environment::Development)).await;

    let app = fixture.read("web/app.js");
    let c = app.find("VENDOR_C").unwrap();
    let b = app.find("VENDOR_B").unwrap();
    let a = app.find("VENDOR_A").unwrap();
    let templates = app.find("TEMPLATE_HEADER").unwrap();
    let body = app.find("APP_BODY_MARKER").unwrap();
    assert!(c < b && b < a, "vendor order is reversed declaration order");
    assert!(a < templates);
    assert!(templates < body);

    // templates.js is embedded verbatim
    let templates_js = fixture.read("web/templates.js");
    assert!(app.contains(templates_js.trim_end()));
}

#[tokio::test]
async fn invariant_stylesheet_urls_follow_platform() {
    let fixture = Fixture::new();
    build(fixture.config(Environment::Development)).await;

    let web = fixture.read("web/app.css");
    let android = fixture.read("android/app.css");
    assert!(web.contains("url(/images/logo.png)"));
    assert!(android.contains("url(images/logo.png)"));
    assert!(!android.contains("url(/images/logo.png)"));
    assert!(web.contains("#224466"));
}

#[tokio::test]
async fn invariant_dev_bootstrap_live_reload_flag() {
    let fixture = Fixture::new();
    build(fixture.config(Environment::Development)).await;
    let bootstrap = fixture.read("web/bootstrap.js");
    assert!(bootstrap.contains("load('http://localhost:8080/web/app.js'"));
    assert!(!bootstrap.contains("connect("));
    assert!(!bootstrap.contains("inspect("));

    let fixture = Fixture::new();
    let mut config = fixture.config(Environment::Development);
    config.socketio = true;
    let report = build(config).await;
    let bootstrap = fixture.read("web/bootstrap.js");
    assert!(bootstrap.contains("connect('http://localhost:7002/');"));

    // Version tokens still come from the artifact hashes
    let script = report.platform("web").unwrap().artifact(ArtifactKind::Script).unwrap();
    let hash = sha256_hex(fs::read(&script.path).unwrap().as_slice());
    assert_eq!(script.hash(), Some(hash.as_str()));
    assert!(bootstrap.contains(&hash));
}

#[tokio::test]
async fn invariant_prod_bootstrap_uses_fingerprinted_urls() {
    let fixture = Fixture::new();
    let mut config = fixture.config(Environment::Production);
    config.socketio = true;
    let report = build(config).await;

    let service = FingerprintService::new(fixture.assets(), "http://localhost:8080");
    let js = service.fingerprint(&fixture.path("web/app.js")).await.unwrap();
    let css = service.fingerprint(&fixture.path("web/app.css")).await.unwrap();

    let bootstrap = fixture.read("web/bootstrap.js");
    assert!(bootstrap.contains(&format!("load('{}', '{}')", js.url, js.hash)));
    assert!(bootstrap.contains(&format!("css('{}', '{}')", css.url, css.hash)));
    assert!(!bootstrap.contains("http://localhost:8080/web/app.js'"));
    assert!(!bootstrap.contains("connect("));

    let web = report.platform("web").unwrap();
    assert_eq!(web.artifact(ArtifactKind::Script).unwrap().fingerprint.as_ref(), Some(&js));
    assert_eq!(web.artifact(ArtifactKind::Stylesheet).unwrap().fingerprint.as_ref(), Some(&css));
}

#[tokio::test]
async fn invariant_production_minifies() {
    let fixture = Fixture::new();
    build(fixture.config(Environment::Production)).await;
    let app = fixture.read("web/app.js");
    assert!(!app.contains("\n\n"));
    assert!(!app.lines().any(|l| l.starts_with(' ')));
    let css = fixture.read("web/app.css");
    assert!(css.contains(".logo{color:#224466;background:url(/images/logo.png)}"));
}

#[tokio::test]
async fn invariant_partial_failure_is_reported() {
    let fixture = Fixture::new();
    write(&fixture.path("android/less/main.less"), ".logo {\n  color: red;\n");

    let result = BuildPipeline::new(fixture.config(Environment::Development)).build_all().await;
    let aggregate = match result {
        Err(PipelineError::Aggregate(aggregate)) => aggregate,
        other => panic!("expected aggregate failure, got {:?}", other.map(|r| r.build_id)),
    };

    assert!(!aggregate.all_failed());
    assert_eq!(aggregate.succeeded(), vec!["web"]);
    assert_eq!(aggregate.failed(), vec!["android"]);
    assert_eq!(aggregate.failures.len(), 1);
    assert_eq!(aggregate.failures[0].platform, "android");
    assert_eq!(aggregate.failures[0].stage, BuildStage::Stylesheet);
    assert!(matches!(aggregate.failures[0].error, PipelineError::Parse { .. }));

    assert!(fixture.path("web/bootstrap.js").exists());
    assert!(!fixture.path("android/bootstrap.js").exists());
    // The sibling script still finished
    assert!(fixture.path("android/app.js").exists());
}

#[tokio::test]
async fn invariant_failed_rebuild_drops_previous_bootstrap() {
    let fixture = Fixture::new();
    build(fixture.config(Environment::Development)).await;
    assert!(fixture.path("android/bootstrap.js").exists());

    write(&fixture.path("android/less/main.less"), ".logo {\n  color: red;\n");
    let result = BuildPipeline::new(fixture.config(Environment::Development)).build_all().await;
    assert!(matches!(result, Err(PipelineError::Aggregate(_))));

    assert!(!fixture.path("android/bootstrap.js").exists());
    assert!(fixture.path("web/bootstrap.js").exists());
}

#[tokio::test]
async fn invariant_vendor_regex_literals_survive_minify() {
    let fixture = Fixture::new();
    write(
        &fixture.dir.path().join("vendor/c.js"),
        "var escape = function (s) { return s.replace(/'/g, \"&#39;\"); };\nvar absolute = /^https?:\\/\\//; var keep = 1;\n",
    );
    let mut config = fixture.config(Environment::Production);
    config.minify = Some(true);
    build(config).await;

    let app = fixture.read("web/app.js");
    assert!(app.contains("s.replace(/'/g, \"&#39;\")"));
    assert!(app.contains("var absolute = /^https?:\\/\\//; var keep = 1;"));
}

#[tokio::test]
async fn invariant_every_platform_failing_is_all_failed() {
    let fixture = Fixture::new();
    for platform in ["web", "android"] {
        write(&fixture.path(&format!("{}/js/main.js", platform)), "function broken( {\n");
    }
    match BuildPipeline::new(fixture.config(Environment::Development)).build_all().await {
        Err(PipelineError::Aggregate(aggregate)) => {
            assert!(aggregate.all_failed());
            assert!(aggregate.failures.iter().all(|f| f.stage == BuildStage::Script));
        }
        other => panic!("expected aggregate failure, got {:?}", other.map(|r| r.build_id)),
    }
}

#[tokio::test]
async fn invariant_strings_failure_is_fatal() {
    let fixture = Fixture::new();
    write(&fixture.path("common/strings/en.json"), "{ not json");
    let result = BuildPipeline::new(fixture.config(Environment::Development)).build_all().await;
    assert!(matches!(result, Err(PipelineError::Parse { .. })));
    assert!(!fixture.path("web/app.js").exists());
    assert!(!fixture.path("android/app.css").exists());
}

#[tokio::test]
async fn invariant_build_is_idempotent() {
    let fixture = Fixture::new();
    let files = [
        "web/templates.js",
        "web/app.js",
        "web/app.css",
        "web/bootstrap.js",
        "android/app.js",
        "android/bootstrap.js",
    ];
    let mut config = fixture.config(Environment::Production);
    config.minify = Some(true);

    build(config.clone()).await;
    let first: Vec<_> = files.iter().map(|f| sha256_hex(fixture.read(f).as_bytes())).collect();
    build(config).await;
    let second: Vec<_> = files.iter().map(|f| sha256_hex(fixture.read(f).as_bytes())).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn invariant_single_platform_build() {
    let fixture = Fixture::new();
    let report = BuildPipeline::new(fixture.config(Environment::Development))
        .build_platform("android")
        .await
        .unwrap();
    assert_eq!(report.platforms.len(), 1);
    assert_eq!(report.platforms[0].platform, "android");
    assert!(fixture.path("android/bootstrap.js").exists());
    assert!(!fixture.path("web/app.js").exists());

    let unknown = BuildPipeline::new(fixture.config(Environment::Development))
        .build_platform("ios")
        .await;
    assert!(matches!(unknown, Err(PipelineError::Config(_))));
}

/// Records what the pipeline hands the bundler.
struct RecordingBundler {
    seen: Mutex<Vec<(Vec<String>, bool)>>,
}

impl ScriptBundler for RecordingBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<String, TransformError> {
        let templates_written = request.entry
            .parent()
            .and_then(Path::parent)
            .map_or(false, |root| root.join("templates.js").exists());
        self.seen.lock().unwrap().push((request.ignore.clone(), templates_written));
        Ok("STUB_BUNDLE();".to_string())
    }
}

#[tokio::test]
async fn invariant_bundler_gets_template_ids_after_templates_written() {
    let fixture = Fixture::new();
    let bundler = Arc::new(RecordingBundler { seen: Mutex::new(Vec::new()) });
    let transforms = Transforms {
        templates: Arc::new(ModuleTemplateCompiler),
        bundler: bundler.clone(),
        stylesheets: Arc::new(LessLiteCompiler),
        minifier: Arc::new(LineMinifier),
    };
    let report = BuildPipeline::with_transforms(fixture.config(Environment::Development), transforms)
        .build_platform("web")
        .await
        .unwrap();
    assert_eq!(report.succeeded(), vec!["web"]);

    let seen = bundler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (ignore, templates_written) = &seen[0];
    assert!(templates_written);
    assert_eq!(
        ignore,
        &vec![
            "common/templates/header.html".to_string(),
            "web/templates/home.html".to_string(),
            "web/templates/partials/nav.html".to_string(),
            "common/js/helpers/upper.js".to_string(),
        ]
    );
    assert!(fixture.read("web/app.js").contains("STUB_BUNDLE();"));
}
