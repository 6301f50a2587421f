//! ForgeBundle Core - Platform Asset Compiler
//!
//! # The Build Rules (Non-Negotiable)
//! 1. Strings Before Scripts
//! 2. templates.js Lands Before app.js Is Assembled
//! 3. No Bootstrap Without Both Script And Stylesheet
//! 4. Fingerprints Hash What Is On Disk
//! 5. One Platform Failing Never Hides Another

pub mod artifact;
pub mod bootstrap;
pub mod config;
pub mod fingerprint;
pub mod hashing;
pub mod pipeline;
pub mod prepare;
pub mod script;
pub mod stylesheet;
pub mod templates;
pub mod transforms;

pub use artifact::{ArtifactKind, BuildArtifact};
pub use bootstrap::{BootstrapGenerator, BootstrapVars, DevBootstrapVars, ProdBootstrapVars};
pub use config::{BuildConfig, Environment, Platform};
pub use fingerprint::{Fingerprint, FingerprintService};
pub use hashing::{canonical_json, sha256_hex};
pub use pipeline::{
    AggregateBuildError, BuildPipeline, BuildReport, BuildStage, PipelineError, PlatformFailure,
    PlatformStatus,
};
pub use script::ScriptBundleBuilder;
pub use stylesheet::StylesheetBuilder;
pub use templates::{TemplateId, TemplateSet};
pub use transforms::Transforms;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
