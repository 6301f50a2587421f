//! Transform Interfaces
//!
//! The pipeline only sees these traits. Compilers, bundlers and minifiers
//! are swappable; the defaults here are enough to build a working site.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::templates::{TemplateId, TemplateSet};

pub mod bundler;
pub mod less;
pub mod minify;
pub mod modules;
pub mod scan;

pub use bundler::CommonJsBundler;
pub use less::LessLiteCompiler;
pub use minify::LineMinifier;
pub use modules::ModuleTemplateCompiler;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("syntax error at line {line}: {message}")]
    Syntax {
        file: Option<PathBuf>,
        line: usize,
        message: String,
    },

    #[error("cannot resolve module '{spec}' from {}", from.display())]
    Unresolved { from: PathBuf, spec: String },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("cannot encode module table: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransformError {
    pub fn syntax(file: Option<&Path>, line: usize, message: impl Into<String>) -> Self {
        TransformError::Syntax {
            file: file.map(Path::to_path_buf),
            line,
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        TransformError::Io { path: path.to_path_buf(), source }
    }
}

/// Compiled templates module plus the ids it defines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplates {
    pub source: String,
    pub dependencies: Vec<TemplateId>,
}

#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub entry: PathBuf,
    /// Module ids are relative to this directory
    pub root: PathBuf,
    /// Bundled and exposed by file stem
    pub expose: Vec<PathBuf>,
    /// Bare names provided by the runtime
    pub externals: Vec<String>,
    /// Module ids satisfied by an earlier script
    pub ignore: Vec<TemplateId>,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct StylesheetOptions {
    pub filename: PathBuf,
    pub include_paths: Vec<PathBuf>,
    pub compress: bool,
}

pub trait TemplateCompiler: Send + Sync {
    fn compile(&self, set: &TemplateSet) -> Result<CompiledTemplates, TransformError>;
}

pub trait ScriptBundler: Send + Sync {
    fn bundle(&self, request: &BundleRequest) -> Result<String, TransformError>;
}

pub trait StylesheetCompiler: Send + Sync {
    fn compile(&self, source: &str, options: &StylesheetOptions) -> Result<String, TransformError>;
}

pub trait Minifier: Send + Sync {
    fn minify(&self, source: &str) -> Result<String, TransformError>;
}

/// The set of transforms one pipeline uses
#[derive(Clone)]
pub struct Transforms {
    pub templates: Arc<dyn TemplateCompiler>,
    pub bundler: Arc<dyn ScriptBundler>,
    pub stylesheets: Arc<dyn StylesheetCompiler>,
    pub minifier: Arc<dyn Minifier>,
}

impl Default for Transforms {
    fn default() -> Self {
        Self {
            templates: Arc::new(ModuleTemplateCompiler),
            bundler: Arc::new(CommonJsBundler),
            stylesheets: Arc::new(LessLiteCompiler),
            minifier: Arc::new(LineMinifier),
        }
    }
}
