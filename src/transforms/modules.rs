//! Script module emission and the default template compiler.
//!
//! Every generated script defines `require` over its own module table and
//! falls back to whatever `require` the previous script defined. That is how
//! templates.js satisfies the ids app.js leaves out.

use std::collections::BTreeMap;

use super::{CompiledTemplates, TemplateCompiler, TransformError};
use crate::templates::{SourceKind, TemplateSet};

/// Id of the shared render function emitted into templates.js
pub const TEMPLATE_RUNTIME_ID: &str = "forgebundle/template";

const PRELUDE: &str = r#"var require = (function (modules, previous) {
  var cache = {};
  var has = Object.prototype.hasOwnProperty;
  function load(id) {
    if (has.call(cache, id)) { return cache[id].exports; }
    var entry = modules[id];
    if (!entry) {
      if (previous) { return previous(id); }
      throw new Error("Cannot find module '" + id + "'");
    }
    var module = cache[id] = { exports: {} };
    entry[0].call(module.exports, function (spec) {
      return load(has.call(entry[1], spec) ? entry[1][spec] : spec);
    }, module, module.exports);
    return module.exports;
  }
  return load;
})({
"#;

const POSTLUDE: &str = "}, typeof require === \"function\" ? require : null);\n";

const TEMPLATE_RUNTIME: &str = r#"module.exports = function (source) {
  return {
    source: source,
    render: function (data) {
      return source.replace(/\{\{\s*([\w.]+)\s*\}\}/g, function (match, key) {
        var value = data == null ? undefined : data[key];
        return value == null ? "" : String(value);
      });
    }
  };
};"#;

/// One entry of a module table
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    pub id: String,
    pub body: String,
    /// Specifier as written -> resolved module id
    pub aliases: BTreeMap<String, String>,
}

/// Render a module table as a script that installs `require`.
/// `entry` is required at the end when given.
pub fn emit_modules(
    modules: &[ModuleEntry],
    entry: Option<&str>,
    debug: bool,
) -> Result<String, TransformError> {
    let mut out = String::from(PRELUDE);
    for (i, module) in modules.iter().enumerate() {
        if debug {
            out.push_str(&format!("// {}\n", module.id));
        }
        let aliases = serde_json::to_string(&module.aliases)?;
        out.push_str(&js_string(&module.id)?);
        out.push_str(": [function (require, module, exports) {\n");
        out.push_str(module.body.trim_end());
        out.push_str("\n}, ");
        out.push_str(&aliases);
        out.push(']');
        if i + 1 < modules.len() {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str(POSTLUDE);
    if let Some(entry) = entry {
        out.push_str(&format!("require({});\n", js_string(entry)?));
    }
    Ok(out)
}

/// Quote text as a JavaScript string literal
pub fn js_string(text: &str) -> Result<String, TransformError> {
    Ok(serde_json::to_string(text)?)
}

/// Compiles templates and helpers into one module table.
pub struct ModuleTemplateCompiler;

impl TemplateCompiler for ModuleTemplateCompiler {
    fn compile(&self, set: &TemplateSet) -> Result<CompiledTemplates, TransformError> {
        let mut modules = vec![ModuleEntry {
            id: TEMPLATE_RUNTIME_ID.to_string(),
            body: TEMPLATE_RUNTIME.to_string(),
            aliases: BTreeMap::new(),
        }];
        let mut dependencies = Vec::with_capacity(set.len());

        for source in set.sources() {
            let body = match source.kind {
                SourceKind::Template => format!(
                    "module.exports = require({})({});",
                    js_string(TEMPLATE_RUNTIME_ID)?,
                    js_string(&source.source)?
                ),
                SourceKind::Helper => {
                    super::scan::check_balanced(&source.source, Some(&source.path), super::scan::Dialect::Script)?;
                    source.source.clone()
                }
            };
            modules.push(ModuleEntry {
                id: source.id.clone(),
                body,
                aliases: BTreeMap::new(),
            });
            dependencies.push(source.id.clone());
        }

        Ok(CompiledTemplates {
            source: emit_modules(&modules, None, false)?,
            dependencies,
        })
    }
}
