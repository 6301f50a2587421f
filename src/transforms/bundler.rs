//! Default script bundler: follows `require('...')` from the entry point.

use regex::Regex;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use super::modules::{emit_modules, ModuleEntry};
use super::scan::{check_balanced, tokenize, Dialect, SegmentKind};
use super::{BundleRequest, ScriptBundler, TransformError};
use crate::templates::module_id;

const REQUIRE_PATTERN: &str = r#"\brequire\s*\(\s*$"#;

pub struct CommonJsBundler;

impl ScriptBundler for CommonJsBundler {
    fn bundle(&self, request: &BundleRequest) -> Result<String, TransformError> {
        let require_call = Regex::new(REQUIRE_PATTERN)?;
        let ignore: HashSet<&str> = request.ignore.iter().map(String::as_str).collect();

        let mut exposed: BTreeMap<String, String> = BTreeMap::new();
        for path in &request.expose {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            exposed.insert(name, module_id(&request.root, path));
        }

        let mut modules = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<PathBuf> = request.expose.iter().cloned().collect();
        queue.push_back(request.entry.clone());

        while let Some(path) = queue.pop_front() {
            let id = module_id(&request.root, &path);
            if !seen.insert(id.clone()) {
                continue;
            }
            let source = fs::read_to_string(&path).map_err(|e| TransformError::io(&path, e))?;
            check_balanced(&source, Some(&path), Dialect::Script)?;

            let mut aliases = BTreeMap::new();
            for spec in required_specs(&source, &path, &require_call)? {
                if is_relative(&spec) {
                    let target = resolve(&request.root, &path, &spec);
                    let target_id = module_id(&request.root, &target);
                    if !ignore.contains(target_id.as_str()) {
                        queue.push_back(target);
                    }
                    aliases.insert(spec, target_id);
                } else if let Some(target_id) = exposed.get(&spec) {
                    aliases.insert(spec, target_id.clone());
                } else if !request.externals.contains(&spec) && !ignore.contains(spec.as_str()) {
                    return Err(TransformError::Unresolved { from: path.clone(), spec });
                }
            }

            let body = if request.debug {
                format!("{}\n//# sourceURL={}", source.trim_end(), id)
            } else {
                source
            };
            modules.push(ModuleEntry { id, body, aliases });
        }

        // Exposed names resolve from outside the bundle as well
        for (name, target) in &exposed {
            modules.push(ModuleEntry {
                id: name.clone(),
                body: format!("module.exports = require({});", super::modules::js_string(target)?),
                aliases: BTreeMap::new(),
            });
        }

        let entry = module_id(&request.root, &request.entry);
        emit_modules(&modules, Some(&entry), request.debug)
    }
}

/// Literal specifiers passed to `require(...)`, in source order
fn required_specs(source: &str, file: &Path, require_call: &Regex) -> Result<Vec<String>, TransformError> {
    let segments = tokenize(source, Some(file), Dialect::Script)?;
    let mut specs = Vec::new();
    for pair in segments.windows(2) {
        let (before, literal) = (&pair[0], &pair[1]);
        if before.kind == SegmentKind::Code
            && literal.kind == SegmentKind::Quoted
            && require_call.is_match(before.text)
        {
            let text = literal.text;
            let spec = &text[1..text.len() - 1];
            if !specs.iter().any(|s| s == spec) {
                specs.push(spec.to_string());
            }
        }
    }
    Ok(specs)
}

fn is_relative(spec: &str) -> bool {
    spec.starts_with("./") || spec.starts_with("../") || spec.starts_with('/')
}

fn resolve(root: &Path, from: &Path, spec: &str) -> PathBuf {
    let base = if let Some(rooted) = spec.strip_prefix('/') {
        root.join(rooted)
    } else {
        from.parent().unwrap_or(root).join(spec)
    };
    if base.extension().is_some() {
        base
    } else {
        base.with_extension("js")
    }
}
