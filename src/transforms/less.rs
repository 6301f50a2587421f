//! Default stylesheet compiler: a LESS subset.
//!
//! Handles `@import`, top-level `@variable: value;` declarations and `//`
//! comments. Compression happens here, while compiling.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::scan::{check_balanced, tokenize, Dialect, SegmentKind};
use super::{StylesheetCompiler, StylesheetOptions, TransformError};

const IMPORT_PATTERN: &str = r#"(?m)^[ \t]*@import\s+(?:\([^)]*\)\s*)?["']([^"']+)["']\s*;[ \t]*$"#;
const VARIABLE_PATTERN: &str = r"(?m)^[ \t]*@([\w-]+)\s*:\s*([^;{}]+?)\s*;[ \t]*\r?\n?";
const REFERENCE_PATTERN: &str = r"@([\w-]+)";

/// Nested variable references are resolved this many levels deep
const MAX_VARIABLE_DEPTH: usize = 8;

pub struct LessLiteCompiler;

impl StylesheetCompiler for LessLiteCompiler {
    fn compile(&self, source: &str, options: &StylesheetOptions) -> Result<String, TransformError> {
        let import = Regex::new(IMPORT_PATTERN)?;
        let mut stack = vec![options.filename.clone()];
        let expanded = expand_imports(source, &options.filename, options, &import, &mut stack)?;
        let substituted = substitute_variables(&expanded)?;
        check_balanced(&substituted, Some(&options.filename), Dialect::Stylesheet)?;

        if options.compress {
            compress(&substituted, &options.filename)
        } else {
            Ok(tidy(&substituted))
        }
    }
}

/// Inline `@import`s recursively. `stack` holds the files currently open.
fn expand_imports(
    source: &str,
    file: &Path,
    options: &StylesheetOptions,
    import: &Regex,
    stack: &mut Vec<PathBuf>,
) -> Result<String, TransformError> {
    check_balanced(source, Some(file), Dialect::Stylesheet)?;
    let source = strip_line_comments(source, file)?;

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for caps in import.captures_iter(&source) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let target = &caps[1];
        out.push_str(&source[last..whole.start]);
        last = whole.end;

        if target.ends_with(".css") || target.contains("://") {
            out.push_str(&source[whole.clone()]);
            continue;
        }
        let path = locate(file, target, &options.include_paths)?;
        if stack.contains(&path) {
            let line = source[..whole.start].matches('\n').count() + 1;
            return Err(TransformError::syntax(
                Some(file),
                line,
                format!("circular import of {}", path.display()),
            ));
        }
        let imported = fs::read_to_string(&path).map_err(|e| TransformError::io(&path, e))?;
        stack.push(path.clone());
        let inlined = expand_imports(&imported, &path, options, import, stack)?;
        stack.pop();
        out.push_str(inlined.trim_end());
    }
    out.push_str(&source[last..]);
    Ok(out)
}

/// Relative to the importing file first, then each include path
fn locate(file: &Path, target: &str, include_paths: &[PathBuf]) -> Result<PathBuf, TransformError> {
    let name = if Path::new(target).extension().is_some() {
        target.to_string()
    } else {
        format!("{}.less", target)
    };
    let here = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let candidates = std::iter::once(here).chain(include_paths.iter().cloned());
    for dir in candidates {
        let candidate = dir.join(&name);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    let tried = file.parent().unwrap_or(Path::new(".")).join(&name);
    Err(TransformError::io(
        &tried,
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("import '{}' not found", target)),
    ))
}

fn strip_line_comments(source: &str, file: &Path) -> Result<String, TransformError> {
    let segments = tokenize(source, Some(file), Dialect::Stylesheet)?;
    Ok(segments
        .iter()
        .filter(|s| s.kind != SegmentKind::LineComment)
        .map(|s| s.text)
        .collect())
}

fn substitute_variables(source: &str) -> Result<String, TransformError> {
    let declaration = Regex::new(VARIABLE_PATTERN)?;
    let reference = Regex::new(REFERENCE_PATTERN)?;

    let mut variables: HashMap<String, String> = HashMap::new();
    for caps in declaration.captures_iter(source) {
        let value = resolve_references(&caps[2], &variables, &reference);
        variables.insert(caps[1].to_string(), value);
    }
    let body = declaration.replace_all(source, "");
    Ok(resolve_references(&body, &variables, &reference))
}

fn resolve_references(text: &str, variables: &HashMap<String, String>, reference: &Regex) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_VARIABLE_DEPTH {
        if !reference.is_match(&current) {
            break;
        }
        let next = reference
            .replace_all(&current, |caps: &Captures| {
                variables
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned();
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Uncompressed output: trailing whitespace trimmed, blank runs collapsed.
fn tidy(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut blank = true;
    for line in source.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if !blank {
                out.push('\n');
            }
            blank = true;
            continue;
        }
        out.push_str(line);
        out.push('\n');
        blank = false;
    }
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

fn compress(source: &str, file: &Path) -> Result<String, TransformError> {
    const TIGHT: [char; 4] = ['{', '}', ';', ','];
    let mut out = String::with_capacity(source.len());
    let mut pending_space = false;
    let mut offset = 0;

    for segment in tokenize(source, Some(file), Dialect::Stylesheet)? {
        let at = offset;
        offset += segment.text.len();
        match segment.kind {
            SegmentKind::LineComment | SegmentKind::BlockComment => {
                pending_space = true;
            }
            SegmentKind::Quoted | SegmentKind::Regex => {
                if pending_space && needs_space(&out, segment.text.chars().next(), &TIGHT) {
                    out.push(' ');
                }
                out.push_str(segment.text);
                pending_space = false;
            }
            SegmentKind::Code => {
                for (idx, c) in segment.text.char_indices() {
                    if c.is_whitespace() {
                        pending_space = true;
                        continue;
                    }
                    let value_colon = c == ':' && declaration_follows(&source[at + idx + 1..]);
                    if pending_space && !value_colon && needs_space(&out, Some(c), &TIGHT) {
                        out.push(' ');
                    }
                    pending_space = false;
                    if c == '}' && out.ends_with(';') {
                        out.pop();
                    }
                    out.push(c);
                }
            }
        }
    }
    Ok(out.trim().to_string())
}

/// A `:` followed by a value rather than a selector's `{`
fn declaration_follows(rest: &str) -> bool {
    rest.find(|c: char| matches!(c, ';' | '{' | '}'))
        .map_or(true, |i| !rest[i..].starts_with('{'))
}

fn needs_space(out: &str, next: Option<char>, tight: &[char]) -> bool {
    let Some(prev) = out.chars().last() else {
        return false;
    };
    if tight.contains(&prev) || prev == ':' {
        return false;
    }
    !matches!(next, Some(c) if tight.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn options(filename: PathBuf, compress: bool) -> StylesheetOptions {
        let include = filename.parent().unwrap().to_path_buf();
        StylesheetOptions { filename, include_paths: vec![include], compress }
    }

    #[test]
    fn test_imports_and_variables() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("less/main.less");
        write(&dir.path().join("less/colors.less"), "@brand: #336699;\n@link: @brand;\n");
        let source = "@import \"colors\";\n// header\na {\n  color: @link;\n  background: url(//cdn.example.com/a.png);\n}\n";

        let css = LessLiteCompiler.compile(source, &options(entry, false)).unwrap();
        assert_eq!(css, "a {\n  color: #336699;\n  background: url(//cdn.example.com/a.png);\n}\n");
    }

    #[test]
    fn test_compress() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.less");
        let source = "/* banner */\na:hover ,\nb  {\n  color : red;\n  content: \"a  b\";\n}\n@media screen {\n  p { margin: 0 auto; }\n}\n";

        let css = LessLiteCompiler.compile(source, &options(entry, true)).unwrap();
        assert_eq!(css, "a:hover,b{color:red;content:\"a  b\"}@media screen{p{margin:0 auto}}");
    }

    #[test]
    fn test_compress_keeps_descendant_pseudo_selector() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.less");
        let source = "nav :first-child {\n  margin : 0;\n  padding :1px\n}\n";

        let css = LessLiteCompiler.compile(source, &options(entry, true)).unwrap();
        assert_eq!(css, "nav :first-child{margin:0;padding:1px}");
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.less");
        let err = LessLiteCompiler.compile("a {\n  color: red;\n", &options(entry.clone(), false)).unwrap_err();
        match err {
            TransformError::Syntax { file, line, .. } => {
                assert_eq!(file, Some(entry));
                assert_eq!(line, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_circular_import() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a.less"), "@import \"b\";\n");
        write(&dir.path().join("b.less"), "@import \"a\";\n");
        let entry = dir.path().join("a.less");
        let source = fs::read_to_string(&entry).unwrap();
        assert!(matches!(
            LessLiteCompiler.compile(&source, &options(entry, false)),
            Err(TransformError::Syntax { .. })
        ));
    }

    #[test]
    fn test_missing_import() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.less");
        assert!(matches!(
            LessLiteCompiler.compile("@import \"nope\";\n", &options(entry, false)),
            Err(TransformError::Io { .. })
        ));
    }
}
