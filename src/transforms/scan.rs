//! Lexical scanning shared by the default transforms.
//!
//! Splits source into code, quoted strings and comments so later passes can
//! rewrite code without touching string contents.

use std::path::Path;

use super::TransformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Script,
    Stylesheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    Quoted,
    /// Script regular expression literal, flags included
    Regex,
    LineComment,
    BlockComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub text: &'a str,
    pub line: usize,
}

impl Segment<'_> {
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, SegmentKind::LineComment | SegmentKind::BlockComment)
    }
}

/// Keywords after which a `/` starts a regular expression
const REGEX_KEYWORDS: [&str; 14] = [
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

/// Tokenize into segments. Unterminated strings, comments and regular
/// expressions are syntax errors.
///
/// In stylesheets `//` only opens a comment outside parentheses, so
/// `url(//cdn/x.png)` survives. In scripts a `/` that cannot be division
/// opens a regular expression literal.
pub fn tokenize<'a>(
    source: &'a str,
    file: Option<&Path>,
    dialect: Dialect,
) -> Result<Vec<Segment<'a>>, TransformError> {
    let bytes = source.as_bytes();
    let len = bytes.len();
    let mut segments = Vec::new();
    let mut i = 0;
    let mut start = 0;
    let mut start_line = 1;
    let mut line = 1;
    let mut parens = 0usize;
    // Whether the last code token ends an operand, so a `/` after it divides
    let mut operand = false;
    let mut last_code = 0usize;

    let flush = move |segments: &mut Vec<Segment<'a>>, from: usize, to: usize, at: usize| {
        if to > from {
            segments.push(Segment { kind: SegmentKind::Code, text: &source[from..to], line: at });
        }
    };

    while i < len {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match b {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'"' | b'\'' | b'`' if b != b'`' || dialect == Dialect::Script => {
                flush(&mut segments, start, i, start_line);
                let open_line = line;
                let mut j = i + 1;
                loop {
                    if j >= len {
                        return Err(TransformError::syntax(file, open_line, "unterminated string"));
                    }
                    match bytes[j] {
                        b'\\' => {
                            if bytes.get(j + 1) == Some(&b'\n') {
                                line += 1;
                            }
                            j += 2;
                        }
                        b'\n' if b != b'`' => {
                            return Err(TransformError::syntax(file, open_line, "unterminated string"));
                        }
                        b'\n' => {
                            line += 1;
                            j += 1;
                        }
                        c if c == b => {
                            j += 1;
                            break;
                        }
                        _ => j += 1,
                    }
                }
                segments.push(Segment { kind: SegmentKind::Quoted, text: &source[i..j], line: open_line });
                i = j;
                start = j;
                start_line = line;
                operand = true;
            }
            b'/' if next == Some(b'*') => {
                flush(&mut segments, start, i, start_line);
                let open_line = line;
                let end = match source[i + 2..].find("*/") {
                    Some(offset) => i + 2 + offset + 2,
                    None => return Err(TransformError::syntax(file, open_line, "unterminated comment")),
                };
                let text = &source[i..end];
                line += text.matches('\n').count();
                segments.push(Segment { kind: SegmentKind::BlockComment, text, line: open_line });
                i = end;
                start = end;
                start_line = line;
            }
            b'/' if next == Some(b'/') && (dialect == Dialect::Script || parens == 0) => {
                flush(&mut segments, start, i, start_line);
                let end = source[i..].find('\n').map_or(len, |offset| i + offset);
                segments.push(Segment { kind: SegmentKind::LineComment, text: &source[i..end], line });
                i = end;
                start = end;
                start_line = line;
            }
            b'/' if dialect == Dialect::Script && !divides(source, operand, last_code) => {
                flush(&mut segments, start, i, start_line);
                let end = regex_end(bytes, i)
                    .ok_or_else(|| TransformError::syntax(file, line, "unterminated regular expression"))?;
                segments.push(Segment { kind: SegmentKind::Regex, text: &source[i..end], line });
                i = end;
                start = end;
                start_line = line;
                operand = true;
            }
            b'(' => {
                parens += 1;
                operand = false;
                last_code = i;
                i += 1;
            }
            b')' => {
                parens = parens.saturating_sub(1);
                operand = true;
                last_code = i;
                i += 1;
            }
            b if b.is_ascii_whitespace() => i += 1,
            b => {
                operand = is_ident(b) || b == b']';
                last_code = i;
                i += 1;
            }
        }
    }
    flush(&mut segments, start, len, start_line);
    Ok(segments)
}

fn is_ident(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// A `/` divides after an operand that is not a keyword.
fn divides(source: &str, operand: bool, last_code: usize) -> bool {
    if !operand {
        return false;
    }
    let bytes = source.as_bytes();
    if !is_ident(bytes[last_code]) {
        return true;
    }
    let mut from = last_code;
    while from > 0 && is_ident(bytes[from - 1]) {
        from -= 1;
    }
    match source.get(from..last_code + 1) {
        Some(word) => !REGEX_KEYWORDS.contains(&word),
        None => true,
    }
}

/// End offset of the regular expression opening at `open`, flags included
fn regex_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut j = open + 1;
    let mut class = false;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if bytes.get(j + 1) == Some(&b'\n') => return None,
            b'\\' => j += 2,
            b'\n' => return None,
            b'[' => {
                class = true;
                j += 1;
            }
            b']' => {
                class = false;
                j += 1;
            }
            b'/' if !class => {
                j += 1;
                while j < bytes.len() && bytes[j].is_ascii_alphabetic() {
                    j += 1;
                }
                return Some(j);
            }
            _ => j += 1,
        }
    }
    None
}

/// Brackets must pair up outside strings and comments.
pub fn check_balanced(
    source: &str,
    file: Option<&Path>,
    dialect: Dialect,
) -> Result<(), TransformError> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for segment in tokenize(source, file, dialect)? {
        if segment.kind != SegmentKind::Code {
            continue;
        }
        let mut line = segment.line;
        for c in segment.text.chars() {
            match c {
                '\n' => line += 1,
                '(' | '[' | '{' => stack.push((c, line)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => return Err(TransformError::syntax(file, line, format!("unexpected '{}'", c))),
                    }
                }
                _ => {}
            }
        }
    }
    match stack.pop() {
        Some((open, line)) => Err(TransformError::syntax(file, line, format!("unclosed '{}'", open))),
        None => Ok(()),
    }
}
