//! Default minifier: drops comments, indentation and blank lines.
//!
//! Line breaks between statements are kept so automatic semicolon insertion
//! still sees the same program.

use super::scan::{tokenize, Dialect, SegmentKind};
use super::{Minifier, TransformError};

pub struct LineMinifier;

impl Minifier for LineMinifier {
    fn minify(&self, source: &str) -> Result<String, TransformError> {
        let mut out = String::with_capacity(source.len());
        let mut at_line_start = true;

        for segment in tokenize(source, None, Dialect::Script)? {
            match segment.kind {
                SegmentKind::LineComment => {}
                SegmentKind::BlockComment if segment.text.starts_with("/*!") => {
                    out.push_str(segment.text);
                    at_line_start = false;
                }
                SegmentKind::BlockComment => {
                    if segment.text.contains('\n') {
                        push_code(&mut out, "\n", &mut at_line_start);
                    } else if !at_line_start {
                        out.push(' ');
                    }
                }
                SegmentKind::Quoted | SegmentKind::Regex => {
                    out.push_str(segment.text);
                    at_line_start = false;
                }
                SegmentKind::Code => push_code(&mut out, segment.text, &mut at_line_start),
            }
        }

        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
        out.push('\n');
        Ok(out)
    }
}

fn push_code(out: &mut String, text: &str, at_line_start: &mut bool) {
    for c in text.chars() {
        if c == '\n' {
            if !*at_line_start {
                let trimmed = out.trim_end_matches(|c: char| c == ' ' || c == '\t' || c == '\r').len();
                out.truncate(trimmed);
                out.push('\n');
                *at_line_start = true;
            }
        } else if *at_line_start && c.is_whitespace() {
            continue;
        } else {
            out.push(c);
            *at_line_start = false;
        }
    }
}
