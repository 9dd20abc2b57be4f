//! Hook file parser
//!
//! A hook file holds up to two named blocks:
//!
//! ```text
//! # comment
//! pre {
//!   {% if var != "xyz" %}ABORT{% endif %}
//! }
//!
//! post {
//!   {{ chmod("644", target) }}
//! }
//! ```
//!
//! Block bodies are matched by brace depth, so template delimiters inside a body
//! need no escaping as long as they are balanced.

use settle_core::{Error, Result};
use std::path::Path;

/// Raw blocks of one hook file
#[derive(Debug, Default, PartialEq, Eq)]
pub struct HookBlocks {
    pub pre: Option<String>,
    pub post: Option<String>,
}

struct Cursor<'a> {
    path: &'a Path,
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn line(&self, pos: usize) -> usize {
        self.text[..pos].matches('\n').count() + 1
    }

    fn error(&self, pos: usize, message: impl std::fmt::Display) -> Error {
        Error::hook_parse(self.path, format!("line {}: {message}", self.line(pos)))
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Skip whitespace and `#` comment lines
    fn skip_trivia(&mut self) {
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.text.len() - trimmed.len();
            if trimmed.starts_with('#') {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                break;
            }
        }
    }

    fn identifier(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    /// Body of a block whose opening brace is at the cursor
    fn block_body(&mut self) -> Result<&'a str> {
        let open = self.pos;
        let mut depth = 0usize;
        for (offset, c) in self.rest().char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = &self.text[open + 1..self.pos + offset];
                        self.pos += offset + 1;
                        return Ok(body);
                    }
                }
                _ => {}
            }
        }
        Err(self.error(open, "unbalanced braces, block is never closed"))
    }
}

/// Split hook file content into its pre and post blocks
///
/// # Errors
///
/// Returns `Error::HookParse` for unknown or duplicate block names, unbalanced
/// braces and any text outside a block that is not a comment.
pub fn parse(path: &Path, content: &str) -> Result<HookBlocks> {
    let mut cursor = Cursor {
        path,
        text: content,
        pos: 0,
    };
    let mut blocks = HookBlocks::default();

    loop {
        cursor.skip_trivia();
        if cursor.rest().is_empty() {
            break;
        }

        let start = cursor.pos;
        let name = cursor.identifier();
        if name.is_empty() {
            return Err(cursor.error(start, "expected 'pre {' or 'post {'"));
        }

        cursor.skip_trivia();
        if !cursor.rest().starts_with('{') {
            return Err(cursor.error(cursor.pos, format!("expected '{{' after '{name}'")));
        }
        let body = cursor.block_body()?.trim().to_string();

        let slot = match name {
            "pre" => &mut blocks.pre,
            "post" => &mut blocks.post,
            other => {
                return Err(cursor.error(start, format!("unknown block '{other}'")));
            }
        };
        if slot.is_some() {
            return Err(cursor.error(start, format!("duplicate '{name}' block")));
        }
        *slot = Some(body);
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn parse_str(content: &str) -> Result<HookBlocks> {
        parse(Path::new("Module.hook"), content)
    }

    #[test]
    fn test_both_blocks_any_order() {
        let blocks = parse_str(
            "# marker hook\npost {\n  {{ touch(target_dir ~ '/x') }}\n}\n\npre {\n  CONTINUE\n}\n",
        )
        .unwrap();
        assert_eq!(blocks.pre.as_deref(), Some("CONTINUE"));
        assert_eq!(blocks.post.as_deref(), Some("{{ touch(target_dir ~ '/x') }}"));
    }

    #[test]
    fn test_nested_template_braces() {
        let blocks =
            parse_str("pre {\n{% if var != \"xyz\" %}ABORT{% endif %}\n}").unwrap();
        assert_eq!(
            blocks.pre.as_deref(),
            Some("{% if var != \"xyz\" %}ABORT{% endif %}")
        );
        assert!(blocks.post.is_none());
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(parse_str("").unwrap(), HookBlocks::default());
        assert_eq!(parse_str("# nothing\n\n").unwrap(), HookBlocks::default());
    }

    #[test]
    fn test_unbalanced() {
        let err = parse_str("pre {\n {{ x }\n").unwrap_err();
        assert!(matches!(err, Error::HookParse { .. }));
        assert!(err.to_string().contains("unbalanced"));
    }

    #[test]
    fn test_unknown_and_duplicate_blocks() {
        assert!(parse_str("during { }").unwrap_err().to_string().contains("unknown block"));
        assert!(
            parse_str("pre { }\npre { }")
                .unwrap_err()
                .to_string()
                .contains("duplicate")
        );
    }

    #[test]
    fn test_stray_text_reports_line() {
        let err = parse_str("pre { }\n\n!!").unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_missing_brace() {
        assert!(parse_str("pre CONTINUE").is_err());
    }
}
