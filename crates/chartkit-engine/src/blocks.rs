//! Named template blocks
//!
//! `{% define "name" %}...{% enddefine %}` declares a template that other
//! templates reach through `include`. The evaluator has no such tag, so
//! blocks are cut out of the source before it is compiled: each body becomes
//! a template of its own and the remaining text is compiled under the
//! file's path.
//!
//! Line numbers survive the split. Removed text is replaced by a comment
//! holding the same number of newlines, and each body is prefixed by a
//! comment that moves it down to the line it started on.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\{%(-?)\s*(?:define\s+"([^"]*)"|enddefine)\s*(-?)%\}"#).expect("valid regex")
});

/// A named template cut out of a source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBlock {
    pub name: String,
    /// Body, padded so its lines match the source file
    pub body: String,
    /// Line of the opening tag
    pub line: usize,
}

/// A source file with its named blocks removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitTemplate {
    pub body: String,
    pub blocks: Vec<NamedBlock>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BlockError {
    pub line: usize,
    pub message: String,
}

struct OpenBlock<'a> {
    name: &'a str,
    line: usize,
    region_start: usize,
    body_start: usize,
}

/// Separate named blocks from the rest of a template source
pub fn split_blocks(source: &str) -> Result<SplitTemplate, BlockError> {
    let mut body = String::with_capacity(source.len());
    let mut blocks = Vec::new();
    let mut cursor = 0;
    let mut open: Option<OpenBlock<'_>> = None;

    for caps in BLOCK_TAG.captures_iter(source) {
        let Some(tag) = caps.get(0) else { continue };
        let trim_before = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let trim_after = caps.get(3).is_some_and(|m| !m.as_str().is_empty());
        let line = line_at(source, tag.start());

        match (caps.get(2), open.take()) {
            (Some(name), None) => {
                if name.as_str().is_empty() {
                    return Err(BlockError {
                        line,
                        message: "define requires a non-empty name".to_string(),
                    });
                }
                let region_start = if trim_before {
                    trim_back(source, cursor, tag.start())
                } else {
                    tag.start()
                };
                body.push_str(&source[cursor..region_start]);
                open = Some(OpenBlock {
                    name: name.as_str(),
                    line,
                    region_start,
                    body_start: if trim_after {
                        skip_whitespace(source, tag.end())
                    } else {
                        tag.end()
                    },
                });
            }
            (Some(_), Some(outer)) => {
                return Err(BlockError {
                    line,
                    message: format!("unexpected define inside define {:?}", outer.name),
                });
            }
            (None, None) => {
                return Err(BlockError {
                    line,
                    message: "unexpected enddefine".to_string(),
                });
            }
            (None, Some(block)) => {
                let body_end = if trim_before {
                    trim_back(source, block.body_start, tag.start())
                } else {
                    tag.start()
                };
                let block_body = &source[block.body_start..body_end];
                blocks.push(NamedBlock {
                    name: block.name.to_string(),
                    body: format!(
                        "{}{}",
                        newline_comment(line_at(source, block.body_start) - 1),
                        block_body
                    ),
                    line: block.line,
                });

                let region_end = if trim_after {
                    skip_whitespace(source, tag.end())
                } else {
                    tag.end()
                };
                let removed = &source[block.region_start..region_end];
                body.push_str(&newline_comment(removed.matches('\n').count()));
                cursor = region_end;
            }
        }
    }

    if let Some(block) = open {
        return Err(BlockError {
            line: block.line,
            message: format!("unexpected EOF in define {:?}", block.name),
        });
    }

    body.push_str(&source[cursor..]);
    Ok(SplitTemplate { body, blocks })
}

fn line_at(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

/// Offset where the whitespace run ending at `end` starts, not before `floor`
fn trim_back(source: &str, floor: usize, end: usize) -> usize {
    floor + source[floor..end].trim_end().len()
}

fn skip_whitespace(source: &str, start: usize) -> usize {
    source.len() - source[start..].trim_start().len()
}

/// A comment rendering nothing but spanning `newlines` line breaks
fn newline_comment(newlines: usize) -> String {
    if newlines == 0 {
        String::new()
    } else {
        format!("{{#{}#}}", "\n".repeat(newlines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_blocks() {
        let split = split_blocks("kind: Service\n{{ Values.name }}\n").unwrap();
        assert_eq!(split.body, "kind: Service\n{{ Values.name }}\n");
        assert!(split.blocks.is_empty());
    }

    #[test]
    fn test_split_keeps_lines() {
        let source = "a\n{% define \"x\" %}\nline3\n{% enddefine %}\nb";
        let split = split_blocks(source).unwrap();

        assert_eq!(split.blocks.len(), 1);
        let block = &split.blocks[0];
        assert_eq!(block.name, "x");
        assert_eq!(block.line, 2);
        assert_eq!(block.body, "{#\n#}\nline3\n");
        assert_eq!(split.body, "a\n{#\n\n#}\nb");
    }

    #[test]
    fn test_trim_markers() {
        let source = "top\n{%- define \"labels\" -%}\n  app: web\n{%- enddefine -%}\nnext";
        let split = split_blocks(source).unwrap();

        assert_eq!(split.blocks[0].body, "{#\n\n#}app: web");
        assert_eq!(split.body, "top{#\n\n\n\n#}next");
    }

    #[test]
    fn test_multiple_blocks() {
        let source = r#"{% define "a" %}A{% enddefine %}{% define "b" %}B{% enddefine %}"#;
        let split = split_blocks(source).unwrap();
        let names: Vec<_> = split.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(split.blocks[1].body, "B");
        assert_eq!(split.body, "");
    }

    #[test]
    fn test_nested_define_rejected() {
        let err = split_blocks("{% define \"a\" %}\n{% define \"b\" %}{% enddefine %}{% enddefine %}")
            .unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("inside define"));
    }

    #[test]
    fn test_stray_enddefine_rejected() {
        let err = split_blocks("a\nb\n{% enddefine %}").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.message, "unexpected enddefine");
    }

    #[test]
    fn test_unclosed_define_rejected() {
        let err = split_blocks("\n{% define \"a\" %}body").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("unexpected EOF"));
    }
}
