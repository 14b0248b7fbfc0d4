//! backquote escape expansion inside ordinary strings
//!
//! A single left-to-right scan with an explicit cursor. Escapes carry a
//! fixed two-backquote envelope (`` `X` ``) except the four wide escapes
//! whose tag runs to the next backquote (`` `!tag` ``, `` `*tag` ``,
//! `` `=tag` ``, `` `+tag` ``) and the elision escape `` `~` ``, the only
//! one that may be left unterminated (it then runs to end of input).
//!
//! | code | expands to |
//! |---|---|
//! | `` ` `` | one literal backquote |
//! | `~` | nothing; elides its span |
//! | `I` | declaration id |
//! | `F` | declaration family |
//! | `T` | tenant name of the source location |
//! | `A` | application name of the source location |
//! | `Y` | `template` of the source application |
//! | `M` | nearest named member (last non-numeric source token) |
//! | `N` | full member path, tokens `/`-joined |
//! | `O` | name of the nearest classed ancestor |
//! | `P` | pointer to that ancestor's container |
//! | `Q` | pointer to that ancestor itself |
//! | `C` | class of that ancestor (`ADC` at the root) |
//! | `!tag` | nothing; records an alert |
//! | `*tag` | canonical path of the resolved tag |
//! | `=tag` | fetched value of the resolved tag |
//! | `+tag` | fetched value, base64-decoded |
use crate::declaration::ADC_CLASS;
use crate::fetch::{self, FetchError, FetchMode};
use crate::path::{self, classed_ancestor, ResolveError, SourcePath};
use serde_json::Value;

/// Result of one expansion: the rewritten text plus any `` `!tag` ``
/// alerts encountered along the way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expanded {
    pub text: String,
    pub alerts: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ExpandError {
    #[error("unrecognized escape `{code}` at offset {offset} in string at {src}")]
    UnrecognizedEscape {
        code: char,
        offset: usize,
        src: String,
    },
    #[error("escape at offset {offset} in string at {src} is missing its closing backquote")]
    MissingClosingBackquote { offset: usize, src: String },
    #[error("escape at offset {offset} in string at {src} is missing its pointer tag")]
    MissingPointerTag { offset: usize, src: String },
    #[error("pointer {tag:?} at offset {offset} in string at {src} points nowhere")]
    PointsNowhere {
        tag: String,
        offset: usize,
        src: String,
    },
    #[error("escape at offset {offset}: {source}")]
    Pointer {
        offset: usize,
        #[source]
        source: ResolveError,
    },
    #[error("escape at offset {offset}: {source}")]
    Fetch {
        offset: usize,
        #[source]
        source: FetchError,
    },
}

/// Expand every backquote escape in `input`.
///
/// Either the whole string expands or the first bad escape fails it; the
/// caller writes the result back into the destination slot.
pub fn expand(input: &str, src: &SourcePath, root: &Value) -> Result<Expanded, ExpandError> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut alerts = Vec::new();
    let mut cursor = 0;

    while cursor < chars.len() {
        if chars[cursor] != '`' {
            out.push(chars[cursor]);
            cursor += 1;
            continue;
        }

        let open = cursor;
        let Some(&code) = chars.get(open + 1) else {
            return Err(ExpandError::MissingClosingBackquote {
                offset: open,
                src: src.pointer(),
            });
        };

        match code {
            '`' => {
                out.push('`');
                cursor = open + 2;
            }
            '~' => {
                // elide through the closing backquote, or to end of input
                cursor = match chars[open + 2..].iter().position(|&c| c == '`') {
                    Some(close) => open + 2 + close + 1,
                    None => chars.len(),
                };
            }
            'I' | 'F' | 'T' | 'A' | 'Y' | 'M' | 'N' | 'O' | 'P' | 'Q' | 'C' => {
                if chars.get(open + 2) != Some(&'`') {
                    return Err(ExpandError::MissingClosingBackquote {
                        offset: open,
                        src: src.pointer(),
                    });
                }
                out.push_str(&structural(code, src, root));
                cursor = open + 3;
            }
            '!' | '*' | '=' | '+' => {
                let Some(close) = chars[open + 2..].iter().position(|&c| c == '`') else {
                    return Err(ExpandError::MissingClosingBackquote {
                        offset: open,
                        src: src.pointer(),
                    });
                };
                let tag: String = chars[open + 2..open + 2 + close].iter().collect();

                match code {
                    '!' => {
                        tracing::warn!(tag=%tag, src=%src.pointer(), "declaration alert");
                        alerts.push(tag);
                    }
                    '*' => {
                        let text = pointer_text(&tag, open, src, root)?;
                        out.push_str(&text);
                    }
                    '=' => {
                        let text = value_text(&tag, open, src, root, FetchMode::String)?;
                        out.push_str(&text);
                    }
                    _ => {
                        let text = value_text(&tag, open, src, root, FetchMode::Decode)?;
                        out.push_str(&text);
                    }
                }
                cursor = open + 2 + close + 1;
            }
            other => {
                return Err(ExpandError::UnrecognizedEscape {
                    code: other,
                    offset: open,
                    src: src.pointer(),
                });
            }
        }
    }

    Ok(Expanded { text: out, alerts })
}

/// The single-character structural codes, computed from declaration
/// metadata and the source location alone.
fn structural(code: char, src: &SourcePath, root: &Value) -> String {
    match code {
        'I' => root_text(root, "id"),
        'F' => root_text(root, "family"),
        'T' => src.tenant().unwrap_or_default().to_string(),
        'A' => src.application().unwrap_or_default().to_string(),
        'Y' => application_template(src, root),
        'M' => src
            .tokens()
            .iter()
            .rev()
            .find(|token| !token.chars().all(|c| c.is_ascii_digit()))
            .cloned()
            .unwrap_or_default(),
        'N' => src.tokens().join("/"),
        'O' => classed_ancestor(src, root).tokens.last().cloned().unwrap_or_default(),
        'P' => {
            let found = classed_ancestor(src, root);
            match found.tokens.len() {
                0 | 1 => String::new(),
                len => format!("/{}", found.tokens[..len - 1].join("/")),
            }
        }
        'Q' => {
            let found = classed_ancestor(src, root);
            if found.tokens.is_empty() {
                String::new()
            } else {
                format!("/{}", found.tokens.join("/"))
            }
        }
        'C' => classed_ancestor(src, root)
            .class
            .unwrap_or_else(|| ADC_CLASS.to_string()),
        _ => unreachable!("caller dispatches only structural codes"),
    }
}

fn root_text(root: &Value, key: &str) -> String {
    match root.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn application_template(src: &SourcePath, root: &Value) -> String {
    let (Some(tenant), Some(application)) = (src.tenant(), src.application()) else {
        return String::new();
    };

    root.get(tenant)
        .and_then(|node| node.get(application))
        .and_then(|node| node.get("template"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn pointer_text(
    tag: &str,
    offset: usize,
    src: &SourcePath,
    root: &Value,
) -> Result<String, ExpandError> {
    if tag.is_empty() {
        return Err(ExpandError::MissingPointerTag {
            offset,
            src: src.pointer(),
        });
    }

    let (resolved, _) =
        path::resolve(tag, src, root).map_err(|source| ExpandError::Pointer { offset, source })?;

    let text = resolved.canonical();
    if text == "/" {
        return Err(ExpandError::PointsNowhere {
            tag: tag.to_string(),
            offset,
            src: src.pointer(),
        });
    }
    Ok(text)
}

fn value_text(
    tag: &str,
    offset: usize,
    src: &SourcePath,
    root: &Value,
    mode: FetchMode,
) -> Result<String, ExpandError> {
    if tag.is_empty() {
        return Err(ExpandError::MissingPointerTag {
            offset,
            src: src.pointer(),
        });
    }

    let (resolved, node) =
        path::resolve(tag, src, root).map_err(|source| ExpandError::Pointer { offset, source })?;
    let value = fetch::fetch(&resolved, node, mode)
        .map_err(|source| ExpandError::Fetch { offset, source })?;

    let text = match value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if text.is_empty() {
        return Err(ExpandError::PointsNowhere {
            tag: tag.to_string(),
            offset,
            src: src.pointer(),
        });
    }
    Ok(text)
}
