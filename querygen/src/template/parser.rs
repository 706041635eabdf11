use super::predicate::{parse_predicate, Predicate};
use super::{Branch, ClauseKind, Fragment, TemplateAst};
use crate::error::TemplateError;

/// Open block while scanning
enum Frame {
    Root,
    Conditional {
        offset: usize,
        done: Vec<Branch>,
        /// Predicate of the branch being filled; `None` inside `{{else}}`
        current: Option<Predicate>,
    },
    Clause {
        offset: usize,
        kind: ClauseKind,
    },
}

struct Scope {
    frame: Frame,
    fragments: Vec<Fragment>,
    literal: String,
}

impl Scope {
    fn new(frame: Frame) -> Self {
        Self {
            frame,
            fragments: Vec::new(),
            literal: String::new(),
        }
    }

    fn flush(&mut self) {
        if !self.literal.is_empty() {
            self.fragments
                .push(Fragment::Literal(std::mem::take(&mut self.literal)));
        }
    }

    fn push(&mut self, fragment: Fragment) {
        self.flush();
        self.fragments.push(fragment);
    }

    fn take_body(&mut self) -> Vec<Fragment> {
        self.flush();
        std::mem::take(&mut self.fragments)
    }
}

/// Parse `raw` in one left-to-right pass.
///
/// `@name` must be one of `declared`; `@@path` is kept for binding. Quoted
/// SQL strings are copied verbatim, so `'@home'` is not a placeholder.
/// Errors carry the byte offset of the offending marker.
pub fn parse_template(raw: &str, declared: &[String]) -> Result<TemplateAst, TemplateError> {
    let mut stack = vec![Scope::new(Frame::Root)];
    let mut i = 0;

    while i < raw.len() {
        let rest = &raw[i..];
        let Some(c) = rest.chars().next() else {
            break;
        };
        let top = stack.last_mut().ok_or_else(|| internal(i))?;

        match c {
            '\'' | '"' | '`' => {
                let end = quoted_end(raw, i).ok_or_else(|| TemplateError::Malformed {
                    offset: i,
                    message: "unterminated quoted string".to_string(),
                })?;
                top.literal.push_str(&raw[i..end]);
                i = end;
            }
            '@' if rest.starts_with("@@") => {
                let (path, len) = read_path(&raw[i + 2..]);
                if path.is_empty() {
                    return Err(TemplateError::Malformed {
                        offset: i,
                        message: "expected a field name after '@@'".to_string(),
                    });
                }
                if path.len() == 1 && path[0] == "table" {
                    top.push(Fragment::Table { offset: i });
                } else {
                    top.push(Fragment::Field { path, offset: i });
                }
                i += 2 + len;
            }
            '@' => {
                let (mut path, len) = read_path(&raw[i + 1..]);
                if path.is_empty() {
                    // not a marker, e.g. a lone '@'
                    top.literal.push('@');
                    i += 1;
                    continue;
                }
                let name = path.remove(0);
                if !declared.iter().any(|param| *param == name) {
                    return Err(TemplateError::UnknownParameter { name, offset: i });
                }
                top.push(Fragment::Param {
                    name,
                    path,
                    offset: i,
                });
                i += 1 + len;
            }
            '{' if rest.starts_with("{{") => {
                let close = rest.find("}}").ok_or_else(|| TemplateError::Malformed {
                    offset: i,
                    message: "unclosed '{{' marker".to_string(),
                })?;
                let marker = rest[2..close].trim();
                handle_marker(&mut stack, marker, i, declared)?;
                i += close + 2;
            }
            _ => {
                top.literal.push(c);
                i += c.len_utf8();
            }
        }
    }

    if stack.len() > 1 {
        let offset = match stack.last().map(|scope| &scope.frame) {
            Some(Frame::Conditional { offset, .. }) | Some(Frame::Clause { offset, .. }) => *offset,
            _ => raw.len(),
        };
        return Err(TemplateError::Malformed {
            offset,
            message: "block is never closed with '{{end}}'".to_string(),
        });
    }

    let mut root = stack.pop().ok_or_else(|| internal(raw.len()))?;
    Ok(TemplateAst {
        fragments: root.take_body(),
    })
}

fn internal(offset: usize) -> TemplateError {
    TemplateError::Malformed {
        offset,
        message: "unbalanced block stack".to_string(),
    }
}

fn handle_marker(stack: &mut Vec<Scope>, marker: &str, offset: usize, declared: &[String]) -> Result<(), TemplateError> {
    let keyword = marker.split_whitespace().next().unwrap_or("");
    match keyword {
        "if" => {
            let predicate = parse_predicate(&marker[2..], offset, declared)?;
            stack.push(Scope::new(Frame::Conditional {
                offset,
                done: Vec::new(),
                current: Some(predicate),
            }));
        }
        "else" => {
            let condition = marker[4..].trim();
            let next = match condition.strip_prefix("if") {
                Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                    Some(parse_predicate(rest, offset, declared)?)
                }
                _ if condition.is_empty() => None,
                _ => {
                    return Err(TemplateError::Malformed {
                        offset,
                        message: format!("unknown marker '{{{{{}}}}}'", marker),
                    })
                }
            };
            let scope = stack.last_mut().ok_or_else(|| internal(offset))?;
            let body = scope.take_body();
            match &mut scope.frame {
                Frame::Conditional { done, current, .. } => {
                    let Some(predicate) = current.take() else {
                        return Err(TemplateError::Malformed {
                            offset,
                            message: "'{{else}}' after '{{else}}'".to_string(),
                        });
                    };
                    done.push(Branch { predicate, body });
                    *current = next;
                }
                _ => {
                    return Err(TemplateError::Malformed {
                        offset,
                        message: "'{{else}}' outside of an '{{if}}' block".to_string(),
                    })
                }
            }
        }
        "where" | "set" if marker.len() == keyword.len() => {
            let kind = if keyword == "where" {
                ClauseKind::Where
            } else {
                ClauseKind::Set
            };
            stack.push(Scope::new(Frame::Clause { offset, kind }));
        }
        "end" if marker.len() == keyword.len() => {
            if stack.len() < 2 {
                return Err(TemplateError::Malformed {
                    offset,
                    message: "'{{end}}' without an open block".to_string(),
                });
            }
            let mut scope = stack.pop().ok_or_else(|| internal(offset))?;
            let body = scope.take_body();
            let fragment = match scope.frame {
                Frame::Conditional {
                    mut done, current, ..
                } => match current {
                    Some(predicate) => {
                        done.push(Branch { predicate, body });
                        Fragment::Conditional {
                            branches: done,
                            otherwise: None,
                        }
                    }
                    None => Fragment::Conditional {
                        branches: done,
                        otherwise: Some(body),
                    },
                },
                Frame::Clause { kind, .. } => Fragment::Clause { kind, body },
                Frame::Root => return Err(internal(offset)),
            };
            stack.last_mut().ok_or_else(|| internal(offset))?.push(fragment);
        }
        _ => {
            return Err(TemplateError::Malformed {
                offset,
                message: format!("unknown marker '{{{{{}}}}}'", marker),
            })
        }
    }
    Ok(())
}

/// Byte offset just past the closing quote of the string starting at `start`
fn quoted_end(raw: &str, start: usize) -> Option<usize> {
    let quote = raw[start..].chars().next()?;
    let mut chars = raw[start + 1..].char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if c == quote {
            // SQL doubles the quote to escape it
            if chars.peek().map(|(_, next)| *next) == Some(quote) {
                chars.next();
                continue;
            }
            return Some(start + 1 + index + c.len_utf8());
        }
    }
    None
}

/// Read `name(.name)*`; returns the segments and the consumed byte length
fn read_path(rest: &str) -> (Vec<String>, usize) {
    let mut segments = Vec::new();
    let mut consumed = 0;
    loop {
        let segment: String = rest[consumed..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if segment.is_empty() || segment.starts_with(|c: char| c.is_ascii_digit()) {
            break;
        }
        consumed += segment.len();
        segments.push(segment);
        // continue only when a dot is followed by another name
        let after = &rest[consumed..];
        if after.starts_with('.') && after[1..].starts_with(|c: char| c.is_alphabetic() || c == '_') {
            consumed += 1;
        } else {
            break;
        }
    }
    (segments, consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{CompareOp, Operand};

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_literals_and_placeholders() {
        let ast = parse_template("SELECT * FROM @@table WHERE @@name = @name", &params(&["name"])).unwrap();
        assert_eq!(
            ast.fragments,
            vec![
                Fragment::Literal("SELECT * FROM ".to_string()),
                Fragment::Table { offset: 14 },
                Fragment::Literal(" WHERE ".to_string()),
                Fragment::Field {
                    path: vec!["name".to_string()],
                    offset: 28,
                },
                Fragment::Literal(" = ".to_string()),
                Fragment::Param {
                    name: "name".to_string(),
                    path: Vec::new(),
                    offset: 37,
                },
            ]
        );
    }

    #[test]
    fn test_quoted_strings_are_literal() {
        let ast = parse_template("SELECT '@x', 'it''s' FROM t", &[]).unwrap();
        assert_eq!(
            ast.fragments,
            vec![Fragment::Literal("SELECT '@x', 'it''s' FROM t".to_string())]
        );
    }

    #[test]
    fn test_param_field_path_and_trailing_dot() {
        let ast = parse_template("@user.name.", &params(&["user"])).unwrap();
        assert_eq!(
            ast.fragments,
            vec![
                Fragment::Param {
                    name: "user".to_string(),
                    path: vec!["name".to_string()],
                    offset: 0,
                },
                Fragment::Literal(".".to_string()),
            ]
        );
    }

    #[test]
    fn test_conditional_branches() {
        let raw = "{{if age > 18}}a{{else if name}}b{{else}}c{{end}}";
        let ast = parse_template(raw, &params(&["age", "name"])).unwrap();
        let [Fragment::Conditional { branches, otherwise }] = ast.fragments.as_slice() else {
            panic!("expected one conditional, got {:?}", ast.fragments);
        };
        assert_eq!(branches.len(), 2);
        assert!(matches!(branches[0].predicate, Predicate::Compare { op: CompareOp::Gt, .. }));
        assert_eq!(
            branches[1].predicate,
            Predicate::Present(Operand::Param {
                name: "name".to_string(),
                path: Vec::new(),
            })
        );
        assert_eq!(otherwise.as_deref(), Some(&[Fragment::Literal("c".to_string())][..]));
    }

    #[test]
    fn test_where_and_set_blocks() {
        let raw = "UPDATE @@table {{set}}{{if name}}@@name=@name,{{end}}{{end}} {{where}}@@id=@id{{end}}";
        let ast = parse_template(raw, &params(&["name", "id"])).unwrap();
        assert!(matches!(ast.fragments[3], Fragment::Clause { kind: ClauseKind::Set, .. }));
        assert!(matches!(ast.fragments[5], Fragment::Clause { kind: ClauseKind::Where, .. }));
        assert_eq!(ast.field_paths().len(), 2);
    }

    #[test]
    fn test_unmatched_markers_report_offset() {
        assert_eq!(
            parse_template("SELECT 1 {{end}}", &[]).unwrap_err(),
            TemplateError::Malformed {
                offset: 9,
                message: "'{{end}}' without an open block".to_string(),
            }
        );
        assert!(matches!(
            parse_template("a {{if x}} b", &params(&["x"])),
            Err(TemplateError::Malformed { offset: 2, .. })
        ));
        assert!(matches!(
            parse_template("{{else}}", &[]),
            Err(TemplateError::Malformed { offset: 0, .. })
        ));
        assert!(matches!(
            parse_template("{{if x}}a{{else}}b{{else}}c{{end}}", &params(&["x"])),
            Err(TemplateError::Malformed { offset: 18, .. })
        ));
        assert!(matches!(
            parse_template("x {{ if y", &params(&["y"])),
            Err(TemplateError::Malformed { offset: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_parameter() {
        assert_eq!(
            parse_template("SELECT @nope", &params(&["name"])).unwrap_err(),
            TemplateError::UnknownParameter {
                name: "nope".to_string(),
                offset: 7,
            }
        );
    }
}
