//! Query template mini-language.
//!
//! Parsing is syntax only: `@param` markers are checked against the
//! declared parameter names, while `@@field` paths are kept unresolved until
//! the template is bound to a model by the synthesizer.
//!
//! ```text
//! SELECT * FROM @@table
//! {{where}}
//!   {{if name != ""}} @@name = @name {{end}}
//!   {{if ids}} AND @@id IN (@ids) {{end}}
//! {{end}}
//! ```

mod parser;
mod predicate;

pub use parser::parse_template;
pub use predicate::{CompareOp, Literal, Operand, Predicate};

/// Parsed, not yet bound template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateAst {
    pub fragments: Vec<Fragment>,
}

impl TemplateAst {
    /// Every `@@` field path, in source order, with its offset
    pub fn field_paths(&self) -> Vec<(&[String], usize)> {
        let mut paths = Vec::new();
        collect_fields(&self.fragments, &mut paths);
        paths
    }
}

fn collect_fields<'a>(fragments: &'a [Fragment], out: &mut Vec<(&'a [String], usize)>) {
    for fragment in fragments {
        match fragment {
            Fragment::Field { path, offset } => out.push((path.as_slice(), *offset)),
            Fragment::Conditional { branches, otherwise } => {
                for branch in branches {
                    collect_fields(&branch.body, out);
                }
                if let Some(body) = otherwise {
                    collect_fields(body, out);
                }
            }
            Fragment::Clause { body, .. } => collect_fields(body, out),
            Fragment::Literal(_) | Fragment::Param { .. } | Fragment::Table { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    /// SQL text copied as is
    Literal(String),
    /// `@name` or `@name.field`
    Param {
        name: String,
        path: Vec<String>,
        offset: usize,
    },
    /// `@@field` or `@@relation.field`
    Field { path: Vec<String>, offset: usize },
    /// `@@table`
    Table { offset: usize },
    /// `{{if}} .. {{else if}} .. {{else}} .. {{end}}`
    Conditional {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Fragment>>,
    },
    /// `{{where}} .. {{end}}` or `{{set}} .. {{end}}`
    Clause { kind: ClauseKind, body: Vec<Fragment> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub predicate: Predicate,
    pub body: Vec<Fragment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Where,
    Set,
}
