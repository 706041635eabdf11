//! Error types for the generation pipeline.
//! Each layer has its own enum so callers can tell how far a failure reaches:
//! a schema error loses one model, a relation error loses one relation field and
//! a template error loses one method.

use std::fmt;

/// Failures while normalizing table or struct metadata into a model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unsupported storage type '{storage_type}' for column '{column}'.\n\nSupported families: integer, float, string, boolean, time, blob, JSON and uuid.\nUse the FieldType model option to map the column to an explicit Rust type:\n    ModelOption::FieldType {{ column: \"{column}\".into(), ty: \"String\".into() }}")]
    UnsupportedType {
        column: String,
        storage_type: String,
    },

    #[error("Multiple primary key fields found in table '{table}': {fields}.\n\nPlease mark exactly one field as primary key.")]
    AmbiguousPrimaryKey { table: String, fields: String },

    #[error("Duplicate field '{field}' in model '{model}'. Field names must be unique; use the FieldRename option to rename one of the columns.")]
    DuplicateField { model: String, field: String },

    #[error("Table '{table}' was not found in the supplied metadata.")]
    UnknownTable { table: String },

    #[error("Invalid identifier '{name}'. Model and field names must be valid Rust identifiers.")]
    InvalidIdentifier { name: String },

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to parse source for '{context}': {message}")]
    InvalidSource { context: String, message: String },
}

/// Failures while attaching one relation field to a model
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelationError {
    #[error("Field '{field}' already exists on model '{model}'. Pick another name for the relation field.")]
    DuplicateField { model: String, field: String },

    #[error("Column '{column}' referenced by relation '{relation}' does not exist on model '{model}'.\n\nCheck the foreignKey / references entries of the relation:\n    foreignKey names a column on the side that stores the key,\n    references names the column it points at.")]
    UnresolvedColumn {
        relation: String,
        model: String,
        column: String,
    },

    #[error("Many-to-many relation '{relation}' needs a join table.\n\nPlease add a join table to the relation config or a many2many tag:\n    gorm_tag: TagSet::parse(\"many2many:user_languages\")")]
    MissingJoinTable { relation: String },

    #[error("Relation '{relation}' declares {foreign_keys} foreign key column(s) but {references} reference column(s); both lists must have the same length.")]
    ArityMismatch {
        relation: String,
        foreign_keys: usize,
        references: usize,
    },

    #[error("Relation '{relation}' needs a primary key on model '{model}' to derive its default key columns. Please set foreignKey and references explicitly.")]
    NoPrimaryKey { relation: String, model: String },

    #[error("Relation field '{field}' has type '{ty}', which is not a declared model.")]
    UnknownTarget { field: String, ty: String },
}

/// Failures while parsing or binding a method contract and its template
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Malformed template at offset {offset}: {message}")]
    Malformed { offset: usize, message: String },

    #[error("Template placeholder '@{name}' at offset {offset} does not name a declared parameter.")]
    UnknownParameter { name: String, offset: usize },

    #[error("Method '{method}' references '{path}', but model '{model}' has no such field.")]
    UnboundFieldReference {
        method: String,
        model: String,
        path: String,
    },

    #[error("Invalid method contract '{method}': {message}")]
    InvalidContract { method: String, message: String },
}

/// Top-level error of the generation pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Relation(#[from] RelationError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("failed to write artifact '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal failure collected during a run.
///
/// Diagnostics never replace an error: the affected model, relation or
/// method is left out of the output and the diagnostic says why.
#[derive(Debug)]
pub struct Diagnostic {
    pub model: String,
    pub method: Option<String>,
    pub error: Error,
}

impl Diagnostic {
    pub fn model(model: impl Into<String>, error: impl Into<Error>) -> Self {
        Self {
            model: model.into(),
            method: None,
            error: error.into(),
        }
    }

    pub fn method(model: impl Into<String>, method: impl Into<String>, error: impl Into<Error>) -> Self {
        Self {
            model: model.into(),
            method: Some(method.into()),
            error: error.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{}::{}: {}", self.model, method, self.error),
            None => write!(f, "{}: {}", self.model, self.error),
        }
    }
}
