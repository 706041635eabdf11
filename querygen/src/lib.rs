//! Schema-driven generator for typed data-access code.
//!
//! The pipeline turns table metadata (or annotated Rust structs) into a
//! normalized [`Model`](model::Model), attaches relations, binds
//! user-declared method contracts against the model and renders one Rust
//! source artifact per model. Generated code talks to `sea_orm`.

pub mod accessor;
pub mod contract;
pub mod crud;
pub mod dialect;
pub mod emit;
pub mod error;
pub mod model;
pub mod naming;
pub mod pipeline;
pub mod relation;
pub mod schema;
pub mod synth;
pub mod tag;
pub mod template;
pub mod types;

pub use accessor::relation_units;
pub use contract::{parse_interfaces, Interface, MethodContract, Param};
pub use crud::builtin_units;
pub use dialect::Dialect;
pub use emit::{Artifact, UnitSet, HEADER, NAMESPACE_FILE};
pub use error::{Diagnostic, Error, RelationError, SchemaError, TemplateError};
pub use model::{ColumnRef, Field, GenerationOptions, Model, Relation, RelationKind};
pub use naming::ModelNames;
pub use pipeline::{collect_units, render_model, render_namespace, RenderedModel, Settings};
pub use relation::{attach_relation, JoinTable, RelateConfig};
pub use schema::{
    apply_relations, build_model, build_models_from_structs, parse_structs, BuildOptions, ColumnMeta,
    IndexMeta, ModelOption, StructFieldMeta, StructMeta, TableMeta, TagModifier,
};
pub use synth::{method_name, synthesize, GenerationUnit, Origin, Synthesis};
pub use tag::TagSet;
pub use template::{parse_template, TemplateAst};
pub use types::{MappedType, RenderHints, TypeMapper, TypeOverrides, Wrapper};

use std::sync::Arc;

/// Name transform hook (column -> field name, column -> JSON tag, contract -> method name).
pub type NameStrategy = Arc<dyn Fn(&str) -> String + Send + Sync>;
