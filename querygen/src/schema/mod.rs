//! Schema model builder.
//!
//! Turns raw table metadata (or annotated structs, see [`structs`]) into a
//! [`Model`]: ordered fields with mapped types and GORM tag sets, plus the
//! primary key designation.

mod structs;

pub use structs::{build_models_from_structs, parse_structs, StructFieldMeta, StructMeta};

use crate::dialect::Dialect;
use crate::error::{RelationError, SchemaError};
use crate::model::{Field, GenerationOptions, Model, RelationKind};
use crate::naming::{self, ModelNames};
use crate::relation::{attach_relation, RelateConfig};
use crate::tag::TagSet;
use crate::types::{TypeMapper, TypeOverrides};
use crate::NameStrategy;
use log::debug;
use quote::ToTokens;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Raw metadata of one table, as produced by schema introspection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub indexes: Vec<IndexMeta>,
    pub comment: Option<String>,
}

/// Raw metadata of one column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type", alias = "storage_type")]
    pub storage_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub default: Option<String>,
    pub comment: Option<String>,
    /// Extra GORM tag string, overriding generated keys
    pub tag: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, storage_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_type: storage_type.into(),
            ..Self::default()
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    fn explicit_primary_key(&self) -> bool {
        self.primary_key || TagSet::parse(&self.tag).contains("primaryKey")
    }
}

/// Raw metadata of one index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexMeta {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub primary: bool,
}

/// Callback rewriting the tag set of matching columns
pub type TagModifier = Arc<dyn Fn(&mut TagSet) + Send + Sync>;

/// Per-model generation option
#[derive(Clone)]
pub enum ModelOption {
    /// Drop columns by column or field name
    FieldIgnore(Vec<String>),
    /// Drop columns whose name matches the pattern
    FieldIgnoreReg(String),
    FieldRename { column: String, name: String },
    /// Use an explicit Rust type for a column
    FieldType { column: String, ty: String },
    FieldTypeReg { pattern: String, ty: String },
    FieldGormTagReg { pattern: String, modifier: TagModifier },
    FieldJsonTag { column: String, tag: String },
    /// Attach a relation field once the model is built
    FieldRelate {
        kind: RelationKind,
        name: String,
        target: Arc<Model>,
        config: RelateConfig,
    },
    /// Rust source with `impl` blocks whose methods join the model struct
    WithMethod(String),
}

impl fmt::Debug for ModelOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelOption::FieldIgnore(names) => f.debug_tuple("FieldIgnore").field(names).finish(),
            ModelOption::FieldIgnoreReg(pattern) => f.debug_tuple("FieldIgnoreReg").field(pattern).finish(),
            ModelOption::FieldRename { column, name } => f
                .debug_struct("FieldRename")
                .field("column", column)
                .field("name", name)
                .finish(),
            ModelOption::FieldType { column, ty } => f
                .debug_struct("FieldType")
                .field("column", column)
                .field("ty", ty)
                .finish(),
            ModelOption::FieldTypeReg { pattern, ty } => f
                .debug_struct("FieldTypeReg")
                .field("pattern", pattern)
                .field("ty", ty)
                .finish(),
            ModelOption::FieldGormTagReg { pattern, .. } => f
                .debug_struct("FieldGormTagReg")
                .field("pattern", pattern)
                .finish_non_exhaustive(),
            ModelOption::FieldJsonTag { column, tag } => f
                .debug_struct("FieldJsonTag")
                .field("column", column)
                .field("tag", tag)
                .finish(),
            ModelOption::FieldRelate { kind, name, target, .. } => f
                .debug_struct("FieldRelate")
                .field("kind", kind)
                .field("name", name)
                .field("target", &target.model_name())
                .finish_non_exhaustive(),
            ModelOption::WithMethod(_) => f.write_str("WithMethod(..)"),
        }
    }
}

/// Everything `build_model` needs besides the table itself
#[derive(Clone, Default)]
pub struct BuildOptions {
    pub dialect: Dialect,
    pub generation: GenerationOptions,
    /// Explicit model name instead of the singularized table name
    pub model_name: Option<String>,
    /// Column -> field name hook
    pub field_name_strategy: Option<NameStrategy>,
    /// Column -> serialization tag hook
    pub json_tag_strategy: Option<NameStrategy>,
    pub model_options: Vec<ModelOption>,
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOptions")
            .field("dialect", &self.dialect)
            .field("generation", &self.generation)
            .field("model_name", &self.model_name)
            .field("field_name_strategy", &self.field_name_strategy.is_some())
            .field("json_tag_strategy", &self.json_tag_strategy.is_some())
            .field("model_options", &self.model_options)
            .finish()
    }
}

impl BuildOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: impl IntoIterator<Item = ModelOption>) -> Self {
        self.model_options.extend(options);
        self
    }

    fn mapper(&self) -> TypeMapper {
        TypeMapper {
            dialect: self.dialect,
            nullable_as_pointer: self.generation.nullable_as_pointer,
            coverable_as_pointer: self.generation.coverable_as_pointer,
        }
    }
}

/// Model options with their patterns compiled
struct CompiledOptions<'a> {
    ignore: Vec<&'a str>,
    ignore_patterns: Vec<Regex>,
    renames: BTreeMap<&'a str, &'a str>,
    types: BTreeMap<&'a str, &'a str>,
    type_patterns: Vec<(Regex, &'a str)>,
    tag_modifiers: Vec<(Regex, &'a TagModifier)>,
    json_tags: BTreeMap<&'a str, &'a str>,
    methods: Vec<&'a str>,
}

fn compile(pattern: &str) -> Result<Regex, SchemaError> {
    Regex::new(pattern).map_err(|err| SchemaError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}

impl<'a> CompiledOptions<'a> {
    fn new(options: &'a [ModelOption]) -> Result<Self, SchemaError> {
        let mut compiled = CompiledOptions {
            ignore: Vec::new(),
            ignore_patterns: Vec::new(),
            renames: BTreeMap::new(),
            types: BTreeMap::new(),
            type_patterns: Vec::new(),
            tag_modifiers: Vec::new(),
            json_tags: BTreeMap::new(),
            methods: Vec::new(),
        };
        for option in options {
            match option {
                ModelOption::FieldIgnore(names) => compiled.ignore.extend(names.iter().map(String::as_str)),
                ModelOption::FieldIgnoreReg(pattern) => compiled.ignore_patterns.push(compile(pattern)?),
                ModelOption::FieldRename { column, name } => {
                    compiled.renames.insert(column.as_str(), name.as_str());
                }
                ModelOption::FieldType { column, ty } => {
                    compiled.types.insert(column.as_str(), ty.as_str());
                }
                ModelOption::FieldTypeReg { pattern, ty } => compiled.type_patterns.push((compile(pattern)?, ty.as_str())),
                ModelOption::FieldGormTagReg { pattern, modifier } => {
                    compiled.tag_modifiers.push((compile(pattern)?, modifier))
                }
                ModelOption::FieldJsonTag { column, tag } => {
                    compiled.json_tags.insert(column.as_str(), tag.as_str());
                }
                ModelOption::WithMethod(source) => compiled.methods.push(source.as_str()),
                ModelOption::FieldRelate { .. } => {}
            }
        }
        Ok(compiled)
    }

    fn ignored(&self, column: &str, field: &str) -> bool {
        self.ignore.iter().any(|name| *name == column || *name == field)
            || self.ignore_patterns.iter().any(|pattern| pattern.is_match(column))
    }

    fn type_override(&self, column: &str) -> Option<String> {
        self.types
            .get(column)
            .copied()
            .or_else(|| {
                self.type_patterns
                    .iter()
                    .find(|(pattern, _)| pattern.is_match(column))
                    .map(|(_, ty)| *ty)
            })
            .map(str::to_string)
    }
}

/// Normalize one table into a model.
///
/// Field order follows column order. `FieldRelate` options are not applied
/// here; see [`apply_relations`].
pub fn build_model(table: &TableMeta, options: &BuildOptions) -> Result<Model, SchemaError> {
    let compiled = CompiledOptions::new(&options.model_options)?;
    let mapper = options.mapper();

    let names = match &options.model_name {
        Some(name) => ModelNames::with_model_name(&table.name, name),
        None => ModelNames::from_table_name(&table.name),
    };
    if !naming::is_valid_identifier(&names.model_name) {
        return Err(SchemaError::InvalidIdentifier {
            name: names.model_name,
        });
    }

    let explicit_keys: Vec<&str> = table
        .columns
        .iter()
        .filter(|column| column.explicit_primary_key())
        .map(|column| column.name.as_str())
        .collect();
    if explicit_keys.len() > 1 {
        return Err(SchemaError::AmbiguousPrimaryKey {
            table: table.name.clone(),
            fields: explicit_keys.join(", "),
        });
    }

    let mut fields: Vec<Field> = Vec::with_capacity(table.columns.len());
    let mut primary_key = None;
    for column in &table.columns {
        let default_name = naming::field_name(&column.name);
        if compiled.ignored(&column.name, &default_name) {
            debug!("ignoring column {}.{}", table.name, column.name);
            continue;
        }

        let name = match compiled.renames.get(column.name.as_str()) {
            Some(name) => name.to_string(),
            None => match &options.field_name_strategy {
                Some(strategy) => strategy(&column.name),
                None => default_name,
            },
        };
        if name != naming::sanitize_ident(&name) {
            return Err(SchemaError::InvalidIdentifier { name });
        }
        if fields.iter().any(|field| field.name == name) {
            return Err(SchemaError::DuplicateField {
                model: names.model_name.clone(),
                field: name,
            });
        }

        let is_primary = column.explicit_primary_key();
        let overrides = TypeOverrides {
            rust_type: compiled.type_override(&column.name),
            has_default: column.default.is_some(),
        };
        let label = format!("{}.{}", table.name, column.name);
        let mapped = mapper.map(&label, &column.storage_type, column.nullable, &overrides)?;

        let mut tags = column_tags(column, is_primary, table, options.generation.include_index_tag);
        for (pattern, modifier) in &compiled.tag_modifiers {
            if pattern.is_match(&column.name) {
                modifier(&mut tags);
            }
        }

        let json_tag = match compiled.json_tags.get(column.name.as_str()) {
            Some(tag) => tag.to_string(),
            None => match &options.json_tag_strategy {
                Some(strategy) => strategy(&column.name),
                None => column.name.clone(),
            },
        };

        if is_primary {
            primary_key = Some(name.clone());
        }
        fields.push(Field {
            name,
            column: column.name.clone(),
            storage_type: column.storage_type.clone(),
            target_type: mapped.render(),
            base_type: mapped.base,
            nullable: column.nullable,
            hints: mapped.hints,
            tags,
            json_tag,
            relation: None,
        });
    }

    if primary_key.is_none() && explicit_keys.is_empty() {
        primary_key = fields
            .iter()
            .find(|field| field.column.eq_ignore_ascii_case("id"))
            .map(|field| field.name.clone());
    }

    let methods = collect_methods(&names.model_name, &compiled.methods)?;

    debug!(
        "built model {} from table {} ({} fields, primary key {:?})",
        names.model_name,
        table.name,
        fields.len(),
        primary_key
    );

    Ok(Model {
        names,
        fields,
        primary_key,
        options: options.generation,
        methods,
    })
}

/// Attach the `FieldRelate` options of `options` to `model`.
///
/// A failed attachment drops that relation only; its error is returned next
/// to the model so the caller can report it.
pub fn apply_relations(model: Model, options: &BuildOptions) -> (Model, Vec<RelationError>) {
    let mut model = model;
    let mut errors = Vec::new();
    for option in &options.model_options {
        if let ModelOption::FieldRelate {
            kind,
            name,
            target,
            config,
        } = option
        {
            match attach_relation(&model, *kind, name, target.clone(), config) {
                Ok(attached) => model = attached,
                Err(err) => errors.push(err),
            }
        }
    }
    (model, errors)
}

fn column_tags(column: &ColumnMeta, is_primary: bool, table: &TableMeta, include_index: bool) -> TagSet {
    let mut tags = TagSet::new();
    tags.set("column", column.name.clone());
    tags.set("type", column.storage_type.clone());
    if is_primary {
        tags.flag("primaryKey");
    }
    if column.auto_increment {
        tags.set("autoIncrement", "true");
    }
    if !column.nullable {
        tags.flag("not null");
    }
    if let Some(default) = &column.default {
        tags.set("default", default.clone());
    }
    if let Some(comment) = &column.comment {
        tags.set("comment", comment.clone());
    }
    if include_index {
        for index in table
            .indexes
            .iter()
            .filter(|index| !index.primary && index.columns.contains(&column.name))
        {
            let key = if index.unique { "uniqueIndex" } else { "index" };
            tags.append(key, index.name.clone());
        }
    }
    if !column.tag.is_empty() {
        tags.merge(&TagSet::parse(&column.tag));
    }
    tags
}

/// Collect the methods of every `impl` block; a later method replaces an
/// earlier one of the same name in place.
fn collect_methods(model: &str, sources: &[&str]) -> Result<Vec<String>, SchemaError> {
    let mut methods: Vec<(String, String)> = Vec::new();
    for source in sources {
        let file = syn::parse_file(source).map_err(|err| SchemaError::InvalidSource {
            context: model.to_string(),
            message: err.to_string(),
        })?;
        for item in file.items {
            let syn::Item::Impl(item_impl) = item else {
                continue;
            };
            for impl_item in item_impl.items {
                if let syn::ImplItem::Fn(method) = impl_item {
                    let name = method.sig.ident.to_string();
                    let rendered = method.to_token_stream().to_string();
                    match methods.iter_mut().find(|(existing, _)| *existing == name) {
                        Some(slot) => slot.1 = rendered,
                        None => methods.push((name, rendered)),
                    }
                }
            }
        }
    }
    Ok(methods.into_iter().map(|(_, rendered)| rendered).collect())
}
