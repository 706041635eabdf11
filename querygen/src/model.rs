//! The normalized intermediate representation every later stage consumes.

use crate::naming::ModelNames;
use crate::relation::JoinTable;
use crate::tag::TagSet;
use crate::types::RenderHints;
use heck::ToSnakeCase;
use std::sync::Arc;

/// Per-model generation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Nullable columns become `Option<T>` instead of `Nullable<T>`
    pub nullable_as_pointer: bool,
    /// Columns with a default value become `Option<T>`
    pub coverable_as_pointer: bool,
    /// Emit `index` / `uniqueIndex` tag keys
    pub include_index_tag: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    ManyToMany,
}

impl RelationKind {
    /// The relation field holds a collection
    pub fn is_many(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::ManyToMany)
    }

    /// GORM name of the kind, used in logs and tags
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::ManyToMany => "many_to_many",
        }
    }
}

/// A resolved key column: the Rust field and the column it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub field: String,
    pub column: String,
}

/// A derived association between two models
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub kind: RelationKind,
    /// Relation-free snapshot of the target model
    pub target: Arc<Model>,
    /// Key columns; on the target for HasOne/HasMany, on the owner otherwise
    pub foreign_keys: Vec<ColumnRef>,
    /// Referenced columns; on the owner for HasOne/HasMany, on the target otherwise
    pub references: Vec<ColumnRef>,
    pub join_table: Option<JoinTable>,
    pub json_tag: String,
}

/// One field of a model
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    /// Source column; empty for relation fields
    pub column: String,
    /// Storage type as given by the metadata; empty for relation fields
    pub storage_type: String,
    /// Rust type as rendered in the struct, wrapper included
    pub target_type: String,
    /// Rust type without wrapper
    pub base_type: String,
    pub nullable: bool,
    pub hints: RenderHints,
    pub tags: TagSet,
    /// Serialization name; `-` skips the field
    pub json_tag: String,
    pub relation: Option<Relation>,
}

impl Field {
    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }

    pub fn is_auto_increment(&self) -> bool {
        self.tags.first("autoIncrement") == Some("true")
    }
}

/// A table or struct normalized into fields, keys and relations
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub names: ModelNames,
    /// Fields in source column order, relation fields appended
    pub fields: Vec<Field>,
    /// Name of the primary key field
    pub primary_key: Option<String>,
    pub options: GenerationOptions,
    /// Extra inherent methods as rendered `fn` items
    pub methods: Vec<String>,
}

impl Model {
    pub fn table_name(&self) -> &str {
        &self.names.table_name
    }

    pub fn model_name(&self) -> &str {
        &self.names.model_name
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Find a field by its name, its column or the snake_case of either
    pub fn resolve(&self, name: &str) -> Option<&Field> {
        if let Some(field) = self.field(name) {
            return Some(field);
        }
        if let Some(field) = self
            .fields
            .iter()
            .find(|field| !field.column.is_empty() && field.column == name)
        {
            return Some(field);
        }
        let snake = name.to_snake_case();
        self.fields
            .iter()
            .find(|field| field.name == snake || (!field.column.is_empty() && field.column.to_snake_case() == snake))
    }

    /// Resolve a scalar column reference for relation keys
    pub fn resolve_column(&self, name: &str) -> Option<ColumnRef> {
        self.resolve(name)
            .filter(|field| !field.is_relation())
            .map(|field| ColumnRef {
                field: field.name.clone(),
                column: field.column.clone(),
            })
    }

    /// Resolve a dotted path such as `name` or `posts.title`.
    ///
    /// Intermediate segments must be relation fields; the path ends on a
    /// scalar field. Returns the model owning the last segment with it.
    pub fn resolve_path<'a>(&'a self, path: &[String]) -> Option<(&'a Model, &'a Field)> {
        let (last, init) = path.split_last()?;
        let mut model = self;
        for segment in init {
            let relation = model.resolve(segment)?.relation.as_ref()?;
            model = relation.target.as_ref();
        }
        let field = model.resolve(last)?;
        if field.is_relation() {
            return None;
        }
        Some((model, field))
    }

    pub fn primary_key_field(&self) -> Option<&Field> {
        self.primary_key.as_deref().and_then(|name| self.field(name))
    }

    /// Primary key as a column reference
    pub fn primary_key_column(&self) -> Option<ColumnRef> {
        self.primary_key_field().map(|field| ColumnRef {
            field: field.name.clone(),
            column: field.column.clone(),
        })
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| !field.is_relation())
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|field| field.is_relation())
    }

    /// The model with every relation field removed
    pub fn without_relations(&self) -> Model {
        Model {
            fields: self.scalar_fields().cloned().collect(),
            ..self.clone()
        }
    }
}
