//! Models sourced from annotated Rust structs.
//!
//! Used when no live schema is available: `#[gorm(...)]` attributes on the
//! struct fields stand in for column metadata. Relations are resolved in a
//! second stage against relation-free snapshots of every model, which is
//! what lets `User -> Post -> Comment -> User` style cycles build.

use super::{build_model, BuildOptions, ColumnMeta, ModelOption, TableMeta};
use crate::error::{Diagnostic, RelationError, SchemaError};
use crate::model::{Model, RelationKind};
use crate::naming;
use crate::relation::{attach_relation, RelateConfig};
use crate::tag::TagSet;
use heck::ToSnakeCase;
use log::{debug, warn};
use quote::ToTokens;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use syn::{Attribute, GenericArgument, Item, LitStr, PathArguments, Type};

/// One struct declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructMeta {
    pub name: String,
    pub table_name: String,
    pub fields: Vec<StructFieldMeta>,
}

/// One field of a struct declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructFieldMeta {
    pub name: String,
    /// Declared type as written, e.g. `Option<String>`
    pub rust_type: String,
    /// `#[gorm(...)]` attributes as GORM tag keys
    pub tags: TagSet,
    pub json_tag: Option<String>,
    pub skip: bool,
}

/// Parse every struct with named fields in `source`
pub fn parse_structs(source: &str) -> Result<Vec<StructMeta>, SchemaError> {
    let file = syn::parse_file(source).map_err(|err| SchemaError::InvalidSource {
        context: "struct source".to_string(),
        message: err.to_string(),
    })?;

    let mut structs = Vec::new();
    for item in file.items {
        let Item::Struct(item_struct) = item else {
            continue;
        };
        let syn::Fields::Named(named) = &item_struct.fields else {
            continue;
        };
        let name = item_struct.ident.to_string();
        let struct_attrs = parse_gorm_attrs(&name, &item_struct.attrs)?;
        let table_name = struct_attrs
            .table
            .unwrap_or_else(|| naming::pluralize(&name.to_snake_case()));

        let mut fields = Vec::new();
        for field in &named.named {
            let Some(ident) = &field.ident else {
                continue;
            };
            let field_name = ident.to_string().trim_start_matches("r#").to_string();
            let context = format!("{}.{}", name, field_name);
            let attrs = parse_gorm_attrs(&context, &field.attrs)?;
            fields.push(StructFieldMeta {
                name: field_name,
                rust_type: field.ty.to_token_stream().to_string(),
                tags: attrs.tags,
                json_tag: attrs.json,
                skip: attrs.skip,
            });
        }
        structs.push(StructMeta {
            name,
            table_name,
            fields,
        });
    }
    Ok(structs)
}

#[derive(Default)]
struct GormAttrs {
    tags: TagSet,
    table: Option<String>,
    json: Option<String>,
    skip: bool,
}

fn parse_gorm_attrs(context: &str, attrs: &[Attribute]) -> Result<GormAttrs, SchemaError> {
    let mut parsed = GormAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("gorm")) {
        attr.parse_nested_meta(|meta| {
            let key = meta
                .path
                .get_ident()
                .map(|ident| ident.to_string())
                .unwrap_or_default();
            let value = if meta.input.peek(syn::Token![=]) {
                Some(meta.value()?.parse::<LitStr>()?.value())
            } else {
                None
            };
            let tag_key = match key.as_str() {
                "primary_key" => Some("primaryKey"),
                "not_null" => Some("not null"),
                "auto_increment" => {
                    parsed.tags.set("autoIncrement", "true");
                    None
                }
                "column" => Some("column"),
                "type" => Some("type"),
                "default" => Some("default"),
                "comment" => Some("comment"),
                "foreign_key" => Some("foreignKey"),
                "references" => Some("references"),
                "many2many" => Some("many2many"),
                "join_foreign_key" => Some("joinForeignKey"),
                "join_references" => Some("joinReferences"),
                "index" => Some("index"),
                "unique_index" => Some("uniqueIndex"),
                "table" => {
                    parsed.table = value.clone();
                    None
                }
                "json" => {
                    parsed.json = value.clone();
                    None
                }
                "skip" => {
                    parsed.skip = true;
                    None
                }
                _ => return Err(meta.error(format!("unknown gorm attribute `{}`", key))),
            };
            if let Some(tag_key) = tag_key {
                match value {
                    Some(value) => parsed.tags.set(tag_key, value),
                    None => parsed.tags.flag(tag_key),
                }
            }
            Ok(())
        })
        .map_err(|err| SchemaError::InvalidSource {
            context: context.to_string(),
            message: err.to_string(),
        })?;
    }
    Ok(parsed)
}

/// Shape of a field type once `Option`, `Box` and `Vec` are peeled off
struct FieldShape {
    inner: String,
    optional: bool,
    many: bool,
}

fn field_shape(ty: &Type) -> FieldShape {
    let mut shape = FieldShape {
        inner: String::new(),
        optional: false,
        many: false,
    };
    let mut current = ty.clone();
    loop {
        let next = match &current {
            Type::Path(type_path) => type_path.path.segments.last().and_then(|segment| {
                let wrapper = segment.ident.to_string();
                let PathArguments::AngleBracketed(args) = &segment.arguments else {
                    return None;
                };
                let Some(GenericArgument::Type(inner)) = args.args.first() else {
                    return None;
                };
                match wrapper.as_str() {
                    "Option" => {
                        shape.optional = true;
                        Some(inner.clone())
                    }
                    "Box" => Some(inner.clone()),
                    // Vec<u8> is a blob column, not a collection
                    "Vec" if !shape.many && inner.to_token_stream().to_string() != "u8" => {
                        shape.many = true;
                        Some(inner.clone())
                    }
                    _ => None,
                }
            }),
            _ => None,
        };
        match next {
            Some(inner) => current = inner,
            None => break,
        }
    }
    shape.inner = current.to_token_stream().to_string();
    shape
}

fn last_segment(ty: &str) -> &str {
    ty.rsplit("::").next().unwrap_or(ty).trim()
}

/// Build models for every struct, then resolve their relation fields.
///
/// A struct that fails to build is left out; a relation that fails to
/// resolve is left off its model. Both are reported as diagnostics.
pub fn build_models_from_structs(
    structs: &[StructMeta],
    options: &BuildOptions,
) -> (Vec<Model>, Vec<Diagnostic>) {
    let declared: BTreeSet<&str> = structs.iter().map(|s| s.name.as_str()).collect();
    let mut diagnostics = Vec::new();

    // Stage 1: relation-free models
    let mut built: Vec<(&StructMeta, Model)> = Vec::new();
    for meta in structs {
        match build_scalar_model(meta, &declared, options) {
            Ok(model) => built.push((meta, model)),
            Err(err) => {
                warn!("skipping struct {}: {}", meta.name, err);
                diagnostics.push(Diagnostic::model(meta.name.clone(), err));
            }
        }
    }
    let snapshots: BTreeMap<String, Arc<Model>> = built
        .iter()
        .map(|(meta, model)| (meta.name.clone(), Arc::new(model.clone())))
        .collect();

    // Stage 2: relations against the snapshots
    let mut models = Vec::with_capacity(built.len());
    for (meta, mut model) in built {
        for field in meta.fields.iter().filter(|field| !field.skip) {
            let Ok(ty) = syn::parse_str::<Type>(&field.rust_type) else {
                continue;
            };
            let shape = field_shape(&ty);
            let target_name = last_segment(&shape.inner);
            if !declared.contains(target_name) {
                continue;
            }
            let Some(target) = snapshots.get(target_name) else {
                let err = RelationError::UnknownTarget {
                    field: format!("{}.{}", meta.name, field.name),
                    ty: field.rust_type.clone(),
                };
                diagnostics.push(Diagnostic::model(model.model_name().to_string(), err));
                continue;
            };

            let config = RelateConfig {
                json_tag: field.json_tag.clone(),
                gorm_tag: field.tags.clone(),
                ..RelateConfig::default()
            };
            let kind = relation_kind(&model, target, field, shape.many);
            match attach_relation(&model, kind, &field.name, target.clone(), &config) {
                Ok(attached) => model = attached,
                Err(err) => {
                    warn!("dropping relation {}.{}: {}", meta.name, field.name, err);
                    diagnostics.push(Diagnostic::model(model.model_name().to_string(), err));
                }
            }
        }
        models.push(model);
    }
    (models, diagnostics)
}

fn relation_kind(owner: &Model, target: &Model, field: &StructFieldMeta, many: bool) -> RelationKind {
    if many {
        return if field.tags.contains("many2many") {
            RelationKind::ManyToMany
        } else {
            RelationKind::HasMany
        };
    }
    let foreign_keys = field.tags.list("foreignKey");
    let owner_holds_keys = if foreign_keys.is_empty() {
        let references = field.tags.list("references");
        let reference = references
            .first()
            .cloned()
            .or_else(|| target.primary_key.clone());
        reference.map_or(false, |reference| {
            let column = target
                .resolve_column(&reference)
                .map(|key| key.column)
                .unwrap_or(reference);
            owner
                .resolve_column(&format!("{}_{}", field.name, column))
                .is_some()
        })
    } else {
        foreign_keys
            .iter()
            .all(|key| owner.resolve_column(key).is_some())
    };
    if owner_holds_keys {
        RelationKind::BelongsTo
    } else {
        RelationKind::HasOne
    }
}

fn build_scalar_model(
    meta: &StructMeta,
    declared: &BTreeSet<&str>,
    options: &BuildOptions,
) -> Result<Model, SchemaError> {
    let mapper = options.mapper();
    let mut columns = Vec::new();
    let mut field_options = Vec::new();

    for field in meta.fields.iter().filter(|field| !field.skip) {
        let ty = syn::parse_str::<Type>(&field.rust_type).map_err(|err| SchemaError::InvalidSource {
            context: format!("{}.{}", meta.name, field.name),
            message: err.to_string(),
        })?;
        let shape = field_shape(&ty);
        if declared.contains(last_segment(&shape.inner)) {
            continue;
        }

        let column = field
            .tags
            .first("column")
            .map(str::to_string)
            .unwrap_or_else(|| field.name.clone());
        // A collection of scalars has no inferable column type
        let declared_ty = if shape.many {
            format!("Vec<{}>", shape.inner.replace(' ', ""))
        } else {
            shape.inner.replace(' ', "")
        };
        let storage_type = match field.tags.first("type") {
            Some(storage) => storage.to_string(),
            None if shape.many => {
                return Err(SchemaError::UnsupportedType {
                    column: format!("{}.{}", meta.name, field.name),
                    storage_type: field.rust_type.clone(),
                })
            }
            None => mapper
                .infer_storage_type(&shape.inner)
                .map(str::to_string)
                .ok_or_else(|| SchemaError::UnsupportedType {
                    column: format!("{}.{}", meta.name, field.name),
                    storage_type: field.rust_type.clone(),
                })?,
        };

        let mut tags = field.tags.clone();
        tags.set("column", column.clone());
        tags.set("type", storage_type.clone());
        let nullable = shape.optional && !tags.contains("not null");
        columns.push(ColumnMeta {
            name: column.clone(),
            storage_type,
            nullable,
            primary_key: tags.contains("primaryKey"),
            auto_increment: tags.first("autoIncrement") == Some("true"),
            default: tags.first("default").map(str::to_string),
            comment: tags.first("comment").map(str::to_string),
            tag: tags.to_string(),
        });

        if naming::field_name(&column) != field.name {
            field_options.push(ModelOption::FieldRename {
                column: column.clone(),
                name: field.name.clone(),
            });
        }
        field_options.push(ModelOption::FieldType {
            column: column.clone(),
            ty: declared_ty,
        });
        if let Some(json) = &field.json_tag {
            field_options.push(ModelOption::FieldJsonTag {
                column,
                tag: json.clone(),
            });
        }
    }

    let table = TableMeta {
        name: meta.table_name.clone(),
        columns,
        ..TableMeta::default()
    };
    let mut struct_options = options.clone();
    struct_options.model_name = Some(meta.name.clone());
    struct_options.model_options.extend(field_options);
    debug!("building model {} from struct source", meta.name);
    build_model(&table, &struct_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;

    const SOURCE: &str = r#"
        struct User {
            #[gorm(primary_key, auto_increment)]
            id: i64,
            #[gorm(column = "user_name", type = "varchar(64)")]
            name: Option<String>,
            posts: Vec<Post>,
            languages: Vec<Language>,
            #[gorm(many2many = "user_languages")]
            spoken: Vec<Language>,
        }

        #[gorm(table = "blog_posts")]
        struct Post {
            id: i64,
            author_id: i64,
            #[gorm(foreign_key = "author_id")]
            author: Option<Box<User>>,
            comments: Vec<Comment>,
        }

        struct Comment {
            id: i64,
            post_id: i64,
            post: Post,
            body: String,
        }

        struct Language {
            id: i32,
            code: String,
        }
    "#;

    #[test]
    fn test_parse_structs() {
        let structs = parse_structs(SOURCE).unwrap();
        assert_eq!(structs.len(), 4);
        assert_eq!(structs[0].table_name, "users");
        assert_eq!(structs[1].table_name, "blog_posts");
        let name = &structs[0].fields[1];
        assert_eq!(name.tags.first("column"), Some("user_name"));
        assert!(structs[0].fields[0].tags.contains("primaryKey"));
    }

    #[test]
    fn test_unknown_attribute_is_rejected() {
        let err = parse_structs("struct A { #[gorm(colour = \"red\")] id: i64 }").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSource { ref context, .. } if context == "A.id"));
    }

    #[test]
    fn test_staged_relations_break_cycles() {
        let structs = parse_structs(SOURCE).unwrap();
        let (models, diagnostics) = build_models_from_structs(&structs, &BuildOptions::new(Dialect::Postgres));
        assert_eq!(models.len(), 4);

        let user = &models[0];
        assert_eq!(user.field("name").unwrap().column, "user_name");
        assert_eq!(user.primary_key.as_deref(), Some("id"));

        // Post has no user_id, so the conventional has-many key fails to resolve
        assert!(user.field("posts").is_none());
        // languages: Vec without many2many is has-many on language.user_id, which is missing
        assert!(user.field("languages").is_none());
        let spoken = user.field("spoken").unwrap().relation.as_ref().unwrap();
        assert_eq!(spoken.kind, RelationKind::ManyToMany);
        assert_eq!(diagnostics.len(), 2);

        let post = &models[1];
        let author = post.field("author").unwrap().relation.as_ref().unwrap();
        assert_eq!(author.kind, RelationKind::BelongsTo);
        assert_eq!(post.field("comments").unwrap().target_type, "Vec<super::comments::Comment>");

        let comment = &models[2];
        let relation = comment.field("post").unwrap().relation.as_ref().unwrap();
        assert_eq!(relation.kind, RelationKind::BelongsTo);
        // snapshots carry no relation fields
        assert!(relation.target.field("comments").is_none());
    }

    #[test]
    fn test_declared_types_are_kept() {
        let structs = parse_structs(
            "struct Event { id: i64, at: chrono::NaiveDateTime, #[gorm(skip)] cache: Vec<String> }",
        )
        .unwrap();
        let (models, diagnostics) = build_models_from_structs(&structs, &BuildOptions::new(Dialect::MySql));
        assert!(diagnostics.is_empty());
        let at = models[0].field("at").unwrap();
        assert_eq!(at.storage_type, "datetime");
        assert_eq!(at.target_type, "chrono::NaiveDateTime");
        assert!(models[0].field("cache").is_none());
    }
}
