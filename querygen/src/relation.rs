//! Relation resolution: derive a relation field and attach it to its owner.
//!
//! Attaching never mutates the owner; the caller gets a new model with the
//! relation field appended, so one model value can feed any number of
//! attachments and output targets.

use crate::error::RelationError;
use crate::model::{ColumnRef, Field, Model, Relation, RelationKind};
use crate::naming;
use crate::tag::TagSet;
use crate::types::RenderHints;
use heck::ToSnakeCase;
use log::debug;
use std::sync::Arc;

/// Join table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTable {
    pub name: String,
    /// Join columns pointing at the owner's keys
    pub foreign_keys: Vec<String>,
    /// Join columns pointing at the target's keys
    pub references: Vec<String>,
}

/// Key configuration of one relation.
///
/// Explicit fields win over the equivalent keys of `gorm_tag`
/// (`foreignKey`, `references`, `many2many`, `joinForeignKey`,
/// `joinReferences`); anything left unset falls back to convention.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelateConfig {
    pub foreign_keys: Vec<String>,
    pub references: Vec<String>,
    pub join_table: Option<String>,
    pub join_foreign_keys: Vec<String>,
    pub join_references: Vec<String>,
    pub json_tag: Option<String>,
    pub gorm_tag: TagSet,
}

impl RelateConfig {
    fn foreign_keys(&self) -> Vec<String> {
        pick(&self.foreign_keys, || self.gorm_tag.list("foreignKey"))
    }

    fn references(&self) -> Vec<String> {
        pick(&self.references, || self.gorm_tag.list("references"))
    }

    fn join_table(&self) -> Option<String> {
        self.join_table
            .clone()
            .or_else(|| self.gorm_tag.first("many2many").map(str::to_string))
            .filter(|name| !name.is_empty())
    }

    fn join_foreign_keys(&self) -> Vec<String> {
        pick(&self.join_foreign_keys, || self.gorm_tag.list("joinForeignKey"))
    }

    fn join_references(&self) -> Vec<String> {
        pick(&self.join_references, || self.gorm_tag.list("joinReferences"))
    }
}

fn pick(explicit: &[String], fallback: impl FnOnce() -> Vec<String>) -> Vec<String> {
    if explicit.is_empty() {
        fallback()
    } else {
        explicit.to_vec()
    }
}

/// Attach a relation field named `field_name` to a copy of `owner`.
///
/// Key names resolve by field name, column name or snake_case. For
/// HasOne/HasMany the references live on the owner and the foreign keys on
/// the target; BelongsTo swaps the sides; ManyToMany keys both live on
/// their own model and meet in the join table.
pub fn attach_relation(
    owner: &Model,
    kind: RelationKind,
    field_name: &str,
    target: Arc<Model>,
    config: &RelateConfig,
) -> Result<Model, RelationError> {
    let name = naming::field_name(field_name);
    let relation_label = format!("{}.{}", owner.model_name(), name);

    if owner.field(&name).is_some() {
        return Err(RelationError::DuplicateField {
            model: owner.model_name().to_string(),
            field: name,
        });
    }

    // (side holding the foreign keys, side holding the references)
    let (fk_side, ref_side): (&Model, &Model) = match kind {
        RelationKind::HasOne | RelationKind::HasMany => (target.as_ref(), owner),
        RelationKind::BelongsTo | RelationKind::ManyToMany => (owner, target.as_ref()),
    };

    let references = match config.references() {
        refs if !refs.is_empty() => refs,
        _ => default_key(&relation_label, ref_side)?,
    };

    let foreign_keys = match config.foreign_keys() {
        keys if !keys.is_empty() => keys,
        _ => match kind {
            RelationKind::HasOne | RelationKind::HasMany => {
                let prefix = owner.model_name().to_snake_case();
                references
                    .iter()
                    .map(|reference| format!("{}_{}", prefix, reference_column(ref_side, reference)))
                    .collect()
            }
            RelationKind::BelongsTo => references
                .iter()
                .map(|reference| format!("{}_{}", name, reference_column(ref_side, reference)))
                .collect(),
            RelationKind::ManyToMany => default_key(&relation_label, owner)?,
        },
    };

    if foreign_keys.len() != references.len() {
        return Err(RelationError::ArityMismatch {
            relation: relation_label,
            foreign_keys: foreign_keys.len(),
            references: references.len(),
        });
    }

    let resolved_fks = resolve_all(&relation_label, fk_side, &foreign_keys)?;
    let resolved_refs = resolve_all(&relation_label, ref_side, &references)?;

    let join_table = if kind == RelationKind::ManyToMany {
        let join_name = config.join_table().ok_or_else(|| RelationError::MissingJoinTable {
            relation: relation_label.clone(),
        })?;
        Some(join_table_for(owner, target.as_ref(), join_name, &resolved_fks, &resolved_refs, config)?)
    } else {
        None
    };

    let json_tag = config.json_tag.clone().unwrap_or_else(|| name.clone());
    let target_path = format!("super::{}::{}", target.names.module_name, target.model_name());
    let target_type = if kind.is_many() {
        format!("Vec<{}>", target_path)
    } else {
        format!("Option<Box<{}>>", target_path)
    };

    let mut tags = TagSet::new();
    tags.set("foreignKey", join_columns(&resolved_fks, |key| key.field.clone()));
    tags.set("references", join_columns(&resolved_refs, |key| key.field.clone()));
    if let Some(join) = &join_table {
        tags.set("many2many", join.name.clone());
        tags.set("joinForeignKey", join.foreign_keys.join(","));
        tags.set("joinReferences", join.references.join(","));
    }
    for (key, values) in config.gorm_tag.iter() {
        if !tags.contains(key) {
            if values.is_empty() {
                tags.flag(key);
            }
            for value in values {
                tags.append(key, value.clone());
            }
        }
    }

    debug!(
        "attaching {} relation {} -> {}",
        kind.as_str(),
        relation_label,
        target.model_name()
    );

    let mut attached = owner.clone();
    attached.fields.push(Field {
        name: name.clone(),
        column: String::new(),
        storage_type: String::new(),
        target_type,
        base_type: target_path,
        nullable: !kind.is_many(),
        hints: RenderHints::default(),
        tags,
        json_tag: json_tag.clone(),
        relation: Some(Relation {
            kind,
            target,
            foreign_keys: resolved_fks,
            references: resolved_refs,
            join_table,
            json_tag,
        }),
    });
    Ok(attached)
}

fn default_key(relation: &str, model: &Model) -> Result<Vec<String>, RelationError> {
    model
        .primary_key_field()
        .map(|field| vec![field.name.clone()])
        .ok_or_else(|| RelationError::NoPrimaryKey {
            relation: relation.to_string(),
            model: model.model_name().to_string(),
        })
}

fn reference_column(model: &Model, reference: &str) -> String {
    model
        .resolve_column(reference)
        .map(|key| key.column)
        .unwrap_or_else(|| reference.to_snake_case())
}

fn resolve_all(relation: &str, model: &Model, names: &[String]) -> Result<Vec<ColumnRef>, RelationError> {
    names
        .iter()
        .map(|name| {
            model
                .resolve_column(name)
                .ok_or_else(|| RelationError::UnresolvedColumn {
                    relation: relation.to_string(),
                    model: model.model_name().to_string(),
                    column: name.clone(),
                })
        })
        .collect()
}

fn join_table_for(
    owner: &Model,
    target: &Model,
    name: String,
    owner_keys: &[ColumnRef],
    target_keys: &[ColumnRef],
    config: &RelateConfig,
) -> Result<JoinTable, RelationError> {
    let owner_prefix = owner.model_name().to_snake_case();
    let target_prefix = target.model_name().to_snake_case();

    let foreign_keys = match config.join_foreign_keys() {
        keys if !keys.is_empty() => keys,
        _ => owner_keys
            .iter()
            .map(|key| format!("{}_{}", owner_prefix, key.column))
            .collect(),
    };
    let references = match config.join_references() {
        keys if !keys.is_empty() => keys,
        _ => target_keys
            .iter()
            .map(|key| format!("{}_{}", target_prefix, key.column))
            .collect(),
    };

    if foreign_keys.len() != owner_keys.len() || references.len() != target_keys.len() {
        return Err(RelationError::ArityMismatch {
            relation: format!("{}.{}", owner.model_name(), name),
            foreign_keys: foreign_keys.len(),
            references: references.len(),
        });
    }

    Ok(JoinTable {
        name,
        foreign_keys,
        references,
    })
}

fn join_columns(keys: &[ColumnRef], f: impl Fn(&ColumnRef) -> String) -> String {
    keys.iter().map(f).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::schema::{build_model, BuildOptions, ColumnMeta, TableMeta};

    fn table(name: &str, columns: &[(&str, &str)]) -> Model {
        let meta = TableMeta {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(column, ty)| ColumnMeta::new(*column, *ty))
                .collect(),
            ..TableMeta::default()
        };
        build_model(&meta, &BuildOptions::new(Dialect::MySql)).unwrap()
    }

    #[test]
    fn test_has_many_defaults() {
        let user = table("users", &[("id", "bigint"), ("name", "varchar(64)")]);
        let post = Arc::new(table("posts", &[("id", "bigint"), ("user_id", "bigint")]));

        let attached =
            attach_relation(&user, RelationKind::HasMany, "Posts", post, &RelateConfig::default()).unwrap();
        let field = attached.field("posts").unwrap();
        assert_eq!(field.target_type, "Vec<super::posts::Post>");
        let relation = field.relation.as_ref().unwrap();
        assert_eq!(relation.foreign_keys[0].column, "user_id");
        assert_eq!(relation.references[0].column, "id");
        assert_eq!(field.tags.to_string(), "foreignKey:user_id;references:id");

        // copy-on-attach
        assert!(user.field("posts").is_none());
    }

    #[test]
    fn test_belongs_to_resolves_on_owner() {
        let post = table("posts", &[("id", "bigint"), ("author_id", "bigint")]);
        let user = Arc::new(table("users", &[("id", "bigint")]));
        let attached =
            attach_relation(&post, RelationKind::BelongsTo, "author", user, &RelateConfig::default()).unwrap();
        let field = attached.field("author").unwrap();
        assert_eq!(field.target_type, "Option<Box<super::users::User>>");
        assert_eq!(field.relation.as_ref().unwrap().foreign_keys[0].field, "author_id");
    }

    #[test]
    fn test_unresolved_foreign_key() {
        let user = table("users", &[("id", "bigint")]);
        let card = Arc::new(table("credit_cards", &[("id", "bigint"), ("number", "varchar(32)")]));
        let config = RelateConfig {
            foreign_keys: vec!["owner_id".to_string()],
            ..RelateConfig::default()
        };
        let err = attach_relation(&user, RelationKind::HasOne, "CreditCard", card, &config).unwrap_err();
        assert_eq!(
            err,
            RelationError::UnresolvedColumn {
                relation: "User.credit_card".to_string(),
                model: "CreditCard".to_string(),
                column: "owner_id".to_string(),
            }
        );
    }

    #[test]
    fn test_many_to_many_requires_join_table() {
        let user = table("users", &[("id", "bigint")]);
        let language = Arc::new(table("languages", &[("id", "bigint")]));
        let err = attach_relation(
            &user,
            RelationKind::ManyToMany,
            "languages",
            language.clone(),
            &RelateConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RelationError::MissingJoinTable { .. }));

        let config = RelateConfig {
            gorm_tag: TagSet::parse("many2many:user_languages"),
            ..RelateConfig::default()
        };
        let attached = attach_relation(&user, RelationKind::ManyToMany, "languages", language, &config).unwrap();
        let join = attached.fields[1].relation.as_ref().unwrap().join_table.clone().unwrap();
        assert_eq!(join.name, "user_languages");
        assert_eq!(join.foreign_keys, vec!["user_id"]);
        assert_eq!(join.references, vec!["language_id"]);
    }

    #[test]
    fn test_duplicate_and_arity() {
        let user = table("users", &[("id", "bigint"), ("name", "varchar(64)")]);
        let post = Arc::new(table("posts", &[("id", "bigint"), ("user_id", "bigint")]));
        let err = attach_relation(&user, RelationKind::HasMany, "name", post.clone(), &RelateConfig::default())
            .unwrap_err();
        assert!(matches!(err, RelationError::DuplicateField { .. }));

        let config = RelateConfig {
            foreign_keys: vec!["user_id".to_string(), "id".to_string()],
            ..RelateConfig::default()
        };
        let err = attach_relation(&user, RelationKind::HasMany, "posts", post, &config).unwrap_err();
        assert!(matches!(err, RelationError::ArityMismatch { foreign_keys: 2, references: 1, .. }));
    }

    #[test]
    fn test_attachment_order_is_append_only() {
        let user = table("users", &[("id", "bigint")]);
        let post = Arc::new(table("posts", &[("id", "bigint"), ("user_id", "bigint")]));
        let card = Arc::new(table("cards", &[("id", "bigint"), ("user_id", "bigint")]));
        let config = RelateConfig::default();

        let a = attach_relation(&user, RelationKind::HasMany, "posts", post.clone(), &config).unwrap();
        let a = attach_relation(&a, RelationKind::HasOne, "card", card.clone(), &config).unwrap();
        let b = attach_relation(&user, RelationKind::HasOne, "card", card, &config).unwrap();
        let b = attach_relation(&b, RelationKind::HasMany, "posts", post, &config).unwrap();

        let names = |m: &Model| m.fields.iter().map(|f| f.name.clone()).collect::<Vec<_>>();
        assert_eq!(names(&a), vec!["id", "posts", "card"]);
        assert_eq!(names(&b), vec!["id", "card", "posts"]);
    }
}
