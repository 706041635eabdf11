//! Relation-derived accessor units: one method per relation field that loads
//! the related rows of an owner row.

use crate::crud::{assignments, field_value, select_list, StaticQuery};
use crate::dialect::Dialect;
use crate::model::{Field, Model, RelationKind};
use crate::naming;
use crate::synth::{GenerationUnit, Origin};
use log::debug;
use quote::quote;
use syn::Type;

/// Accessor units for every relation field of `model`, in field order
pub fn relation_units(model: &Model, dialect: Dialect) -> Vec<GenerationUnit> {
    model
        .relation_fields()
        .filter_map(|field| accessor(model, field, dialect))
        .map(|query| query.into_unit(model, dialect, Origin::RelationDerived))
        .collect()
}

fn accessor(model: &Model, field: &Field, dialect: Dialect) -> Option<StaticQuery> {
    let relation = field.relation.as_ref()?;
    let target = relation.target.as_ref();
    let target_type: Type = match syn::parse_str(&field.base_type) {
        Ok(ty) => ty,
        Err(err) => {
            debug!("{}.{}: unusable target type: {}", model.model_name(), field.name, err);
            return None;
        }
    };
    let owner_ident = naming::ident(model.model_name());
    let owner = quote!(owner);
    let target_table = dialect.quote_ident(target.table_name());
    let qualified = |table: &str, column: &str| format!("{}.{}", table, dialect.quote_ident(column));

    // Columns compared against the owner, and the owner fields bound to them
    let (columns, bound, from): (Vec<String>, Vec<&str>, String) = match relation.kind {
        RelationKind::HasOne | RelationKind::HasMany => (
            relation
                .foreign_keys
                .iter()
                .map(|key| qualified(&target_table, &key.column))
                .collect(),
            relation.references.iter().map(|key| key.field.as_str()).collect(),
            target_table.clone(),
        ),
        RelationKind::BelongsTo => (
            relation
                .references
                .iter()
                .map(|key| qualified(&target_table, &key.column))
                .collect(),
            relation.foreign_keys.iter().map(|key| key.field.as_str()).collect(),
            target_table.clone(),
        ),
        RelationKind::ManyToMany => {
            let join = relation.join_table.as_ref()?;
            let join_table = dialect.quote_ident(&join.name);
            let on = join
                .references
                .iter()
                .zip(&relation.references)
                .map(|(join_column, key)| {
                    format!(
                        "{} = {}",
                        qualified(&join_table, join_column),
                        qualified(&target_table, &key.column)
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ");
            (
                join.foreign_keys
                    .iter()
                    .map(|join_column| qualified(&join_table, join_column))
                    .collect(),
                relation.foreign_keys.iter().map(|key| key.field.as_str()).collect(),
                format!("{} JOIN {} ON {}", target_table, join_table, on),
            )
        }
    };

    let mut values = Vec::with_capacity(bound.len());
    for name in bound {
        values.push(field_value(&owner, model.field(name)?));
    }
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_list(target, dialect, true),
        from,
        assignments(columns, dialect, 1, " AND ")
    );
    let returns: Type = if relation.kind.is_many() {
        syn::parse_quote!(Vec<#target_type>)
    } else {
        syn::parse_quote!(Option<#target_type>)
    };

    Some(StaticQuery {
        name: field.name.clone(),
        inputs: quote! { owner: &#owner_ident },
        returns,
        sql,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::{attach_relation, RelateConfig};
    use crate::schema::{build_model, BuildOptions, ColumnMeta, TableMeta};
    use std::sync::Arc;

    fn table(name: &str, columns: &[&str]) -> Model {
        let meta = TableMeta {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|column| {
                    let meta = ColumnMeta::new(*column, "bigint");
                    if *column == "id" {
                        meta.primary_key()
                    } else {
                        meta
                    }
                })
                .collect(),
            ..TableMeta::default()
        };
        build_model(&meta, &BuildOptions::new(Dialect::MySql)).unwrap()
    }

    #[test]
    fn test_has_many_and_belongs_to_accessors() {
        let user = table("users", &["id"]);
        let post = table("posts", &["id", "user_id"]);
        let user = attach_relation(
            &user,
            RelationKind::HasMany,
            "posts",
            Arc::new(post.clone()),
            &RelateConfig::default(),
        )
        .unwrap();
        let post = attach_relation(&post, RelationKind::BelongsTo, "user", Arc::new(user.clone()), &RelateConfig::default())
            .unwrap();

        let units = relation_units(&user, Dialect::MySql);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "posts");
        assert_eq!(units[0].origin, Origin::RelationDerived);
        assert!(units[0]
            .body
            .contains("SELECT `posts`.`id`, `posts`.`user_id` FROM `posts` WHERE `posts`.`user_id` = ?"));
        assert!(units[0].signature.contains("Vec < super :: posts :: Post >"));

        let units = relation_units(&post, Dialect::MySql);
        assert!(units[0].body.contains("FROM `users` WHERE `users`.`id` = ?"));
        assert!(units[0].body.contains("owner . user_id . clone ()"));
        assert!(units[0].signature.contains("Option < super :: users :: User >"));
        syn::parse_str::<syn::ItemFn>(&format!("{} {}", units[0].signature, units[0].body)).unwrap();
    }

    #[test]
    fn test_many_to_many_accessor_joins() {
        let user = table("users", &["id"]);
        let language = table("languages", &["id"]);
        let config = RelateConfig {
            join_table: Some("user_languages".to_string()),
            ..RelateConfig::default()
        };
        let user = attach_relation(&user, RelationKind::ManyToMany, "languages", Arc::new(language), &config).unwrap();
        let units = relation_units(&user, Dialect::Postgres);
        assert_eq!(units.len(), 1);
        assert!(units[0].body.contains(
            r#"FROM \"languages\" JOIN \"user_languages\" ON \"user_languages\".\"language_id\" = \"languages\".\"id\" WHERE \"user_languages\".\"user_id\" = $1"#
        ));
    }
}
