mod helpers;

use helpers::*;
use querygen::{
    apply_relations, attach_relation, parse_interfaces, render_model, render_namespace, BuildOptions, Dialect,
    Error, ModelOption, RelateConfig, RelationError, RelationKind, Settings, TemplateError,
};
use std::sync::Arc;

fn artifact(rendered: &querygen::RenderedModel) -> &str {
    &rendered.artifacts[0].content
}

#[test]
fn test_regeneration_is_byte_identical() {
    init_logger();
    let interfaces = parse_interfaces(QUERIER).unwrap();
    let posts = build(&posts_table(), Dialect::Postgres);
    let users = build(&users_table(), Dialect::Postgres);
    let users = attach_relation(&users, RelationKind::HasMany, "posts", Arc::new(posts), &RelateConfig::default())
        .unwrap();
    let settings = Settings {
        dialect: Dialect::Postgres,
        with_unit_test: true,
        ..Settings::default()
    };

    let first = render_model(&users, &interfaces, &settings);
    let second = render_model(&users, &interfaces, &settings);
    assert!(first.diagnostics.is_empty(), "{:?}", first.diagnostics);
    assert_eq!(first.artifacts, second.artifacts);
    assert_eq!(
        render_namespace(&[users.names.clone()], &settings),
        render_namespace(&[users.names.clone()], &settings)
    );
}

#[test]
fn test_skip_directive_suppresses_only_that_method() {
    init_logger();
    let interfaces = parse_interfaces(QUERIER).unwrap();
    let users = build(&users_table(), Dialect::MySql);
    let rendered = render_model(&users, &interfaces, &Settings::default());
    assert!(rendered.diagnostics.is_empty());

    let methods = method_names(artifact(&rendered));
    assert!(methods.contains(&"no_skip_method".to_string()));
    assert!(methods.contains(&"search".to_string()));
    assert!(!methods.contains(&"skip_method".to_string()));
}

#[test]
fn test_skip_directive_removes_builtin() {
    let interfaces = parse_interfaces(
        r#"
        trait Custom {
            /// gen:skip
            fn Count() -> Result<i64, sea_orm::DbErr>;
        }
        "#,
    )
    .unwrap();
    let users = build(&users_table(), Dialect::MySql);
    let rendered = render_model(&users, &interfaces, &Settings::default());
    let methods = method_names(artifact(&rendered));
    assert!(!methods.contains(&"count".to_string()));
    assert!(methods.contains(&"find".to_string()));
}

#[test]
fn test_user_template_overrides_builtin() {
    let interfaces = parse_interfaces(
        r#"
        trait Custom {
            /// SELECT * FROM @@table WHERE @@name = @name
            fn Find(name: &str) -> Result<Vec<gen::T>, sea_orm::DbErr>;
        }
        "#,
    )
    .unwrap();
    let users = build(&users_table(), Dialect::MySql);
    let rendered = render_model(&users, &interfaces, &Settings::default());
    let body = method_body(artifact(&rendered), "find").unwrap();
    assert!(body.contains("SELECT * FROM `users` WHERE `name` = ?"));
    assert!(!body.contains("SELECT `id`, `name`"));

    // the built-in is still there without the override
    let rendered = render_model(&users, &[], &Settings::default());
    let body = method_body(artifact(&rendered), "find").unwrap();
    assert!(body.contains("SELECT `id`, `name`, `age`, `created_at` FROM `users`"));
}

#[test]
fn test_unbound_field_reference_is_reported() {
    let interfaces = parse_interfaces(
        r#"
        trait Broken {
            /// SELECT * FROM @@table WHERE @@NonexistentField = @value
            fn ByMissing(value: i64) -> Result<Vec<gen::T>, sea_orm::DbErr>;
        }
        "#,
    )
    .unwrap();
    let users = build(&users_table(), Dialect::MySql);
    let rendered = render_model(&users, &interfaces, &Settings::default());

    assert_eq!(rendered.diagnostics.len(), 1);
    let diagnostic = &rendered.diagnostics[0];
    assert_eq!(diagnostic.method.as_deref(), Some("by_missing"));
    assert!(matches!(
        &diagnostic.error,
        Error::Template(TemplateError::UnboundFieldReference { path, .. }) if path == "@@NonexistentField"
    ));
    assert!(!method_names(artifact(&rendered)).contains(&"by_missing".to_string()));
    assert!(!artifact(&rendered).contains("NonexistentField"));
}

#[test]
fn test_unresolved_has_one_emits_no_accessor() {
    init_logger();
    let profiles = build(
        &querygen::TableMeta {
            name: "profiles".to_string(),
            columns: vec![
                querygen::ColumnMeta::new("id", "bigint").primary_key(),
                querygen::ColumnMeta::new("owner_ref", "bigint"),
            ],
            ..querygen::TableMeta::default()
        },
        Dialect::MySql,
    );
    let options = BuildOptions::new(Dialect::MySql).with_options([ModelOption::FieldRelate {
        kind: RelationKind::HasOne,
        name: "profile".to_string(),
        target: Arc::new(profiles),
        config: RelateConfig::default(),
    }]);
    let users = querygen::build_model(&users_table(), &options).unwrap();
    let (users, errors) = apply_relations(users, &options);

    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        RelationError::UnresolvedColumn { column, model, .. } if column == "user_id" && model == "Profile"
    ));
    assert!(users.field("profile").is_none());

    let rendered = render_model(&users, &[], &Settings::default());
    let content = artifact(&rendered);
    assert!(!method_names(content).contains(&"profile".to_string()));
    let user = struct_item(content, "User");
    assert_eq!(user.fields.len(), 4);
}

#[test]
fn test_relation_order_follows_attachment_order() {
    let users = build(&users_table(), Dialect::MySql);
    let posts = Arc::new(build(&posts_table(), Dialect::MySql));
    let languages = Arc::new(build(&languages_table(), Dialect::MySql));
    let many = RelateConfig {
        join_table: Some("user_languages".to_string()),
        ..RelateConfig::default()
    };

    let attach = |first: bool| {
        if first {
            let model = attach_relation(&users, RelationKind::HasMany, "posts", posts.clone(), &RelateConfig::default())
                .unwrap();
            attach_relation(&model, RelationKind::ManyToMany, "languages", languages.clone(), &many).unwrap()
        } else {
            let model = attach_relation(&users, RelationKind::ManyToMany, "languages", languages.clone(), &many).unwrap();
            attach_relation(&model, RelationKind::HasMany, "posts", posts.clone(), &RelateConfig::default()).unwrap()
        }
    };

    let names = |model: &querygen::Model| model.relation_fields().map(|field| field.name.clone()).collect::<Vec<_>>();
    assert_eq!(names(&attach(true)), vec!["posts", "languages"]);
    assert_eq!(names(&attach(false)), vec!["languages", "posts"]);

    let settings = Settings::default();
    let same = render_model(&attach(true), &[], &settings);
    let again = render_model(&attach(true), &[], &settings);
    let swapped = render_model(&attach(false), &[], &settings);
    assert_eq!(same.artifacts, again.artifacts);
    // struct field order differs, methods stay sorted by name
    assert_ne!(same.artifacts, swapped.artifacts);
    assert_eq!(method_names(artifact(&same)), method_names(artifact(&swapped)));
}

#[test]
fn test_template_with_clauses_renders_parseable_code() {
    let interfaces = parse_interfaces(QUERIER).unwrap();
    for dialect in [Dialect::MySql, Dialect::Postgres, Dialect::Sqlite] {
        let users = build(&users_table(), dialect);
        let settings = Settings {
            dialect,
            ..Settings::default()
        };
        let rendered = render_model(&users, &interfaces, &settings);
        let content = artifact(&rendered);
        let file = parse(content);
        assert!(content.starts_with("// Code generated by querygen. DO NOT EDIT."));
        assert!(file.items.iter().any(|item| matches!(
            item,
            syn::Item::Fn(function) if function.sig.ident == "where_clause"
        )));
        let body = method_body(content, "search").unwrap();
        assert!(body.contains("where_clause (& __clause0)"));
    }
}

#[test]
fn test_query_interface_mode_renders_trait() {
    let users = build(&users_table(), Dialect::MySql);
    let settings = Settings {
        query_interface: true,
        ..Settings::default()
    };
    let rendered = render_model(&users, &[], &settings);
    let file = parse(artifact(&rendered));
    let interface = file
        .items
        .iter()
        .find_map(|item| match item {
            syn::Item::Trait(item_trait) if item_trait.ident == "IUserDo" => Some(item_trait),
            _ => None,
        })
        .unwrap();
    let names: Vec<String> = interface
        .items
        .iter()
        .filter_map(|item| match item {
            syn::TraitItem::Fn(method) => Some(method.sig.ident.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(
        names,
        vec!["count", "create", "delete_by_pk", "find", "find_by_pk", "first", "last", "take", "update_by_pk"]
    );
}

#[test]
fn test_namespace_declares_every_model() {
    let users = build(&users_table(), Dialect::MySql);
    let posts = build(&posts_table(), Dialect::MySql);
    let settings = Settings {
        with_unit_test: true,
        ..Settings::default()
    };
    let namespace = render_namespace(&[users.names.clone(), posts.names.clone()], &settings);
    assert_eq!(namespace.file_name, "gen.rs");
    let file = parse(&namespace.content);

    let modules: Vec<String> = file
        .items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Mod(module) => Some(module.ident.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(modules, vec!["posts", "posts_test", "users", "users_test"]);
    assert!(namespace.content.contains("pub struct Nullable"));
    assert!(namespace.content.contains("pub fn user (& self) -> users :: UserDo < 'a , C >"));
}
