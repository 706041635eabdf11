#![allow(dead_code)]

use querygen::{build_model, BuildOptions, ColumnMeta, Dialect, Model, TableMeta};
use quote::ToTokens;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn users_table() -> TableMeta {
    TableMeta {
        name: "users".to_string(),
        columns: vec![
            ColumnMeta::new("id", "bigint").primary_key().auto_increment(),
            ColumnMeta::new("name", "varchar(64)"),
            ColumnMeta::new("age", "int").nullable(),
            ColumnMeta::new("created_at", "datetime"),
        ],
        ..TableMeta::default()
    }
}

pub fn posts_table() -> TableMeta {
    TableMeta {
        name: "posts".to_string(),
        columns: vec![
            ColumnMeta::new("id", "bigint").primary_key().auto_increment(),
            ColumnMeta::new("user_id", "bigint"),
            ColumnMeta::new("title", "varchar(255)"),
        ],
        ..TableMeta::default()
    }
}

pub fn languages_table() -> TableMeta {
    TableMeta {
        name: "languages".to_string(),
        columns: vec![
            ColumnMeta::new("id", "bigint").primary_key(),
            ColumnMeta::new("code", "char(2)"),
        ],
        ..TableMeta::default()
    }
}

pub fn build(table: &TableMeta, dialect: Dialect) -> Model {
    build_model(table, &BuildOptions::new(dialect)).unwrap()
}

/// Contract source exercising skip, override and templates
pub const QUERIER: &str = r#"
    /// gen:for users
    trait Querier {
        /// SELECT * FROM @@table WHERE @@id = @id
        fn NoSkipMethod(id: i64) -> Result<Option<gen::T>, sea_orm::DbErr>;

        /// gen:skip
        fn SkipMethod(id: i64) -> Result<gen::T, sea_orm::DbErr>;

        /// SELECT * FROM @@table
        /// {{where}}
        ///   {{if name != ""}} @@name = @name {{end}}
        ///   {{if min_age != nil}} AND @@age >= @min_age {{end}}
        /// {{end}}
        fn Search(name: &str, min_age: Option<i32>) -> Result<Vec<gen::T>, sea_orm::DbErr>;
    }
"#;

pub fn parse(content: &str) -> syn::File {
    syn::parse_file(content).unwrap_or_else(|err| panic!("artifact does not parse: {}\n{}", err, content))
}

/// Names of every method defined in an `impl` block of the artifact
pub fn method_names(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    for item in parse(content).items {
        if let syn::Item::Impl(item_impl) = item {
            for impl_item in item_impl.items {
                if let syn::ImplItem::Fn(method) = impl_item {
                    names.push(method.sig.ident.to_string());
                }
            }
        }
    }
    names
}

/// Rendered body of the method `name`, if the artifact defines it
pub fn method_body(content: &str, name: &str) -> Option<String> {
    parse(content).items.into_iter().find_map(|item| match item {
        syn::Item::Impl(item_impl) => item_impl.items.into_iter().find_map(|impl_item| match impl_item {
            syn::ImplItem::Fn(method) if method.sig.ident == name => Some(method.block.to_token_stream().to_string()),
            _ => None,
        }),
        _ => None,
    })
}

pub fn struct_item(content: &str, name: &str) -> syn::ItemStruct {
    parse(content)
        .items
        .into_iter()
        .find_map(|item| match item {
            syn::Item::Struct(item_struct) if item_struct.ident == name => Some(item_struct),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no struct {} in artifact", name))
}
