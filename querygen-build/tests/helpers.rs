#![allow(dead_code)]

use querygen::{ColumnMeta, Dialect, TableMeta};
use querygen_build::Config;
use std::path::Path;

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

pub fn config(out_path: &Path, dialect: Dialect) -> Config {
    Config {
        out_path: out_path.to_path_buf(),
        dialect,
        with_unit_test: true,
        ..Config::default()
    }
}

pub fn file_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
        .collect()
}

/// Parse a written artifact, panicking with its content on failure
pub fn parse_file(path: &Path) -> syn::File {
    let content = std::fs::read_to_string(path).unwrap();
    syn::parse_file(&content).unwrap_or_else(|err| panic!("{}: {}\n{}", path.display(), err, content))
}

pub const QUERIES: &str = r#"
    trait UserQueries {
        /// gen:for users
        /// SELECT * FROM @@table WHERE @@name = @name
        fn FindByName(name: String) -> Result<Vec<gen::T>, sea_orm::DbErr>;

        /// gen:for users
        /// SELECT * FROM @@table WHERE @@nickname = @name
        fn FindByNickname(name: String) -> Result<Vec<gen::T>, sea_orm::DbErr>;
    }
"#;
