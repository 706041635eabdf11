use crate::error::BuildError;
use querygen::{Dialect, GenerationOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Generator configuration.
///
/// Every key is optional in JSON:
///
/// ```json
/// { "out_path": "src/query", "dialect": "postgres", "field_nullable": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the artifacts are written to
    pub out_path: PathBuf,
    pub dialect: Dialect,
    /// Render `I<Model>Do` traits
    pub query_interface: bool,
    /// Render the `Query` aggregator in `gen.rs`
    pub with_default_query: bool,
    /// Render `<module>.gen_test.rs` next to each model
    pub with_unit_test: bool,
    /// Nullable columns become `Option<T>`
    pub field_nullable: bool,
    /// Columns with a default become `Option<T>`
    pub field_coverable: bool,
    pub field_with_index_tag: bool,
    /// Upper bound for a whole run
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_path: PathBuf::from("./query"),
            dialect: Dialect::MySql,
            query_interface: false,
            with_default_query: true,
            with_unit_test: false,
            field_nullable: false,
            field_coverable: false,
            field_with_index_tag: false,
            timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BuildError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| BuildError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| BuildError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            nullable_as_pointer: self.field_nullable,
            coverable_as_pointer: self.field_coverable,
            include_index_tag: self.field_with_index_tag,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"dialect":"postgres","field_nullable":true}"#).unwrap();
        assert_eq!(config.dialect, Dialect::Postgres);
        assert!(config.generation_options().nullable_as_pointer);
        assert!(config.with_default_query);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.out_path, PathBuf::from("./query"));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_json_file("/nonexistent/querygen.json"),
            Err(BuildError::Read { .. })
        ));
    }
}
