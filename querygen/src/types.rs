//! Storage type -> Rust type mapping.
//!
//! The mapper is a pure function of its inputs: the same storage type,
//! nullability and overrides always give the same Rust type, which is what
//! keeps regenerated artifacts identical.

use crate::dialect::Dialect;
use crate::error::SchemaError;
use crate::tag::TagSet;
use once_cell::sync::Lazy;
use regex::Regex;

static TYPE_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^)]*)\)").expect("type parameter pattern is valid"));

/// Type families of the recognised storage vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Float,
    String,
    Boolean,
    Time,
    Blob,
    Json,
    Uuid,
}

/// A storage type split into its name, parameters and modifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageType {
    /// Lowercase base name with single spaces, e.g. "character varying"
    pub name: String,
    /// Length / precision / enum values, e.g. ["10", "2"]
    pub params: Vec<String>,
    pub unsigned: bool,
}

impl StorageType {
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        let params = TYPE_PARAMS
            .captures(&lower)
            .and_then(|caps| caps.get(1))
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|p| p.trim().trim_matches('\'').to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let stripped = TYPE_PARAMS.replace_all(&lower, " ");
        let mut unsigned = false;
        let words: Vec<&str> = stripped
            .split_whitespace()
            .filter(|word| match *word {
                "unsigned" => {
                    unsigned = true;
                    false
                }
                "zerofill" | "signed" => false,
                _ => true,
            })
            .collect();
        Self {
            name: words.join(" "),
            params,
            unsigned,
        }
    }
}

/// How a nullable or coverable value is wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    /// `T`
    Plain,
    /// `Option<T>`
    Optional,
    /// `Nullable<T>`, the value/valid pair emitted in the query namespace
    NullScalar,
}

/// Flags that decided the shape of a mapped type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderHints {
    pub nullable: bool,
    pub coverable: bool,
    pub overridden: bool,
}

/// Result of mapping one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedType {
    /// Rust type without wrapper, e.g. "i64" or "chrono::NaiveDateTime"
    pub base: String,
    pub family: Option<TypeFamily>,
    pub wrapper: Wrapper,
    pub hints: RenderHints,
}

impl MappedType {
    /// Rust type as it appears in the struct field
    pub fn render(&self) -> String {
        match self.wrapper {
            Wrapper::Plain => self.base.clone(),
            Wrapper::Optional => format!("Option<{}>", self.base),
            Wrapper::NullScalar => format!("super::Nullable<{}>", self.base),
        }
    }
}

/// Caller supplied adjustments for one column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeOverrides {
    /// Explicit Rust type replacing the mapped one
    pub rust_type: Option<String>,
    /// The column has a default value
    pub has_default: bool,
}

/// Maps storage types to Rust types for one dialect and one option set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeMapper {
    pub dialect: Dialect,
    pub nullable_as_pointer: bool,
    pub coverable_as_pointer: bool,
}

impl TypeMapper {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Map a column's storage type. `column` only labels errors.
    pub fn map(
        &self,
        column: &str,
        storage_type: &str,
        nullable: bool,
        overrides: &TypeOverrides,
    ) -> Result<MappedType, SchemaError> {
        let resolved = self.resolve(storage_type);
        let (base, family, overridden) = match (&overrides.rust_type, resolved) {
            (Some(ty), resolved) => {
                let overridden = resolved.map_or(true, |(base, _)| base != *ty);
                (ty.clone(), resolved.map(|(_, family)| family), overridden)
            }
            (None, Some((base, family))) => (base.to_string(), Some(family), false),
            (None, None) => {
                return Err(SchemaError::UnsupportedType {
                    column: column.to_string(),
                    storage_type: storage_type.to_string(),
                })
            }
        };

        let coverable = overrides.has_default && !nullable && self.coverable_as_pointer;
        let wrapper = if nullable {
            if self.nullable_as_pointer {
                Wrapper::Optional
            } else {
                Wrapper::NullScalar
            }
        } else if coverable {
            Wrapper::Optional
        } else {
            Wrapper::Plain
        };

        Ok(MappedType {
            base,
            family,
            wrapper,
            hints: RenderHints {
                nullable,
                coverable,
                overridden,
            },
        })
    }

    /// Rust type and family for a storage type, if it is in the vocabulary
    pub fn resolve(&self, storage_type: &str) -> Option<(&'static str, TypeFamily)> {
        let parsed = StorageType::parse(storage_type);
        let unsigned = parsed.unsigned;
        let pick = |signed: &'static str, unsigned_ty: &'static str| {
            if unsigned {
                unsigned_ty
            } else {
                signed
            }
        };

        let resolved = match parsed.name.as_str() {
            "tinyint" if self.dialect == Dialect::MySql && parsed.params == ["1"] => {
                ("bool", TypeFamily::Boolean)
            }
            "tinyint" => (pick("i8", "u8"), TypeFamily::Integer),
            "smallint" | "int2" | "smallserial" | "year" => (pick("i16", "u16"), TypeFamily::Integer),
            // SQLite integers are always 64 bit
            "integer" | "int" if self.dialect == Dialect::Sqlite => ("i64", TypeFamily::Integer),
            "mediumint" | "int" | "integer" | "int4" | "serial" => {
                (pick("i32", "u32"), TypeFamily::Integer)
            }
            "bigint" | "int8" | "bigserial" => (pick("i64", "u64"), TypeFamily::Integer),
            "float" | "real" | "float4" => ("f32", TypeFamily::Float),
            "double" | "double precision" | "float8" | "decimal" | "numeric" => {
                ("f64", TypeFamily::Float)
            }
            "char" | "varchar" | "character" | "character varying" | "text" | "tinytext"
            | "mediumtext" | "longtext" | "enum" | "set" | "citext" | "nvarchar" | "nchar" => {
                ("String", TypeFamily::String)
            }
            "bool" | "boolean" | "bit" => ("bool", TypeFamily::Boolean),
            "date" => ("chrono::NaiveDate", TypeFamily::Time),
            "time" | "time without time zone" => ("chrono::NaiveTime", TypeFamily::Time),
            "datetime" | "timestamp" | "timestamp without time zone" => {
                ("chrono::NaiveDateTime", TypeFamily::Time)
            }
            "timestamptz" | "timestamp with time zone" => {
                ("chrono::DateTime<chrono::Utc>", TypeFamily::Time)
            }
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bytea" => {
                ("Vec<u8>", TypeFamily::Blob)
            }
            "json" | "jsonb" => ("serde_json::Value", TypeFamily::Json),
            "uuid" => ("uuid::Uuid", TypeFamily::Uuid),
            _ => return None,
        };
        Some(resolved)
    }

    /// Storage type for a Rust type declared on a struct-sourced model
    pub fn infer_storage_type(&self, rust_type: &str) -> Option<&'static str> {
        let compact: String = rust_type.chars().filter(|c| !c.is_whitespace()).collect();
        let last = compact.rsplit("::").next().unwrap_or(&compact);
        let postgres = self.dialect == Dialect::Postgres;
        let mysql = self.dialect == Dialect::MySql;
        let storage = match last {
            "i8" => "tinyint",
            "i16" => "smallint",
            "i32" if self.dialect == Dialect::Sqlite => "int4",
            "i32" => "integer",
            "i64" => "bigint",
            "u8" if mysql => "tinyint unsigned",
            "u16" if mysql => "smallint unsigned",
            "u32" if mysql => "int unsigned",
            "u64" if mysql => "bigint unsigned",
            "u8" | "u16" => "smallint",
            "u32" | "u64" => "bigint",
            "f32" => "real",
            "f64" if postgres => "double precision",
            "f64" => "double",
            "bool" => "boolean",
            "String" | "str" | "&str" if postgres => "text",
            "String" | "str" | "&str" => "varchar(255)",
            "NaiveDate" => "date",
            "NaiveTime" => "time",
            "NaiveDateTime" if postgres => "timestamp",
            "NaiveDateTime" => "datetime",
            "Utc>" | "DateTime<Utc>" | "DateTime<chrono::Utc>" => "timestamptz",
            "Vec<u8>" if postgres => "bytea",
            "Vec<u8>" => "blob",
            "Value" if postgres => "jsonb",
            "Value" => "json",
            "Uuid" => "uuid",
            _ => return None,
        };
        Some(storage)
    }
}

impl RenderHints {
    /// Recover the hints from a rendered field declaration.
    ///
    /// The field's `gorm:"..."` doc tag gives back the storage type and the
    /// `not null`/`default` flags; the field type gives back the wrapper.
    /// Returns `None` when the field carries no tag or no storage type.
    pub fn recover(field: &syn::Field, mapper: &TypeMapper) -> Option<(RenderHints, Wrapper)> {
        let tags = doc_tag(&field.attrs)?;
        let storage = tags.first("type")?;
        let nullable = !tags.contains("not null");
        let (wrapper, inner) = unwrap_type(&field.ty);
        let coverable = !nullable && wrapper == Wrapper::Optional && tags.contains("default");
        let overridden = match mapper.resolve(storage) {
            Some((base, _)) => normalize(base) != normalize(&inner),
            None => true,
        };
        Some((
            RenderHints {
                nullable,
                coverable,
                overridden,
            },
            wrapper,
        ))
    }
}

/// The gorm tag carried by a field's `#[doc = "gorm:\"...\""]` attribute
pub fn doc_tag(attrs: &[syn::Attribute]) -> Option<TagSet> {
    attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("doc") {
            return None;
        }
        let syn::Meta::NameValue(nv) = &attr.meta else {
            return None;
        };
        let syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) = &nv.value
        else {
            return None;
        };
        let value = lit.value();
        let inner = value.trim().strip_prefix("gorm:\"")?.strip_suffix('"')?;
        Some(TagSet::parse(inner))
    })
}

fn unwrap_type(ty: &syn::Type) -> (Wrapper, String) {
    if let syn::Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            let wrapper = match segment.ident.to_string().as_str() {
                "Option" => Some(Wrapper::Optional),
                "Nullable" => Some(Wrapper::NullScalar),
                _ => None,
            };
            if let (Some(wrapper), syn::PathArguments::AngleBracketed(args)) =
                (wrapper, &segment.arguments)
            {
                if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                    return (wrapper, quote::quote!(#inner).to_string());
                }
            }
        }
    }
    (Wrapper::Plain, quote::quote!(#ty).to_string())
}

fn normalize(ty: &str) -> String {
    ty.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> TypeMapper {
        TypeMapper {
            dialect: Dialect::MySql,
            nullable_as_pointer: true,
            coverable_as_pointer: false,
        }
    }

    #[test]
    fn test_parse_storage_type() {
        let parsed = StorageType::parse("BIGINT(20) UNSIGNED");
        assert_eq!(parsed.name, "bigint");
        assert_eq!(parsed.params, vec!["20"]);
        assert!(parsed.unsigned);

        let parsed = StorageType::parse("timestamp(6) with time zone");
        assert_eq!(parsed.name, "timestamp with time zone");
        assert_eq!(parsed.params, vec!["6"]);
    }

    #[test]
    fn test_map_integer_variants() {
        let m = mapper();
        let none = TypeOverrides::default();
        assert_eq!(m.map("t.a", "bigint(20) unsigned", false, &none).unwrap().base, "u64");
        assert_eq!(m.map("t.a", "int", false, &none).unwrap().base, "i32");
        assert_eq!(m.map("t.a", "tinyint(1)", false, &none).unwrap().base, "bool");

        let sqlite = TypeMapper::new(Dialect::Sqlite);
        assert_eq!(sqlite.map("t.a", "integer", false, &none).unwrap().base, "i64");
        let pg = TypeMapper::new(Dialect::Postgres);
        assert_eq!(pg.map("t.a", "tinyint(1)", false, &none).unwrap().base, "i8");
    }

    #[test]
    fn test_nullable_wrapping() {
        let none = TypeOverrides::default();
        let pointer = mapper().map("t.a", "varchar(64)", true, &none).unwrap();
        assert_eq!(pointer.render(), "Option<String>");

        let scalar = TypeMapper::new(Dialect::MySql)
            .map("t.a", "varchar(64)", true, &none)
            .unwrap();
        assert_eq!(scalar.render(), "super::Nullable<String>");
        assert!(scalar.hints.nullable);
    }

    #[test]
    fn test_coverable_wraps_defaulted_columns() {
        let m = TypeMapper {
            coverable_as_pointer: true,
            ..mapper()
        };
        let overrides = TypeOverrides {
            rust_type: None,
            has_default: true,
        };
        let mapped = m.map("t.a", "int", false, &overrides).unwrap();
        assert_eq!(mapped.wrapper, Wrapper::Optional);
        assert!(mapped.hints.coverable);
    }

    #[test]
    fn test_unsupported_type_names_column() {
        let err = mapper()
            .map("users.shape", "geometry", false, &TypeOverrides::default())
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnsupportedType {
                column: "users.shape".to_string(),
                storage_type: "geometry".to_string(),
            }
        );
    }

    #[test]
    fn test_override_replaces_base() {
        let overrides = TypeOverrides {
            rust_type: Some("MyShape".to_string()),
            has_default: false,
        };
        let mapped = mapper().map("t.shape", "geometry", false, &overrides).unwrap();
        assert_eq!(mapped.base, "MyShape");
        assert!(mapped.hints.overridden);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let m = mapper();
        let none = TypeOverrides::default();
        for storage in ["datetime", "json", "decimal(10,2)", "uuid", "longblob"] {
            assert_eq!(m.map("t.a", storage, true, &none), m.map("t.a", storage, true, &none));
        }
    }

    #[test]
    fn test_infer_storage_type() {
        let m = TypeMapper::new(Dialect::Postgres);
        assert_eq!(m.infer_storage_type("String"), Some("text"));
        assert_eq!(m.infer_storage_type("chrono::NaiveDateTime"), Some("timestamp"));
        assert_eq!(m.infer_storage_type("Vec < u8 >"), Some("bytea"));
        assert_eq!(m.infer_storage_type("Post"), None);
    }
}
