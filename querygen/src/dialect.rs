use proc_macro2::TokenStream;
use quote::quote;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL dialect the generated code targets.
///
/// The dialect is picked once, when the generator is configured, and passed
/// down explicitly to the type mapper and the template renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Quote a table or column identifier
    pub fn quote_ident(self, name: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
            Dialect::Postgres | Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Postgres numbers its bind parameters, the others use `?`
    pub fn numbered_placeholders(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Placeholder for the 1-based bind position `index`
    pub fn placeholder(self, index: usize) -> String {
        if self.numbered_placeholders() {
            format!("${}", index)
        } else {
            "?".to_string()
        }
    }

    /// Comma separated placeholders for positions `start..start + count`
    pub fn placeholders(self, start: usize, count: usize) -> String {
        (start..start + count)
            .map(|index| self.placeholder(index))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `sea_orm::DbBackend` variant used by generated statements
    pub fn backend_tokens(self) -> TokenStream {
        match self {
            Dialect::MySql => quote! { ::sea_orm::DbBackend::MySql },
            Dialect::Postgres => quote! { ::sea_orm::DbBackend::Postgres },
            Dialect::Sqlite => quote! { ::sea_orm::DbBackend::Sqlite },
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgres",
            Dialect::Sqlite => "sqlite",
        })
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}
