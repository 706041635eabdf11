//! Naming conventions shared by every generated artifact.
//!
//! A table name is resolved once into all the names derived from it (model
//! struct, query object, interface trait, module) so emission never has to
//! re-derive them with ad-hoc string manipulation.

use heck::{ToPascalCase, ToSnakeCase};
use proc_macro2::{Ident, Span};

/// All the names generated for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNames {
    /// Struct name in PascalCase (e.g. "CreditCard")
    pub model_name: String,
    /// Table identifier as given by the metadata (e.g. "credit_cards")
    pub table_name: String,
    /// Module and artifact stem (e.g. "credit_cards")
    pub module_name: String,
}

impl ModelNames {
    /// Derive names from a table name, singularizing it for the struct name
    pub fn from_table_name(table_name: &str) -> Self {
        let model_name = singularize(&table_name.to_snake_case()).to_pascal_case();
        Self::with_model_name(table_name, &model_name)
    }

    /// Use an explicit model name for a table
    pub fn with_model_name(table_name: &str, model_name: &str) -> Self {
        Self {
            model_name: sanitize_ident(&model_name.to_pascal_case()),
            table_name: table_name.to_string(),
            module_name: sanitize_ident(&table_name.to_snake_case()),
        }
    }

    /// Query object name (e.g. "CreditCardDo")
    pub fn do_name(&self) -> String {
        format!("{}Do", self.model_name)
    }

    /// Query interface trait name (e.g. "ICreditCardDo")
    pub fn interface_name(&self) -> String {
        format!("I{}Do", self.model_name)
    }

    /// Artifact file name (e.g. "credit_cards.gen.rs")
    pub fn file_name(&self) -> String {
        format!("{}.gen.rs", self.module_name)
    }

    /// Unit test artifact file name (e.g. "credit_cards.gen_test.rs")
    pub fn test_file_name(&self) -> String {
        format!("{}.gen_test.rs", self.module_name)
    }
}

/// Naive English singularization, good enough for table names
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") && word.len() > 1 {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Naive English pluralization, the inverse of [`singularize`] for table names
pub fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.is_empty() && !stem.ends_with(|c: char| "aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|suffix| word.ends_with(suffix)) {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

/// Default column -> field name transform
pub fn field_name(column: &str) -> String {
    sanitize_ident(&column.to_snake_case())
}

/// Make `name` usable as a Rust identifier
pub fn sanitize_ident(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    // These cannot be raw identifiers
    if matches!(out.as_str(), "self" | "Self" | "super" | "crate" | "_") {
        out.push('_');
    }
    out
}

/// Whether `name` parses as a plain (non-keyword) identifier
pub fn is_valid_identifier(name: &str) -> bool {
    syn::parse_str::<Ident>(name).is_ok()
}

/// Identifier for an already sanitized name; keywords become raw identifiers
pub fn ident(name: &str) -> Ident {
    if is_valid_identifier(name) {
        Ident::new(name, Span::call_site())
    } else {
        Ident::new_raw(name, Span::call_site())
    }
}
