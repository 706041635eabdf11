//! Emission engine: merges generation units by name and renders artifacts.

mod model;
mod namespace;

pub use model::{render_model_artifact, render_test_artifact};
pub use namespace::{render_namespace_artifact, NAMESPACE_FILE};

use crate::error::{Error, TemplateError};
use crate::synth::{GenerationUnit, Origin};
use log::debug;
use proc_macro2::TokenStream;
use std::collections::BTreeMap;

/// First line of every generated file
pub const HEADER: &str = "// Code generated by querygen. DO NOT EDIT.";

/// One rendered source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name relative to the output directory
    pub file_name: String,
    /// Module the file is declared as in `gen.rs`
    pub module: String,
    pub content: String,
}

impl Artifact {
    fn new(file_name: String, module: String, tokens: TokenStream) -> Self {
        Self {
            file_name,
            module,
            content: format!("{}\n\n{}\n", HEADER, tokens),
        }
    }
}

#[derive(Debug, Clone)]
enum Entry {
    Unit(GenerationUnit),
    Skipped,
}

impl Entry {
    fn origin(&self) -> Origin {
        match self {
            Entry::Unit(unit) => unit.origin,
            Entry::Skipped => Origin::UserTemplate,
        }
    }
}

/// The name-keyed unit set of one model.
///
/// A unit replaces the entry under its name when its origin ranks at least
/// as high (user template > relation-derived > built-in), so among equals
/// the most recently added wins. A skip marker ranks as a user template.
/// Iteration is sorted by name.
#[derive(Debug, Clone, Default)]
pub struct UnitSet {
    entries: BTreeMap<String, Entry>,
}

impl UnitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the unit was kept
    pub fn insert(&mut self, unit: GenerationUnit) -> bool {
        if let Some(existing) = self.entries.get(&unit.name) {
            if unit.origin < existing.origin() {
                debug!(
                    "{}::{} ({:?}) is shadowed by a {:?} unit",
                    unit.model,
                    unit.name,
                    unit.origin,
                    existing.origin()
                );
                return false;
            }
        }
        self.entries.insert(unit.name.clone(), Entry::Unit(unit));
        true
    }

    /// Suppress everything under `name`, whatever was added before.
    ///
    /// The marker ranks as a user template, so a user template added after
    /// it (a later interface redefining the method) takes the name back.
    pub fn skip(&mut self, name: impl Into<String>) {
        self.entries.insert(name.into(), Entry::Skipped);
    }

    pub fn extend(&mut self, units: impl IntoIterator<Item = GenerationUnit>) {
        for unit in units {
            self.insert(unit);
        }
    }

    pub fn get(&self, name: &str) -> Option<&GenerationUnit> {
        match self.entries.get(name) {
            Some(Entry::Unit(unit)) => Some(unit),
            _ => None,
        }
    }

    pub fn is_skipped(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(Entry::Skipped))
    }

    /// Surviving units, sorted by name
    pub fn units(&self) -> impl Iterator<Item = &GenerationUnit> {
        self.entries.values().filter_map(|entry| match entry {
            Entry::Unit(unit) => Some(unit),
            Entry::Skipped => None,
        })
    }

    pub fn len(&self) -> usize {
        self.units().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse the rendered text of a unit back into tokens
fn unit_tokens(unit: &GenerationUnit, text: &str) -> Result<TokenStream, Error> {
    text.parse().map_err(|err: proc_macro2::LexError| {
        Error::Template(TemplateError::InvalidContract {
            method: unit.name.clone(),
            message: format!("rendered method does not tokenize: {}", err),
        })
    })
}
