//! Per-model generation: collect built-in, relation-derived and user
//! units, merge them and render the model's artifacts.
//!
//! Everything here is a pure function of its inputs, so models can be
//! rendered on separate tasks and the results written independently.

use crate::accessor::relation_units;
use crate::contract::Interface;
use crate::crud::builtin_units;
use crate::dialect::Dialect;
use crate::emit::{render_model_artifact, render_namespace_artifact, render_test_artifact, Artifact, UnitSet};
use crate::error::Diagnostic;
use crate::model::Model;
use crate::naming::ModelNames;
use crate::synth::{method_name, synthesize, Synthesis};
use crate::NameStrategy;
use log::{debug, warn};
use std::fmt;

/// Rendering switches shared by every model of a run
#[derive(Clone)]
pub struct Settings {
    pub dialect: Dialect,
    /// Render an `I<Model>Do` trait and implement it, instead of inherent methods
    pub query_interface: bool,
    /// Also render `<module>.gen_test.rs`
    pub with_unit_test: bool,
    /// Render the `Query` aggregator in `gen.rs`
    pub with_default_query: bool,
    /// Contract name -> method name; snake_case when unset
    pub method_name_strategy: Option<NameStrategy>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            query_interface: false,
            with_unit_test: false,
            with_default_query: true,
            method_name_strategy: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("dialect", &self.dialect)
            .field("query_interface", &self.query_interface)
            .field("with_unit_test", &self.with_unit_test)
            .field("with_default_query", &self.with_default_query)
            .field("method_name_strategy", &self.method_name_strategy.is_some())
            .finish()
    }
}

/// Output of one model
#[derive(Debug)]
pub struct RenderedModel {
    pub names: ModelNames,
    pub artifacts: Vec<Artifact>,
    /// Methods left out, and why
    pub diagnostics: Vec<Diagnostic>,
}

/// Merge every unit that applies to `model`.
///
/// Built-in units go in first, relation accessors next, then the contracts
/// of each interface in order, so a later interface overrides an earlier one
/// method by method. A failed contract is reported and left out; it never
/// falls back to the unit it would have replaced.
pub fn collect_units(model: &Model, interfaces: &[Interface], settings: &Settings) -> (UnitSet, Vec<Diagnostic>) {
    let mut units = UnitSet::new();
    let mut diagnostics = Vec::new();
    units.extend(builtin_units(model, settings.dialect));
    units.extend(relation_units(model, settings.dialect));

    for interface in interfaces {
        for contract in interface.methods.iter().filter(|contract| contract.applies_to(model)) {
            match synthesize(contract, model, settings) {
                Ok(Synthesis::Unit(unit)) => {
                    units.insert(unit);
                }
                Ok(Synthesis::Skipped { name }) => units.skip(name),
                Err(err) => {
                    let name = method_name(contract, settings);
                    warn!("{}::{} from {} was not generated: {}", model.model_name(), name, interface.name, err);
                    units.skip(name.clone());
                    diagnostics.push(Diagnostic::method(model.model_name(), name, err));
                }
            }
        }
    }
    (units, diagnostics)
}

/// Render the artifacts of one model
pub fn render_model(model: &Model, interfaces: &[Interface], settings: &Settings) -> RenderedModel {
    let (units, mut diagnostics) = collect_units(model, interfaces, settings);
    let mut artifacts = Vec::new();
    match render_model_artifact(model, &units, settings) {
        Ok(artifact) => {
            artifacts.push(artifact);
            if settings.with_unit_test {
                artifacts.push(render_test_artifact(model));
            }
        }
        Err(err) => {
            warn!("{} was not rendered: {}", model.model_name(), err);
            diagnostics.push(Diagnostic::model(model.model_name(), err));
        }
    }
    debug!(
        "{}: {} artifact(s), {} diagnostic(s)",
        model.model_name(),
        artifacts.len(),
        diagnostics.len()
    );
    RenderedModel {
        names: model.names.clone(),
        artifacts,
        diagnostics,
    }
}

/// Render `gen.rs` for the given models
pub fn render_namespace(models: &[ModelNames], settings: &Settings) -> Artifact {
    render_namespace_artifact(models, settings)
}
