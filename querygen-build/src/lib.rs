//! Build-time driver for querygen.
//!
//! [`Generator`] owns the configuration of a run: the table metadata, the
//! naming hooks and the models registered for output together with the
//! contract traits applied to them. [`Generator::execute`] renders every
//! registered model on its own task and writes the artifacts under
//! [`Config::out_path`]. Relation targets of registered models are written
//! too, with their built-in units, so every referenced module exists.

mod config;
mod error;
mod scan;

pub use config::Config;
pub use error::BuildError;
pub use scan::{discover_interfaces, discover_structs, generate_from_dirs, scan_sources, SourceFile};

use log::{debug, info, warn};
use querygen::{
    apply_relations, build_model, build_models_from_structs, parse_interfaces, parse_structs, render_model,
    render_namespace, BuildOptions, Diagnostic, Interface, Model, ModelNames, ModelOption, NameStrategy,
    RenderedModel, SchemaError, Settings, StructMeta, TableMeta, NAMESPACE_FILE,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

/// A model registered for output and the interfaces bound to it
#[derive(Debug, Clone)]
struct Registration {
    model: Arc<Model>,
    interfaces: Vec<Interface>,
}

/// Collects models and contracts, then renders and writes them
pub struct Generator {
    config: Config,
    tables: Vec<TableMeta>,
    field_name_strategy: Option<NameStrategy>,
    json_tag_strategy: Option<NameStrategy>,
    method_name_strategy: Option<NameStrategy>,
    /// Every model built so far, latest per module name
    generated: Vec<Arc<Model>>,
    /// Insertion order; one entry per module name
    registrations: Vec<Registration>,
    diagnostics: Vec<Diagnostic>,
}

/// Outcome of a run
#[derive(Debug)]
pub struct Report {
    /// Every file written, sorted
    pub written: Vec<PathBuf>,
    /// Models, relations and methods left out, and why
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    /// The written files, or every diagnostic when something was left out
    pub fn into_result(self) -> Result<Vec<PathBuf>, BuildError> {
        if self.diagnostics.is_empty() {
            Ok(self.written)
        } else {
            Err(BuildError::Diagnostics(self.diagnostics))
        }
    }
}

impl Generator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tables: Vec::new(),
            field_name_strategy: None,
            json_tag_strategy: None,
            method_name_strategy: None,
            generated: Vec::new(),
            registrations: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Add table metadata; a table already known by name is replaced
    pub fn use_tables(&mut self, tables: impl IntoIterator<Item = TableMeta>) -> &mut Self {
        for table in tables {
            match self.tables.iter_mut().find(|known| known.name == table.name) {
                Some(known) => *known = table,
                None => self.tables.push(table),
            }
        }
        self
    }

    /// Load a JSON array of table metadata
    pub fn load_tables_json(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, BuildError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| BuildError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let tables: Vec<TableMeta> = serde_json::from_str(&raw).map_err(|source| BuildError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("loaded {} table(s) from {}", tables.len(), path.display());
        Ok(self.use_tables(tables))
    }

    pub fn with_field_name_strategy(&mut self, strategy: impl Fn(&str) -> String + Send + Sync + 'static) -> &mut Self {
        self.field_name_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_json_tag_strategy(&mut self, strategy: impl Fn(&str) -> String + Send + Sync + 'static) -> &mut Self {
        self.json_tag_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_method_name_strategy(&mut self, strategy: impl Fn(&str) -> String + Send + Sync + 'static) -> &mut Self {
        self.method_name_strategy = Some(Arc::new(strategy));
        self
    }

    fn build_options(&self, model_name: Option<String>, options: Vec<ModelOption>) -> BuildOptions {
        BuildOptions {
            dialect: self.config.dialect,
            generation: self.config.generation_options(),
            model_name,
            field_name_strategy: self.field_name_strategy.clone(),
            json_tag_strategy: self.json_tag_strategy.clone(),
            model_options: options,
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            dialect: self.config.dialect,
            query_interface: self.config.query_interface,
            with_unit_test: self.config.with_unit_test,
            with_default_query: self.config.with_default_query,
            method_name_strategy: self.method_name_strategy.clone(),
        }
    }

    /// Build the model of a loaded table.
    ///
    /// `None` when the table is unknown or its schema cannot be normalized;
    /// the reason is kept as a diagnostic. Relations that fail to attach are
    /// dropped from the model and reported the same way.
    pub fn generate_model(&mut self, table: &str, options: Vec<ModelOption>) -> Option<Arc<Model>> {
        self.generate(table, None, options)
    }

    /// Like [`generate_model`](Self::generate_model) with an explicit struct name
    pub fn generate_model_as(&mut self, table: &str, model_name: &str, options: Vec<ModelOption>) -> Option<Arc<Model>> {
        self.generate(table, Some(model_name.to_string()), options)
    }

    /// A model for every loaded table, in load order
    pub fn generate_all_tables(&mut self, options: Vec<ModelOption>) -> Vec<Arc<Model>> {
        let names: Vec<String> = self.tables.iter().map(|table| table.name.clone()).collect();
        names
            .iter()
            .filter_map(|name| self.generate(name, None, options.clone()))
            .collect()
    }

    fn generate(&mut self, table_name: &str, model_name: Option<String>, options: Vec<ModelOption>) -> Option<Arc<Model>> {
        let label = model_name
            .clone()
            .unwrap_or_else(|| ModelNames::from_table_name(table_name).model_name);
        let Some(table) = self.tables.iter().find(|table| table.name == table_name) else {
            let err = SchemaError::UnknownTable {
                table: table_name.to_string(),
            };
            warn!("{}: {}", label, err);
            self.diagnostics.push(Diagnostic::model(label, err));
            return None;
        };

        let options = self.build_options(model_name, options);
        let model = match build_model(table, &options) {
            Ok(model) => model,
            Err(err) => {
                warn!("{} was not generated: {}", label, err);
                self.diagnostics.push(Diagnostic::model(label, err));
                return None;
            }
        };
        let (model, errors) = apply_relations(model, &options);
        for err in errors {
            warn!("{}: relation dropped: {}", model.model_name(), err);
            self.diagnostics.push(Diagnostic::model(model.model_name(), err));
        }
        debug!("built model {} from table {}", model.model_name(), table_name);
        let model = Arc::new(model);
        self.track(&model);
        Some(model)
    }

    /// Models for annotated structs, relations resolved between them
    pub fn generate_models(&mut self, structs: &[StructMeta], options: Vec<ModelOption>) -> Vec<Arc<Model>> {
        let options = self.build_options(None, options);
        let (models, diagnostics) = build_models_from_structs(structs, &options);
        self.diagnostics.extend(diagnostics);
        let models: Vec<Arc<Model>> = models.into_iter().map(Arc::new).collect();
        for model in &models {
            self.track(model);
        }
        models
    }

    fn track(&mut self, model: &Arc<Model>) {
        let module = &model.names.module_name;
        match self.generated.iter_mut().find(|known| &known.names.module_name == module) {
            Some(known) => *known = model.clone(),
            None => self.generated.push(model.clone()),
        }
    }

    /// Registered models followed by every relation target they reach.
    ///
    /// A target is written from its latest generated model when there is
    /// one, so its own relations are followed too; otherwise from the
    /// relation's snapshot. Targets carry no interfaces.
    fn outputs(&self) -> Vec<Registration> {
        let mut outputs = self.registrations.clone();
        let mut modules: BTreeSet<String> = outputs
            .iter()
            .map(|registration| registration.model.names.module_name.clone())
            .collect();
        let mut index = 0;
        while index < outputs.len() {
            let targets: Vec<Arc<Model>> = outputs[index]
                .model
                .relation_fields()
                .filter_map(|field| field.relation.as_ref())
                .map(|relation| relation.target.clone())
                .collect();
            for target in targets {
                if !modules.insert(target.names.module_name.clone()) {
                    continue;
                }
                let model = self
                    .generated
                    .iter()
                    .find(|known| known.names.module_name == target.names.module_name)
                    .cloned()
                    .unwrap_or(target);
                debug!(
                    "{} is written as a relation target of {}",
                    model.model_name(),
                    outputs[index].model.model_name()
                );
                outputs.push(Registration {
                    model,
                    interfaces: Vec::new(),
                });
            }
            index += 1;
        }
        outputs
    }

    /// Parse `source` for structs, then [`generate_models`](Self::generate_models)
    pub fn generate_models_from_structs(
        &mut self,
        source: &str,
        options: Vec<ModelOption>,
    ) -> Result<Vec<Arc<Model>>, BuildError> {
        let structs = parse_structs(source)?;
        Ok(self.generate_models(&structs, options))
    }

    fn register(&mut self, model: Arc<Model>) -> &mut Registration {
        let module = model.names.module_name.clone();
        let index = match self
            .registrations
            .iter()
            .position(|registration| registration.model.names.module_name == module)
        {
            Some(index) => {
                self.registrations[index].model = model;
                index
            }
            None => {
                self.registrations.push(Registration {
                    model,
                    interfaces: Vec::new(),
                });
                self.registrations.len() - 1
            }
        };
        &mut self.registrations[index]
    }

    /// Register models for output with their built-in and relation units only
    pub fn apply_basic(&mut self, models: impl IntoIterator<Item = Arc<Model>>) -> &mut Self {
        for model in models {
            self.register(model);
        }
        self
    }

    /// Parse contract traits from `source` and bind them to `models`
    pub fn apply_interface(&mut self, source: &str, models: &[Arc<Model>]) -> Result<&mut Self, BuildError> {
        let interfaces = parse_interfaces(source)?;
        Ok(self.apply_interfaces(interfaces, models))
    }

    /// Bind already parsed contract traits to `models`.
    ///
    /// A method whose `gen:for` line does not name a model is ignored for
    /// that model. Interfaces applied later override earlier ones.
    pub fn apply_interfaces(&mut self, interfaces: Vec<Interface>, models: &[Arc<Model>]) -> &mut Self {
        for model in models {
            let registration = self.register(model.clone());
            registration.interfaces.extend(interfaces.iter().cloned());
        }
        self
    }

    /// Render and write every registered model.
    ///
    /// Starts its own runtime, so it must not be called from async code; use
    /// [`execute_async`](Self::execute_async) there.
    pub fn execute(self) -> Result<Report, BuildError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(BuildError::Runtime)?;
        runtime.block_on(self.execute_async())
    }

    /// Render every registered model on its own task and write the results.
    ///
    /// The first write failure aborts the run, as does the configured
    /// timeout. `gen.rs` is written after every model succeeded.
    pub async fn execute_async(self) -> Result<Report, BuildError> {
        let out_path = self.config.out_path.clone();
        tokio::fs::create_dir_all(&out_path)
            .await
            .map_err(|source| BuildError::Write {
                path: out_path.clone(),
                source,
            })?;

        let settings = Arc::new(self.settings());
        let mut tasks = JoinSet::new();
        for (index, registration) in self.outputs().into_iter().enumerate() {
            let settings = settings.clone();
            let out_path = out_path.clone();
            tasks.spawn(async move {
                let rendered = render_model(&registration.model, &registration.interfaces, &settings);
                let written = write_artifacts(&out_path, &rendered).await?;
                Ok::<_, BuildError>((index, rendered, written))
            });
        }

        let mut finished = Vec::with_capacity(tasks.len());
        let outcome = tokio::time::timeout(self.config.timeout(), join_all(&mut tasks, &mut finished)).await;
        match outcome {
            Err(_) => {
                let pending = tasks.len();
                tasks.abort_all();
                warn!("generation timed out with {} model(s) pending", pending);
                return Err(BuildError::Timeout {
                    seconds: self.config.timeout_secs,
                    pending,
                });
            }
            Ok(Err(err)) => {
                tasks.abort_all();
                return Err(err);
            }
            Ok(Ok(())) => {}
        }
        finished.sort_by_key(|(index, _, _)| *index);

        let mut diagnostics = self.diagnostics;
        let mut written = Vec::new();
        let mut names = Vec::new();
        for (_, rendered, paths) in finished {
            if !rendered.artifacts.is_empty() {
                names.push(rendered.names);
            }
            diagnostics.extend(rendered.diagnostics);
            written.extend(paths);
        }

        let namespace = render_namespace(&names, &settings);
        let path = out_path.join(NAMESPACE_FILE);
        tokio::fs::write(&path, &namespace.content)
            .await
            .map_err(|source| BuildError::Write {
                path: path.clone(),
                source,
            })?;
        info!("wrote {}", path.display());
        written.push(path);
        written.sort();

        Ok(Report { written, diagnostics })
    }
}

async fn write_artifacts(out_path: &Path, rendered: &RenderedModel) -> Result<Vec<PathBuf>, BuildError> {
    let mut written = Vec::with_capacity(rendered.artifacts.len());
    for artifact in &rendered.artifacts {
        let path = out_path.join(&artifact.file_name);
        tokio::fs::write(&path, &artifact.content)
            .await
            .map_err(|source| BuildError::Write {
                path: path.clone(),
                source,
            })?;
        info!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

async fn join_all<T: 'static>(
    tasks: &mut JoinSet<Result<T, BuildError>>,
    finished: &mut Vec<T>,
) -> Result<(), BuildError> {
    while let Some(joined) = tasks.join_next().await {
        finished.push(joined??);
    }
    Ok(())
}
