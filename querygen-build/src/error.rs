use querygen::{Diagnostic, SchemaError};
use std::path::PathBuf;

/// Failures of a generation run
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to scan '{}': {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("generation did not finish within {seconds}s; {pending} model(s) were abandoned")]
    Timeout { seconds: u64, pending: usize },

    #[error("generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("{} model(s) or method(s) were not generated:\n{}", .0.len(), render_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| format!("  - {}", diagnostic))
        .collect::<Vec<_>>()
        .join("\n")
}
