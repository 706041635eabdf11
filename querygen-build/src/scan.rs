//! Source discovery for build scripts.

use crate::config::Config;
use crate::error::BuildError;
use crate::{Generator, Report};
use log::{debug, info};
use querygen::{parse_interfaces, parse_structs, Interface, ModelOption, StructMeta};
use std::path::{Path, PathBuf};

/// One Rust source file found under a scanned directory
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
}

/// Every `.rs` file under `dirs`, sorted by path so runs are reproducible
pub fn scan_sources<P: AsRef<Path>>(dirs: &[P]) -> Result<Vec<SourceFile>, BuildError> {
    let mut files = Vec::new();
    for dir in dirs {
        let dir = dir.as_ref();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|source| BuildError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            if !entry.file_type().is_file() || !entry.path().extension().is_some_and(|ext| ext == "rs") {
                continue;
            }
            let content = std::fs::read_to_string(entry.path()).map_err(|source| BuildError::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;
            files.push(SourceFile {
                path: entry.path().to_path_buf(),
                content,
            });
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!("scanned {} source file(s)", files.len());
    Ok(files)
}

/// Structs declared under `dirs`
pub fn discover_structs<P: AsRef<Path>>(dirs: &[P]) -> Result<Vec<StructMeta>, BuildError> {
    let mut structs = Vec::new();
    for file in scan_sources(dirs)? {
        structs.extend(parse_structs(&file.content)?);
    }
    Ok(structs)
}

/// Contract traits declared under `dirs`
pub fn discover_interfaces<P: AsRef<Path>>(dirs: &[P]) -> Result<Vec<Interface>, BuildError> {
    let mut interfaces = Vec::new();
    for file in scan_sources(dirs)? {
        interfaces.extend(parse_interfaces(&file.content)?);
    }
    Ok(interfaces)
}

/// Generate from annotated structs and contract traits, for `build.rs`.
///
/// Every struct under `model_dirs` becomes a model; every trait under
/// `interface_dirs` is applied to the models its `gen:for` line names (all
/// of them without one). Fails when any model or method was left out.
///
/// ```ignore
/// fn main() {
///     querygen_build::generate_from_dirs(
///         querygen_build::Config::default(),
///         &["src/models"],
///         &["src/queries"],
///     )
///     .unwrap();
/// }
/// ```
pub fn generate_from_dirs<P: AsRef<Path>>(
    config: Config,
    model_dirs: &[P],
    interface_dirs: &[P],
) -> Result<Vec<PathBuf>, BuildError> {
    for dir in model_dirs.iter().chain(interface_dirs) {
        println!("cargo:rerun-if-changed={}", dir.as_ref().display());
    }

    let structs = discover_structs(model_dirs)?;
    let interfaces = discover_interfaces(interface_dirs)?;
    info!(
        "discovered {} struct(s) and {} interface(s)",
        structs.len(),
        interfaces.len()
    );

    let mut generator = Generator::new(config);
    let models = generator.generate_models(&structs, Vec::<ModelOption>::new());
    generator.apply_basic(models.iter().cloned());
    generator.apply_interfaces(interfaces, &models);
    let report: Report = generator.execute()?;
    report.into_result()
}
