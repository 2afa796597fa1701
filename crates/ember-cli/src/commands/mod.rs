//! Subcommand implementations

pub mod build;
pub mod check;
pub mod lower;
pub mod run;

use anyhow::{Context, Result};
use ember_compiler::{CompilerConfig, Program};
use std::path::Path;

/// Configuration file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ember.toml";

/// Read a program in JSON interchange form
pub fn load_program(path: &Path) -> Result<Program> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let program =
        Program::from_json(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    log::debug!(
        "loaded {}: {} classes, {} functions",
        path.display(),
        program.classes.len(),
        program.functions.len()
    );
    Ok(program)
}

/// Explicit `--config` file, else `./ember.toml` when present, else defaults
pub fn load_config(explicit: Option<&Path>) -> Result<CompilerConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let local = Path::new(DEFAULT_CONFIG_FILE);
            if !local.is_file() {
                return Ok(CompilerConfig::default());
            }
            local.to_path_buf()
        }
    };
    log::debug!("using configuration {}", path.display());
    CompilerConfig::load(&path).with_context(|| format!("invalid configuration {}", path.display()))
}
