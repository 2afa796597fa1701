//! `ember lower` - eliminate classes without optimizing

use anyhow::Result;
use ember_compiler::{Compiler, CompilerConfig, PrettyPrint};
use std::path::Path;

/// Lowered program as a readable listing, or JSON when `json` is set
pub fn execute(path: &Path, config: CompilerConfig, json: bool) -> Result<String> {
    let program = super::load_program(path)?;
    let (flat, stats) = Compiler::new(config).lower(program)?;
    log::info!(
        "eliminated {} classes ({} dispatch functions)",
        stats.classes,
        stats.dispatch_functions
    );
    if json {
        Ok(flat.to_json()?)
    } else {
        Ok(flat.pretty_print())
    }
}
