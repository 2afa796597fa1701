//! `ember build` - full pipeline, flat JSON out

use anyhow::{Context, Result};
use ember_compiler::{CompileStats, Compiler, CompilerConfig, OptLevel};
use std::path::Path;

/// Result of a build
#[derive(Debug)]
pub struct BuildReport {
    /// Flat program JSON, present when no output file was given
    pub json: Option<String>,
    pub stats: CompileStats,
}

pub fn execute(
    path: &Path,
    mut config: CompilerConfig,
    opt: Option<OptLevel>,
    output: Option<&Path>,
) -> Result<BuildReport> {
    if let Some(level) = opt {
        config.optimize.level = level;
    }
    let program = super::load_program(path)?;
    let (flat, stats) = Compiler::new(config).compile_with_stats(program)?;
    let json = flat.to_json()?;

    match output {
        Some(out) => {
            std::fs::write(out, &json)
                .with_context(|| format!("failed to write {}", out.display()))?;
            log::info!("wrote {}", out.display());
            Ok(BuildReport { json: None, stats })
        }
        None => Ok(BuildReport {
            json: Some(json),
            stats,
        }),
    }
}
