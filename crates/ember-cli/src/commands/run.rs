//! `ember run` - compile and interpret an entry function

use anyhow::{Context, Result};
use ember_compiler::{Compiler, CompilerConfig, Interpreter, OptLevel, Value};
use std::path::Path;

/// What running the entry produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub value: Value,
    /// Lines written by `print`
    pub output: Vec<String>,
}

pub fn execute(
    path: &Path,
    mut config: CompilerConfig,
    opt: Option<OptLevel>,
    entry: &str,
) -> Result<RunReport> {
    if let Some(level) = opt {
        config.optimize.level = level;
    }
    let program = super::load_program(path)?;
    let flat = Compiler::new(config).compile(program)?;

    let mut interp = Interpreter::new(&flat);
    let value = interp
        .call(entry, Vec::new())
        .with_context(|| format!("{} failed", entry))?;
    log::debug!("{} finished after {} steps", entry, interp.steps());
    Ok(RunReport {
        value,
        output: interp.output().to_vec(),
    })
}
