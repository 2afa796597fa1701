//! `ember check` - structural verification only

use anyhow::Result;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub classes: usize,
    pub methods: usize,
    pub functions: usize,
    /// Already free of class constructs
    pub flat: bool,
}

pub fn execute(path: &Path) -> Result<CheckReport> {
    let program = super::load_program(path)?;
    program.verify()?;
    Ok(CheckReport {
        classes: program.classes.len(),
        methods: program.methods.len(),
        functions: program.functions.len(),
        flat: program.is_flat(),
    })
}
