//! Ember Compiler - class elimination and dataflow optimization
//!
//! Takes a type-checked object-oriented IR program, lowers every class
//! construct to plain functions and global arrays, and then shrinks the
//! result with intraprocedural dataflow passes.

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod interp;
pub mod ir;
pub mod lower;
pub mod optimize;

pub use config::{CompilerConfig, ConfigError, LowerConfig, OptimizeConfig};
pub use error::{CompileError, CompileResult, Diagnostic, RuntimeError, Severity};
pub use interp::{Interpreter, Value};
pub use ir::{PrettyPrint, Program, ProgramBuilder};
pub use lower::{ClassEliminator, EliminationStats};
pub use optimize::{OptLevel, OptStats, Optimizer};

/// What one compilation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileStats {
    pub elimination: EliminationStats,
    pub optimization: OptStats,
}

/// Main compiler entry point
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Run the whole pipeline and return the flat program
    pub fn compile(&self, program: Program) -> CompileResult<Program> {
        self.compile_with_stats(program).map(|(program, _)| program)
    }

    /// Verify, eliminate classes, optimize, and check the result
    pub fn compile_with_stats(&self, program: Program) -> CompileResult<(Program, CompileStats)> {
        let (mut program, elimination) = self.lower(program)?;

        let optimization = Optimizer::new(self.config.optimize.level)
            .with_max_rounds(self.config.optimize.max_rounds)
            .optimize(&mut program)?;

        program.verify()?;
        program.assert_flat()?;
        log::info!(
            "compiled {} functions: {} classes eliminated, {} rewrites",
            program.functions.len(),
            elimination.classes,
            optimization.changes()
        );
        Ok((
            program,
            CompileStats {
                elimination,
                optimization,
            },
        ))
    }

    /// Verify and eliminate classes without optimizing
    pub fn lower(&self, mut program: Program) -> CompileResult<(Program, EliminationStats)> {
        program.verify()?;
        let stats = ClassEliminator::new(self.config.lower.clone()).eliminate(&mut program)?;
        program.verify()?;
        Ok((program, stats))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}
