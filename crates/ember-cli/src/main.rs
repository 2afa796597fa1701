//! Ember command-line tool
//!
//! Reads programs in JSON interchange form, lowers classes away, optimizes
//! and optionally runs the result.

use anyhow::Result;
use clap::Parser;
use ember_cli::app::{Cli, Command};
use ember_cli::commands::{self, build, check, lower, run};
use ember_cli::output::{resolve_color_choice, StyledOutput};
use ember_compiler::CompileError;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let choice = resolve_color_choice(cli.global.color.as_deref());
    let mut out = StyledOutput::new(choice);

    if let Err(err) = dispatch(&cli, &mut out) {
        report(&err, &mut out);
        out.flush();
        std::process::exit(ember_cli::exit_code(&err));
    }
    out.flush();
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_module("ember_compiler", level)
        .filter_module("ember_cli", level)
        .filter_module("ember", level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .format_timestamp(None)
        .init();
}

fn dispatch(cli: &Cli, out: &mut StyledOutput) -> Result<()> {
    match &cli.command {
        Command::Lower { path, json } => {
            let config = commands::load_config(cli.global.config.as_deref())?;
            let text = lower::execute(path, config, *json)?;
            print_block(out, &text);
        }
        Command::Build {
            path,
            output,
            opt,
        } => {
            let config = commands::load_config(cli.global.config.as_deref())?;
            let report = build::execute(path, config, opt.map(Into::into), output.as_deref())?;
            match report.json {
                Some(json) => print_block(out, &json),
                None => {
                    let stats = &report.stats;
                    out.success("Built");
                    out.plain(&format!(
                        " {} classes eliminated, {} rewrites in {} rounds",
                        stats.elimination.classes,
                        stats.optimization.changes(),
                        stats.optimization.rounds
                    ));
                    out.newline();
                }
            }
        }
        Command::Run { path, entry, opt } => {
            let config = commands::load_config(cli.global.config.as_deref())?;
            let report = run::execute(path, config, opt.map(Into::into), entry)?;
            for line in &report.output {
                out.plain(line);
                out.newline();
            }
            if report.value != ember_compiler::Value::Void {
                out.info(&format!("=> {}", report.value));
                out.newline();
            }
        }
        Command::Check { path } => {
            let report = check::execute(path)?;
            out.success("ok");
            out.plain(&format!(
                " {} classes, {} methods, {} functions{}",
                report.classes,
                report.methods,
                report.functions,
                if report.flat { " (flat)" } else { "" }
            ));
            out.newline();
        }
    }
    Ok(())
}

fn print_block(out: &mut StyledOutput, text: &str) {
    out.plain(text);
    if !text.ends_with('\n') {
        out.newline();
    }
}

/// Compile errors go through the diagnostic renderer, anything else is
/// printed with its cause chain
fn report(err: &anyhow::Error, out: &mut StyledOutput) {
    if let Some(compile) = err.chain().find_map(|c| c.downcast_ref::<CompileError>()) {
        out.diagnostic(&compile.to_diagnostic());
        if let CompileError::InvariantViolation { dump, .. } = compile {
            if !dump.is_empty() {
                out.note(dump);
            }
        }
        return;
    }
    out.error(&err.to_string());
    for cause in err.chain().skip(1) {
        out.note(&format!("  caused by: {}", cause));
    }
    let _ = std::io::stderr().flush();
}
