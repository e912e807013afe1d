//! omnibuild CLI - build software components from recipes

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use omnibuild::builder::ExecuteError;
use omnibuild::core::{GraphError, RecipeError};
use omnibuild::util::diagnostic::emit;
use omnibuild::util::GlobalContext;

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli, color) {
        report(&e, color);
        std::process::exit(1);
    }
}

fn run(cli: Cli, color: bool) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("omnibuild=debug")
    } else {
        EnvFilter::new("omnibuild=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .with_target(false)
        .without_time()
        .init();

    let mut ctx = GlobalContext::new()?;
    ctx.set_color(color);

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &ctx),
        Commands::Plan(args) => commands::plan::execute(args, &ctx),
        Commands::Clean(args) => commands::clean::execute(args, &ctx),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Print a fatal error, as a diagnostic when we know its shape.
fn report(e: &anyhow::Error, color: bool) {
    if let Some(err) = e.downcast_ref::<ExecuteError>() {
        emit(&err.to_diagnostic(), color);
    } else if let Some(err) = e.downcast_ref::<GraphError>() {
        emit(&err.to_diagnostic(), color);
    } else if let Some(err) = e.downcast_ref::<RecipeError>() {
        emit(&err.to_diagnostic(), color);
    } else {
        eprintln!("error: {:#}", e);
    }
}
