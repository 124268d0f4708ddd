//! cinterop CLI
//!
//! - `dump`: list the symbols of an encoded symbol table
//! - `demangle`: decode mangled type strings, resolving structs from a table
//! - `call`: perform a one-off native call against a shared library

mod cli;
mod commands;

use clap::Parser;
use colored::Colorize;
use std::process;

use cli::{Cli, Commands};

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dump { file, compressed } => commands::dump(&file, compressed, cli.verbose),
        Commands::Demangle {
            names,
            table,
            compressed,
        } => commands::demangle(&names, table.as_deref(), compressed),
        Commands::Call {
            library,
            symbol,
            returns,
            now,
            args,
        } => commands::call(&library, &symbol, &returns, &args, now, cli.verbose),
        Commands::Version => Ok(commands::version()),
    };

    match result {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            process::exit(1);
        }
    }
}
