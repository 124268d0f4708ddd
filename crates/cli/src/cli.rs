//! CLI argument parsing and command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cinterop")]
#[command(about = "Inspect cinterop symbol tables and call into native libraries", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every symbol of an encoded symbol table
    Dump {
        /// Encoded symbol table file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// The file is DEFLATE-compressed
        #[arg(short, long)]
        compressed: bool,
    },

    /// Decode mangled type strings
    Demangle {
        /// Mangled names, each decoded as a list of types
        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,

        /// Symbol table supplying struct fields
        #[arg(short, long, value_name = "FILE")]
        table: Option<PathBuf>,

        /// The table file is DEFLATE-compressed
        #[arg(short, long)]
        compressed: bool,
    },

    /// Call a function exported by a shared library
    ///
    /// Arguments are written as KIND:VALUE, e.g. `int:5`, `double:2.5`,
    /// `pointer:0x0`.
    Call {
        /// Library file name or path
        #[arg(value_name = "LIBRARY")]
        library: String,

        /// Exported function name
        #[arg(value_name = "SYMBOL")]
        symbol: String,

        /// Return kind (void, int, double, pointer, ...)
        #[arg(short, long, default_value = "void")]
        returns: String,

        /// Resolve all library symbols at load time
        #[arg(long)]
        now: bool,

        /// Arguments as KIND:VALUE
        #[arg(value_name = "ARG", allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Display version information
    Version,
}
