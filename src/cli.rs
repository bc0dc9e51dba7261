//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vellum::config::CONFIG_FILE;

/// Vellum template renderer CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root; the config file and relative directories live here
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name (default: vellum.toml)
    #[arg(short = 'C', long, default_value = CONFIG_FILE)]
    pub config: PathBuf,

    /// Extra template directory, searched after the configured ones
    #[arg(short = 'd', long = "dir")]
    pub dirs: Vec<PathBuf>,

    /// Print cache, lookup and layout resolution details to stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Shared arguments for Render and Watch commands
#[derive(clap::Args, Debug, Clone)]
pub struct RenderArgs {
    /// Virtual path of the template (`~/index`) or inline template text
    pub path: String,

    /// JSON file holding the model
    #[arg(short, long, conflicts_with = "data")]
    pub model: Option<PathBuf>,

    /// Model as inline JSON
    #[arg(long)]
    pub data: Option<String>,

    /// Initial value bag as inline JSON object
    #[arg(long)]
    pub bag: Option<String>,

    /// Ignore any layout set by the template or its view-starts
    #[arg(long)]
    pub skip_layout: bool,

    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the executed template tree to stderr
    #[arg(long)]
    pub tree: bool,

    /// Print the generated source of every executed template to stderr
    #[arg(long)]
    pub generated: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Render a template once
    Render {
        #[command(flatten)]
        args: RenderArgs,
    },

    /// List the templates found in the template directories
    List,

    /// Compile every template and report failures
    Check,

    /// Render a template and render it again whenever a template changes
    Watch {
        #[command(flatten)]
        args: RenderArgs,
    },
}

#[allow(unused)]
impl Cli {
    pub const fn is_watch(&self) -> bool {
        matches!(self.command, Commands::Watch { .. })
    }

    /// Whether generated sources must be kept in the cache.
    pub fn wants_generated(&self) -> bool {
        match &self.command {
            Commands::Render { args } | Commands::Watch { args } => args.generated,
            _ => false,
        }
    }
}
