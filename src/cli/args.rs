//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Table rendering resolution: structural trees, aspect cascade, headers and sizes
#[derive(Parser, Debug)]
#[command(name = "rendr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug verbosity: -d info, -dd debug, -ddd trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Document selection shared by the render commands.
#[derive(Args, Debug, Clone)]
pub struct DocumentArgs {
    /// Table document (TOML)
    #[arg(value_hint = ValueHint::FilePath)]
    pub document: PathBuf,

    /// Only this table (default: every table)
    #[arg(short, long)]
    pub table: Option<String>,

    /// Alternative selected on every z-axis choice
    #[arg(short = 'z', long, default_value_t = 0)]
    pub z_choice: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the structural tree of each table
    Tree {
        #[command(flatten)]
        doc: DocumentArgs,
    },

    /// Show each structural node's header
    Headers {
        #[command(flatten)]
        doc: DocumentArgs,
        /// Label language (default: configured lang)
        #[arg(short, long)]
        lang: Option<String>,
        /// Label role (default: standard role, messages enabled)
        #[arg(short, long)]
        role: Option<String>,
        /// Return message text without evaluating expressions
        #[arg(long)]
        raw: bool,
    },

    /// Show the resolved aspect set of each leaf
    Aspects {
        #[command(flatten)]
        doc: DocumentArgs,
    },

    /// Show cardinality and depth of each structural node
    Size {
        #[command(flatten)]
        doc: DocumentArgs,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show merged config
    Show {
        /// Document directory whose local config is merged
        #[arg(value_hint = ValueHint::DirPath)]
        dir: Option<PathBuf>,
    },

    /// Create config template
    Init {
        /// Create global config
        #[arg(short, long)]
        global: bool,
        /// Document directory for the local config (default: cwd)
        #[arg(value_hint = ValueHint::DirPath)]
        dir: Option<PathBuf>,
    },

    /// Show config paths
    Path,
}
