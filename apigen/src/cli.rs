//! CLI argument parsing using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Rule-driven C header to C++ header API generator
#[derive(Parser, Debug)]
#[command(name = "apigen")]
#[command(author, version, about, long_about = None)]
#[command(after_help = r#"EXAMPLES:
    # Transform a parsed API model and print the target model
    apigen transform -c "config/*.json" -s api.json

    # Write fresh headers plus their positions for later patch runs
    apigen transform -c transform.json -s api.json --render include/ --positions current.json

    # Update previously generated headers in place
    apigen patch -c transform.json -s api.json --current current.json --root include/

    # Show what would change without writing
    apigen patch -c transform.json -s api.json --current current.json --root include/ --dry-run

    # Patch and keep the positions current for the next run
    apigen patch -c transform.json -s api.json --current current.json --root include/ --positions current.json
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Show verbose output (repeat for more)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Transform a source model into the target model
    Transform(TransformArgs),
    /// Patch generated headers to match the target model
    Patch(PatchArgs),
}

/// Inputs shared by every command
#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Transform configuration files, layered in order (supports glob patterns)
    #[arg(short = 'c', long = "config", required = true)]
    pub config: Vec<String>,

    /// Source API model (json or yaml)
    #[arg(short = 's', long = "source")]
    pub source: PathBuf,
}

#[derive(Args, Debug)]
pub struct TransformArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Write the target model here instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Render every target module as a header under this directory
    #[arg(long = "render")]
    pub render: Option<PathBuf>,

    /// With --render: save the rendered model with line positions
    #[arg(long = "positions", requires = "render")]
    pub positions: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PatchArgs {
    #[command(flatten)]
    pub model: ModelArgs,

    /// Current headers as a model with line positions
    #[arg(long = "current")]
    pub current: PathBuf,

    /// Directory the model's file paths are relative to
    #[arg(short = 'r', long = "root", default_value = ".")]
    pub root: PathBuf,

    /// Compute changes without writing files
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long = "concurrency")]
    pub concurrency: Option<usize>,

    /// Save the patched headers' line positions for the next patch run
    #[arg(long = "positions", conflicts_with = "dry_run")]
    pub positions: Option<PathBuf>,
}
