//! Command-line surface.

pub mod build;
pub mod display;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Autonomous multi-phase project builder.
#[derive(Parser, Debug)]
#[command(name = "specforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit JSON instead of human-readable output where applicable.
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a configuration file (defaults to .specforge/config.yaml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a project from a specification, resuming when possible.
    Build {
        /// Specification file (UTF-8, Latin-1 fallback).
        spec: PathBuf,
        /// Project output directory.
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
        /// Keep going after a phase fails permanently.
        #[arg(long)]
        continue_on_error: bool,
        /// Skip the research pass.
        #[arg(long)]
        no_research: bool,
        /// Ignore any prior snapshot and start fresh.
        #[arg(long)]
        fresh: bool,
    },
    /// Show the plan that would be built, without running anything.
    Plan {
        spec: PathBuf,
    },
    /// Run only the research pass and print the synthesis.
    Research {
        spec: PathBuf,
        /// Directory for the research dump.
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,
    },
}
