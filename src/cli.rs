// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use crate::output::OutputMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "devstack")]
#[command(about = "Dependency-ordered local development stacks on Docker and Podman")]
#[command(version)]
pub struct Cli {
    /// Stack file to use instead of discovering devstack.yml
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Show engine calls and probe attempts
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start every service, dependencies first
    Up,

    /// Stop the stack, dependents first
    Down {
        /// Kill containers instead of stopping them gracefully
        #[arg(long)]
        kill: bool,
    },

    /// Show the state of every service
    Status,

    /// Validate the stack file and print the start order
    Config,

    /// Write a starter devstack.yml
    Init {
        /// Stack prefix (defaults to the directory name)
        #[arg(long)]
        prefix: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
