use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "codetutor")]
#[command(about = "Turns a codebase into a beginner-friendly tutorial")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Skip post-init hints
        #[arg(long)]
        non_interactive: bool,
    },

    /// Analyze a codebase and print the learning path without generating content
    Plan {
        /// Source directory to analyze (defaults to current directory)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate the full tutorial
    Generate {
        /// Source directory to analyze (defaults to current directory)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output directory for the tutorial
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Produce a skeleton without calling any LLM provider
        #[arg(long)]
        skip_llm: bool,
    },
}

impl Cli {
    pub async fn execute(self, mut engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init {
                path,
                non_interactive,
            } => engine.init(path, non_interactive).await,
            Commands::Plan { source, json } => engine.plan(source, json).await,
            Commands::Generate {
                source,
                output,
                skip_llm,
            } => engine.generate(source, output, skip_llm).await,
        }
    }
}
