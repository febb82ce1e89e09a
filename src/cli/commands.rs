//! CLI command definitions using clap.
//!
//! - chat: run one turn against the configured model
//! - tools: list local and remote tools
//! - providers: show remote provider health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Relay - chat turns with local and remote tool routing
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message and print the reply
    Chat {
        /// Message text
        message: String,

        /// Conversation id used for session notes
        #[arg(short = 'C', long, default_value = "cli")]
        conversation: String,

        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// List every tool the model can call
    Tools,

    /// Show configured remote providers and their health
    Providers,
}
