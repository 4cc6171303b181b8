//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::suites::Suite;

#[derive(Debug, Parser)]
#[command(
    name = "backoffice-sim",
    version,
    about = "Validated tool handlers over a simulated back-office database"
)]
pub struct Cli {
    /// Config file (default: ~/.backoffice-sim/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tool family to serve
    #[arg(long, global = true, value_enum)]
    pub suite: Option<Suite>,

    /// Seed database document (JSON)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print every enabled tool descriptor as a JSON array
    Tools,
    /// Invoke one tool and print its envelope
    Call {
        /// Tool name, e.g. manage_payroll
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
        /// Write the resulting database document here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Read tool calls as JSON lines from stdin, one envelope per line
    Session {
        /// Transcript name
        #[arg(long, default_value = "session")]
        name: String,
        /// Write the final database document here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write the transcript to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Re-run a saved transcript and report envelopes that differ
    Replay {
        /// Saved session id, or a path to an exported transcript
        session: String,
    },
}
