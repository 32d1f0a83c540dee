//! CLI command definitions and handlers.

pub mod labels;
pub mod run;

use clap::{Parser, Subcommand};

/// Repcam - Real-time action recognition and rep counting
#[derive(Parser)]
#[command(name = "repcam")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Shared run arguments (classifier, input, output, flags).
    #[command(flatten)]
    pub run: run::RunArgs,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Stream a camera or a file through a custom classifier
    Run(run::RunArgs),
    /// Show the labels of a custom classifier
    Labels(labels::LabelsArgs),
}

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// The run ended normally.
    Success,
    /// Start-up or streaming failed.
    Error,
    /// The run was stopped by SIGINT or SIGTERM.
    Interrupted,
}

impl ExitCode {
    /// Numeric process status.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::Interrupted => 130,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.code())
    }
}
