//! Command-line interface for sheetq
//!
//! Argument parsing with clap. Global flags apply to every subcommand;
//! execution flags are shared by the commands that run plans.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// sheetq - ask questions about spreadsheet data in plain language
///
/// A language model turns the question into a JSON operation plan which is
/// then executed locally against the workbook's sheets.
#[derive(Parser, Debug)]
#[command(name = "sheetq")]
#[command(author, version, about)]
#[command(after_help = "EXAMPLES:\n  \
    # Ask a question about a spreadsheet workbook\n  \
    sheetq analyse --file sales.xlsx --query 'average salary in IT'\n\n  \
    # Run a hand-written plan without a model\n  \
    sheetq run --file sales.xlsx --plan plan.json\n\n  \
    # Show the sheets and columns the model will see\n  \
    sheetq schema --file sales.xlsx\n\n  \
    # Write a config file with the defaults\n  \
    sheetq config init")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (overrides discovery)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print JSON on a single line
    #[arg(long, global = true)]
    pub compact: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer a question: generate a plan with the model and execute it
    Analyse {
        /// Workbook file or directory
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,

        /// Question in plain language
        #[arg(short, long)]
        query: String,

        #[command(flatten)]
        execution: ExecutionArgs,
    },

    /// Execute a JSON plan file
    Run {
        /// Workbook file or directory
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,

        /// Plan file
        #[arg(short, long, value_name = "FILE")]
        plan: PathBuf,

        #[command(flatten)]
        execution: ExecutionArgs,
    },

    /// Print the sheets and columns of a workbook
    Schema {
        /// Workbook file or directory
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,
    },

    /// Print the plan-generation prompt without calling the model
    Prompt {
        /// Workbook file or directory
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,

        /// Question in plain language
        #[arg(short, long)]
        query: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Flags for commands that execute plans
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionArgs {
    /// Fractional sum/min/max handling: truncate or preserve
    #[arg(long, value_name = "MODE")]
    pub precision: Option<String>,

    /// Run text analysis rows in parallel
    #[arg(long)]
    pub parallel_text: bool,

    /// Model to use instead of the configured one
    #[arg(long)]
    pub model: Option<String>,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write a config file with the defaults
    Init {
        /// Where to write it
        #[arg(default_value = "sheetq.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyse_with_globals() {
        let cli = Cli::try_parse_from([
            "sheetq",
            "-vv",
            "analyse",
            "--file",
            "book/",
            "--query",
            "total sales",
            "--precision",
            "preserve",
            "--compact",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert!(cli.compact);
        match cli.command {
            Commands::Analyse {
                file,
                query,
                execution,
            } => {
                assert_eq!(file, PathBuf::from("book/"));
                assert_eq!(query, "total sales");
                assert_eq!(execution.precision.as_deref(), Some("preserve"));
                assert!(!execution.parallel_text);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_run_and_config() {
        let cli =
            Cli::try_parse_from(["sheetq", "run", "-f", "a.csv", "-p", "plan.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { .. }));

        let cli = Cli::try_parse_from(["sheetq", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config {
                command: ConfigCommands::Init { path, force },
            } => {
                assert_eq!(path, PathBuf::from("sheetq.toml"));
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_missing_query_is_rejected() {
        assert!(Cli::try_parse_from(["sheetq", "analyse", "--file", "book/"]).is_err());
    }
}
