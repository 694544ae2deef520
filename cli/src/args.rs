//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for `toolgate tools`
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// One line per tool with its parameters
    #[default]
    Text,
    /// Canonical function-schema list, as handed to a model
    Json,
}

/// CLI arguments for toolgate
#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(author, version, about = "Discover and safely invoke tools from remote tool servers")]
#[command(long_about = r#"
toolgate aggregates the tools exposed by a project's tool servers into one
canonical catalog and invokes them behind a loop and rate guard.

Configuration files are loaded from (in priority order):
1. TOOLGATE_* environment variables (nested keys split on "__")
2. --config <path>     Explicit config file
3. ./toolgate.toml     Project-level config
4. ~/.config/toolgate/config.toml   Global config

Example:
  toolgate tools support-bot
  toolgate tools support-bot --format json
  toolgate call support-bot search --args '{"query": "refund policy"}'
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Aggregate and print the tool catalog of a project
    Tools {
        /// Project id from the configuration
        project: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Invoke one tool through the loop guard
    Call {
        /// Project id from the configuration
        project: String,

        /// Tool name as listed by `toolgate tools`
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(short, long, value_name = "JSON", default_value = "{}")]
        args: String,
    },

    /// Show configuration sources and validation issues
    Config,
}
