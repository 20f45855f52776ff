//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LTI 1.3 tool bridge for Moodle - OIDC launch validation and course proxy
#[derive(Parser, Debug)]
#[command(name = "lti-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "LTI_BRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "LTI_BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "LTI_BRIDGE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "LTI_BRIDGE_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LTI_BRIDGE_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the bridge server (default)
    Serve,

    /// Validate the configuration and print the resolved registration
    CheckConfig,

    /// Run one interactive launch through the system browser
    Launch {
        /// Sub-resource inside the tool to open after the launch
        #[arg(long)]
        target_url: Option<String>,

        /// Login hint forwarded to the platform
        #[arg(long)]
        login_hint: Option<String>,
    },
}
