// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "topgun_driver")]
#[command(author, version, about = "EMS LCD TopGun light gun driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/topgun/driver.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log every report (overrides the config file)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive every connected gun through a virtual input device (default)
    Run,

    /// List connected guns
    #[command(visible_alias = "ls")]
    List,

    /// Print decoded frames instead of creating input devices
    #[command(visible_alias = "mon")]
    Monitor {
        /// Only print frames that differ from the previous one
        #[arg(long)]
        changes: bool,
    },
}
