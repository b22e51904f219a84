//! Configuration management CLI commands.
//!
//! Provides `config check`, `config init` and `config path`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use locus::config::{config_file_path, to_config_string, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Load and validate a configuration file, then print the effective settings
    Check {
        /// Configuration file (defaults to ~/.locus/config.ini)
        path: Option<PathBuf>,
    },

    /// Write a default configuration file if none exists
    Init,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Check { path } => {
            let path = path.unwrap_or_else(config_file_path);
            let rendered = check(&path)?;
            println!("# {} is valid", path.display());
            println!();
            print!("{}", rendered);
            Ok(())
        }
        ConfigCommands::Init => run_init(),
        ConfigCommands::Path => {
            println!("{}", config_file_path().display());
            Ok(())
        }
    }
}

/// Load `path` and render the effective configuration.
fn check(path: &Path) -> Result<String, CliError> {
    if !path.exists() {
        println!("# {} does not exist, showing defaults", path.display());
    }
    let config = ConfigFile::load_from(path)?;
    Ok(to_config_string(&config))
}

fn run_init() -> Result<(), CliError> {
    let existed = config_file_path().exists();
    let path = ConfigFile::ensure_exists()?;
    if existed {
        println!("Configuration already exists: {}", path.display());
    } else {
        println!("Created {}", path.display());
    }
    Ok(())
}
