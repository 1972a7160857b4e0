//! Config command - inspect and create the configuration file

use clap::Subcommand;
use extgallery_client::GalleryConfig;
use std::path::{Path, PathBuf};

use super::load_config;
use crate::error::{CliError, Result};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file location
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(GalleryConfig::default_path()?),
    }
}

pub fn run(action: &ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(explicit)?;
            config.validate()?;
            print!("{}", serde_yaml::to_string(&config)?);
        }
        ConfigAction::Path => {
            println!("{}", config_path(explicit)?.display());
        }
        ConfigAction::Init { force } => {
            let path = config_path(explicit)?;
            if path.exists() && !force {
                return Err(CliError::input_with_help(
                    format!("{} already exists", path.display()),
                    "Pass --force to overwrite it",
                ));
            }
            GalleryConfig::default().save_to(&path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
