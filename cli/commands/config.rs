use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use xbundle_core::Config;
use xbundle_core::config::{DEFAULT_CONFIG_DIR, DEFAULT_CONFIG_FILENAME};

use crate::cli_args::ConfigArgs;
use crate::output;

pub fn handle_config_command(args: &ConfigArgs, project_root: &Path, quiet: bool) -> Result<()> {
    let content = Config::default_toml().context("Failed to render default configuration")?;

    if !args.save {
        return output::write_to_stdout(&content);
    }

    let save_path = project_root
        .join(DEFAULT_CONFIG_DIR)
        .join(DEFAULT_CONFIG_FILENAME);
    if !output::confirm_overwrite(&save_path, quiet)? {
        println!("Save cancelled.");
        return Ok(());
    }
    output::write_to_file(&save_path, &content)?;
    if !quiet {
        println!(
            "{} Default configuration saved to: {}",
            "✅".green(),
            save_path.display().to_string().blue()
        );
    }
    Ok(())
}
