use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use colored::*;
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use xbundle_core::AppError;

use crate::cli_args::{Cli, CompletionArgs};
use crate::output;

fn default_completion_path(shell: Shell, bin_name: &str) -> Result<PathBuf> {
    let (dir, filename) = match shell {
        Shell::Fish => (
            dirs::config_dir().map(|p| p.join("fish").join("completions")),
            format!("{}.fish", bin_name),
        ),
        Shell::Bash => (
            dirs::config_dir().map(|p| p.join("bash_completion.d")),
            format!("{}.bash", bin_name),
        ),
        Shell::Zsh => (
            dirs::data_local_dir().map(|p| p.join("zsh").join("site-functions")),
            format!("_{}", bin_name),
        ),
        other => anyhow::bail!(AppError::InvalidArgument(format!(
            "Default save location not known for shell: {}",
            other
        ))),
    };
    let dir =
        dir.ok_or_else(|| anyhow::anyhow!("Could not determine standard completion directory."))?;
    Ok(dir.join(filename))
}

pub fn handle_completion_command(args: &CompletionArgs, quiet: bool) -> Result<()> {
    let mut command = Cli::command();
    let bin_name = command.get_name().to_string();

    if !args.save {
        generate(args.shell, &mut command, bin_name, &mut io::stdout());
        return Ok(());
    }

    let save_path = default_completion_path(args.shell, &bin_name)?;
    if !output::confirm_overwrite(&save_path, quiet)? {
        println!("Save cancelled.");
        return Ok(());
    }
    if let Some(save_dir) = save_path.parent() {
        fs::create_dir_all(save_dir)
            .with_context(|| format!("Failed to create directory {}", save_dir.display()))?;
    }
    let mut file = File::create(&save_path)
        .with_context(|| format!("Failed to create file {}", save_path.display()))?;
    generate(args.shell, &mut command, bin_name, &mut file);

    if !quiet {
        println!(
            "{} {} completions saved to: {}",
            "✅".green(),
            args.shell.to_string().cyan(),
            save_path.display().to_string().blue()
        );
    }
    Ok(())
}
