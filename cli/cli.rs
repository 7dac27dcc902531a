mod cli_args;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use std::process;

use cli_args::{Cli, Commands, ProjectConfigOpts};
use xbundle_core::{AppError, Config};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);

    let quiet = cli_args.quiet;

    log::debug!("CLI args parsed: {:?}", cli_args);

    let outcome = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
        .and_then(|runtime| runtime.block_on(run_app(cli_args, quiet)));

    let exit_code = match outcome {
        Ok(_) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = match e.downcast_ref::<AppError>() {
                Some(AppError::Config(_)) => 1,
                Some(AppError::TomlParse(_)) => 1,
                Some(AppError::TomlSerialize(_)) => 1,
                Some(AppError::Io(_)) => 2,
                Some(AppError::Stat { .. }) => 2,
                Some(AppError::FileRead { .. }) => 2,
                Some(AppError::FileWrite { .. }) => 2,
                Some(AppError::DirRead { .. }) => 2,
                Some(AppError::DirCreation { .. }) => 2,
                Some(AppError::Persistence(_)) => 3,
                Some(AppError::ScanSuperseded { .. }) => 4,
                Some(AppError::InvalidArgument(_)) => 5,
                Some(AppError::JsonSerialize(_)) => 6,
                Some(AppError::YamlError(_)) => 6,
                Some(AppError::TikToken(_)) => 8,
                Some(_) => 1,
                None => 1,
            };

            // Config and usage errors are shown even in quiet mode.
            if !quiet || exit_code == 1 || exit_code == 5 {
                eprintln!("{} {:#}\n", "Error:".red().bold(), e);
            } else {
                log::error!("Application failed: {:#}", e);
            }

            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

async fn run_app(cli: Cli, quiet: bool) -> Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    match command {
        Commands::Bundle(args) => {
            log::debug!("Executing 'bundle' command...");
            commands::bundle::handle_bundle_command(args, quiet).await?;
        }
        Commands::Tree(args) => {
            log::debug!("Executing 'tree' command...");
            commands::tree::handle_tree_command(args).await?;
        }
        Commands::Tokens(args) => {
            log::debug!("Executing 'tokens' command...");
            commands::tokens::handle_tokens_command(args).await?;
        }
        Commands::State(args) => {
            log::debug!("Executing 'state' command...");
            commands::state::handle_state_command(args, quiet).await?;
        }
        Commands::Completion(args) => {
            log::debug!("Executing 'completion' command...");
            commands::completion::handle_completion_command(&args, quiet)?;
        }
        Commands::Config(args) => {
            log::debug!("Executing 'config' command...");
            let project_root =
                Config::determine_project_root(args.project_config.project_root.as_ref())
                    .context("Failed to determine project root for config command")?;
            commands::config::handle_config_command(&args, &project_root, quiet)?;
        }
    }
    Ok(())
}

/// Loads the config a command runs with: the resolved TOML file (if any) plus CLI overrides.
pub fn load_config_for_command(
    project_root: &std::path::Path,
    project_opts: &ProjectConfigOpts,
) -> Result<Config> {
    let config_path = Config::resolve_config_path(
        project_root,
        project_opts.config_file.as_ref(),
        project_opts.disable_config_file,
    )
    .context("Failed to resolve configuration path")?;

    let mut config = match &config_path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(name) = &project_opts.project_name {
        config.general.project_name = Some(name.clone());
    }
    config.general.project_name = Some(config.get_effective_project_name(project_root));

    log::trace!("Effective config: {:?}", config);
    Ok(config)
}
