use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use xbundle_core::{
    AppError, CheckboxState, CheckedItem, Config, OutputFormat, TokioFileSystem, path_from_uri,
};

use super::{Project, state_store_for};
use crate::cli_args::{StateAction, StateArgs};
use crate::output;

#[derive(Debug, Serialize)]
struct ShownItem {
    path: String,
    uri: String,
    checked: bool,
}

pub async fn handle_state_command(args: StateArgs, quiet: bool) -> Result<()> {
    match args.action {
        StateAction::Save { select, label } => {
            // Saving needs the catalog to turn paths into URIs.
            let fs = TokioFileSystem;
            let project = Project::open(&args.project_config, &fs).await?;
            let items = select
                .iter()
                .map(|path| project.uri_for_path(path).map(CheckedItem::checked))
                .collect::<Result<Vec<_>>>()?;
            let id = project
                .state_store()
                .save_state(label.as_deref(), items)
                .await
                .context("Failed to save selection state")?;
            if quiet {
                println!("{}", id);
            } else {
                println!("{} Saved selection state {}", "✅".green(), id.cyan());
            }
        }
        StateAction::List { format_output } => {
            let (root, config) = load(&args.project_config)?;
            let states = state_store_for(&root, &config)
                .load_all_saved_states()
                .await?;
            let format = output::resolve_format(&format_output, "text")?;
            if format == OutputFormat::Text {
                output::print_states_table(&states);
            } else {
                output::print_data_or_text(&states, String::new, format)?;
            }
        }
        StateAction::Show { id, format_output } => {
            let (root, config) = load(&args.project_config)?;
            let items = state_store_for(&root, &config)
                .load_state(&id)
                .await?
                .ok_or_else(|| {
                    AppError::InvalidArgument(format!("No saved state with id '{}'", id))
                })?;
            let shown: Vec<ShownItem> = items
                .iter()
                .map(|item| ShownItem {
                    path: display_path(&root, &item.uri_string),
                    uri: item.uri_string.clone(),
                    checked: item.checkbox_state == CheckboxState::Checked,
                })
                .collect();
            let format = output::resolve_format(&format_output, "text")?;
            output::print_data_or_text(
                &shown,
                || {
                    shown
                        .iter()
                        .map(|s| format!("[{}] {}\n", if s.checked { "x" } else { " " }, s.path))
                        .collect()
                },
                format,
            )?;
        }
        StateAction::Delete { id } => {
            let (root, config) = load(&args.project_config)?;
            let removed = state_store_for(&root, &config).delete_state(&id).await?;
            if !quiet {
                if removed {
                    println!("{} Deleted selection state {}", "✅".green(), id.cyan());
                } else {
                    println!("{} No selection state {}", "ℹ️".blue(), id.cyan());
                }
            }
        }
        StateAction::Rename { id, label } => {
            let (root, config) = load(&args.project_config)?;
            let renamed = state_store_for(&root, &config)
                .rename_state(&id, label.as_deref())
                .await?;
            if !renamed {
                anyhow::bail!(AppError::InvalidArgument(format!(
                    "No saved state with id '{}'",
                    id
                )));
            }
            if !quiet {
                println!("{} Renamed selection state {}", "✅".green(), id.cyan());
            }
        }
    }
    Ok(())
}

fn load(opts: &crate::cli_args::ProjectConfigOpts) -> Result<(std::path::PathBuf, Config)> {
    let root = Config::determine_project_root(opts.project_root.as_ref())
        .context("Failed to determine project root")?;
    let config = crate::load_config_for_command(&root, opts)?;
    Ok((root, config))
}

fn display_path(root: &std::path::Path, uri: &str) -> String {
    path_from_uri(uri)
        .and_then(|p| pathdiff::diff_paths(&p, root))
        .filter(|p| !p.starts_with(".."))
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| uri.to_string())
}
