use anyhow::{Context, Result};
use xbundle_core::{AppError, Bundle, FileSystem, TokenEstimator, TokioFileSystem};

use super::Project;
use crate::cli_args::BundleArgs;
use crate::output;

pub async fn handle_bundle_command(args: BundleArgs, quiet: bool) -> Result<()> {
    let fs = TokioFileSystem;
    let mut project = Project::open(&args.project_config, &fs).await?;

    if let Some(max_tokens) = args.max_tokens {
        if max_tokens == 0 {
            anyhow::bail!(AppError::InvalidArgument(
                "--max-tokens must be greater than 0".to_string()
            ));
        }
        project.config.budget.max_tokens = max_tokens;
    }
    if args.no_tree {
        project.config.output.include_tree = false;
    }
    let format = output::resolve_format(&args.format_output, &project.config.output.format)?;

    let checked = project.resolve_checked(&args.selection).await?;
    let estimator = TokenEstimator::from_config(&project.config.budget);
    log::debug!("Using estimator {:?}", estimator);

    let bundle = Bundle::build(
        &project.catalog,
        &project.engine,
        &checked,
        &fs,
        &estimator,
        &project.config,
    )
    .await
    .context("Failed to build bundle")?;
    let rendered = bundle.render(format)?;

    match &args.save {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs.create_directory(parent).await?;
            }
            fs.write_file(path, rendered.as_bytes())
                .await
                .with_context(|| format!("Failed to save bundle to {}", path.display()))?;
            if !quiet {
                output::print_bundle_summary(&bundle, Some(path));
            }
        }
        None => {
            output::write_to_stdout(&rendered)?;
            if !quiet {
                output::print_bundle_summary(&bundle, None);
            }
        }
    }
    Ok(())
}
