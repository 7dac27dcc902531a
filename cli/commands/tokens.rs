use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use xbundle_core::tree::human_size;
use xbundle_core::{Config, FileSystem, OutputFormat, TokenEstimator, TokioFileSystem};

use crate::cli_args::TokensArgs;
use crate::output::{self, TokenRow};

pub async fn handle_tokens_command(args: TokensArgs) -> Result<()> {
    let project_root = Config::determine_project_root(args.project_config.project_root.as_ref())
        .context("Failed to determine project root")?;
    let mut config = crate::load_config_for_command(&project_root, &args.project_config)?;
    if let Some(encoding) = &args.encoding {
        config.budget.encoding = encoding.clone();
    }
    let estimator = TokenEstimator::from_config(&config.budget);
    let encoding = estimator
        .model_name()
        .unwrap_or("heuristic (chars / 4)")
        .to_string();

    let mut rows = Vec::new();
    if args.files.is_empty() {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read standard input")?;
        rows.push(TokenRow {
            path: "<stdin>".to_string(),
            bytes: text.len() as u64,
            size: human_size(text.len() as u64),
            tokens: estimator.estimate_off_thread(text).await,
        });
    } else {
        let fs = TokioFileSystem;
        for path in &args.files {
            let bytes = fs.read_file(path).await?;
            let text = String::from_utf8(bytes)
                .with_context(|| format!("{} is not valid UTF-8 text", path.display()))?;
            let display = pathdiff::diff_paths(path, &project_root)
                .filter(|p| !p.starts_with(".."))
                .unwrap_or_else(|| path.clone());
            rows.push(TokenRow {
                path: display.display().to_string(),
                bytes: text.len() as u64,
                size: human_size(text.len() as u64),
                tokens: estimator.estimate_off_thread(text).await,
            });
        }
    }

    match output::resolve_format(&args.format_output, "text")? {
        OutputFormat::Text => {
            output::print_tokens_table(&rows, &encoding);
            Ok(())
        }
        format => output::print_data_or_text(&rows, String::new, format),
    }
}
