use anyhow::{Context, Result};
use colored::*;
use comfy_table::{Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use xbundle_core::output_formats::{serialize_to_json, serialize_to_yaml};
use xbundle_core::{Bundle, OutputFormat, SavedStateItem};

use crate::cli_args::FormatOutputOpts;

pub fn resolve_format(
    format_opts: &FormatOutputOpts,
    default_format: &str,
) -> Result<OutputFormat> {
    let name = format_opts.format.as_deref().unwrap_or(default_format);
    Ok(OutputFormat::parse(name)?)
}

/// Prints `plain_text` for the text format, `data` serialized otherwise.
pub fn print_data_or_text<T: Serialize>(
    data: &T,
    plain_text: impl FnOnce() -> String,
    format: OutputFormat,
) -> Result<()> {
    let content = match format {
        OutputFormat::Text => plain_text(),
        OutputFormat::Json => serialize_to_json(data, true)?,
        OutputFormat::Yaml => serialize_to_yaml(data)?,
    };
    write_to_stdout(&content)
}

pub fn write_to_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file =
        File::create(path).with_context(|| format!("Failed to create file {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write to file {}", path.display()))?;
    Ok(())
}

pub fn write_to_stdout(content: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(content.as_bytes())
        .context("Failed to write to stdout")?;
    if !content.ends_with('\n') {
        handle
            .write_all(b"\n")
            .context("Failed to write newline to stdout")?;
    }
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Asks before replacing `path`. In quiet mode an existing file is an error.
pub fn confirm_overwrite(path: &Path, quiet: bool) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    if quiet {
        anyhow::bail!(
            "Target file '{}' exists. Overwrite prevented in quiet mode.",
            path.display()
        );
    }
    print!(
        "{} File already exists at '{}'. Overwrite? [{}/{}] ",
        "⚠️".yellow(),
        path.display().to_string().cyan(),
        "y".green(),
        "N".red()
    );
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut response = String::new();
    io::stdin()
        .read_line(&mut response)
        .context("Failed to read user input")?;
    Ok(response.trim().eq_ignore_ascii_case("y"))
}

/// Summary of a bundle run, on stderr so stdout stays pipeable.
pub fn print_bundle_summary(bundle: &Bundle, saved_to: Option<&Path>) {
    let tokens = format!("{}/{}", bundle.processed_tokens, bundle.max_tokens);
    eprintln!(
        "{} Bundled {} files ({} tokens){}",
        "✅".green(),
        bundle.files_included.len().to_string().cyan(),
        tokens.cyan(),
        saved_to
            .map(|p| format!(" to {}", p.display().to_string().blue()))
            .unwrap_or_default()
    );
    if bundle.limit_reached {
        eprintln!(
            "{} Token limit reached; remaining selected files were left out.",
            "⚠️".yellow()
        );
    }
    for skipped in &bundle.files_skipped {
        eprintln!("{} Skipped {}", "-".dimmed(), skipped.uri.dimmed());
    }
}

#[derive(Debug, Serialize)]
pub struct TokenRow {
    pub path: String,
    pub bytes: u64,
    pub size: String,
    pub tokens: usize,
}

pub fn print_tokens_table(rows: &[TokenRow], encoding: &str) {
    println!();
    println!("{}", " Token Estimates ".green().bold().underline());
    println!("{:<20} {}", "Encoding:".green(), encoding.cyan());
    println!(
        "{:<20} {}",
        "Total Tokens:".green(),
        rows.iter()
            .map(|r| r.tokens)
            .sum::<usize>()
            .to_string()
            .cyan()
    );
    if rows.is_empty() {
        println!("\n{}", "(No input estimated)".yellow());
        println!();
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Path").fg(Color::Green),
        Cell::new("Size").fg(Color::Green),
        Cell::new("Tokens").fg(Color::Green),
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.path).fg(Color::Cyan),
            Cell::new(&row.size)
                .set_alignment(CellAlignment::Right)
                .fg(Color::DarkGrey),
            Cell::new(row.tokens).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
    println!();
}

pub fn print_states_table(states: &[SavedStateItem]) {
    if states.is_empty() {
        println!("{}", "(No saved selection states)".yellow());
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Id").fg(Color::Green),
        Cell::new("Label").fg(Color::Green),
        Cell::new("Saved").fg(Color::Green),
        Cell::new("Items").fg(Color::Green),
    ]);
    for state in states {
        let saved = state
            .saved_at()
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| state.timestamp.to_string());
        table.add_row(vec![
            Cell::new(&state.id).fg(Color::Cyan),
            Cell::new(state.label.as_deref().unwrap_or("-")),
            Cell::new(saved).fg(Color::DarkGrey),
            Cell::new(state.checked_items.len()).set_alignment(CellAlignment::Right),
        ]);
    }
    println!("{table}");
}
