use crate::catalog::{CheckedSet, EntryCatalog, FileSystemEntry};
use crate::config::BudgetConfig;
use crate::error::{AppError, Result};
use crate::filter::FilterDecisions;
use crate::fs::{FileSystem, path_from_uri};
use crate::tokens::TokenEstimator;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum SkipReason {
    NotInCatalog,
    Directory,
    Unreadable(String),
    NotUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub uri: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyResult {
    pub content: String,
    pub processed_tokens: usize,
    pub limit_reached: bool,
    pub included: Vec<String>,
    pub skipped: Vec<SkippedFile>,
}

pub fn format_block(entry: &FileSystemEntry, content: &str) -> String {
    let fence_tag = entry.extension().unwrap_or_default();
    let newline = if content.ends_with('\n') { "" } else { "\n" };
    format!(
        "File: {}\n```{}\n{}{}```\n\n",
        entry.relative_path, fence_tag, content, newline
    )
}

// Stops at the first file that does not fit. Unreadable files cost nothing.
pub async fn assemble(
    selected_uris: &[String],
    catalog: &EntryCatalog,
    fs: &dyn FileSystem,
    estimator: &TokenEstimator,
    budget: &BudgetConfig,
    tokens_already_consumed: usize,
) -> Result<AssemblyResult> {
    if tokens_already_consumed > budget.max_tokens {
        return Err(AppError::InvalidArgument(format!(
            "{} tokens already consumed exceeds the budget of {}",
            tokens_already_consumed, budget.max_tokens
        )));
    }
    log::info!(
        "Assembling {} selected files (budget {} tokens, {} already used)",
        selected_uris.len(),
        budget.max_tokens,
        tokens_already_consumed
    );

    let mut result = AssemblyResult {
        processed_tokens: tokens_already_consumed,
        ..AssemblyResult::default()
    };

    for uri in selected_uris {
        let Some(entry) = catalog.get(uri) else {
            log::warn!("Skipping {}: not in the catalog", uri);
            result.skipped.push(skipped(uri, SkipReason::NotInCatalog));
            continue;
        };
        if !entry.is_file {
            log::debug!("Skipping directory {}", entry.relative_path);
            result.skipped.push(skipped(uri, SkipReason::Directory));
            continue;
        }
        let path =
            path_from_uri(uri).unwrap_or_else(|| catalog.absolute_path(&entry.relative_path));
        let bytes = match fs.read_file(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Skipping {}: {}", entry.relative_path, e);
                result
                    .skipped
                    .push(skipped(uri, SkipReason::Unreadable(e.to_string())));
                continue;
            }
        };
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => {
                log::warn!("Skipping {}: not valid UTF-8", entry.relative_path);
                result.skipped.push(skipped(uri, SkipReason::NotUtf8));
                continue;
            }
        };

        let cost =
            estimator.estimate_off_thread(content.clone()).await + budget.header_overhead_tokens;
        if result.processed_tokens + cost > budget.max_tokens {
            log::info!(
                "Token limit reached at {} ({} + {} > {})",
                entry.relative_path,
                result.processed_tokens,
                cost,
                budget.max_tokens
            );
            result.limit_reached = true;
            break;
        }
        log::debug!("Including {} ({} tokens)", entry.relative_path, cost);
        result.content.push_str(&format_block(entry, &content));
        result.processed_tokens += cost;
        result.included.push(entry.relative_path.clone());
    }

    log::info!(
        "Assembled {} files, {} skipped, {} tokens{}",
        result.included.len(),
        result.skipped.len(),
        result.processed_tokens,
        if result.limit_reached { " (limit reached)" } else { "" }
    );
    Ok(result)
}

fn skipped(uri: &str, reason: SkipReason) -> SkippedFile {
    SkippedFile {
        uri: uri.to_string(),
        reason,
    }
}

pub fn expand_selection(
    catalog: &EntryCatalog,
    decisions: &FilterDecisions,
    checked: &CheckedSet,
) -> Vec<String> {
    let checked_dirs: HashSet<&str> = checked
        .iter()
        .filter_map(|uri| catalog.get(uri))
        .filter(|e| !e.is_file)
        .map(|e| e.relative_path.as_str())
        .collect();
    for uri in checked.iter().filter(|uri| catalog.get(uri).is_none()) {
        log::debug!("Checked item {} is not in the catalog", uri);
    }

    let hidden_ancestor = |entry: &FileSystemEntry| {
        let mut current = entry.relative_path.as_str();
        while let Some((parent, _)) = current.rsplit_once('/') {
            if catalog
                .get_by_relative_path(parent)
                .is_some_and(|p| decisions.is_hidden(&p.uri))
            {
                return true;
            }
            current = parent;
        }
        false
    };
    let under_checked_dir = |entry: &FileSystemEntry| {
        let mut current = entry.relative_path.as_str();
        while let Some((parent, _)) = current.rsplit_once('/') {
            if checked_dirs.contains(parent) {
                return true;
            }
            current = parent;
        }
        false
    };

    catalog
        .files()
        .filter(|f| checked.contains(&f.uri) || under_checked_dir(f))
        .filter(|f| !decisions.is_hidden(&f.uri) && !hidden_ancestor(f))
        .map(|f| f.uri.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterDecision;
    use crate::fs::file_uri;
    use std::path::Path;

    fn entry(rel: &str, is_file: bool) -> FileSystemEntry {
        FileSystemEntry {
            uri: file_uri(&Path::new("/p").join(rel)),
            is_file,
            size: is_file.then_some(0),
            name: rel.rsplit('/').next().unwrap().to_string(),
            relative_path: rel.to_string(),
        }
    }

    #[test]
    fn block_format_fences_by_extension() {
        let rs = entry("src/lib.rs", true);
        assert_eq!(
            format_block(&rs, "fn main() {}"),
            "File: src/lib.rs\n```rs\nfn main() {}\n```\n\n"
        );
        let bare = entry("Makefile", true);
        assert_eq!(format_block(&bare, "all:\n"), "File: Makefile\n```\nall:\n```\n\n");
    }

    #[test]
    fn expansion_follows_catalog_order_and_skips_hidden() {
        let catalog = EntryCatalog::from_entries(
            Path::new("/p"),
            vec![
                entry("a.txt", true),
                entry("src", false),
                entry("src/lib.rs", true),
                entry("src/secret.key", true),
                entry("src/gen", false),
                entry("src/gen/out.rs", true),
                entry("z.txt", true),
            ],
        )
        .unwrap();
        let mut decisions = FilterDecisions::default();
        decisions.set(catalog.uri_for("src/secret.key"), FilterDecision::AlwaysHide);
        decisions.set(catalog.uri_for("src/gen"), FilterDecision::AlwaysHide);

        let checked: CheckedSet = [
            catalog.uri_for("z.txt"),
            catalog.uri_for("src"),
            catalog.uri_for("src/lib.rs"),
            "file:///nowhere".to_string(),
        ]
        .into_iter()
        .collect();
        let expanded = expand_selection(&catalog, &decisions, &checked);
        assert_eq!(
            expanded,
            vec![catalog.uri_for("src/lib.rs"), catalog.uri_for("z.txt")]
        );
    }
}
