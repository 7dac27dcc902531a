use crate::assembler::{self, SkippedFile};
use crate::catalog::{CheckedSet, EntryCatalog};
use crate::config::Config;
use crate::error::Result;
use crate::filter::FilterEngine;
use crate::fs::FileSystem;
use crate::output_formats::{OutputFormat, serialize_to_json, serialize_to_yaml};
use crate::tokens::TokenEstimator;
use crate::tree::{self, TreeFormatterNode, TreeOptions};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// The payload handed to a model: an optional directory tree followed by file contents,
/// together costing at most `max_tokens`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub project_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree: Option<Vec<TreeFormatterNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_text: Option<String>,
    pub content: String,
    pub processed_tokens: usize,
    pub max_tokens: usize,
    pub limit_reached: bool,
    pub files_included: Vec<String>,
    pub files_skipped: Vec<SkippedFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

fn tree_section(tree_text: &str) -> String {
    format!("Directory tree:\n```text\n{}```\n\n", tree_text)
}

impl Bundle {
    pub async fn build(
        catalog: &EntryCatalog,
        engine: &FilterEngine,
        checked: &CheckedSet,
        fs: &dyn FileSystem,
        estimator: &TokenEstimator,
        config: &Config,
    ) -> Result<Self> {
        let decisions = engine.classify_catalog(catalog);
        let selected = assembler::expand_selection(catalog, &decisions, checked);
        log::debug!(
            "{} checked items expanded to {} files",
            checked.len(),
            selected.len()
        );
        let budget = &config.budget;

        let mut tree = None;
        let mut tree_text = None;
        let mut tree_tokens = 0;
        if config.output.include_tree {
            let nodes = tree::build_nodes(
                catalog,
                &decisions,
                checked,
                TreeOptions::from(&config.tree),
            );
            let text = tree::render(&nodes, catalog.root_name());
            let cost = estimator
                .estimate_off_thread(tree_section(&text))
                .await;
            if cost > budget.max_tokens {
                log::warn!(
                    "Directory tree alone costs {} tokens, over the budget of {}; leaving it out",
                    cost,
                    budget.max_tokens
                );
            } else {
                tree_tokens = cost;
                tree = Some(nodes);
                tree_text = Some(text);
            }
        }

        let assembled =
            assembler::assemble(&selected, catalog, fs, estimator, budget, tree_tokens).await?;

        Ok(Self {
            project_name: config.get_effective_project_name(catalog.root()),
            tree,
            tree_text,
            content: assembled.content,
            processed_tokens: assembled.processed_tokens,
            max_tokens: budget.max_tokens,
            limit_reached: assembled.limit_reached,
            files_included: assembled.included,
            files_skipped: assembled.skipped,
            generated_at: config.output.include_timestamp.then(Utc::now),
        })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if let Some(tree_text) = &self.tree_text {
            out.push_str(&tree_section(tree_text));
        }
        out.push_str(&self.content);
        out
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => Ok(self.to_text()),
            OutputFormat::Json => serialize_to_json(self, true),
            OutputFormat::Yaml => serialize_to_yaml(self),
        }
    }
}
