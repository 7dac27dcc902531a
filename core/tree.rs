use crate::catalog::{CheckedSet, EntryCatalog};
use crate::config::TreeConfig;
use crate::filter::{FilterDecision, FilterDecisions};
use byte_unit::{Byte, UnitType};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeFormatterNode {
    pub label: String,
    pub is_directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeFormatterNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    pub show_sizes: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self { show_sizes: true }
    }
}

impl From<&TreeConfig> for TreeOptions {
    fn from(config: &TreeConfig) -> Self {
        Self {
            show_sizes: config.show_sizes,
        }
    }
}

pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let adjusted = Byte::from_u64(bytes).get_appropriate_unit(UnitType::Binary);
    format!("{:.1}", adjusted)
}

// Checked entries, their ancestors and everything below a checked directory.
struct Selection<'a> {
    checked: HashSet<&'a str>,
    above_checked: HashSet<&'a str>,
}

impl<'a> Selection<'a> {
    fn new(catalog: &'a EntryCatalog, checked: &CheckedSet) -> Self {
        let checked: HashSet<&str> = checked
            .iter()
            .filter_map(|uri| catalog.get(uri))
            .map(|e| e.relative_path.as_str())
            .collect();
        let above_checked = checked.iter().copied().flat_map(ancestors).collect();
        Self {
            checked,
            above_checked,
        }
    }

    fn contains(&self, rel: &str) -> bool {
        self.checked.contains(rel)
            || self.above_checked.contains(rel)
            || ancestors(rel).any(|a| self.checked.contains(a))
    }
}

fn ancestors(rel: &str) -> impl Iterator<Item = &str> {
    let mut current = rel;
    std::iter::from_fn(move || {
        let (parent, _) = current.rsplit_once('/')?;
        current = parent;
        Some(parent)
    })
}

// Hidden directories take their subtree with them. A directory with children renders
// only when one of its descendants does.
pub fn build_nodes(
    catalog: &EntryCatalog,
    decisions: &FilterDecisions,
    checked: &CheckedSet,
    options: TreeOptions,
) -> Vec<TreeFormatterNode> {
    let selection = Selection::new(catalog, checked);
    let entries: Vec<_> = catalog.entries().collect();
    let index: HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.relative_path.as_str(), i))
        .collect();
    let parent_of = |i: usize| {
        entries[i]
            .parent_relative_path()
            .and_then(|p| index.get(p).copied())
    };

    let mut hidden = vec![false; entries.len()];
    let mut visible = vec![false; entries.len()];
    let mut effective = vec![FilterDecision::Normal; entries.len()];
    for (i, entry) in entries.iter().enumerate() {
        let parent = parent_of(i);
        let decision = match decisions.get(&entry.uri) {
            FilterDecision::Normal
                if parent.is_some_and(|p| effective[p] == FilterDecision::ShowIfSelected) =>
            {
                FilterDecision::ShowIfSelected
            }
            own => own,
        };
        effective[i] = decision;
        hidden[i] = decision == FilterDecision::AlwaysHide || parent.is_some_and(|p| hidden[p]);
        visible[i] = !hidden[i]
            && match decision {
                FilterDecision::AlwaysHide => false,
                FilterDecision::AlwaysShow | FilterDecision::Normal => true,
                FilterDecision::ShowIfSelected => selection.contains(&entry.relative_path),
            };
    }

    // Reverse pre-order visits every child before its parent.
    let mut has_children = vec![false; entries.len()];
    let mut rendered_child = vec![false; entries.len()];
    let mut rendered = vec![false; entries.len()];
    for i in (0..entries.len()).rev() {
        rendered[i] = if hidden[i] {
            false
        } else if !entries[i].is_file && has_children[i] {
            rendered_child[i]
        } else {
            visible[i]
        };
        if let Some(p) = parent_of(i) {
            has_children[p] = true;
            rendered_child[p] |= rendered[i];
        }
    }

    let mut roots = Vec::new();
    for (i, entry) in entries.iter().enumerate().filter(|(i, _)| rendered[*i]) {
        let node = TreeFormatterNode {
            label: entry.name.clone(),
            is_directory: !entry.is_file,
            detail: entry
                .size
                .filter(|_| options.show_sizes && entry.is_file)
                .map(human_size),
            children: Vec::new(),
        };
        let components: Vec<&str> = entry.relative_path.split('/').collect();
        log::trace!("Tree node #{}: {}", i, entry.relative_path);
        insert_node(&mut roots, &components, node);
    }
    log::debug!(
        "Tree built: {} of {} entries rendered",
        rendered.iter().filter(|r| **r).count(),
        entries.len()
    );
    roots
}

fn insert_node(level: &mut Vec<TreeFormatterNode>, components: &[&str], node: TreeFormatterNode) {
    let Some((first, rest)) = components.split_first() else {
        return;
    };
    match level.binary_search_by(|n| n.label.as_str().cmp(first)) {
        Ok(index) if !rest.is_empty() => insert_node(&mut level[index].children, rest, node),
        Ok(_) => log::warn!("Duplicate tree node '{}' ignored", node.label),
        Err(insertion_point) if rest.is_empty() => level.insert(insertion_point, node),
        Err(_) => log::error!(
            "Tree node '{}' has no rendered parent '{}'; dropping it",
            node.label,
            first
        ),
    }
}

pub fn render(nodes: &[TreeFormatterNode], root_name: &str) -> String {
    let mut out = String::new();
    out.push_str(root_name.trim_end_matches('/'));
    out.push_str("/\n");
    render_level(nodes, "", &mut out);
    out
}

fn render_level(nodes: &[TreeFormatterNode], prefix: &str, out: &mut String) {
    let mut sorted: Vec<&TreeFormatterNode> = nodes.iter().collect();
    sorted.sort_by(|a, b| a.label.cmp(&b.label));
    let last = sorted.len().saturating_sub(1);
    for (i, node) in sorted.into_iter().enumerate() {
        let (branch, indent) = if i == last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        out.push_str(prefix);
        out.push_str(branch);
        out.push_str(&node.label);
        if node.is_directory {
            out.push('/');
        }
        if let Some(detail) = &node.detail {
            out.push_str(" (");
            out.push_str(detail);
            out.push(')');
        }
        out.push('\n');
        if !node.children.is_empty() {
            render_level(&node.children, &format!("{}{}", prefix, indent), out);
        }
    }
}

pub fn format_tree(
    catalog: &EntryCatalog,
    decisions: &FilterDecisions,
    checked: &CheckedSet,
    root_name: &str,
    options: TreeOptions,
) -> String {
    render(&build_nodes(catalog, decisions, checked, options), root_name)
}
