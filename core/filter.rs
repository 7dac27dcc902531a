use crate::catalog::{EntryCatalog, FileSystemEntry};
use crate::config::FileGroup;
use globset::{Glob, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterDecision {
    AlwaysShow,
    AlwaysHide,
    ShowIfSelected,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Show,
    Hide,
    IfSelected,
}

impl Tier {
    fn for_group(name: &str, group: &FileGroup) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "alwaysshow" => Tier::Show,
            "alwayshide" => Tier::Hide,
            "showifselected" => Tier::IfSelected,
            _ if group.initially_visible => Tier::Show,
            _ => Tier::IfSelected,
        }
    }
}

// Directory patterns (`foo/`) split into a directory-only `foo` and a general `foo/**`.
#[derive(Debug, Clone)]
struct TierMatcher {
    any: GlobSet,
    dirs_only: GlobSet,
}

impl TierMatcher {
    fn build(patterns: &[&str]) -> Self {
        let mut any = Vec::new();
        let mut dirs_only = Vec::new();
        for pattern_str in patterns {
            let trimmed = pattern_str.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(dir) = trimmed.strip_suffix('/').filter(|d| !d.is_empty()) {
                let processed = format!("{}/**", dir);
                if let (Some(bare), Some(below)) =
                    (compile(pattern_str, dir), compile(pattern_str, &processed))
                {
                    dirs_only.push(bare);
                    any.push(below);
                }
            } else if let Some(glob) = compile(pattern_str, trimmed) {
                any.push(glob);
            }
        }
        Self {
            any: finish(any),
            dirs_only: finish(dirs_only),
        }
    }

    fn matches(&self, entry: &FileSystemEntry) -> bool {
        let candidates = [entry.name.as_str(), entry.relative_path.as_str()];
        candidates.iter().any(|c| self.any.is_match(c))
            || (!entry.is_file && candidates.iter().any(|c| self.dirs_only.is_match(c)))
    }
}

fn compile(original: &str, processed: &str) -> Option<Glob> {
    match Glob::new(processed) {
        Ok(glob) => {
            log::trace!(
                "Adding glob pattern: {} (processed as {})",
                original,
                processed
            );
            Some(glob)
        }
        Err(e) => {
            log::warn!("Ignoring invalid glob pattern \"{}\": {}", original, e);
            None
        }
    }
}

fn finish(globs: Vec<Glob>) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for glob in &globs {
        builder.add(glob.clone());
    }
    match builder.build() {
        Ok(set) => set,
        Err(e) => {
            log::warn!("Error building glob set, retrying pattern by pattern: {}", e);
            let mut builder = GlobSetBuilder::new();
            for glob in globs {
                match GlobSetBuilder::new().add(glob.clone()).build() {
                    Ok(_) => {
                        builder.add(glob);
                    }
                    Err(e) => log::warn!("Ignoring glob pattern \"{}\": {}", glob.glob(), e),
                }
            }
            builder.build().unwrap_or_else(|e| {
                log::warn!("Error building glob set, ignoring its patterns: {}", e);
                GlobSet::empty()
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterEngine {
    show: TierMatcher,
    hide: TierMatcher,
    if_selected: TierMatcher,
}

impl FilterEngine {
    pub fn new(groups: &IndexMap<String, FileGroup>) -> Self {
        let mut show = Vec::new();
        let mut hide = Vec::new();
        let mut if_selected = Vec::new();
        for (name, group) in groups {
            let tier = Tier::for_group(name, group);
            log::debug!(
                "File group '{}' ({} patterns) -> {:?}",
                name,
                group.items.len(),
                tier
            );
            let bucket = match tier {
                Tier::Show => &mut show,
                Tier::Hide => &mut hide,
                Tier::IfSelected => &mut if_selected,
            };
            bucket.extend(group.items.iter().map(String::as_str));
        }
        Self {
            show: TierMatcher::build(&show),
            hide: TierMatcher::build(&hide),
            if_selected: TierMatcher::build(&if_selected),
        }
    }

    pub fn classify(&self, entry: &FileSystemEntry) -> FilterDecision {
        if self.hide.matches(entry) {
            FilterDecision::AlwaysHide
        } else if self.show.matches(entry) {
            FilterDecision::AlwaysShow
        } else if self.if_selected.matches(entry) {
            FilterDecision::ShowIfSelected
        } else {
            FilterDecision::Normal
        }
    }

    /// Classifies every entry. Anything below an always-hidden directory is
    /// always-hidden too, and normal entries below a show-if-selected directory
    /// become show-if-selected.
    pub fn classify_catalog(&self, catalog: &EntryCatalog) -> FilterDecisions {
        let mut decisions = HashMap::with_capacity(catalog.len());
        let mut hidden_dirs = 0usize;
        for entry in catalog.entries() {
            let inherited = entry
                .parent_relative_path()
                .and_then(|p| catalog.get_by_relative_path(p))
                .and_then(|parent| decisions.get(&parent.uri).copied());
            let decision = match (inherited, self.classify(entry)) {
                (Some(FilterDecision::AlwaysHide), _) => FilterDecision::AlwaysHide,
                (Some(FilterDecision::ShowIfSelected), FilterDecision::Normal) => {
                    FilterDecision::ShowIfSelected
                }
                (_, own) => own,
            };
            if decision == FilterDecision::AlwaysHide && !entry.is_file {
                hidden_dirs += 1;
            }
            decisions.insert(entry.uri.clone(), decision);
        }
        log::debug!(
            "Classified {} entries ({} hidden directories)",
            decisions.len(),
            hidden_dirs
        );
        FilterDecisions { decisions }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterDecisions {
    decisions: HashMap<String, FilterDecision>,
}

impl FilterDecisions {
    pub fn get(&self, uri: &str) -> FilterDecision {
        self.decisions
            .get(uri)
            .copied()
            .unwrap_or(FilterDecision::Normal)
    }

    pub fn set(&mut self, uri: impl Into<String>, decision: FilterDecision) {
        self.decisions.insert(uri.into(), decision);
    }

    pub fn is_hidden(&self, uri: &str) -> bool {
        self.get(uri) == FilterDecision::AlwaysHide
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

impl FromIterator<(String, FilterDecision)> for FilterDecisions {
    fn from_iter<I: IntoIterator<Item = (String, FilterDecision)>>(iter: I) -> Self {
        Self {
            decisions: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::file_uri;
    use std::path::Path;

    fn group(visible: bool, items: &[&str]) -> FileGroup {
        FileGroup {
            initially_visible: visible,
            items: items.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn entry(rel: &str, is_file: bool) -> FileSystemEntry {
        FileSystemEntry {
            uri: file_uri(&Path::new("/p").join(rel)),
            is_file,
            size: None,
            name: rel.rsplit('/').next().unwrap().to_string(),
            relative_path: rel.to_string(),
        }
    }

    #[test]
    fn hide_beats_show() {
        let mut groups = IndexMap::new();
        groups.insert("Always show".to_string(), group(true, &["*.rs"]));
        groups.insert("always_hide".to_string(), group(true, &["secret*"]));
        let engine = FilterEngine::new(&groups);

        assert_eq!(
            engine.classify(&entry("src/secret.rs", true)),
            FilterDecision::AlwaysHide
        );
        assert_eq!(
            engine.classify(&entry("src/lib.rs", true)),
            FilterDecision::AlwaysShow
        );
        assert_eq!(
            engine.classify(&entry("notes.md", true)),
            FilterDecision::Normal
        );
    }

    #[test]
    fn unnamed_groups_use_initial_visibility() {
        let mut groups = IndexMap::new();
        groups.insert("Docs".to_string(), group(true, &["*.md"]));
        groups.insert("Lockfiles".to_string(), group(false, &["*.lock"]));
        let engine = FilterEngine::new(&groups);

        assert_eq!(
            engine.classify(&entry("README.md", true)),
            FilterDecision::AlwaysShow
        );
        assert_eq!(
            engine.classify(&entry("Cargo.lock", true)),
            FilterDecision::ShowIfSelected
        );
    }

    #[test]
    fn malformed_pattern_is_ignored_individually() {
        let mut groups = IndexMap::new();
        groups.insert("Always hide".to_string(), group(true, &["[unclosed", "*.key"]));
        let engine = FilterEngine::new(&groups);

        assert_eq!(
            engine.classify(&entry("secret.key", true)),
            FilterDecision::AlwaysHide
        );
        assert_eq!(
            engine.classify(&entry("main.rs", true)),
            FilterDecision::Normal
        );
    }

    #[test]
    fn directory_pattern_hides_subtree() {
        let mut groups = IndexMap::new();
        groups.insert("Always hide".to_string(), group(true, &["node_modules/"]));
        let engine = FilterEngine::new(&groups);

        let root = Path::new("/p");
        let catalog = EntryCatalog::from_entries(
            root,
            vec![
                entry("web", false),
                entry("web/node_modules", false),
                entry("web/node_modules/left-pad", false),
                entry("web/node_modules/left-pad/index.js", true),
                entry("web/app.js", true),
                entry("node_modules", true),
            ],
        )
        .unwrap();
        let decisions = engine.classify_catalog(&catalog);

        assert!(decisions.is_hidden(&catalog.uri_for("web/node_modules")));
        assert!(decisions.is_hidden(&catalog.uri_for("web/node_modules/left-pad/index.js")));
        assert!(!decisions.is_hidden(&catalog.uri_for("web/app.js")));
        // a plain file named like the directory pattern is not a directory
        assert!(!decisions.is_hidden(&catalog.uri_for("node_modules")));
        assert_eq!(decisions.get("file:///elsewhere"), FilterDecision::Normal);
    }

    #[test]
    fn show_if_selected_directory_covers_its_subtree() {
        let mut groups = IndexMap::new();
        groups.insert("Show if selected".to_string(), group(false, &["vendor"]));
        groups.insert("Always show".to_string(), group(true, &["LICENSE"]));
        let engine = FilterEngine::new(&groups);

        let catalog = EntryCatalog::from_entries(
            Path::new("/p"),
            vec![
                entry("lib.rs", true),
                entry("vendor", false),
                entry("vendor/LICENSE", true),
                entry("vendor/x.rs", true),
            ],
        )
        .unwrap();
        let decisions = engine.classify_catalog(&catalog);

        assert_eq!(
            decisions.get(&catalog.uri_for("vendor")),
            FilterDecision::ShowIfSelected
        );
        assert_eq!(
            decisions.get(&catalog.uri_for("vendor/x.rs")),
            FilterDecision::ShowIfSelected
        );
        assert_eq!(
            decisions.get(&catalog.uri_for("vendor/LICENSE")),
            FilterDecision::AlwaysShow
        );
        assert_eq!(
            decisions.get(&catalog.uri_for("lib.rs")),
            FilterDecision::Normal
        );
    }

    #[test]
    fn finish_keeps_every_compiled_pattern() {
        let globs = ["*.key", "target/**", "[ab].txt"]
            .iter()
            .map(|p| Glob::new(p).unwrap())
            .collect();
        let set = finish(globs);
        assert_eq!(set.len(), 3);
        assert!(set.is_match("a.txt"));
        assert!(set.is_match("target/debug/app"));
        assert!(finish(Vec::new()).is_empty());
    }
}
