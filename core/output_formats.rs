use crate::config::FileGroup;
use crate::error::{AppError, Result};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::Serialize;

static DEFAULT_FILE_GROUPS: Lazy<IndexMap<String, FileGroup>> = Lazy::new(|| {
    let yaml_content = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../data/default_file_groups.yaml"
    ));
    serde_yml::from_str(yaml_content)
        .expect("Failed to parse embedded data/default_file_groups.yaml")
});

pub fn get_default_file_groups() -> &'static IndexMap<String, FileGroup> {
    &DEFAULT_FILE_GROUPS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(AppError::InvalidArgument(format!(
                "Unsupported output format '{}'. Use text, json or yaml.",
                other
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }
}

pub fn serialize_to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, AppError> {
    if pretty {
        serde_json::to_string_pretty(value).map_err(AppError::JsonSerialize)
    } else {
        serde_json::to_string(value).map_err(AppError::JsonSerialize)
    }
}

pub fn serialize_to_yaml<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_yml::to_string(value).map_err(AppError::YamlError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_groups_cover_all_three_tiers() {
        let groups = get_default_file_groups();
        for name in ["Always hide", "Show if selected", "Always show"] {
            assert!(groups.contains_key(name), "missing default group {name}");
        }
        assert!(groups["Always hide"].items.iter().any(|p| p == "*.key"));
    }

    #[test]
    fn output_format_names() {
        assert_eq!(OutputFormat::parse("YML").unwrap(), OutputFormat::Yaml);
        assert_eq!(OutputFormat::parse("text").unwrap().extension(), "txt");
        assert!(OutputFormat::parse("xml").is_err());
    }
}
