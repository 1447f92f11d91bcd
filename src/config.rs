//! Immutable engine configuration.
//!
//! A [`TreeConfig`] is read once (from a file or built in code) and then shared with the engine as
//! an `Arc<TreeConfig>`. Nothing in the crate mutates it after construction.

use crate::error::TreeError;
use serde::{Deserialize, Serialize};
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
};
use url::Url;

/// How the child-type of a node's children partitions them into branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchMode {
    /// All children of a node form one branch; child-types are ignored.
    Single,
    /// Each child-type is an independent branch.
    Multiple,
    /// Each child-type is a branch, and expanding one evicts every other materialized type back to
    /// a placeholder.
    Exclusive,
}

/// Attribute names used when decoding attribute-bag node descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    pub id: String,
    pub parent: String,
    pub child_type: String,
    pub class: String,
    pub group: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        AttributeNames {
            id: "id".to_string(),
            parent: "parentid".to_string(),
            child_type: "childtype".to_string(),
            class: "class".to_string(),
            group: "groupid".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Endpoint branch data is requested from.
    pub child_fetch_path: String,
    pub attributes: AttributeNames,
    /// Class token (or boolean attribute name) flagging a placeholder row.
    pub placeholder_marker: String,
    pub expand_control: String,
    pub collapse_control: String,
    /// Prefix stripped from child-types before they are sent to the data source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_type_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_mode: Option<BranchMode>,
    pub parent_grouping: bool,
    pub extra_params_deny_list: Vec<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        TreeConfig {
            child_fetch_path: "#".to_string(),
            attributes: AttributeNames::default(),
            placeholder_marker: "att_placeholder".to_string(),
            expand_control: "att_expand_button".to_string(),
            collapse_control: "att_collapse_button".to_string(),
            child_type_prefix: None,
            branch_mode: None,
            parent_grouping: false,
            extra_params_deny_list: Vec::new(),
        }
    }
}

/// Config file formats [`TreeConfig::from_path`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<ConfigFormat> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => Some(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Some(ConfigFormat::Yaml),
            Some("json") => Some(ConfigFormat::Json),
            _ => None,
        }
    }
}

impl TreeConfig {
    /// The effective branch mode. An explicit `branch_mode` wins; otherwise a configured
    /// `child_type_prefix` turns on exclusive multi-type branches.
    pub fn branch_mode(&self) -> BranchMode {
        match (self.branch_mode, &self.child_type_prefix) {
            (Some(mode), _) => mode,
            (None, Some(_)) => BranchMode::Exclusive,
            (None, None) => BranchMode::Single,
        }
    }

    pub fn with_branch_mode(mut self, mode: BranchMode) -> Self {
        self.branch_mode = Some(mode);
        self
    }

    pub fn with_fetch_path<S: Into<String>>(mut self, path: S) -> Self {
        self.child_fetch_path = path.into();
        self
    }

    pub fn with_parent_grouping(mut self, enabled: bool) -> Self {
        self.parent_grouping = enabled;
        self
    }

    pub fn with_deny_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_params_deny_list = names.into_iter().map(Into::into).collect();
        self
    }

    /// Strip the configured prefix from a child-type, as sent in fetch requests.
    pub fn wire_child_type<'a>(&self, child_type: &'a str) -> &'a str {
        match &self.child_type_prefix {
            Some(prefix) => child_type.strip_prefix(prefix.as_str()).unwrap_or(child_type),
            None => child_type,
        }
    }

    pub fn is_denied(&self, name: &str) -> bool {
        self.extra_params_deny_list.iter().any(|denied| denied == name)
    }

    /// Resolve `child_fetch_path` against `base`. Absolute endpoints ignore `base`.
    pub fn fetch_url(&self, base: &Url) -> Result<Url, TreeError> {
        Ok(base.join(&self.child_fetch_path)?)
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<TreeConfig, TreeError> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Load a config file. The format follows the extension; files without a known extension are
    /// tried as YAML, then JSON, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<TreeConfig, TreeError> {
        let path = path.as_ref();
        tracing::debug!("Reading tree config from {:?}", path);
        let content = read_to_string(path)?;
        if let Some(format) = ConfigFormat::from_path(path) {
            return TreeConfig::parse(&content, format);
        }
        let mut failures = Vec::new();
        for format in [ConfigFormat::Yaml, ConfigFormat::Json, ConfigFormat::Toml] {
            match TreeConfig::parse(&content, format) {
                Ok(config) => return Ok(config),
                Err(e) => failures.push(format!("{format:?}: {e}")),
            }
        }
        Err(TreeError::Config(format!(
            "{} is not valid YAML, JSON or TOML ({})",
            PathBuf::from(path).display(),
            failures.join("; ")
        )))
    }
}
