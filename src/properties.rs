//! Node, branch and affordance types shared by the engine, its collaborators and its events.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use crate::config::{AttributeNames, TreeConfig};

/// Identity a node declares for itself. Unique within one tree instance.
pub type NodeId = String;

/// Branch-group tag of a child. `None` is the default branch-type.
pub type ChildType = Option<String>;

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Engine-assigned handle for a stored row. Rows without a declared id (placeholders, grouped
/// follower rows) are only addressable through their `RowId`. Never reused within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row:{}", self.0)
    }
}

/// What a renderer (at initial load) or a data source (after a fetch) tells the engine about a
/// row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default, alias = "parentId", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, alias = "childType", skip_serializing_if = "Option::is_none")]
    pub child_type: ChildType,
    #[serde(default, alias = "isPlaceholder")]
    pub placeholder: bool,
    /// Lead node this row belongs to when parent grouping is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<NodeId>,
}

impl NodeDescriptor {
    pub fn new<S: Into<String>>(id: S) -> Self {
        NodeDescriptor {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    /// A row with no id of its own.
    pub fn anonymous() -> Self {
        NodeDescriptor::default()
    }

    /// The stand-in row for an unfetched branch.
    pub fn placeholder_for<S: Into<String>>(parent: S, child_type: ChildType) -> Self {
        NodeDescriptor {
            id: None,
            parent_id: Some(parent.into()),
            child_type,
            placeholder: true,
            group: None,
        }
    }

    pub fn with_parent<S: Into<String>>(mut self, parent: S) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_child_type<S: Into<String>>(mut self, child_type: S) -> Self {
        self.child_type = Some(child_type.into());
        self
    }

    pub fn in_group<S: Into<String>>(mut self, lead: S) -> Self {
        self.group = Some(lead.into());
        self
    }

    /// Blank strings become absent, the same way stored rows treat them.
    pub fn normalized(self) -> Self {
        NodeDescriptor {
            id: non_empty(self.id.as_ref()),
            parent_id: non_empty(self.parent_id.as_ref()),
            child_type: non_empty(self.child_type.as_ref()),
            placeholder: self.placeholder,
            group: non_empty(self.group.as_ref()),
        }
    }

    /// Decode a row from its raw attribute bag using the configured tagging convention. The
    /// placeholder marker is honoured either as a token of the class attribute or as an attribute
    /// of its own (any value but `"false"`).
    pub fn from_attributes(attrs: &BTreeMap<String, String>, config: &TreeConfig) -> Self {
        let names: &AttributeNames = &config.attributes;
        let marker = config.placeholder_marker.as_str();
        let in_class = attrs
            .get(&names.class)
            .map(|class| class.split_whitespace().any(|token| token == marker))
            .unwrap_or(false);
        let as_attr = attrs
            .get(marker)
            .map(|value| value != "false")
            .unwrap_or(false);
        NodeDescriptor {
            id: non_empty(attrs.get(&names.id)),
            parent_id: non_empty(attrs.get(&names.parent)),
            child_type: non_empty(attrs.get(&names.child_type)),
            placeholder: in_class || as_attr,
            group: non_empty(attrs.get(&names.group)),
        }
    }
}

/// A stored row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub row: RowId,
    pub id: Option<NodeId>,
    pub parent_id: Option<NodeId>,
    pub child_type: ChildType,
    pub placeholder: bool,
    pub group: Option<NodeId>,
    pub(crate) visible: bool,
}

impl TreeNode {
    /// Empty strings are normalised to absent so `is_child` and id lookups agree.
    pub(crate) fn from_descriptor(row: RowId, desc: NodeDescriptor) -> Self {
        TreeNode {
            row,
            id: non_empty(desc.id.as_ref()),
            parent_id: non_empty(desc.parent_id.as_ref()),
            child_type: non_empty(desc.child_type.as_ref()),
            placeholder: desc.placeholder,
            group: non_empty(desc.group.as_ref()),
            visible: true,
        }
    }

    /// Derived from the expansion state; never set directly by callers.
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn is_child(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn descriptor(&self) -> NodeDescriptor {
        NodeDescriptor {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            child_type: self.child_type.clone(),
            placeholder: self.placeholder,
            group: self.group.clone(),
        }
    }

    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => self.row.to_string(),
        }
    }
}

/// One `(parent, child-type)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchKey {
    pub node: NodeId,
    pub child_type: ChildType,
}

impl BranchKey {
    pub fn new<S: Into<String>>(node: S, child_type: ChildType) -> Self {
        BranchKey {
            node: node.into(),
            child_type,
        }
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.child_type {
            Some(child_type) => write!(f, "{}/{}", self.node, child_type),
            None => write!(f, "{}", self.node),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchState {
    /// No children registered at all.
    Empty,
    /// Exactly one placeholder stands in for unfetched children.
    Placeholder,
    /// Real children (possibly zero, after an empty fetch) and no placeholder.
    Materialized { children: usize },
}

/// Which control a branch currently offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Affordance {
    /// No children, so neither control is shown.
    None,
    /// Collapsed: expand control visible, collapse control hidden.
    Expand,
    /// Expanded: collapse control visible, expand control hidden.
    Collapse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_attributes() {
        let config = TreeConfig::default();
        let attrs: BTreeMap<String, String> = [
            ("id", ""),
            ("parentid", "R"),
            ("childtype", "comments"),
            ("class", "row odd att_placeholder"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let desc = NodeDescriptor::from_attributes(&attrs, &config);
        assert_eq!(desc.id, None);
        assert_eq!(desc.parent_id.as_deref(), Some("R"));
        assert_eq!(desc.child_type.as_deref(), Some("comments"));
        assert!(desc.placeholder);
    }

    #[test]
    fn test_marker_as_attribute() {
        let config = TreeConfig::default();
        let mut attrs = BTreeMap::new();
        attrs.insert("id".to_string(), "N".to_string());
        attrs.insert("att_placeholder".to_string(), "false".to_string());
        assert!(!NodeDescriptor::from_attributes(&attrs, &config).placeholder);
        attrs.insert("att_placeholder".to_string(), "".to_string());
        assert!(NodeDescriptor::from_attributes(&attrs, &config).placeholder);
    }

    #[test]
    fn test_empty_parent_is_root() {
        let node = TreeNode::from_descriptor(RowId(0), NodeDescriptor::new("N").with_parent(""));
        assert!(!node.is_child());
        assert_eq!(node.label(), "N");
        let anon = TreeNode::from_descriptor(RowId(3), NodeDescriptor::anonymous());
        assert_eq!(anon.label(), "row:3");
    }

    #[test]
    fn test_descriptor_accepts_camel_case() {
        let desc: NodeDescriptor =
            serde_json::from_str(r#"{"id":"C1","parentId":"R","childType":"comments"}"#).unwrap();
        assert_eq!(desc, NodeDescriptor::new("C1").with_parent("R").with_child_type("comments"));
    }
}
