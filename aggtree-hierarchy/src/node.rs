//! Node records in their persisted shape

use aggtree_core::NodeId;
use aggtree_formula::{Operation, UsedAttribute};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Root,
    Attribute,
    Aggregation,
}

/// Informational column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Number,
    Text,
    Date,
    #[default]
    Unknown,
    None,
}

/// Formula state of an aggregation node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationInfo {
    #[serde(default)]
    pub operation: Operation,
    /// Human-authored source, e.g. `$(a) + $(b)`
    #[serde(default)]
    pub formula: String,
    /// Compiled transform source, e.g. `r => r["a"] + r["b"]`
    #[serde(default)]
    pub exec: String,
    #[serde(default)]
    pub used_attributes: Vec<UsedAttribute>,
}

impl AggregationInfo {
    pub fn new(operation: Operation, used_attributes: Vec<UsedAttribute>) -> Self {
        Self {
            operation,
            used_attributes,
            ..Self::default()
        }
    }

    pub fn clear_formula(&mut self) {
        self.formula.clear();
        self.exec.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeNode {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub dtype: Dtype,
    #[serde(default)]
    pub desc: String,
    #[serde(default = "default_shown")]
    pub is_shown: bool,
    /// Ordered child ids
    #[serde(default)]
    pub related: Vec<NodeId>,
    #[serde(
        default,
        serialize_with = "serialize_info",
        deserialize_with = "deserialize_info"
    )]
    pub info: Option<AggregationInfo>,
}

fn default_shown() -> bool {
    true
}

impl AttributeNode {
    fn new(id: NodeId, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id,
            name: name.into(),
            node_type,
            dtype: Dtype::Unknown,
            desc: String::new(),
            is_shown: true,
            related: Vec::new(),
            info: None,
        }
    }

    pub fn root(name: impl Into<String>) -> Self {
        let mut node = Self::new(0, name, NodeType::Root);
        node.dtype = Dtype::None;
        node
    }

    pub fn attribute(id: NodeId, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Attribute)
    }

    pub fn aggregation(id: NodeId, name: impl Into<String>, info: AggregationInfo) -> Self {
        let mut node = Self::new(id, name, NodeType::Aggregation);
        node.info = Some(info);
        node
    }

    pub fn with_dtype(mut self, dtype: Dtype) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_related(mut self, related: Vec<NodeId>) -> Self {
        self.related = related;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_shown = false;
        self
    }

    pub fn is_root(&self) -> bool {
        self.node_type == NodeType::Root
    }

    pub fn is_aggregation(&self) -> bool {
        self.node_type == NodeType::Aggregation
    }

    /// Formula source, empty for non-aggregations
    pub fn formula(&self) -> &str {
        self.info.as_ref().map(|i| i.formula.as_str()).unwrap_or("")
    }
}

/// Shallow field update; `None` leaves a field untouched.
///
/// `info` distinguishes "leave alone" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<Dtype>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_shown: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_patch_info",
        deserialize_with = "deserialize_patch_info"
    )]
    pub info: Option<Option<AggregationInfo>>,
}

impl NodePatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn info(info: Option<AggregationInfo>) -> Self {
        Self {
            info: Some(info),
            ..Self::default()
        }
    }

    pub fn with_shown(mut self, shown: bool) -> Self {
        self.is_shown = Some(shown);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Current values of exactly the fields this patch would overwrite
    pub fn capture(&self, node: &AttributeNode) -> NodePatch {
        NodePatch {
            name: self.name.as_ref().map(|_| node.name.clone()),
            node_type: self.node_type.map(|_| node.node_type),
            dtype: self.dtype.map(|_| node.dtype),
            desc: self.desc.as_ref().map(|_| node.desc.clone()),
            is_shown: self.is_shown.map(|_| node.is_shown),
            info: self.info.as_ref().map(|_| node.info.clone()),
        }
    }

    pub fn apply_to(&self, node: &mut AttributeNode) {
        if let Some(name) = &self.name {
            node.name = name.clone();
        }
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(dtype) = self.dtype {
            node.dtype = dtype;
        }
        if let Some(desc) = &self.desc {
            node.desc = desc.clone();
        }
        if let Some(shown) = self.is_shown {
            node.is_shown = shown;
        }
        if let Some(info) = &self.info {
            node.info = info.clone();
        }
    }
}

// Non-aggregations persist `info` as an empty object
fn serialize_info<S: Serializer>(info: &Option<AggregationInfo>, s: S) -> Result<S::Ok, S::Error> {
    match info {
        Some(info) => info.serialize(s),
        None => s.serialize_map(Some(0))?.end(),
    }
}

fn deserialize_info<'de, D: Deserializer<'de>>(d: D) -> Result<Option<AggregationInfo>, D::Error> {
    match Option::<serde_json::Value>::deserialize(d)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(None),
        Some(raw) => serde_json::from_value(raw).map(Some).map_err(D::Error::custom),
    }
}

fn serialize_patch_info<S: Serializer>(
    info: &Option<Option<AggregationInfo>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match info {
        Some(Some(info)) => info.serialize(s),
        _ => s.serialize_none(),
    }
}

fn deserialize_patch_info<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Option<AggregationInfo>>, D::Error> {
    deserialize_info(d).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_persisted_field_names() {
        let node = AttributeNode::aggregation(
            3,
            "total",
            AggregationInfo::new(Operation::Sum, vec![UsedAttribute::new(1, "a")]),
        )
        .with_related(vec![1]);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "aggregation");
        assert_eq!(json["isShown"], true);
        assert_eq!(json["info"]["operation"], "sum");
        assert_eq!(json["info"]["usedAttributes"][0]["name"], "a");
    }

    #[test]
    fn test_attribute_info_is_empty_object() {
        let json = serde_json::to_value(AttributeNode::attribute(1, "a")).unwrap();
        assert_eq!(json["info"], json!({}));
        let back: AttributeNode = serde_json::from_value(json).unwrap();
        assert_eq!(back.info, None);
    }

    #[test]
    fn test_minimal_record_defaults() {
        let node: AttributeNode =
            serde_json::from_value(json!({"id": 2, "name": "b", "type": "attribute"})).unwrap();
        assert!(node.is_shown);
        assert_eq!(node.dtype, Dtype::Unknown);
        assert!(node.related.is_empty());
    }

    #[test]
    fn test_patch_distinguishes_clear_from_absent() {
        let absent: NodePatch = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(absent.info, None);
        let cleared: NodePatch = serde_json::from_value(json!({"info": null})).unwrap();
        assert_eq!(cleared.info, Some(None));
    }

    #[test]
    fn test_capture_only_patched_fields() {
        let node = AttributeNode::attribute(1, "a").with_desc("old");
        let patch = NodePatch {
            desc: Some("new".to_string()),
            ..NodePatch::default()
        };
        let before = patch.capture(&node);
        assert_eq!(before.desc.as_deref(), Some("old"));
        assert_eq!(before.name, None);

        let mut edited = node.clone();
        patch.apply_to(&mut edited);
        before.apply_to(&mut edited);
        assert_eq!(edited, node);
    }
}
