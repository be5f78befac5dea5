//! Splitting raw model output into prose and the trailing graph description.
//!
//! Model output is untrusted: the graph JSON is coerced field by field and
//! anything unusable is dropped rather than failing the whole response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Literal delimiter between prose and graph JSON.
pub const SENTINEL: &str = "### SEMANTIC_GRAPH_JSON";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphResponse {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// Text before the sentinel, untouched.
    pub prose: String,
    pub graph: Option<GraphResponse>,
    pub warning: Option<String>,
}

/// Strings and numbers are accepted as identifiers; anything else is not.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn coerce_node(value: &Value) -> Option<GraphNode> {
    let id = scalar_text(value.get("id"))?;
    let label = scalar_text(value.get("label")).unwrap_or_else(|| id.clone());
    Some(GraphNode {
        id,
        label,
        node_type: optional_text(value.get("type")),
        color: optional_text(value.get("color")),
        shape: optional_text(value.get("shape")),
    })
}

fn coerce_edge(value: &Value) -> Option<GraphEdge> {
    Some(GraphEdge {
        source: scalar_text(value.get("source"))?,
        target: scalar_text(value.get("target"))?,
        rel_type: optional_text(value.get("rel_type")),
    })
}

impl GraphResponse {
    /// Builds a graph from arbitrary JSON. Missing `nodes`/`edges` become empty
    /// lists; entries without usable ids or endpoints are skipped.
    pub fn from_value(value: &Value) -> Self {
        Self {
            nodes: array_items(value, "nodes").iter().filter_map(coerce_node).collect(),
            edges: array_items(value, "edges").iter().filter_map(coerce_edge).collect(),
        }
    }
}

fn array_items<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Greedy span from the first `{` to the last `}`.
fn json_span(tail: &str) -> Option<&str> {
    let start = tail.find('{')?;
    let end = tail.rfind('}')?;
    (end > start).then(|| &tail[start..=end])
}

pub fn parse_response(text: &str) -> ParsedResponse {
    let Some((prose, tail)) = text.split_once(SENTINEL) else {
        return ParsedResponse {
            prose: text.to_string(),
            graph: None,
            warning: None,
        };
    };

    let Some(span) = json_span(tail) else {
        return ParsedResponse {
            prose: prose.to_string(),
            graph: None,
            warning: Some("graph marker present but no JSON object followed it".to_string()),
        };
    };

    match serde_json::from_str::<Value>(span) {
        Ok(value) if value.is_object() => ParsedResponse {
            prose: prose.to_string(),
            graph: Some(GraphResponse::from_value(&value)),
            warning: None,
        },
        Ok(_) => ParsedResponse {
            prose: prose.to_string(),
            graph: None,
            warning: Some("graph data is not a JSON object".to_string()),
        },
        Err(err) => ParsedResponse {
            prose: prose.to_string(),
            graph: None,
            warning: Some(format!("graph data parsing failed: {err}")),
        },
    }
}
