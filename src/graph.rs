//! Graph rendering port.
//!
//! The pipeline only normalizes the model's graph into display elements; the
//! layout and interaction live in a client-side library behind [`GraphRenderer`].

use std::collections::HashSet;

use serde::Serialize;

use crate::annotate::escape_html;
use crate::response::GraphResponse;

const DEFAULT_COLOR: &str = "#2a9d8f";
const DEFAULT_SHAPE: &str = "ellipse";
const DEFAULT_REL_TYPE: &str = "AS";

/// Shapes the Cytoscape renderer accepts.
const KNOWN_SHAPES: &[&str] = &[
    "ellipse",
    "triangle",
    "round-triangle",
    "rectangle",
    "round-rectangle",
    "roundrectangle",
    "bottom-round-rectangle",
    "cut-rectangle",
    "barrel",
    "rhomboid",
    "diamond",
    "round-diamond",
    "pentagon",
    "round-pentagon",
    "hexagon",
    "round-hexagon",
    "concave-hexagon",
    "heptagon",
    "round-heptagon",
    "octagon",
    "round-octagon",
    "star",
    "tag",
    "round-tag",
    "vee",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderNode {
    pub id: String,
    pub label: String,
    pub color: String,
    pub shape: String,
    pub size: u32,
    pub z_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEdge {
    pub source: String,
    pub target: String,
    pub rel_type: String,
}

/// Display-ready graph: every edge references a declared node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderGraph {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
    /// Edges removed because an endpoint was not a declared node.
    #[serde(skip)]
    pub dropped_edges: usize,
}

fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 4 | 6 | 8) && digits.chars().all(|c| c.is_ascii_hexdigit())
}

fn normalize_shape(shape: Option<&str>) -> String {
    shape
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| KNOWN_SHAPES.contains(&s.as_str()))
        .unwrap_or_else(|| DEFAULT_SHAPE.to_string())
}

fn size_and_layer(node_type: Option<&str>) -> (u32, u32) {
    match node_type.map(str::trim) {
        Some(t) if t.eq_ignore_ascii_case("class") => (110, 10),
        Some(t) if t.eq_ignore_ascii_case("root") => (90, 10),
        _ => (75, 1),
    }
}

impl RenderGraph {
    pub fn from_response(graph: &GraphResponse) -> Self {
        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            if !seen.insert(node.id.clone()) {
                continue;
            }
            let (size, z_index) = size_and_layer(node.node_type.as_deref());
            let color = node
                .color
                .as_deref()
                .map(str::trim)
                .filter(|c| is_hex_color(c))
                .unwrap_or(DEFAULT_COLOR)
                .to_string();
            nodes.push(RenderNode {
                id: node.id.clone(),
                label: node.label.clone(),
                color,
                shape: normalize_shape(node.shape.as_deref()),
                size,
                z_index,
            });
        }

        let mut dropped_edges = 0;
        let mut edges = Vec::with_capacity(graph.edges.len());
        for edge in &graph.edges {
            if !seen.contains(&edge.source) || !seen.contains(&edge.target) {
                tracing::debug!(
                    source = %edge.source,
                    target = %edge.target,
                    "dropping edge with undeclared endpoint"
                );
                dropped_edges += 1;
                continue;
            }
            edges.push(RenderEdge {
                source: edge.source.clone(),
                target: edge.target.clone(),
                rel_type: edge
                    .rel_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REL_TYPE.to_string()),
            });
        }

        Self {
            nodes,
            edges,
            dropped_edges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Cytoscape element list: `[{data: {...}}, ...]`, nodes first.
    pub fn elements(&self) -> serde_json::Value {
        let nodes = self.nodes.iter().map(|node| serde_json::json!({ "data": node }));
        let edges = self.edges.iter().map(|edge| serde_json::json!({ "data": edge }));
        serde_json::Value::Array(nodes.chain(edges).collect())
    }
}

/// Turns a normalized graph into an embeddable HTML fragment.
pub trait GraphRenderer: Send + Sync {
    fn render(&self, graph: &RenderGraph, container_id: &str) -> String;
}

/// Cytoscape.js renderer: cose layout, hover highlighting, click-to-scroll to
/// the prose anchor with the same id, and PNG export.
#[derive(Debug, Clone)]
pub struct CytoscapeRenderer {
    pub script_url: String,
    pub height_px: u32,
}

impl Default for CytoscapeRenderer {
    fn default() -> Self {
        Self {
            script_url: "https://cdnjs.cloudflare.com/ajax/libs/cytoscape/3.26.0/cytoscape.min.js"
                .to_string(),
            height_px: 800,
        }
    }
}

/// JSON safe to place inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

impl GraphRenderer for CytoscapeRenderer {
    fn render(&self, graph: &RenderGraph, container_id: &str) -> String {
        let container = escape_html(container_id);
        let container_js = script_json(&serde_json::Value::String(container_id.to_string()));
        let elements = script_json(&graph.elements());
        format!(
            r##"<div class="sis-graph" style="position: relative; margin-top: 25px;">
  <button id="{container}_save" class="sis-graph-save">Download PNG</button>
  <div id="{container}" style="width: 100%; height: {height}px; background: #ffffff; border-radius: 25px; border: 1px solid #e2e8f0;"></div>
</div>
<script src="{script}"></script>
<script>
(function() {{
  var cy = cytoscape({{
    container: document.getElementById({container_js}),
    elements: {elements},
    style: [
      {{ selector: 'node', style: {{
          'label': 'data(label)', 'text-valign': 'center', 'color': '#111',
          'background-color': 'data(color)', 'width': 'data(size)', 'height': 'data(size)',
          'shape': 'data(shape)', 'font-size': '14px', 'font-weight': '700',
          'text-outline-width': 3, 'text-outline-color': '#ffffff', 'z-index': 'data(z_index)',
          'transition-property': 'background-color, border-width, border-color', 'transition-duration': '0.4s' }} }},
      {{ selector: 'edge', style: {{
          'width': 4, 'line-color': '#cbd5e0', 'label': 'data(rel_type)', 'font-size': '11px',
          'color': '#2a9d8f', 'target-arrow-color': '#cbd5e0', 'target-arrow-shape': 'triangle',
          'curve-style': 'bezier', 'text-rotation': 'autorotate', 'text-background-opacity': 1,
          'text-background-color': '#ffffff', 'text-background-padding': '5px' }} }},
      {{ selector: 'node.highlighted', style: {{ 'border-width': 7, 'border-color': '#e76f51', 'z-index': 9999, 'font-size': '20px' }} }},
      {{ selector: '.dimmed', style: {{ 'opacity': 0.05, 'text-opacity': 0 }} }}
    ],
    layout: {{ name: 'cose', padding: 80, animate: true, nodeRepulsion: 45000, idealEdgeLength: 160 }}
  }});
  cy.on('mouseover', 'node', function(e) {{
    var sel = e.target;
    cy.elements().addClass('dimmed');
    sel.neighborhood().add(sel).removeClass('dimmed').addClass('highlighted');
  }});
  cy.on('mouseout', 'node', function() {{
    cy.elements().removeClass('dimmed highlighted');
  }});
  cy.on('tap', 'node', function(evt) {{
    var target = document.getElementById(evt.target.id());
    if (target) {{
      target.scrollIntoView({{ behavior: 'smooth', block: 'center' }});
      target.style.backgroundColor = '#ffffd0';
      setTimeout(function() {{ target.style.backgroundColor = 'transparent'; }}, 4000);
    }}
  }});
  document.getElementById({save_js}).addEventListener('click', function() {{
    var link = document.createElement('a');
    link.href = cy.png({{ full: true, bg: 'white', scale: 3 }});
    link.download = 'sis_universal_map_' + Date.now() + '.png';
    document.body.appendChild(link);
    link.click();
    document.body.removeChild(link);
  }});
}})();
</script>
"##,
            height = self.height_px,
            script = escape_html(&self.script_url),
            save_js = script_json(&serde_json::Value::String(format!("{container_id}_save"))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{GraphEdge, GraphNode};

    fn node(id: &str, node_type: Option<&str>, color: Option<&str>, shape: Option<&str>) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            label: format!("label {id}"),
            node_type: node_type.map(str::to_string),
            color: color.map(str::to_string),
            shape: shape.map(str::to_string),
        }
    }

    fn edge(source: &str, target: &str) -> GraphEdge {
        GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: None,
        }
    }

    #[test]
    fn sizes_and_defaults_follow_node_type() {
        let graph = GraphResponse {
            nodes: vec![
                node("a", Some("Class"), Some("#FFC000"), Some("Diamond")),
                node("b", Some("root"), Some("red"), Some("blob")),
                node("c", Some("Leaf"), None, None),
            ],
            edges: vec![edge("a", "b")],
        };
        let render = RenderGraph::from_response(&graph);
        assert_eq!((render.nodes[0].size, render.nodes[0].z_index), (110, 10));
        assert_eq!(render.nodes[0].shape, "diamond");
        assert_eq!(render.nodes[0].color, "#FFC000");
        assert_eq!((render.nodes[1].size, render.nodes[1].z_index), (90, 10));
        assert_eq!(render.nodes[1].color, DEFAULT_COLOR);
        assert_eq!(render.nodes[1].shape, DEFAULT_SHAPE);
        assert_eq!((render.nodes[2].size, render.nodes[2].z_index), (75, 1));
        assert_eq!(render.edges[0].rel_type, "AS");
    }

    #[test]
    fn dangling_edges_are_dropped() {
        let graph = GraphResponse {
            nodes: vec![node("a", None, None, None), node("b", None, None, None)],
            edges: vec![edge("a", "b"), edge("a", "ghost"), edge("ghost", "b")],
        };
        let render = RenderGraph::from_response(&graph);
        assert_eq!(render.edges.len(), 1);
        assert_eq!(render.dropped_edges, 2);
    }

    #[test]
    fn duplicate_ids_keep_first() {
        let mut second = node("a", Some("Root"), None, None);
        second.label = "other".to_string();
        let graph = GraphResponse {
            nodes: vec![node("a", None, None, None), second],
            edges: Vec::new(),
        };
        let render = RenderGraph::from_response(&graph);
        assert_eq!(render.nodes.len(), 1);
        assert_eq!(render.nodes[0].label, "label a");
    }

    #[test]
    fn elements_put_nodes_before_edges() {
        let graph = GraphResponse {
            nodes: vec![node("a", None, None, None), node("b", None, None, None)],
            edges: vec![edge("a", "b")],
        };
        let elements = RenderGraph::from_response(&graph).elements();
        let items = elements.as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["data"]["id"], "a");
        assert_eq!(items[2]["data"]["source"], "a");
        assert_eq!(items[2]["data"]["rel_type"], "AS");
    }

    #[test]
    fn renderer_escapes_script_content() {
        let mut evil = node("x", None, None, None);
        evil.label = "</script><b>".to_string();
        let graph = GraphResponse {
            nodes: vec![evil],
            edges: Vec::new(),
        };
        let html = CytoscapeRenderer::default().render(&RenderGraph::from_response(&graph), "viz");
        assert!(html.contains("id=\"viz\""));
        assert!(html.contains("\\u003c/script\\u003e"));
        assert!(!html.contains("</script><b>"));
        assert!(html.contains("cytoscape.min.js"));
    }

    #[test]
    fn hex_color_check() {
        assert!(is_hex_color("#fff"));
        assert!(is_hex_color("#A6A6A6"));
        assert!(!is_hex_color("A6A6A6"));
        assert!(!is_hex_color("#12345"));
        assert!(!is_hex_color("#zzz"));
    }
}
