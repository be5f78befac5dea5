//! HTML and markdown rendering of a finished synthesis.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::annotate::escape_html;
use crate::graph::GraphRenderer;
use crate::pipeline::SynthesisOutcome;
use crate::prompt::SynthesisRequest;

pub const GRAPH_CONTAINER_ID: &str = "sis-graph";

pub const PAGE_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; margin: 0 auto; max-width: 1200px; padding: 24px; color: #1f2933; }
.sis-prose { white-space: pre-wrap; line-height: 1.6; font-size: 1.05rem; }
.semantic-node-highlight { color: #2a9d8f; font-weight: bold; border-bottom: 2px solid #2a9d8f; padding: 0 2px; background-color: #f0fdfa; border-radius: 4px; text-decoration: none; }
.semantic-node-highlight:hover { background-color: #ccfbf1; color: #264653; }
.search-icon { font-size: 0.8em; vertical-align: super; margin-left: 2px; color: #e76f51; font-style: normal; }
.sis-engine { background: linear-gradient(135deg, #1e3a8a 0%, #2a9d8f 100%); color: #fff; padding: 12px 18px; border-radius: 12px; margin-bottom: 16px; }
.sis-innovation { background: #fdf4ff; border-left: 5px solid #a21caf; padding: 8px 12px; margin: 6px 0; }
.sis-warning { background: #fff7ed; border-left: 5px solid #e76f51; padding: 8px 12px; margin: 6px 0; }
.sis-error { background: #fef2f2; border-left: 5px solid #b91c1c; padding: 12px; margin: 12px 0; }
.sis-biblio { background: #f8fafc; border: 1px solid #e2e8f0; border-radius: 8px; padding: 12px; white-space: pre-wrap; font-size: 0.9rem; }
.sis-graph-save { position: absolute; top: 15px; right: 15px; z-index: 1000; padding: 10px 16px; background: #2a9d8f; color: #fff; border: none; border-radius: 8px; cursor: pointer; font-weight: bold; }
fieldset { border: 1px solid #e2e8f0; border-radius: 8px; margin: 12px 0; padding: 12px; }
label { display: block; font-weight: 600; margin-top: 8px; }
select[multiple] { min-width: 260px; min-height: 120px; }
textarea { width: 100%; min-height: 120px; }
"#;

/// Wraps a body fragment in a standalone HTML document.
pub fn render_page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>{PAGE_STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

/// Result section: engine banner, warnings, anchored prose, graph, bibliography.
pub fn render_outcome(outcome: &SynthesisOutcome, renderer: &dyn GraphRenderer) -> String {
    let mut html = String::new();
    let _ = writeln!(
        html,
        "<div class=\"sis-engine\">Engine: {}</div>",
        escape_html(&outcome.engine)
    );
    if outcome.innovation {
        html.push_str(
            "<div class=\"sis-innovation\">Innovation mode engaged: the synthesis favours novel conceptual architectures.</div>\n",
        );
    }
    for warning in &outcome.warnings {
        let _ = writeln!(
            html,
            "<div class=\"sis-warning\">{}</div>",
            escape_html(warning)
        );
    }
    html.push_str("<h2>Synthesis Output</h2>\n");
    let _ = writeln!(
        html,
        "<div class=\"sis-prose\">{}</div>",
        outcome.annotated
    );
    match &outcome.graph {
        Some(graph) if !graph.is_empty() => {
            html.push_str("<h2>Unified Interconnected Network</h2>\n");
            html.push_str(&renderer.render(graph, GRAPH_CONTAINER_ID));
        }
        _ => html.push_str("<p><em>No semantic graph was produced.</em></p>\n"),
    }
    if !outcome.bibliography.trim().is_empty() {
        let _ = writeln!(
            html,
            "<h2>Bibliography</h2>\n<div class=\"sis-biblio\">{}</div>",
            escape_html(outcome.bibliography.trim())
        );
    }
    html
}

pub fn default_report_path(now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!("reports/sis-{}.html", now.format("%Y-%m-%d-%H%M%S")))
}

fn inquiry_summary(request: &SynthesisRequest) -> String {
    let mut summary = String::new();
    if !request.research_inquiry.trim().is_empty() {
        let _ = writeln!(
            summary,
            "<p><strong>Synthesis inquiry:</strong> {}</p>",
            escape_html(request.research_inquiry.trim())
        );
    }
    if !request.innovation_inquiry.trim().is_empty() {
        let _ = writeln!(
            summary,
            "<p><strong>Idea production inquiry:</strong> {}</p>",
            escape_html(request.innovation_inquiry.trim())
        );
    }
    let fields = &request.selections.science_fields;
    if !fields.is_empty() {
        let _ = writeln!(
            summary,
            "<p><strong>Fields:</strong> {}</p>",
            escape_html(&fields.join(", "))
        );
    }
    summary
}

pub fn write_report(
    path: &Path,
    request: &SynthesisRequest,
    outcome: &SynthesisOutcome,
    renderer: &dyn GraphRenderer,
    generated_at: DateTime<Utc>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create report directory")?;
        }
    }
    let mut body = String::new();
    body.push_str("<h1>SIS Universal Knowledge Synthesizer</h1>\n");
    let _ = writeln!(
        body,
        "<p>Generated: {}</p>",
        generated_at.to_rfc3339()
    );
    body.push_str(&inquiry_summary(request));
    body.push_str(&render_outcome(outcome, renderer));

    let mut file =
        File::create(path).with_context(|| format!("create report {}", path.display()))?;
    file.write_all(render_page("SIS Synthesis", &body).as_bytes())
        .context("write report")?;
    file.flush().context("flush report")?;
    Ok(())
}

/// Prose plus the bibliography appendix, for archiving.
pub fn write_markdown(path: &Path, outcome: &SynthesisOutcome) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create markdown directory")?;
        }
    }
    let mut file =
        File::create(path).with_context(|| format!("create markdown {}", path.display()))?;
    writeln!(file, "<!-- engine: {} -->", outcome.engine)?;
    writeln!(file)?;
    writeln!(file, "{}", outcome.prose.trim_end())?;
    if !outcome.bibliography.trim().is_empty() {
        writeln!(file)?;
        writeln!(file, "## Bibliography")?;
        writeln!(file)?;
        writeln!(file, "```text")?;
        writeln!(file, "{}", outcome.bibliography.trim())?;
        writeln!(file, "```")?;
    }
    file.flush().context("flush markdown")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::annotate;
    use crate::graph::{CytoscapeRenderer, RenderGraph};
    use crate::response::{GraphNode, GraphResponse};

    fn outcome() -> SynthesisOutcome {
        let graph = GraphResponse {
            nodes: vec![GraphNode {
                id: "n1".to_string(),
                label: "Hello".to_string(),
                node_type: None,
                color: None,
                shape: None,
            }],
            edges: Vec::new(),
        };
        SynthesisOutcome {
            engine: "Groq (test)".to_string(),
            innovation: false,
            raw: String::new(),
            prose: "Hello <world>".to_string(),
            annotated: annotate("Hello world", &graph),
            graph: Some(RenderGraph::from_response(&graph)),
            bibliography: "\n--- NO RECORD: A & B ---\nNo bibliographic record found.\n".to_string(),
            warnings: vec!["dropped 1 edge(s)".to_string()],
        }
    }

    #[test]
    fn outcome_fragment_contains_all_parts() {
        let html = render_outcome(&outcome(), &CytoscapeRenderer::default());
        assert!(html.contains("Engine: Groq (test)"));
        assert!(html.contains("<div class=\"sis-warning\">dropped 1 edge(s)</div>"));
        assert!(html.contains("<span id=\"n1\""));
        assert!(html.contains(&format!("id=\"{GRAPH_CONTAINER_ID}\"")));
        assert!(html.contains("NO RECORD: A &amp; B"));
    }

    #[test]
    fn injected_markup_in_prose_is_inert() {
        let mut outcome = outcome();
        outcome.annotated = annotate(
            "Intro <img src=x onerror=alert(document.cookie)> Hello",
            &GraphResponse::default(),
        );
        let html = render_outcome(&outcome, &CytoscapeRenderer::default());
        assert!(html.contains("Intro &lt;img src=x onerror=alert(document.cookie)&gt; Hello"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn empty_graph_gets_a_note() {
        let mut outcome = outcome();
        outcome.graph = None;
        let html = render_outcome(&outcome, &CytoscapeRenderer::default());
        assert!(html.contains("No semantic graph was produced."));
        assert!(!html.contains("cytoscape("));
        assert!(!html.contains("sis-innovation"));

        outcome.innovation = true;
        let html = render_outcome(&outcome, &CytoscapeRenderer::default());
        assert!(html.contains("<div class=\"sis-innovation\">"));
    }

    #[test]
    fn writes_report_and_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let html_path = dir.path().join("out/report.html");
        let md_path = dir.path().join("out/report.md");
        let request = SynthesisRequest {
            research_inquiry: "Why <this>?".to_string(),
            ..Default::default()
        };
        write_report(
            &html_path,
            &request,
            &outcome(),
            &CytoscapeRenderer::default(),
            Utc::now(),
        )
        .unwrap();
        write_markdown(&md_path, &outcome()).unwrap();

        let html = fs::read_to_string(&html_path).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Why &lt;this&gt;?"));
        let md = fs::read_to_string(&md_path).unwrap();
        assert!(md.contains("Hello <world>"));
        assert!(md.contains("## Bibliography"));
    }
}
