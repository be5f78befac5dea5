//! Anchors graph node labels in the prose so the graph can scroll to them.
//!
//! Matching runs against an immutable snapshot of the prose and all insertions
//! are spliced in a single pass, so inserted markup is never re-scanned. The
//! prose comes from a model and is escaped; the anchors are the only markup.

use std::collections::HashSet;
use std::fmt;
use std::ops::Range;

use regex::RegexBuilder;

use crate::response::GraphResponse;

pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedProse(String);

impl AnnotatedProse {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AnnotatedProse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_escaped(out: &mut String, ch: char) {
    match ch {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        _ => out.push(ch),
    }
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        push_escaped(&mut out, ch);
    }
    out
}

/// Length of the character reference (`&amp;`, `&#39;`) starting `text`, if any.
fn entity_len(text: &str) -> Option<usize> {
    let body = text.strip_prefix('&')?;
    let name = body.strip_prefix('#').unwrap_or(body);
    let len = name.bytes().take_while(u8::is_ascii_alphanumeric).count();
    let terminated = name.as_bytes().get(len) == Some(&b';');
    (len > 0 && len <= 32 && terminated).then(|| text.len() - name.len() + len + 1)
}

/// Like [`escape_html`], but leaves existing character references alone so
/// escaped prose stays stable when it is annotated again.
fn escape_prose(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (idx, ch) in input.char_indices() {
        if ch == '&' && entity_len(&input[idx..]).is_some() {
            out.push('&');
        } else {
            push_escaped(&mut out, ch);
        }
    }
    out
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

const ANCHOR_OPEN: &str = "<span id=\"";
const ANCHOR_HEAD: &str = "\" class=\"sis-node-anchor\"><a href=\"";
const ANCHOR_MID: &str = "\" target=\"_blank\" rel=\"noopener\" class=\"semantic-node-highlight\">";
const ANCHOR_TAIL: &str = "<i class=\"search-icon\">↗</i></a></span>";

/// An anchor emitted by an earlier pass, kept verbatim on re-annotation.
struct ExistingAnchor {
    range: Range<usize>,
    id: String,
}

/// Wraps the first free occurrence of each node label in an anchor. All other
/// prose is HTML-escaped; only the anchors built here are emitted as markup.
#[derive(Debug, Clone)]
pub struct Annotator {
    search_url: String,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_URL)
    }
}

impl Annotator {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }

    pub fn search_link(&self, label: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(label.as_bytes()).collect();
        format!("{}?q={}", self.search_url, encoded)
    }

    fn anchor(&self, id: &str, label: &str, matched: &str) -> String {
        format!(
            "{ANCHOR_OPEN}{id}{ANCHOR_HEAD}{href}{ANCHOR_MID}{matched}{ANCHOR_TAIL}",
            id = escape_html(id),
            href = escape_html(&self.search_link(label)),
            matched = escape_prose(matched),
        )
    }

    /// Parses one of our own anchors starting at `start`. Anything that deviates
    /// from the exact shape, or links elsewhere than the search engine, is not one.
    fn existing_anchor_at(&self, text: &str, start: usize) -> Option<ExistingAnchor> {
        let rest = text[start..].strip_prefix(ANCHOR_OPEN)?;
        let id_end = rest.find('"')?;
        let id = &rest[..id_end];
        let rest = rest[id_end..].strip_prefix(ANCHOR_HEAD)?;
        let href_prefix = escape_html(&format!("{}?q=", self.search_url));
        let rest = rest.strip_prefix(href_prefix.as_str())?;
        let query_end = rest.find('"')?;
        let query = &rest[..query_end];
        let rest = rest[query_end..].strip_prefix(ANCHOR_MID)?;
        let shown_end = rest.find(ANCHOR_TAIL)?;
        let shown = &rest[..shown_end];

        let query_ok = query
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"%+*-._".contains(&b));
        if !query_ok || id.contains(['<', '>']) || shown.contains(['<', '>']) {
            return None;
        }
        let end = text.len() - rest.len() + shown_end + ANCHOR_TAIL.len();
        Some(ExistingAnchor {
            range: start..end,
            id: id.to_string(),
        })
    }

    fn existing_anchors(&self, text: &str) -> Vec<ExistingAnchor> {
        let mut anchors = Vec::new();
        let mut pos = 0;
        while let Some(offset) = text[pos..].find(ANCHOR_OPEN) {
            let start = pos + offset;
            match self.existing_anchor_at(text, start) {
                Some(anchor) => {
                    pos = anchor.range.end;
                    anchors.push(anchor);
                }
                None => pos = start + 1,
            }
        }
        anchors
    }

    pub fn annotate(&self, prose: &str, graph: &GraphResponse) -> AnnotatedProse {
        let existing = self.existing_anchors(prose);
        let mut blocked: Vec<Range<usize>> = existing.iter().map(|a| a.range.clone()).collect();
        blocked.extend(
            prose
                .match_indices('&')
                .filter_map(|(idx, _)| entity_len(&prose[idx..]).map(|len| idx..idx + len)),
        );

        // Duplicate ids keep their first node, then longer labels claim text first.
        let mut seen = HashSet::new();
        let mut order: Vec<usize> = (0..graph.nodes.len())
            .filter(|&idx| seen.insert(graph.nodes[idx].id.as_str()))
            .collect();
        order.sort_by_key(|&idx| std::cmp::Reverse(graph.nodes[idx].label.trim().chars().count()));

        // `None` marks an existing anchor that is copied through unchanged.
        let mut splices: Vec<(Range<usize>, Option<usize>)> =
            existing.iter().map(|a| (a.range.clone(), None)).collect();
        for idx in order {
            let node = &graph.nodes[idx];
            let label = node.label.trim();
            if label.is_empty() {
                continue;
            }
            let escaped_id = escape_html(&node.id);
            if existing.iter().any(|a| a.id == escaped_id) {
                continue;
            }
            let pattern = match RegexBuilder::new(&regex::escape(label))
                .case_insensitive(true)
                .build()
            {
                Ok(pattern) => pattern,
                Err(err) => {
                    tracing::debug!(label, "skipping label: {err}");
                    continue;
                }
            };
            let free = pattern
                .find_iter(prose)
                .map(|m| m.range())
                .find(|range| !blocked.iter().any(|b| overlaps(b, range)));
            if let Some(range) = free {
                blocked.push(range.clone());
                splices.push((range, Some(idx)));
            }
        }

        splices.sort_by_key(|(range, _)| range.start);
        let mut out = String::with_capacity(prose.len() + splices.len() * 160);
        let mut cursor = 0;
        for (range, claim) in splices {
            out.push_str(&escape_prose(&prose[cursor..range.start]));
            match claim {
                Some(idx) => {
                    let node = &graph.nodes[idx];
                    out.push_str(&self.anchor(&node.id, node.label.trim(), &prose[range.clone()]));
                }
                None => out.push_str(&prose[range.clone()]),
            }
            cursor = range.end;
        }
        out.push_str(&escape_prose(&prose[cursor..]));
        AnnotatedProse(out)
    }
}

/// [`Annotator::annotate`] with the default search engine.
pub fn annotate(prose: &str, graph: &GraphResponse) -> AnnotatedProse {
    Annotator::default().annotate(prose, graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::GraphNode;

    fn node(id: &str, label: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            label: label.to_string(),
            node_type: None,
            color: None,
            shape: None,
        }
    }

    fn graph(nodes: Vec<GraphNode>) -> GraphResponse {
        GraphResponse {
            nodes,
            edges: Vec::new(),
        }
    }

    #[test]
    fn wraps_first_case_insensitive_occurrence() {
        let g = graph(vec![node("n1", "hello")]);
        let out = annotate("Hello world, hello again", &g);
        let text = out.as_str();
        assert!(text.starts_with("<span id=\"n1\" class=\"sis-node-anchor\">"));
        assert!(text.contains(">Hello<i class=\"search-icon\">"));
        assert!(text.contains("https://www.google.com/search?q=hello"));
        assert!(text.ends_with("</span> world, hello again"));
        assert_eq!(text.matches("<span").count(), 1);
    }

    #[test]
    fn absent_labels_leave_prose_unchanged() {
        let g = graph(vec![node("n1", "Quasar"), node("n2", "   ")]);
        assert_eq!(annotate("Nothing matches", &g).as_str(), "Nothing matches");
    }

    #[test]
    fn annotating_twice_is_idempotent() {
        let g = graph(vec![node("n1", "Hello"), node("n2", "world")]);
        let once = annotate("Hello world. Hello world.", &g);
        let twice = annotate(once.as_str(), &g);
        assert_eq!(once, twice);
        assert_eq!(twice.as_str().matches("sis-node-anchor").count(), 2);
    }

    #[test]
    fn longer_labels_claim_first() {
        let g = graph(vec![
            node("short", "Quantum"),
            node("long", "Quantum field theory"),
        ]);
        let out = annotate("Quantum field theory extends quantum mechanics.", &g);
        let text = out.as_str();
        let long_pos = text.find("id=\"long\"").unwrap();
        let short_pos = text.find("id=\"short\"").unwrap();
        assert!(long_pos < short_pos);
        assert!(text.contains(">Quantum field theory<i"));
        assert!(text.contains(">quantum<i"));
    }

    #[test]
    fn model_markup_is_escaped() {
        let g = graph(vec![node("n1", "text")]);
        let out = annotate("Intro <img src=x onerror=alert(1)> text", &g);
        let text = out.as_str();
        assert!(text.starts_with("Intro &lt;img src=x onerror=alert(1)&gt; <span id=\"n1\""));
        assert!(!text.contains("<img"));
        assert_eq!(annotate(text, &g), out);
    }

    #[test]
    fn forged_anchors_are_escaped() {
        let g = graph(vec![node("n1", "Hello")]);
        let forged = "<span id=\"n1\" class=\"sis-node-anchor\"><a href=\"javascript:alert(1)\">x</a></span> Hello";
        let out = annotate(forged, &g);
        let text = out.as_str();
        assert!(text.starts_with("&lt;span id=&quot;n1&quot;"));
        assert!(!text.contains("href=\"javascript"));
        assert_eq!(text.matches("<span id=\"n1\"").count(), 1);
    }

    #[test]
    fn unclosed_less_than_does_not_block_labels() {
        let g = graph(vec![node("n1", "entropy"), node("n2", "phase")]);
        let out = annotate("Below T<Tc the entropy drops and n<m near the phase edge.", &g);
        let text = out.as_str();
        assert!(text.contains("T&lt;Tc the <span id=\"n1\""));
        assert!(text.contains("n&lt;m near the <span id=\"n2\""));
    }

    #[test]
    fn character_references_stay_stable() {
        let g = graph(vec![node("n1", "amp")]);
        let out = annotate("AT&amp;T & an amp", &g);
        let text = out.as_str();
        assert!(text.starts_with("AT&amp;T &amp; an <span id=\"n1\""));
        assert_eq!(annotate(text, &g), out);
    }

    #[test]
    fn comparison_signs_are_not_markup() {
        let g = graph(vec![node("n1", "entropy")]);
        let out = annotate("a < b and entropy > c", &g);
        assert!(out.as_str().contains("<span id=\"n1\""));
    }

    #[test]
    fn escapes_ids_and_encodes_links() {
        let g = graph(vec![node("n\"1", "C++ & more")]);
        let out = annotate("We use C++ & more here", &g);
        let text = out.as_str();
        assert!(text.contains("id=\"n&quot;1\""));
        assert!(text.contains("?q=C%2B%2B+%26+more\""));
    }

    #[test]
    fn duplicate_node_ids_anchor_once() {
        let g = graph(vec![node("n1", "alpha"), node("n1", "beta")]);
        let out = annotate("alpha and beta", &g);
        assert_eq!(out.as_str().matches("id=\"n1\"").count(), 1);
    }

    #[test]
    fn duplicate_node_ids_keep_the_first_node() {
        let g = graph(vec![node("n1", "Hi"), node("n1", "Hello")]);
        let out = annotate("Hi and Hello", &g);
        let text = out.as_str();
        assert!(text.contains(">Hi<i class=\"search-icon\">"));
        assert!(text.contains("?q=Hi\""));
        assert!(text.ends_with("</span> and Hello"));
    }
}
