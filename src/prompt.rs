use serde::{Deserialize, Serialize};

use crate::ontology::KnowledgeBase;
use crate::response::SENTINEL;

/// Taxonomy values picked in the form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selections {
    pub user_profiles: Vec<String>,
    pub science_fields: Vec<String>,
    pub expertise: String,
    pub structural_models: Vec<String>,
    pub paradigms: Vec<String>,
    pub goal_context: String,
    pub mental_approaches: Vec<String>,
    pub methods: Vec<String>,
    pub tools: Vec<String>,
}

/// One unit of work: everything a single submission contributes to the prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisRequest {
    pub selections: Selections,
    pub authors: String,
    pub research_inquiry: String,
    pub innovation_inquiry: String,
    pub attachment: String,
}

impl SynthesisRequest {
    pub fn has_inquiry(&self) -> bool {
        !self.research_inquiry.trim().is_empty() || !self.innovation_inquiry.trim().is_empty()
    }

    pub fn is_innovation(&self) -> bool {
        !self.innovation_inquiry.trim().is_empty()
    }

    /// User message shared by every stage.
    pub fn context_text(&self) -> String {
        format!(
            "[SYNTHESIS INQUIRY]: {}\n[IDEA PRODUCTION INQUIRY]: {}\n[ATTACHED DATA]: {}",
            self.research_inquiry, self.innovation_inquiry, self.attachment
        )
    }
}

fn joined(items: &[String]) -> String {
    if items.is_empty() {
        "none specified".to_string()
    } else {
        items.join(", ")
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn ontology_rules(kb: &KnowledgeBase) -> String {
    format!(
        "ONTOLOGICAL RULES:\n\
1. MANDATORY IMA ARCHITECTURE INTEGRATION (IMA + ADD-ON): {ima}\n\
2. MANDATORY MENTAL APPROACHES INTEGRATION (MA): {ma}",
        ima = kb.metamodel.to_json(),
        ma = kb.mental_approaches.to_json()
    )
}

fn selection_block(request: &SynthesisRequest, bibliography: &str) -> String {
    let s = &request.selections;
    format!(
        "FIELDS OF APPLICATION: {fields}.\n\
USER PROFILES: {profiles}.\n\
EXPERTISE LEVEL: {expertise}.\n\
CONTEXT / GOAL: {goal}.\n\
STRUCTURAL MODELS: {models}.\n\
MENTAL APPROACHES: {approaches}.\n\
METHODOLOGY: {methods}.\n\
SPECIFIC TOOLS: {tools}.\n\
PARADIGMS: {paradigms}.\n\
HISTORICAL AUTHOR CONTEXT: {biblio}.",
        fields = joined(&s.science_fields),
        profiles = joined(&s.user_profiles),
        expertise = or_default(&s.expertise, "Expert"),
        goal = or_default(&s.goal_context, "Scientific Research"),
        models = joined(&s.structural_models),
        approaches = joined(&s.mental_approaches),
        methods = joined(&s.methods),
        tools = joined(&s.tools),
        paradigms = joined(&s.paradigms),
        biblio = or_default(bibliography.trim(), "none"),
    )
}

fn graph_directive() -> String {
    format!(
        "STRICT OUTPUT FORMAT:\n\
- Write a long technical dissertation first.\n\
- End the textual part and append the marker '{SENTINEL}'.\n\
- Immediately follow with a valid JSON object ONLY.\n\n\
GRAPH JSON REQUIREMENTS:\n\
- Create 40+ interconnected nodes.\n\
- Use TT|BT|NT|AS|RT relation types.\n\
- Strictly use color/shape logic from provided ontologies.\n\
JSON schema: {{\"nodes\": [{{\"id\": \"n1\", \"label\": \"Text\", \"type\": \"Root|Branch|Leaf|Class\", \"color\": \"#hex\", \"shape\": \"rectangle|ellipse|diamond\"}}], \"edges\": [{{\"source\": \"n1\", \"target\": \"n2\", \"rel_type\": \"AS|BT|NT|TT\"}}]}}"
    )
}

/// System instruction for a single-call synthesis.
pub fn standalone_system_prompt(
    kb: &KnowledgeBase,
    request: &SynthesisRequest,
    bibliography: &str,
) -> String {
    let focus = if request.is_innovation() {
        "Focus on radical innovation and deep taxonomic relations."
    } else {
        "Focus on rigorous synthesis and deep taxonomic relations."
    };
    format!(
        "You are the SIS Synthesizer. Perform an exhaustive dissertation (minimum 1500 words).\n\
{focus}\n\n{rules}\n\n{selection}\n\n{directive}",
        rules = ontology_rules(kb),
        selection = selection_block(request, bibliography),
        directive = graph_directive(),
    )
}

/// Stage A of the sequential engine: factual groundwork, no graph.
pub fn foundation_system_prompt(
    kb: &KnowledgeBase,
    request: &SynthesisRequest,
    bibliography: &str,
) -> String {
    format!(
        "You are the SIS Foundation Analyst. Produce a factual, structural synthesis of the inquiry: \
established knowledge, definitions, causal connections and open problems. Do not speculate.\n\n\
{rules}\n\n{selection}\n\n\
OUTPUT RULES:\n\
- Prose only, organised under clear headings.\n\
- Do NOT emit the marker '{SENTINEL}' and do NOT produce any JSON graph.",
        rules = ontology_rules(kb),
        selection = selection_block(request, bibliography),
    )
}

/// Stage B of the sequential engine: creative extension of Stage A plus the graph.
pub fn extension_system_prompt(
    kb: &KnowledgeBase,
    request: &SynthesisRequest,
    bibliography: &str,
    foundation: &str,
) -> String {
    format!(
        "You are the SIS Innovation Architect. Extend the foundation synthesis below with creative, \
non-obvious ideas, perspective shifts and cross-field transfers. Do not repeat the foundation.\n\n\
{rules}\n\n{selection}\n\n\
FOUNDATION SYNTHESIS (integrate and extend):\n{foundation}\n\n{directive}",
        rules = ontology_rules(kb),
        selection = selection_block(request, bibliography),
        directive = graph_directive(),
    )
}
