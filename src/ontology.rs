//! Built-in taxonomy: the two ontology graphs embedded in every prompt and the
//! selection tables (profiles, paradigms, structural models, science fields).
//!
//! Everything here is constructed once at startup and treated as immutable.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const EXPERTISE_LEVELS: [&str; 3] = ["Novice", "Intermediate", "Expert"];

pub const GOAL_CONTEXTS: [&str; 4] = [
    "Scientific Research",
    "Problem Solving",
    "Educational",
    "Policy Making",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyNode {
    pub color: String,
    pub shape: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `(source_label, target_label, relation_text)`, serialized as a 3-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation(pub String, pub String, pub String);

impl Relation {
    pub fn source(&self) -> &str {
        &self.0
    }

    pub fn target(&self) -> &str {
        &self.1
    }

    pub fn text(&self) -> &str {
        &self.2
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OntologyError {
    #[error("relation '{relation}' references unknown node '{label}'")]
    UnknownEndpoint { label: String, relation: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OntologyGraph {
    pub nodes: BTreeMap<String, OntologyNode>,
    pub relations: Vec<Relation>,
}

impl OntologyGraph {
    fn from_tables(nodes: &[(&str, &str)], relations: &[(&str, &str, &str)]) -> Self {
        let nodes = nodes
            .iter()
            .map(|(label, color)| {
                (
                    label.to_string(),
                    OntologyNode {
                        color: color.to_string(),
                        shape: "rectangle".to_string(),
                        description: None,
                    },
                )
            })
            .collect();
        let relations = relations
            .iter()
            .map(|(source, target, text)| {
                Relation(source.to_string(), target.to_string(), text.to_string())
            })
            .collect();
        Self { nodes, relations }
    }

    /// Integrated metamodel architecture (IMA): structural reasoning plus
    /// sociopsychological outcome mapping.
    pub fn human_thinking_metamodel() -> Self {
        Self::from_tables(
            &[
                ("Human mental concentration", "#A6A6A6"),
                ("Identity", "#C6EFCE"),
                ("Autobiographical memory", "#C6EFCE"),
                ("Mission", "#92D050"),
                ("Vision", "#FFFF00"),
                ("Goal", "#00B0F0"),
                ("Problem", "#F2DCDB"),
                ("Ethics/moral", "#FFC000"),
                ("Hierarchy of interests", "#F8CBAD"),
                ("Rule", "#F2F2F2"),
                ("Decision-making", "#FFFF99"),
                ("Problem solving", "#D9D9D9"),
                ("Conflict situation", "#00FF00"),
                ("Knowledge", "#DDEBF7"),
                ("Tool", "#00B050"),
                ("Experience", "#00B050"),
                ("Classification", "#CCC0DA"),
                ("Psychological aspect", "#F8CBAD"),
                ("Sociological aspect", "#00FFFF"),
            ],
            &[
                ("Human mental concentration", "Identity", "has"),
                ("Human mental concentration", "Mission", "can have"),
                ("Identity", "Autobiographical memory", "has"),
                ("Mission", "Vision", "can have"),
                ("Vision", "Goal", "can have"),
                ("Problem", "Identity", "threatens"),
                ("Problem", "Mission", "impedes"),
                ("Problem", "Vision", "impedes"),
                ("Problem", "Goal", "threatens"),
                ("Problem", "Ethics/moral", "has"),
                ("Ethics/moral", "Problem", "can solve"),
                ("Problem", "Rule", "can be connected"),
                ("Hierarchy of interests", "Goal", "realizes"),
                ("Hierarchy of interests", "Knowledge", "realizes or hinders"),
                ("Rule", "Goal", "realizes or hinders"),
                ("Rule", "Decision-making", "realizes or hinders"),
                ("Knowledge", "Goal", "acquisition"),
                ("Decision-making", "Problem solving", "realizes or hinders"),
                ("Ethics/moral", "Problem solving", "helps or hinders"),
                ("Problem", "Problem solving", "should"),
                ("Problem solving", "Conflict situation", "results_in"),
                ("Knowledge", "Classification", "aided_by"),
                ("Knowledge", "Tool", "aided_by"),
                ("Knowledge", "Experience", "aided_by"),
                ("Experience", "Psychological aspect", "outcome_of"),
                ("Experience", "Sociological aspect", "outcome_of"),
                ("Conflict situation", "Psychological aspect", "outcome_of"),
                ("Conflict situation", "Sociological aspect", "outcome_of"),
                ("Psychological aspect", "Sociological aspect", "interconnected"),
            ],
        )
    }

    /// Mental approaches (MA): cognitive filters applied during synthesis.
    pub fn mental_approaches() -> Self {
        Self::from_tables(
            &[
                ("Perspective shifting", "#00FF00"),
                ("Similarity and difference", "#FFFF00"),
                ("Core", "#FFC000"),
                ("Attraction", "#F2A6A2"),
                ("Repulsion", "#D9D9D9"),
                ("Condensation", "#CCC0DA"),
                ("Framework and foundation", "#F8CBAD"),
                ("Bipolarity and dialectics", "#DDEBF7"),
                ("Constant", "#E1C1D1"),
                ("Associativity", "#E1C1D1"),
                ("Induction", "#B4C6E7"),
                ("Whole and part", "#00FF00"),
                ("Mini-max", "#00FF00"),
                ("Addition and composition", "#FF00FF"),
                ("Hierarchy", "#C6EFCE"),
                ("Balance", "#00B0F0"),
                ("Deduction", "#92D050"),
                ("Abstraction and elimination", "#00B0F0"),
                ("Pleasure and displeasure", "#00FF00"),
                ("Openness and closedness", "#FFC000"),
            ],
            &[
                ("Perspective shifting", "Similarity and difference", "leads to"),
                ("Core", "Similarity and difference", "influences"),
                ("Core", "Attraction", "has dynamic"),
                ("Core", "Repulsion", "has dynamic"),
                ("Repulsion", "Bipolarity and dialectics", "leads to"),
                ("Framework and foundation", "Bipolarity and dialectics", "mutually interacts"),
                ("Bipolarity and dialectics", "Constant", "stabilizes"),
                ("Constant", "Associativity", "allows"),
                ("Induction", "Whole and part", "bidirectional link"),
                ("Induction", "Hierarchy", "structures"),
                ("Whole and part", "Mini-max", "optimizes"),
                ("Mini-max", "Addition and composition", "results in"),
                ("Deduction", "Hierarchy", "defines taxonomy"),
                ("Deduction", "Abstraction and elimination", "processes through"),
                ("Hierarchy", "Balance", "maintains"),
                ("Balance", "Addition and composition", "stabilizes"),
            ],
        )
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Relations whose source or target is not a declared node.
    pub fn dangling_relations(&self) -> Vec<&Relation> {
        self.relations
            .iter()
            .filter(|rel| {
                !self.nodes.contains_key(rel.source()) || !self.nodes.contains_key(rel.target())
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), OntologyError> {
        for rel in &self.relations {
            for label in [rel.source(), rel.target()] {
                if !self.nodes.contains_key(label) {
                    return Err(OntologyError::UnknownEndpoint {
                        label: label.to_string(),
                        relation: rel.text().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScienceFieldEntry {
    pub category: String,
    pub methods: Vec<String>,
    pub tools: Vec<String>,
    pub facets: Vec<String>,
}

type FieldRow = (
    &'static str,
    &'static str,
    &'static [&'static str],
    &'static [&'static str],
    &'static [&'static str],
);

const SCIENCE_FIELDS: &[FieldRow] = &[
    ("Mathematics", "Formal", &["Axiomatization", "Statistical Inference", "Mathematical Modeling", "Formal Proof"], &["MATLAB", "Mathematica", "LaTeX", "Calculus"], &["Topology", "Algebra", "Analysis", "Number Theory"]),
    ("Physics", "Natural", &["Modeling", "Simulation"], &["Accelerator", "Spectrometer"], &["Quantum", "Relativity"]),
    ("Chemistry", "Natural", &["Synthesis", "Spectroscopy"], &["NMR", "Chromatography"], &["Organic", "Molecular"]),
    ("Biology", "Natural", &["Sequencing", "CRISPR"], &["Microscope", "Bio-Incubator"], &["Genetics", "Population Dynamics"]),
    ("Ecology", "Natural", &["Ecosystem Modeling", "Field Sampling", "Remote Sensing"], &["GIS Software", "Biosensors", "Satellite Imagery"], &["Biodiversity", "Sustainability", "Conservation Biology"]),
    ("Neuroscience", "Natural", &["Neuroimaging", "Electrophys"], &["fMRI", "EEG"], &["Plasticity", "Synaptic"]),
    ("Psychology", "Social", &["Double-Blind Trials", "Psychometrics"], &["fMRI", "Testing Kits"], &["Behavioral", "Cognitive"]),
    ("Sociology", "Social", &["Ethnography", "Surveys"], &["Data Analytics", "Archives"], &["Stratification", "Dynamics"]),
    ("Computer Science", "Formal", &["Algorithm Design", "Verification"], &["LLMGraphTransformer", "GPU Clusters"], &["AI", "Cybersecurity"]),
    ("Psychiatry", "Applied/Medical", &["Diagnosis", "Clinical Trials"], &["DSM-5", "EEG"], &["Clinical Psychiatry", "Neuropsychiatry"]),
    ("Medicine", "Applied", &["Clinical Trials", "Epidemiology"], &["MRI/CT", "Bio-Markers"], &["Immunology", "Pharmacology"]),
    ("Engineering", "Applied", &["Prototyping", "FEA Analysis"], &["3D Printers", "CAD Software"], &["Robotics", "Nanotech"]),
    ("Library Science", "Applied", &["Taxonomy", "Appraisal"], &["OPAC", "Metadata"], &["Retrieval", "Knowledge Org"]),
    ("Philosophy", "Humanities", &["Socratic Method", "Phenomenology"], &["Logic Mapping", "Critical Analysis"], &["Epistemology", "Metaphysics"]),
    ("Linguistics", "Humanities", &["Corpus Analysis", "Syntactic Parsing"], &["Praat", "NLTK Toolkit"], &["Socioling", "CompLing"]),
    ("Geography", "Natural/Social", &["Spatial Analysis", "GIS"], &["ArcGIS"], &["Human Geo", "Physical Geo"]),
    ("Geology", "Natural", &["Stratigraphy", "Mineralogy"], &["Seismograph"], &["Tectonics", "Petrology"]),
    ("Climatology", "Natural", &["Climate Modeling"], &["Weather Stations"], &["Change Analysis"]),
    ("History", "Humanities", &["Archives"], &["Archives"], &["Social History"]),
    ("Legal science", "Social", &["Legal Hermeneutics", "Dogmatic Method", "Empirical Legal Research"], &["Legislative Databases", "Case Law Archives"], &["Jurisprudence", "Constitutional Law", "Criminal Law", "Civil Law"]),
    ("Economics", "Social", &["Econometrics", "Game Theory", "Market Modeling"], &["Stata", "R", "Bloomberg"], &["Macroeconomics", "Behavioral Economics"]),
    ("Politics", "Social", &["Policy Analysis", "Comparative Politics"], &["Polls", "Legislative Databases"], &["International Relations", "Governance"]),
    ("Criminology", "Social", &["Case Studies", "Profiling"], &["NCVS", "Mapping Software"], &["Victimology", "Penology"]),
    ("Forensic sciences", "Applied/Natural", &["DNA Profiling", "Ballistics"], &["Mass Spectrometer", "Luminol"], &["Toxicology", "Pathology"]),
    ("Cybernetics", "Applied", &["Feedback Loop Analysis", "Modeling"], &["System Dynamics Software"], &["Autopoiesis", "Homeostasis"]),
    ("Mycology", "Natural", &["Spore Identification"], &["Autoclave", "Petri Dishes"], &["Symbiosis", "Fungal Genetics"]),
    ("Theology", "Humanities", &["Exegesis", "Hermeneutics"], &["Manuscript Archives"], &["Dogmatics", "Ethics"]),
    ("Musicology", "Humanities", &["Harmonic Analysis"], &["DAW Software", "Spectrogram"], &["Music Theory"]),
    ("Anthropology", "Social", &["Participant Observation"], &["Carbon Dating"], &["Cultural Anthropology"]),
    ("Archeology", "Social/Humanities", &["Excavation"], &["Lidar", "GPR"], &["Zooarcheology"]),
    ("Astronomy", "Natural", &["Photometry"], &["VLT Telescope", "James Webb"], &["Astrophysics"]),
    ("Demography", "Social", &["Census Analysis"], &["SAS", "Census Data"], &["Migration Studies"]),
    ("Architecture", "Applied", &["Spatial Composition"], &["BIM Software", "Revit"], &["Urban Planning"]),
    ("Meteorology", "Natural", &["Atmospheric Modeling"], &["Doppler Radar"], &["Weather Forecast"]),
    ("Nanotechnology", "Applied", &["Scanning Probe Microscopy"], &["AFM", "SEM"], &["Nano-electronics"]),
    ("Botany", "Natural", &["Phylogenetic Analysis"], &["Herbaria"], &["Plant Anatomy"]),
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn described(rows: &[(&str, &str)]) -> BTreeMap<String, String> {
    rows.iter()
        .map(|(name, desc)| (name.to_string(), desc.to_string()))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeBase {
    pub metamodel: OntologyGraph,
    pub mental_approaches: OntologyGraph,
    pub user_profiles: BTreeMap<String, String>,
    pub paradigms: BTreeMap<String, String>,
    pub structural_models: BTreeMap<String, String>,
    pub science_fields: BTreeMap<String, ScienceFieldEntry>,
    pub expertise_levels: Vec<String>,
    pub goal_contexts: Vec<String>,
}

impl KnowledgeBase {
    pub fn builtin() -> Self {
        let science_fields = SCIENCE_FIELDS
            .iter()
            .map(|(name, category, methods, tools, facets)| {
                (
                    name.to_string(),
                    ScienceFieldEntry {
                        category: category.to_string(),
                        methods: owned(methods),
                        tools: owned(tools),
                        facets: owned(facets),
                    },
                )
            })
            .collect();

        Self {
            metamodel: OntologyGraph::human_thinking_metamodel(),
            mental_approaches: OntologyGraph::mental_approaches(),
            user_profiles: described(&[
                ("Adventurers", "Explorers of hidden patterns and non-linear connections."),
                ("Applicators", "Efficiency focused; seeking direct implementation paths."),
                ("Know-it-alls", "Systemic clarity and exhaustive taxonomic coverage."),
                ("Observers", "System monitors; focused on trends and long-term stability."),
            ]),
            paradigms: described(&[
                ("Empiricism", "Knowledge through sensory experience and evidence."),
                ("Rationalism", "Deductive logic and innate reason as the primary source."),
                ("Constructivism", "Knowledge is socially constructed through human interaction."),
                ("Positivism", "Strict adherence to scientific facts and observable laws."),
                ("Pragmatism", "Practical utility and 'what works' as the truth criterion."),
                ("Critical Theory", "Analyzing and challenging power structures in knowledge."),
                ("Phenomenology", "Study of direct conscious experience and subjectivity."),
            ]),
            structural_models: described(&[
                ("Causal Connections", "Analyzing A leads to B (Cause-Effect)."),
                ("Principles & Relations", "Fundamental laws governing a system."),
                ("Episodes & Sequences", "Temporal flow and historical context."),
                ("Facts & Characteristics", "Raw empirical data and attributes."),
                ("Generalizations", "High-level frameworks and categorical abstractions."),
                ("Glossary", "Precise definitions and semantic boundaries."),
                ("Concepts", "Abstract constructs and mental representations."),
            ]),
            science_fields,
            expertise_levels: owned(&EXPERTISE_LEVELS),
            goal_contexts: owned(&GOAL_CONTEXTS),
        }
    }

    pub fn mental_approach_labels(&self) -> Vec<String> {
        self.mental_approaches.labels().map(str::to_string).collect()
    }

    pub fn field(&self, name: &str) -> Option<&ScienceFieldEntry> {
        self.science_fields.get(name)
    }

    /// Sorted, de-duplicated methods of the selected fields. Unknown fields are ignored.
    pub fn aggregate_methods(&self, fields: &[String]) -> Vec<String> {
        self.aggregate(fields, |entry| &entry.methods)
    }

    /// Sorted, de-duplicated tools of the selected fields. Unknown fields are ignored.
    pub fn aggregate_tools(&self, fields: &[String]) -> Vec<String> {
        self.aggregate(fields, |entry| &entry.tools)
    }

    fn aggregate<F>(&self, fields: &[String], pick: F) -> Vec<String>
    where
        F: Fn(&ScienceFieldEntry) -> &Vec<String>,
    {
        let mut out = BTreeSet::new();
        for name in fields {
            if let Some(entry) = self.field(name) {
                out.extend(pick(entry).iter().cloned());
            }
        }
        out.into_iter().collect()
    }
}
