//! Knowledge synthesis over curated ontologies, author bibliographies and
//! hosted chat models, with an interactive semantic graph of the result.

pub mod annotate;
pub mod bibliography;
pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod ontology;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod response;
pub mod session;

pub use annotate::{annotate, AnnotatedProse, Annotator};
pub use bibliography::{BibliographyResolver, BibliographySource};
pub use config::SisConfig;
pub use error::{Stage, SynthesisError};
pub use graph::{CytoscapeRenderer, GraphRenderer, RenderGraph};
pub use llm::{ChatProvider, LlmError, ProviderKind};
pub use ontology::KnowledgeBase;
pub use pipeline::{ApiKeys, Engine, EngineSelection, SynthesisOutcome, Synthesizer};
pub use prompt::{Selections, SynthesisRequest};
pub use response::{parse_response, GraphResponse, ParsedResponse, SENTINEL};
pub use session::SessionContext;

/// Installs the `tracing` subscriber used by both binaries (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
