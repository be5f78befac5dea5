//! Synthesis pipeline: bibliography, model call(s), response parsing and anchoring.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::annotate::{AnnotatedProse, Annotator};
use crate::bibliography::BibliographyResolver;
use crate::config::{ProvidersConfig, SisConfig, SynthesisConfig};
use crate::error::{Stage, SynthesisError};
use crate::graph::RenderGraph;
use crate::llm::{ChatMessage, ChatProvider, OpenAiCompatibleProvider, ProviderKind};
use crate::ontology::KnowledgeBase;
use crate::prompt::{
    extension_system_prompt, foundation_system_prompt, standalone_system_prompt, SynthesisRequest,
};
use crate::response::{parse_response, SENTINEL};

pub const FOUNDATION_HEADING: &str = "## Foundation Synthesis";
pub const EXTENSION_HEADING: &str = "## Creative Extension";

/// How the model calls of one synthesis are arranged.
pub enum Engine {
    Standalone(Arc<dyn ChatProvider>),
    /// Two strictly ordered calls: the extension sees the foundation's output.
    Sequential {
        foundation: Arc<dyn ChatProvider>,
        extension: Arc<dyn ChatProvider>,
    },
}

impl Engine {
    pub fn describe(&self) -> String {
        match self {
            Engine::Standalone(provider) => format!("{} ({})", provider.name(), provider.model()),
            Engine::Sequential {
                foundation,
                extension,
            } => format!("{} + {} synergy", foundation.name(), extension.name()),
        }
    }
}

/// Engine choices offered to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineSelection {
    #[default]
    Groq,
    Cerebras,
    Synergy,
}

impl EngineSelection {
    pub const ALL: [EngineSelection; 3] = [
        EngineSelection::Groq,
        EngineSelection::Cerebras,
        EngineSelection::Synergy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineSelection::Groq => "groq",
            EngineSelection::Cerebras => "cerebras",
            EngineSelection::Synergy => "synergy",
        }
    }

    /// Providers whose keys this selection needs.
    pub fn required_providers(&self) -> &'static [ProviderKind] {
        match self {
            EngineSelection::Groq => &[ProviderKind::Groq],
            EngineSelection::Cerebras => &[ProviderKind::Cerebras],
            EngineSelection::Synergy => &[ProviderKind::Cerebras, ProviderKind::Groq],
        }
    }

    /// Builds the engine. Keys are checked before any client is created.
    pub fn build(
        &self,
        keys: &ApiKeys,
        providers: &ProvidersConfig,
        timeout: Duration,
    ) -> Result<Engine, SynthesisError> {
        for kind in self.required_providers() {
            keys.require(*kind)?;
        }
        match self {
            EngineSelection::Groq => Ok(Engine::Standalone(connect(
                ProviderKind::Groq,
                Stage::Standalone,
                keys,
                providers,
                timeout,
            )?)),
            EngineSelection::Cerebras => Ok(Engine::Standalone(connect(
                ProviderKind::Cerebras,
                Stage::Standalone,
                keys,
                providers,
                timeout,
            )?)),
            EngineSelection::Synergy => Ok(Engine::Sequential {
                foundation: connect(
                    ProviderKind::Cerebras,
                    Stage::Foundation,
                    keys,
                    providers,
                    timeout,
                )?,
                extension: connect(
                    ProviderKind::Groq,
                    Stage::Extension,
                    keys,
                    providers,
                    timeout,
                )?,
            }),
        }
    }
}

impl fmt::Display for EngineSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(EngineSelection::Groq),
            "cerebras" => Ok(EngineSelection::Cerebras),
            "synergy" | "sequential" => Ok(EngineSelection::Synergy),
            other => Err(format!(
                "unknown engine '{other}' (expected groq, cerebras or synergy)"
            )),
        }
    }
}

/// Provider credentials; blank values count as missing.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub groq: Option<String>,
    pub cerebras: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            groq: std::env::var(ProviderKind::Groq.key_env()).ok(),
            cerebras: std::env::var(ProviderKind::Cerebras.key_env()).ok(),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&str> {
        let key = match kind {
            ProviderKind::Groq => self.groq.as_deref(),
            ProviderKind::Cerebras => self.cerebras.as_deref(),
        };
        key.map(str::trim).filter(|k| !k.is_empty())
    }

    fn require(&self, kind: ProviderKind) -> Result<&str, SynthesisError> {
        self.get(kind).ok_or_else(|| SynthesisError::MissingApiKey {
            provider: kind.label().to_string(),
        })
    }
}

fn connect(
    kind: ProviderKind,
    stage: Stage,
    keys: &ApiKeys,
    providers: &ProvidersConfig,
    timeout: Duration,
) -> Result<Arc<dyn ChatProvider>, SynthesisError> {
    let key = keys.require(kind)?;
    let provider =
        OpenAiCompatibleProvider::new(kind.label(), providers.settings(kind), key, timeout)
            .map_err(|source| SynthesisError::ModelCall {
                stage,
                provider: kind.label().to_string(),
                source,
            })?;
    Ok(Arc::new(provider))
}

/// Everything a finished synthesis hands to the presentation layer.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub engine: String,
    /// An idea production inquiry was part of the request.
    pub innovation: bool,
    pub raw: String,
    pub prose: String,
    pub annotated: AnnotatedProse,
    pub graph: Option<RenderGraph>,
    pub bibliography: String,
    pub warnings: Vec<String>,
}

pub struct Synthesizer {
    knowledge: Arc<KnowledgeBase>,
    resolver: BibliographyResolver,
    settings: SynthesisConfig,
    annotator: Annotator,
}

impl Synthesizer {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        resolver: BibliographyResolver,
        settings: SynthesisConfig,
    ) -> Self {
        let annotator = Annotator::new(settings.search_url.clone());
        Self {
            knowledge,
            resolver,
            settings,
            annotator,
        }
    }

    pub fn from_config(knowledge: Arc<KnowledgeBase>, config: &SisConfig) -> Result<Self> {
        let resolver = BibliographyResolver::from_config(&config.bibliography)?;
        Ok(Self::new(knowledge, resolver, config.synthesis.clone()))
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn settings(&self) -> &SynthesisConfig {
        &self.settings
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }

    /// Single call returning the model's raw text.
    pub async fn synthesize(
        &self,
        provider: &dyn ChatProvider,
        request: &SynthesisRequest,
        bibliography: &str,
    ) -> Result<String, SynthesisError> {
        let temperature = if request.is_innovation() {
            self.settings.innovation_temperature
        } else {
            self.settings.research_temperature
        };
        let messages = [
            ChatMessage::system(standalone_system_prompt(
                &self.knowledge,
                request,
                bibliography,
            )),
            ChatMessage::user(request.context_text()),
        ];
        self.call(Stage::Standalone, provider, &messages, temperature)
            .await
    }

    /// Foundation then extension. The extension is never called if the foundation fails.
    pub async fn synthesize_sequential(
        &self,
        foundation: &dyn ChatProvider,
        extension: &dyn ChatProvider,
        request: &SynthesisRequest,
        bibliography: &str,
    ) -> Result<String, SynthesisError> {
        let context = ChatMessage::user(request.context_text());

        let stage_a = [
            ChatMessage::system(foundation_system_prompt(
                &self.knowledge,
                request,
                bibliography,
            )),
            context.clone(),
        ];
        let raw_foundation = self
            .call(
                Stage::Foundation,
                foundation,
                &stage_a,
                self.settings.foundation_temperature,
            )
            .await?;
        let foundation_text = match raw_foundation.split_once(SENTINEL) {
            Some((head, _)) => {
                tracing::warn!("foundation output contained the graph marker; truncated");
                head.trim_end().to_string()
            }
            None => raw_foundation,
        };

        let stage_b = [
            ChatMessage::system(extension_system_prompt(
                &self.knowledge,
                request,
                bibliography,
                &foundation_text,
            )),
            context,
        ];
        let extension_text = self
            .call(
                Stage::Extension,
                extension,
                &stage_b,
                self.settings.extension_temperature,
            )
            .await?;

        Ok(format!(
            "{FOUNDATION_HEADING}\n\n{foundation_text}\n\n{EXTENSION_HEADING}\n\n{extension_text}"
        ))
    }

    pub async fn generate(
        &self,
        engine: &Engine,
        request: &SynthesisRequest,
        bibliography: &str,
    ) -> Result<String, SynthesisError> {
        match engine {
            Engine::Standalone(provider) => {
                self.synthesize(provider.as_ref(), request, bibliography)
                    .await
            }
            Engine::Sequential {
                foundation,
                extension,
            } => {
                self.synthesize_sequential(
                    foundation.as_ref(),
                    extension.as_ref(),
                    request,
                    bibliography,
                )
                .await
            }
        }
    }

    /// Full request: bibliography, generation, parsing, graph normalization, anchoring.
    pub async fn run(
        &self,
        engine: &Engine,
        request: &SynthesisRequest,
    ) -> Result<SynthesisOutcome, SynthesisError> {
        if !request.has_inquiry() {
            return Err(SynthesisError::EmptyInquiry);
        }

        let bibliography = self.resolver.resolve(&request.authors).await;
        let raw = self.generate(engine, request, &bibliography).await?;

        let parsed = parse_response(&raw);
        let mut warnings = Vec::new();
        if let Some(warning) = parsed.warning {
            tracing::warn!("{warning}");
            warnings.push(warning);
        }

        let graph = parsed.graph.as_ref().map(RenderGraph::from_response);
        if let Some(render) = &graph {
            if render.dropped_edges > 0 {
                let warning = format!(
                    "dropped {} edge(s) referencing undeclared nodes",
                    render.dropped_edges
                );
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
        }

        let annotated = match &parsed.graph {
            Some(graph) => self.annotator.annotate(&parsed.prose, graph),
            None => self
                .annotator
                .annotate(&parsed.prose, &Default::default()),
        };

        tracing::info!(
            nodes = graph.as_ref().map_or(0, |g| g.nodes.len()),
            edges = graph.as_ref().map_or(0, |g| g.edges.len()),
            warnings = warnings.len(),
            "synthesis complete"
        );

        Ok(SynthesisOutcome {
            engine: engine.describe(),
            innovation: request.is_innovation(),
            raw,
            prose: parsed.prose,
            annotated,
            graph,
            bibliography,
            warnings,
        })
    }

    async fn call(
        &self,
        stage: Stage,
        provider: &dyn ChatProvider,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, SynthesisError> {
        let span = tracing::info_span!(
            "model_call",
            %stage,
            provider = provider.name(),
            model = provider.model()
        );
        async {
            tracing::info!(temperature, "calling model");
            let text = provider
                .complete(messages, temperature, Some(self.settings.max_tokens))
                .await
                .map_err(|source| {
                    tracing::error!("model call failed: {source}");
                    SynthesisError::ModelCall {
                        stage,
                        provider: provider.name().to_string(),
                        source,
                    }
                })?;
            tracing::info!(chars = text.len(), "model responded");
            Ok::<_, SynthesisError>(text)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        name: &'static str,
        reply: Result<String, ()>,
        calls: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
    }

    impl Scripted {
        fn ok(name: &'static str, reply: &str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Err(()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Vec<ChatMessage>, f32)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn base_url(&self) -> &str {
            "http://scripted.invalid"
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<String, LlmError> {
            self.calls
                .lock()
                .unwrap()
                .push((messages.to_vec(), temperature));
            self.reply
                .clone()
                .map_err(|_| LlmError::Network("connection refused".to_string()))
        }
    }

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(
            Arc::new(KnowledgeBase::builtin()),
            BibliographyResolver::new(Vec::new(), 1),
            SynthesisConfig::default(),
        )
    }

    fn research(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            research_inquiry: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn standalone_temperature_follows_inquiry_kind() {
        let synth = synthesizer();
        let provider = Scripted::ok("p", "text");
        synth
            .synthesize(provider.as_ref(), &research("q"), "")
            .await
            .unwrap();
        let mut request = research("");
        request.innovation_inquiry = "invent".to_string();
        synth
            .synthesize(provider.as_ref(), &request, "")
            .await
            .unwrap();
        let calls = provider.calls();
        assert_eq!(calls[0].1, 0.45);
        assert_eq!(calls[1].1, 0.75);
        assert!(calls[1].0[1].content.contains("[IDEA PRODUCTION INQUIRY]: invent"));
    }

    #[tokio::test]
    async fn sequential_concatenates_and_truncates_foundation_marker() {
        let synth = synthesizer();
        let foundation = Scripted::ok("A", &format!("Facts here\n{SENTINEL} {{\"nodes\":[]}}"));
        let extension = Scripted::ok("B", "Ideas here");
        let out = synth
            .synthesize_sequential(foundation.as_ref(), extension.as_ref(), &research("q"), "")
            .await
            .unwrap();
        assert_eq!(
            out,
            "## Foundation Synthesis\n\nFacts here\n\n## Creative Extension\n\nIdeas here"
        );
        let stage_b = extension.calls();
        assert_eq!(stage_b[0].1, 0.85);
        assert!(stage_b[0].0[0].content.contains("Facts here"));
        assert_eq!(foundation.calls()[0].1, 0.3);
    }

    #[tokio::test]
    async fn foundation_failure_short_circuits() {
        let synth = synthesizer();
        let foundation = Scripted::failing("A");
        let extension = Scripted::ok("B", "never");
        let engine = Engine::Sequential {
            foundation: foundation.clone(),
            extension: extension.clone(),
        };
        let err = synth.run(&engine, &research("q")).await.unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::ModelCall {
                stage: Stage::Foundation,
                ..
            }
        ));
        assert!(extension.calls().is_empty());
    }

    #[tokio::test]
    async fn run_rejects_empty_inquiry_before_calling() {
        let synth = synthesizer();
        let provider = Scripted::ok("p", "text");
        let engine = Engine::Standalone(provider.clone());
        let err = synth.run(&engine, &research("   ")).await.unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyInquiry));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn run_anchors_labels_and_reports_dangling_edges() {
        let synth = synthesizer();
        let reply = format!(
            "Hello world {SENTINEL} {{\"nodes\":[{{\"id\":\"n1\",\"label\":\"Hello\"}}],\"edges\":[{{\"source\":\"n1\",\"target\":\"n9\"}}]}}"
        );
        let engine = Engine::Standalone(Scripted::ok("p", &reply));
        let outcome = synth.run(&engine, &research("q")).await.unwrap();
        assert_eq!(outcome.prose, "Hello world ");
        assert!(outcome.annotated.as_str().contains("<span id=\"n1\""));
        let graph = outcome.graph.unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("dropped 1 edge"));
    }

    #[test]
    fn missing_keys_fail_before_connecting() {
        let providers = ProvidersConfig::default();
        let keys = ApiKeys {
            groq: Some("gk".to_string()),
            cerebras: Some("  ".to_string()),
        };
        let timeout = Duration::from_secs(1);
        assert!(EngineSelection::Groq.build(&keys, &providers, timeout).is_ok());
        let err = EngineSelection::Synergy
            .build(&keys, &providers, timeout)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SynthesisError::MissingApiKey { ref provider } if provider == "Cerebras"
        ));
    }

    #[test]
    fn engine_selection_parses() {
        assert_eq!("Synergy".parse::<EngineSelection>(), Ok(EngineSelection::Synergy));
        assert_eq!(" groq ".parse::<EngineSelection>(), Ok(EngineSelection::Groq));
        assert!("openai".parse::<EngineSelection>().is_err());
    }
}
