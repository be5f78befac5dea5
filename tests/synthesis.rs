use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sis_synth::bibliography::BibliographyResolver;
use sis_synth::config::{BibliographyConfig, ProviderSettings, ProvidersConfig, SynthesisConfig};
use sis_synth::llm::{LlmError, OpenAiCompatibleProvider};
use sis_synth::pipeline::{ApiKeys, Engine, EngineSelection, Synthesizer};
use sis_synth::{KnowledgeBase, Stage, SynthesisError, SynthesisRequest};

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "chatcmpl-1",
        "choices": [ { "index": 0, "message": { "role": "assistant", "content": content } } ]
    }))
}

fn provider(name: &str, base_url: &str) -> Arc<OpenAiCompatibleProvider> {
    let settings = ProviderSettings {
        base_url: base_url.to_string(),
        model: "test-model".to_string(),
    };
    Arc::new(OpenAiCompatibleProvider::new(name, &settings, "test-key", Duration::from_secs(5)).unwrap())
}

fn synthesizer(biblio_url: &str) -> Synthesizer {
    let biblio = BibliographyConfig {
        registry_url: biblio_url.to_string(),
        scholar_url: biblio_url.to_string(),
        timeout_secs: 5,
        ..Default::default()
    };
    Synthesizer::new(
        Arc::new(KnowledgeBase::builtin()),
        BibliographyResolver::from_config(&biblio).unwrap(),
        SynthesisConfig::default(),
    )
}

fn request(inquiry: &str) -> SynthesisRequest {
    SynthesisRequest {
        research_inquiry: inquiry.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn standalone_response_is_parsed_and_anchored() {
    let server = MockServer::start().await;
    let reply = r##"Hello world ### SEMANTIC_GRAPH_JSON {"nodes":[{"id":"n1","label":"Hello","color":"#fff","shape":"rectangle"}],"edges":[]}"##;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_string_contains("\"model\":\"test-model\""))
        .and(body_string_contains("[SYNTHESIS INQUIRY]: Greet the world"))
        .respond_with(completion(reply))
        .expect(1)
        .mount(&server)
        .await;

    let synth = synthesizer(&server.uri());
    let engine = Engine::Standalone(provider("Groq", &server.uri()));
    let outcome = synth.run(&engine, &request("Greet the world")).await.unwrap();

    assert_eq!(outcome.prose, "Hello world ");
    let annotated = outcome.annotated.as_str();
    assert!(annotated.starts_with("<span id=\"n1\" class=\"sis-node-anchor\">"));
    assert!(annotated.contains("href=\"https://www.google.com/search?q=Hello\""));
    assert!(annotated.contains(">Hello<i class=\"search-icon\">"));
    let graph = outcome.graph.unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].shape, "rectangle");
    assert_eq!(graph.nodes[0].color, "#fff");
    assert!(graph.edges.is_empty());
    assert!(outcome.warnings.is_empty());
    assert!(outcome.bibliography.is_empty());
}

#[tokio::test]
async fn sequential_feeds_foundation_into_extension() {
    let foundation_server = MockServer::start().await;
    let extension_server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("SIS Foundation Analyst"))
        .respond_with(completion("Established facts about entropy."))
        .expect(1)
        .mount(&foundation_server)
        .await;
    Mock::given(path("/chat/completions"))
        .and(body_string_contains("Established facts about entropy."))
        .respond_with(completion(
            r#"Wild ideas. ### SEMANTIC_GRAPH_JSON {"nodes":[{"id":"e","label":"entropy","type":"Class"}],"edges":[]}"#,
        ))
        .expect(1)
        .mount(&extension_server)
        .await;

    let synth = synthesizer(&foundation_server.uri());
    let engine = Engine::Sequential {
        foundation: provider("Cerebras", &foundation_server.uri()),
        extension: provider("Groq", &extension_server.uri()),
    };
    let outcome = synth.run(&engine, &request("entropy")).await.unwrap();

    assert_eq!(
        outcome.prose,
        "## Foundation Synthesis\n\nEstablished facts about entropy.\n\n## Creative Extension\n\nWild ideas. "
    );
    assert_eq!(outcome.annotated.as_str().matches("sis-node-anchor").count(), 1);
    let graph = outcome.graph.unwrap();
    assert_eq!((graph.nodes[0].size, graph.nodes[0].z_index), (110, 10));
    assert_eq!(outcome.engine, "Cerebras + Groq synergy");
}

#[tokio::test]
async fn foundation_network_error_never_reaches_extension() {
    let extension_server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .respond_with(completion("should not be called"))
        .expect(0)
        .mount(&extension_server)
        .await;

    let synth = synthesizer(&extension_server.uri());
    let engine = Engine::Sequential {
        foundation: provider("Cerebras", "http://127.0.0.1:1"),
        extension: provider("Groq", &extension_server.uri()),
    };
    let err = synth.run(&engine, &request("anything")).await.unwrap_err();

    match err {
        SynthesisError::ModelCall {
            stage,
            provider,
            source,
        } => {
            assert_eq!(stage, Stage::Foundation);
            assert_eq!(provider, "Cerebras");
            assert!(matches!(source, LlmError::Network(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn upstream_status_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let synth = synthesizer(&server.uri());
    let engine = Engine::Standalone(provider("Groq", &server.uri()));
    let err = synth.run(&engine, &request("q")).await.unwrap_err();
    match err {
        SynthesisError::ModelCall {
            stage: Stage::Standalone,
            source: LlmError::Status { status, body },
            ..
        } => {
            assert_eq!(status, 500);
            assert!(body.contains("upstream exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_choices_are_an_error() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let synth = synthesizer(&server.uri());
    let engine = Engine::Standalone(provider("Groq", &server.uri()));
    let err = synth.run(&engine, &request("q")).await.unwrap_err();
    assert!(matches!(
        err,
        SynthesisError::ModelCall {
            source: LlmError::EmptyResponse,
            ..
        }
    ));
}

#[tokio::test]
async fn malformed_graph_keeps_prose_with_warning() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .respond_with(completion("Body text ### SEMANTIC_GRAPH_JSON {\"nodes\": [oops]}"))
        .mount(&server)
        .await;

    let synth = synthesizer(&server.uri());
    let engine = Engine::Standalone(provider("Groq", &server.uri()));
    let outcome = synth.run(&engine, &request("q")).await.unwrap();
    assert_eq!(outcome.prose, "Body text ");
    assert_eq!(outcome.annotated.as_str(), "Body text ");
    assert!(outcome.graph.is_none());
    assert_eq!(outcome.warnings.len(), 1);
}

#[tokio::test]
async fn empty_inquiry_is_rejected_without_calls() {
    let server = MockServer::start().await;
    Mock::given(path("/chat/completions"))
        .respond_with(completion("unused"))
        .expect(0)
        .mount(&server)
        .await;

    let synth = synthesizer(&server.uri());
    let engine = Engine::Standalone(provider("Groq", &server.uri()));
    let err = synth.run(&engine, &request("")).await.unwrap_err();
    assert!(matches!(err, SynthesisError::EmptyInquiry));
    assert!(err.is_client_error());
}

#[test]
fn missing_key_is_reported_per_provider() {
    let providers = ProvidersConfig::default();
    let timeout = Duration::from_secs(1);
    let err = EngineSelection::Cerebras
        .build(&ApiKeys::default(), &providers, timeout)
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "missing API key for Cerebras");

    let keys = ApiKeys {
        groq: None,
        cerebras: Some("ck".to_string()),
    };
    let err = EngineSelection::Synergy
        .build(&keys, &providers, timeout)
        .err()
        .unwrap();
    assert!(matches!(err, SynthesisError::MissingApiKey { ref provider } if provider == "Groq"));
}
