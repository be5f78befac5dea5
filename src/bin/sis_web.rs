use std::{env, fmt::Write as _, net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use dotenvy::dotenv;
use serde::Deserialize;

use sis_synth::annotate::escape_html;
use sis_synth::ontology::{KnowledgeBase, EXPERTISE_LEVELS, GOAL_CONTEXTS};
use sis_synth::pipeline::{ApiKeys, EngineSelection, Synthesizer};
use sis_synth::report::{render_outcome, render_page};
use sis_synth::{CytoscapeRenderer, SessionContext, SisConfig, SynthesisError, SynthesisRequest};

#[derive(Clone)]
struct Config {
    bind_addr: String,
    config_path: PathBuf,
    max_upload_bytes: usize,
    keys: ApiKeys,
}

impl Config {
    fn from_env() -> Self {
        Self {
            bind_addr: parse_env_string("SIS_BIND_ADDR", "127.0.0.1:8501"),
            config_path: PathBuf::from(parse_env_string("SIS_CONFIG", "data/sis.yml")),
            max_upload_bytes: parse_env_usize("SIS_MAX_UPLOAD_BYTES", 5 * 1024 * 1024),
            keys: ApiKeys::from_env(),
        }
    }
}

fn parse_env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

struct AppState {
    config: SisConfig,
    synthesizer: Synthesizer,
    env_keys: ApiKeys,
    renderer: CytoscapeRenderer,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    sis_synth::init_tracing();
    let cfg = Config::from_env();
    let config = SisConfig::load_or_default(&cfg.config_path)?;
    let knowledge = Arc::new(KnowledgeBase::builtin());
    let synthesizer = Synthesizer::from_config(knowledge, &config)?;

    let state = Arc::new(AppState {
        config,
        synthesizer,
        env_keys: cfg.keys.clone(),
        renderer: CytoscapeRenderer::default(),
    });

    let app = Router::new()
        .route("/", get(index))
        .route(
            "/synthesize",
            post(synthesize).route_layer(DefaultBodyLimit::max(cfg.max_upload_bytes)),
        )
        .route("/reset", get(reset))
        .route("/api/knowledge", get(knowledge_json))
        .route("/health", get(health))
        .with_state(state);

    let addr: SocketAddr = cfg
        .bind_addr
        .parse()
        .with_context(|| format!("invalid SIS_BIND_ADDR {}", cfg.bind_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "sis-web listening");
    axum::serve(listener, app).await.context("serve")?;
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct IndexQuery {
    guide: Option<bool>,
}

async fn index(State(state): State<SharedState>, Query(query): Query<IndexQuery>) -> Html<String> {
    let mut session = SessionContext::default();
    session.guide_open = query.guide.unwrap_or(false);
    Html(page(&state, &session, "", None))
}

async fn reset() -> Redirect {
    Redirect::to("/")
}

async fn health() -> &'static str {
    "OK"
}

async fn knowledge_json(State(state): State<SharedState>) -> Json<KnowledgeBase> {
    Json(state.synthesizer.knowledge().clone())
}

async fn synthesize(State(state): State<SharedState>, mp: Multipart) -> Response {
    let submission = match read_submission(mp, state.synthesizer.knowledge()).await {
        Ok(submission) => submission,
        Err(message) => {
            let session = SessionContext::default();
            let banner = error_banner(&message);
            return (
                StatusCode::BAD_REQUEST,
                Html(page(&state, &session, &banner, None)),
            )
                .into_response();
        }
    };
    let Submission {
        session,
        request,
        keys,
    } = submission;

    let keys = ApiKeys {
        groq: keys.groq.or_else(|| state.env_keys.groq.clone()),
        cerebras: keys.cerebras.or_else(|| state.env_keys.cerebras.clone()),
    };

    match run_synthesis(&state, &session, &keys, &request).await {
        Ok(results) => Html(page(&state, &session, "", Some(&results))).into_response(),
        Err(err) => {
            let status = if err.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::BAD_GATEWAY
            };
            tracing::warn!(status = status.as_u16(), "synthesis failed: {err}");
            let banner = error_banner(&err.to_string());
            (status, Html(page(&state, &session, &banner, None))).into_response()
        }
    }
}

async fn run_synthesis(
    state: &AppState,
    session: &SessionContext,
    keys: &ApiKeys,
    request: &SynthesisRequest,
) -> Result<String, SynthesisError> {
    let engine = session.engine.build(
        keys,
        &state.config.providers,
        state.synthesizer.chat_timeout(),
    )?;
    if !request.has_inquiry() {
        return Err(SynthesisError::EmptyInquiry);
    }
    let outcome = state.synthesizer.run(&engine, request).await?;
    Ok(render_outcome(&outcome, &state.renderer))
}

struct Submission {
    session: SessionContext,
    request: SynthesisRequest,
    keys: ApiKeys,
}

async fn read_submission(mut mp: Multipart, kb: &KnowledgeBase) -> Result<Submission, String> {
    let mut fields = Vec::new();
    let mut attachment = String::new();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|err| format!("invalid form data: {err}"))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "attachment" {
            let file_name = field.file_name().unwrap_or("").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| format!("failed to read upload `{file_name}`: {err}"))?;
            if bytes.is_empty() {
                continue;
            }
            if !file_name.to_ascii_lowercase().ends_with(".txt") {
                return Err(format!("only .txt attachments are accepted (got `{file_name}`)"));
            }
            attachment = String::from_utf8(bytes.to_vec())
                .map_err(|_| format!("attachment `{file_name}` is not valid UTF-8"))?;
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|err| format!("failed to read field `{name}`: {err}"))?;
        fields.push((name, value));
    }
    Ok(submission_from_fields(&fields, attachment, kb))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Maps flat form fields (multi-selects repeat their name) onto session, request and keys.
/// Methods and tools the selected fields do not offer are dropped.
fn submission_from_fields(
    fields: &[(String, String)],
    attachment: String,
    kb: &KnowledgeBase,
) -> Submission {
    let mut session = SessionContext::default();
    let selections = &mut session.selections;
    for list in [
        &mut selections.user_profiles,
        &mut selections.science_fields,
        &mut selections.structural_models,
        &mut selections.paradigms,
        &mut selections.mental_approaches,
        &mut selections.methods,
        &mut selections.tools,
    ] {
        list.clear();
    }

    let mut request = SynthesisRequest::default();
    let mut keys = ApiKeys::default();
    for (name, value) in fields {
        let selections = &mut session.selections;
        match name.as_str() {
            "user_profiles" => selections.user_profiles.push(value.clone()),
            "science_fields" => selections.science_fields.push(value.clone()),
            "structural_models" => selections.structural_models.push(value.clone()),
            "paradigms" => selections.paradigms.push(value.clone()),
            "mental_approaches" => selections.mental_approaches.push(value.clone()),
            "methods" => selections.methods.push(value.clone()),
            "tools" => selections.tools.push(value.clone()),
            "expertise" => selections.expertise = value.clone(),
            "goal_context" => selections.goal_context = value.clone(),
            "authors" => session.authors = value.clone(),
            "engine" => {
                session.engine = value.parse().unwrap_or_else(|err| {
                    tracing::warn!("{err}; using default engine");
                    EngineSelection::default()
                })
            }
            "guide_open" => session.guide_open = value == "true",
            "research_inquiry" => request.research_inquiry = value.clone(),
            "innovation_inquiry" => request.innovation_inquiry = value.clone(),
            "groq_key" => keys.groq = non_blank(value),
            "cerebras_key" => keys.cerebras = non_blank(value),
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    let selections = &mut session.selections;
    let methods = kb.aggregate_methods(&selections.science_fields);
    let tools = kb.aggregate_tools(&selections.science_fields);
    selections.methods.retain(|m| {
        let keep = methods.contains(m);
        if !keep {
            tracing::debug!(method = %m, "dropping method not offered by the selected fields");
        }
        keep
    });
    selections.tools.retain(|t| {
        let keep = tools.contains(t);
        if !keep {
            tracing::debug!(tool = %t, "dropping tool not offered by the selected fields");
        }
        keep
    });

    request.selections = session.selections.clone();
    request.authors = session.authors.clone();
    request.attachment = attachment;
    Submission {
        session,
        request,
        keys,
    }
}

fn error_banner(message: &str) -> String {
    format!("<div class=\"sis-error\">{}</div>", escape_html(message))
}

const USER_GUIDE: &str = r#"<div class="sis-warning"><ol>
<li><strong>Keys</strong>: enter the API keys for the selected engine (or set GROQ_API_KEY / CEREBRAS_API_KEY). Synergy mode is recommended for interdisciplinary research.</li>
<li><strong>Authors</strong>: comma-separated names fetch real bibliographies from ORCID with Semantic Scholar as fallback.</li>
<li><strong>Expertise</strong>: adjusts the taxonomic depth and linguistic complexity.</li>
<li><strong>Inquiry</strong>: use both the synthesis and the idea production boxes for dual output.</li>
<li><strong>Graph</strong>: nodes are interactive. Click one to scroll to its anchor in the text.</li>
</ol><a href="/">Close guide</a></div>"#;

fn page(state: &AppState, session: &SessionContext, banner: &str, results: Option<&str>) -> String {
    let mut body = String::new();
    body.push_str("<h1>SIS Universal Knowledge Synthesizer</h1>\n");
    body.push_str(
        "<p>Multi-dimensional synthesis with separated metamodel and mental approaches. \
<a href=\"/?guide=true\">User guide</a> | <a href=\"/api/knowledge\">Knowledge explorer</a> | \
<a href=\"/reset\">Reset framework</a></p>\n",
    );
    if session.guide_open {
        body.push_str(USER_GUIDE);
    }
    body.push_str(banner);
    body.push_str(&render_form(state.synthesizer.knowledge(), session));
    if let Some(results) = results {
        body.push_str(results);
    }
    render_page("SIS Synthesizer", &body)
}

fn select_options<'a>(
    options: impl IntoIterator<Item = &'a str>,
    selected: impl Fn(&str) -> bool,
) -> String {
    let mut html = String::new();
    for option in options {
        let attr = if selected(option) { " selected" } else { "" };
        let escaped = escape_html(option);
        let _ = write!(html, "<option value=\"{escaped}\"{attr}>{escaped}</option>");
    }
    html
}

fn multi_select<'a>(
    name: &str,
    label: &str,
    options: impl IntoIterator<Item = &'a str>,
    selected: &[String],
) -> String {
    format!(
        "<label for=\"{name}\">{label}</label><select id=\"{name}\" name=\"{name}\" multiple>{}</select>\n",
        select_options(options, |o| selected.iter().any(|s| s == o))
    )
}

fn single_select<'a>(
    name: &str,
    label: &str,
    options: impl IntoIterator<Item = &'a str>,
    selected: &str,
) -> String {
    format!(
        "<label for=\"{name}\">{label}</label><select id=\"{name}\" name=\"{name}\">{}</select>\n",
        select_options(options, |o| o == selected)
    )
}

fn render_form(kb: &KnowledgeBase, session: &SessionContext) -> String {
    let s = &session.selections;
    let methods = kb.aggregate_methods(&s.science_fields);
    let tools = kb.aggregate_tools(&s.science_fields);
    let approaches = kb.mental_approach_labels();
    let engines = EngineSelection::ALL.map(|e| e.as_str());

    let mut form = String::new();
    form.push_str("<form method=\"post\" action=\"/synthesize\" enctype=\"multipart/form-data\">\n");
    let _ = write!(
        form,
        "<input type=\"hidden\" name=\"guide_open\" value=\"{}\">\n",
        session.guide_open
    );
    form.push_str("<fieldset><legend>Engine</legend>\n");
    form.push_str(&single_select(
        "engine",
        "Engine (groq, cerebras, synergy = Cerebras foundation + Groq extension)",
        engines,
        session.engine.as_str(),
    ));
    form.push_str("<label for=\"groq_key\">Groq API key</label><input type=\"password\" id=\"groq_key\" name=\"groq_key\">\n");
    form.push_str("<label for=\"cerebras_key\">Cerebras API key</label><input type=\"password\" id=\"cerebras_key\" name=\"cerebras_key\">\n");
    form.push_str("</fieldset>\n");

    form.push_str("<fieldset><legend>Step 1: Configure the build</legend>\n");
    let _ = writeln!(
        form,
        "<label for=\"authors\">Target research authors</label><input type=\"text\" id=\"authors\" name=\"authors\" size=\"80\" placeholder=\"Karl Petrič, Samo Kralj, Teodor Petrič\" value=\"{}\">",
        escape_html(&session.authors)
    );
    form.push_str(&multi_select(
        "user_profiles",
        "1. User profiles",
        kb.user_profiles.keys().map(String::as_str),
        &s.user_profiles,
    ));
    form.push_str(&multi_select(
        "science_fields",
        "2. Science fields",
        kb.science_fields.keys().map(String::as_str),
        &s.science_fields,
    ));
    form.push_str(&single_select(
        "expertise",
        "3. Expertise level",
        EXPERTISE_LEVELS,
        &s.expertise,
    ));
    form.push_str(&multi_select(
        "structural_models",
        "4. Structural models",
        kb.structural_models.keys().map(String::as_str),
        &s.structural_models,
    ));
    form.push_str(&multi_select(
        "paradigms",
        "5. Scientific paradigms",
        kb.paradigms.keys().map(String::as_str),
        &s.paradigms,
    ));
    form.push_str(&single_select(
        "goal_context",
        "6. Context / goal",
        GOAL_CONTEXTS,
        &s.goal_context,
    ));
    form.push_str(&multi_select(
        "mental_approaches",
        "7. Mental approaches",
        approaches.iter().map(String::as_str),
        &s.mental_approaches,
    ));
    form.push_str(&multi_select(
        "methods",
        "8. Methodologies (for the selected fields)",
        methods.iter().map(String::as_str),
        &s.methods,
    ));
    form.push_str(&multi_select(
        "tools",
        "9. Specific tools (for the selected fields)",
        tools.iter().map(String::as_str),
        &s.tools,
    ));
    form.push_str("</fieldset>\n");

    form.push_str("<fieldset><legend>Step 2: Inquiry</legend>\n");
    form.push_str("<label for=\"research_inquiry\">Knowledge synthesis inquiry</label><textarea id=\"research_inquiry\" name=\"research_inquiry\" placeholder=\"Complex interdisciplinary research question.\"></textarea>\n");
    form.push_str("<label for=\"innovation_inquiry\">Idea production inquiry</label><textarea id=\"innovation_inquiry\" name=\"innovation_inquiry\" placeholder=\"Generative innovative ideas leveraging IMA/MA logic.\"></textarea>\n");
    form.push_str("<label for=\"attachment\">Supplementary context (.txt)</label><input type=\"file\" id=\"attachment\" name=\"attachment\" accept=\".txt\">\n");
    form.push_str("</fieldset>\n");
    form.push_str("<button type=\"submit\">Execute multi-dimensional synthesis</button>\n</form>\n");
    form
}
