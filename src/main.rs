use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;

use sis_synth::ontology::{KnowledgeBase, EXPERTISE_LEVELS, GOAL_CONTEXTS};
use sis_synth::pipeline::{ApiKeys, EngineSelection, Synthesizer};
use sis_synth::report::{default_report_path, write_markdown, write_report};
use sis_synth::{CytoscapeRenderer, SessionContext, SisConfig, SynthesisRequest};

#[derive(Parser)]
#[command(
    name = "sis-synth",
    version,
    about = "Multi-dimensional knowledge synthesis with an interactive semantic graph"
)]
struct Cli {
    #[arg(long, default_value = "data/sis.yml")]
    config: PathBuf,
    #[arg(long, default_value = "data/session.json")]
    session: PathBuf,
    #[arg(long)]
    reset_session: bool,
    /// HTML report path (default: reports/sis-<timestamp>.html).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Also write the raw prose and bibliography as markdown.
    #[arg(long)]
    markdown: Option<PathBuf>,
    /// groq, cerebras or synergy (Cerebras foundation + Groq extension).
    #[arg(long)]
    engine: Option<EngineSelection>,
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_api_key: Option<String>,
    #[arg(long, env = "CEREBRAS_API_KEY", hide_env_values = true)]
    cerebras_api_key: Option<String>,
    /// Comma-separated author names for bibliography lookup.
    #[arg(long)]
    authors: Option<String>,
    /// Knowledge synthesis inquiry.
    #[arg(long)]
    inquiry: Option<String>,
    /// Idea production inquiry; switches the standalone engine to innovation mode.
    #[arg(long)]
    idea: Option<String>,
    /// Supplementary UTF-8 text file.
    #[arg(long)]
    attach: Option<PathBuf>,
    #[arg(long = "profile", value_delimiter = ',')]
    profiles: Vec<String>,
    #[arg(long = "field", value_delimiter = ',')]
    fields: Vec<String>,
    #[arg(long)]
    expertise: Option<String>,
    #[arg(long = "model", value_delimiter = ',')]
    structural_models: Vec<String>,
    #[arg(long = "paradigm", value_delimiter = ',')]
    paradigms: Vec<String>,
    #[arg(long)]
    goal: Option<String>,
    #[arg(long = "approach", value_delimiter = ',')]
    approaches: Vec<String>,
    #[arg(long = "method", value_delimiter = ',')]
    methods: Vec<String>,
    #[arg(long = "tool", value_delimiter = ',')]
    tools: Vec<String>,
    /// Print the knowledge base as JSON and exit.
    #[arg(long)]
    show_knowledge: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    sis_synth::init_tracing();
    let cli = Cli::parse();
    let config = SisConfig::load_or_default(&cli.config)?;
    let knowledge = Arc::new(KnowledgeBase::builtin());

    if cli.show_knowledge {
        let json = serde_json::to_string_pretty(knowledge.as_ref())
            .context("serialize knowledge base")?;
        println!("{json}");
        return Ok(());
    }

    let mut session = SessionContext::load(&cli.session)?;
    if cli.reset_session {
        session.reset();
        tracing::info!(path = %cli.session.display(), "session reset");
    }
    apply_selections(&cli, &mut session, &knowledge)?;

    let request = build_request(&cli, &session)?;
    session.save(&cli.session)?;
    if cli.reset_session && !request.has_inquiry() {
        return Ok(());
    }

    let synthesizer = Synthesizer::from_config(knowledge, &config)?;
    let keys = ApiKeys {
        groq: cli.groq_api_key.clone(),
        cerebras: cli.cerebras_api_key.clone(),
    };
    let engine = session
        .engine
        .build(&keys, &config.providers, synthesizer.chat_timeout())?;
    tracing::info!(engine = %engine.describe(), "starting synthesis");

    let outcome = synthesizer.run(&engine, &request).await?;

    let generated_at = Utc::now();
    let out_path = cli
        .out
        .clone()
        .unwrap_or_else(|| default_report_path(generated_at));
    write_report(
        &out_path,
        &request,
        &outcome,
        &CytoscapeRenderer::default(),
        generated_at,
    )?;
    if let Some(path) = &cli.markdown {
        write_markdown(path, &outcome)?;
    }

    println!("Report written to {}", out_path.display());
    if !outcome.warnings.is_empty() {
        println!("Warnings: {}", outcome.warnings.len());
    }
    Ok(())
}

fn check_known(
    kind: &str,
    values: &[String],
    mut known: impl FnMut(&str) -> bool,
) -> Result<()> {
    for value in values {
        if !known(value) {
            bail!("unknown {kind}: {value}");
        }
    }
    Ok(())
}

/// Overlays CLI flags on the stored session; flags win, unset flags keep the stored value.
fn apply_selections(cli: &Cli, session: &mut SessionContext, kb: &KnowledgeBase) -> Result<()> {
    if let Some(engine) = cli.engine {
        session.engine = engine;
    }
    if let Some(authors) = &cli.authors {
        session.authors = authors.clone();
    }

    let selections = &mut session.selections;
    if !cli.profiles.is_empty() {
        check_known("user profile", &cli.profiles, |v| kb.user_profiles.contains_key(v))?;
        selections.user_profiles = cli.profiles.clone();
    }
    if !cli.fields.is_empty() {
        check_known("science field", &cli.fields, |v| kb.science_fields.contains_key(v))?;
        selections.science_fields = cli.fields.clone();
    }
    if let Some(expertise) = &cli.expertise {
        if !EXPERTISE_LEVELS.contains(&expertise.as_str()) {
            bail!("--expertise must be one of {}", EXPERTISE_LEVELS.join(", "));
        }
        selections.expertise = expertise.clone();
    }
    if !cli.structural_models.is_empty() {
        check_known("structural model", &cli.structural_models, |v| {
            kb.structural_models.contains_key(v)
        })?;
        selections.structural_models = cli.structural_models.clone();
    }
    if !cli.paradigms.is_empty() {
        check_known("paradigm", &cli.paradigms, |v| kb.paradigms.contains_key(v))?;
        selections.paradigms = cli.paradigms.clone();
    }
    if let Some(goal) = &cli.goal {
        if !GOAL_CONTEXTS.contains(&goal.as_str()) {
            bail!("--goal must be one of {}", GOAL_CONTEXTS.join(", "));
        }
        selections.goal_context = goal.clone();
    }
    if !cli.approaches.is_empty() {
        let labels = kb.mental_approach_labels();
        check_known("mental approach", &cli.approaches, |v| {
            labels.iter().any(|l| l == v)
        })?;
        selections.mental_approaches = cli.approaches.clone();
    }

    let methods = kb.aggregate_methods(&selections.science_fields);
    let tools = kb.aggregate_tools(&selections.science_fields);
    if !cli.methods.is_empty() {
        check_known("method for the selected fields", &cli.methods, |v| {
            methods.iter().any(|m| m == v)
        })?;
        selections.methods = cli.methods.clone();
    }
    if !cli.tools.is_empty() {
        check_known("tool for the selected fields", &cli.tools, |v| {
            tools.iter().any(|t| t == v)
        })?;
        selections.tools = cli.tools.clone();
    }
    selections.methods.retain(|m| {
        let keep = methods.contains(m);
        if !keep {
            tracing::warn!(method = %m, "dropping stored method not offered by the selected fields");
        }
        keep
    });
    selections.tools.retain(|t| {
        let keep = tools.contains(t);
        if !keep {
            tracing::warn!(tool = %t, "dropping stored tool not offered by the selected fields");
        }
        keep
    });
    Ok(())
}

fn build_request(cli: &Cli, session: &SessionContext) -> Result<SynthesisRequest> {
    let attachment = match &cli.attach {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("read attachment {}", path.display()))?,
        None => String::new(),
    };
    Ok(SynthesisRequest {
        selections: session.selections.clone(),
        authors: session.authors.clone(),
        research_inquiry: cli.inquiry.clone().unwrap_or_default(),
        innovation_inquiry: cli.idea.clone().unwrap_or_default(),
        attachment,
    })
}
