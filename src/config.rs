use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::annotate::DEFAULT_SEARCH_URL;
use crate::llm::ProviderKind;

/// Endpoint and model for one hosted chat-completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub groq: ProviderSettings,
    pub cerebras: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            groq: ProviderKind::Groq.default_settings(),
            cerebras: ProviderKind::Cerebras.default_settings(),
        }
    }
}

impl ProvidersConfig {
    pub fn settings(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Groq => &self.groq,
            ProviderKind::Cerebras => &self.cerebras,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Standalone temperature when only a research inquiry is given.
    pub research_temperature: f32,
    /// Standalone temperature when an innovation inquiry is given.
    pub innovation_temperature: f32,
    pub foundation_temperature: f32,
    pub extension_temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Base URL of the search engine that anchored labels link to.
    pub search_url: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            research_temperature: 0.45,
            innovation_temperature: 0.75,
            foundation_temperature: 0.3,
            extension_temperature: 0.85,
            max_tokens: 4000,
            timeout_secs: 120,
            search_url: DEFAULT_SEARCH_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BibliographyConfig {
    pub registry_url: String,
    pub scholar_url: String,
    pub works_limit: usize,
    pub scholar_limit: usize,
    pub timeout_secs: u64,
    pub concurrency: usize,
}

impl Default for BibliographyConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://pub.orcid.org/v3.0".to_string(),
            scholar_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            works_limit: 10,
            scholar_limit: 8,
            timeout_secs: 10,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SisConfig {
    pub providers: ProvidersConfig,
    pub synthesis: SynthesisConfig,
    pub bibliography: BibliographyConfig,
}

impl SisConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let config = serde_yaml::from_str(&raw).context("parse config yaml")?;
        Ok(config)
    }

    /// Loads `path` when it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
