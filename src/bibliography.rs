//! Per-author bibliography lookup.
//!
//! Each author runs through a fallback chain of [`BibliographySource`]s: the
//! ORCID registry first, then a Semantic Scholar author search. Lookup failures
//! never escape; an author nobody knows gets an explicit "no record" section.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::{header, Client};
use serde::Deserialize;

use crate::config::BibliographyConfig;

pub const UNDATED: &str = "n.d.";
const UNKNOWN_TITLE: &str = "Unknown Publication Title";

/// One publication line: `- ({year}) {title}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Work {
    pub year: Option<String>,
    pub title: String,
}

impl Work {
    pub fn format_line(&self) -> String {
        format!(
            "- ({}) {}",
            self.year.as_deref().unwrap_or(UNDATED),
            self.title
        )
    }
}

/// A resolved author section, rendered as free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorRecord {
    pub heading: String,
    pub works: Vec<Work>,
    /// Line printed instead of works when the list is empty.
    pub empty_note: Option<String>,
}

impl AuthorRecord {
    pub fn render(&self) -> String {
        let mut out = format!("\n--- {} ---\n", self.heading);
        if self.works.is_empty() {
            if let Some(note) = &self.empty_note {
                out.push_str(note);
                out.push('\n');
            }
        }
        for work in &self.works {
            out.push_str(&work.format_line());
            out.push('\n');
        }
        out
    }
}

/// Something that can look an author up. `Ok(None)` means "not known here".
#[async_trait]
pub trait BibliographySource: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, author: &str) -> Result<Option<AuthorRecord>>;
}

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("sis-synth/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("build http client")
}

#[derive(Debug, Deserialize)]
struct OrcidSearchResponse {
    #[serde(default)]
    result: Option<Vec<OrcidSearchHit>>,
}

#[derive(Debug, Deserialize)]
struct OrcidSearchHit {
    #[serde(rename = "orcid-identifier")]
    orcid_identifier: Option<OrcidIdentifier>,
}

#[derive(Debug, Deserialize)]
struct OrcidIdentifier {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrcidRecord {
    #[serde(rename = "activities-summary", default)]
    activities_summary: Option<ActivitiesSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct ActivitiesSummary {
    #[serde(default)]
    works: Option<WorksSummary>,
}

#[derive(Debug, Default, Deserialize)]
struct WorksSummary {
    #[serde(default)]
    group: Vec<WorkGroup>,
}

#[derive(Debug, Deserialize)]
struct WorkGroup {
    #[serde(rename = "work-summary", default)]
    work_summary: Vec<WorkSummary>,
}

#[derive(Debug, Deserialize)]
struct WorkSummary {
    title: Option<TitleBlock>,
    #[serde(rename = "publication-date")]
    publication_date: Option<PublicationDate>,
}

#[derive(Debug, Deserialize)]
struct TitleBlock {
    title: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct PublicationDate {
    year: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: Option<String>,
}

impl WorkSummary {
    fn into_work(self) -> Work {
        let title = self
            .title
            .and_then(|block| block.title)
            .and_then(|field| field.value)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
        let year = self
            .publication_date
            .and_then(|date| date.year)
            .and_then(|field| field.value);
        Work { year, title }
    }
}

/// ORCID public registry: name search, then the record's works summary.
pub struct OrcidRegistry {
    client: Client,
    base_url: String,
    works_limit: usize,
}

impl OrcidRegistry {
    pub fn new(config: &BibliographyConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.registry_url.trim_end_matches('/').to_string(),
            works_limit: config.works_limit,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("bad status for {url}"))?;
        let body = response.text().await.context("read registry body")?;
        serde_json::from_str(&body).with_context(|| format!("parse registry JSON from {url}"))
    }

    async fn find_identifier(&self, author: &str) -> Result<Option<String>> {
        let url = format!("{}/search/", self.base_url);
        let search: OrcidSearchResponse = self.get_json(&url, &[("q", author)]).await?;
        let id = search
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|hit| hit.orcid_identifier)
            .and_then(|ident| ident.path)
            .filter(|path| !path.trim().is_empty());
        Ok(id)
    }
}

#[async_trait]
impl BibliographySource for OrcidRegistry {
    fn name(&self) -> &str {
        "orcid"
    }

    async fn lookup(&self, author: &str) -> Result<Option<AuthorRecord>> {
        let Some(orcid_id) = self.find_identifier(author).await? else {
            return Ok(None);
        };
        let url = format!("{}/{}/record", self.base_url, orcid_id);
        let record: OrcidRecord = self.get_json(&url, &[]).await?;
        let works = record
            .activities_summary
            .and_then(|summary| summary.works)
            .map(|works| works.group)
            .unwrap_or_default()
            .into_iter()
            .take(self.works_limit)
            .filter_map(|group| group.work_summary.into_iter().next())
            .map(WorkSummary::into_work)
            .collect();
        Ok(Some(AuthorRecord {
            heading: format!(
                "DATABASE RECORD: {} (ORCID: {})",
                author.to_uppercase(),
                orcid_id
            ),
            works,
            empty_note: Some("No public works registered in registry.".to_string()),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct ScholarSearchResponse {
    #[serde(default)]
    data: Vec<ScholarPaper>,
}

#[derive(Debug, Deserialize)]
struct ScholarPaper {
    title: Option<String>,
    year: Option<serde_json::Value>,
}

fn year_text(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Semantic Scholar paper search restricted to an author name.
pub struct ScholarSearch {
    client: Client,
    base_url: String,
    limit: usize,
}

impl ScholarSearch {
    pub fn new(config: &BibliographyConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            base_url: config.scholar_url.trim_end_matches('/').to_string(),
            limit: config.scholar_limit,
        })
    }
}

#[async_trait]
impl BibliographySource for ScholarSearch {
    fn name(&self) -> &str {
        "scholar"
    }

    async fn lookup(&self, author: &str) -> Result<Option<AuthorRecord>> {
        let url = format!("{}/paper/search", self.base_url);
        let query = format!("author:\"{author}\"");
        let limit = self.limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", query.as_str()),
                ("limit", limit.as_str()),
                ("fields", "title,year"),
            ])
            .send()
            .await
            .with_context(|| format!("fetch {url}"))?;
        let status = response.status();
        let body = response.text().await.context("read scholar body")?;
        if !status.is_success() {
            bail!("scholar search error: {} {}", status, body);
        }
        let parsed: ScholarSearchResponse =
            serde_json::from_str(&body).context("parse scholar JSON")?;
        let works: Vec<Work> = parsed
            .data
            .into_iter()
            .take(self.limit)
            .map(|paper| Work {
                year: year_text(paper.year),
                title: paper
                    .title
                    .filter(|title| !title.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            })
            .collect();
        if works.is_empty() {
            return Ok(None);
        }
        Ok(Some(AuthorRecord {
            heading: format!("SCHOLAR BACKUP RECORD: {}", author.to_uppercase()),
            works,
            empty_note: None,
        }))
    }
}

pub fn not_found_record(author: &str) -> AuthorRecord {
    AuthorRecord {
        heading: format!("NO RECORD: {}", author.to_uppercase()),
        works: Vec::new(),
        empty_note: Some("No bibliographic record found.".to_string()),
    }
}

/// Splits a comma-separated author list, dropping empty tokens.
pub fn split_authors(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct BibliographyResolver {
    sources: Vec<Arc<dyn BibliographySource>>,
    concurrency: usize,
}

impl BibliographyResolver {
    pub fn new(sources: Vec<Arc<dyn BibliographySource>>, concurrency: usize) -> Self {
        Self {
            sources,
            concurrency: concurrency.max(1),
        }
    }

    /// ORCID first, Semantic Scholar as the fallback.
    pub fn from_config(config: &BibliographyConfig) -> Result<Self> {
        let registry: Arc<dyn BibliographySource> = Arc::new(OrcidRegistry::new(config)?);
        let scholar: Arc<dyn BibliographySource> = Arc::new(ScholarSearch::new(config)?);
        Ok(Self::new(vec![registry, scholar], config.concurrency))
    }

    pub async fn resolve_author(&self, author: &str) -> AuthorRecord {
        for source in &self.sources {
            match source.lookup(author).await {
                Ok(Some(record)) => return record,
                Ok(None) => {
                    tracing::debug!(source = source.name(), author, "no bibliography match");
                }
                Err(err) => {
                    tracing::warn!(
                        source = source.name(),
                        author,
                        "bibliography lookup failed: {err:#}"
                    );
                }
            }
        }
        not_found_record(author)
    }

    /// Resolves every author in a comma-separated list. Output order follows input order.
    pub async fn resolve(&self, author_list: &str) -> String {
        let authors = split_authors(author_list);
        if authors.is_empty() {
            return String::new();
        }
        let lookups: Vec<_> = authors
            .iter()
            .map(|author| self.resolve_author(author))
            .collect();
        let records: Vec<AuthorRecord> = stream::iter(lookups)
            .buffered(self.concurrency)
            .collect()
            .await;
        records.iter().map(AuthorRecord::render).collect()
    }
}
