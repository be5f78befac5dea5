use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::EngineSelection;
use crate::prompt::Selections;

/// Per-user form state carried between requests. Nothing here is global:
/// callers own a context and pass it where it is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionContext {
    pub guide_open: bool,
    pub engine: EngineSelection,
    pub authors: String,
    pub selections: Selections,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            guide_open: false,
            engine: EngineSelection::default(),
            authors: String::new(),
            selections: Selections {
                user_profiles: vec!["Adventurers".to_string()],
                science_fields: vec![
                    "Physics".to_string(),
                    "Psychology".to_string(),
                    "Sociology".to_string(),
                ],
                expertise: "Expert".to_string(),
                structural_models: vec!["Concepts".to_string()],
                paradigms: vec!["Rationalism".to_string()],
                goal_context: "Scientific Research".to_string(),
                mental_approaches: vec!["Perspective shifting".to_string()],
                methods: Vec::new(),
                tools: Vec::new(),
            },
        }
    }
}

impl SessionContext {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn expertise(&self) -> &str {
        &self.selections.expertise
    }

    pub fn toggle_guide(&mut self) {
        self.guide_open = !self.guide_open;
    }

    /// Loads a saved session. A missing, empty or corrupt file yields the defaults;
    /// I/O failures while reading are returned.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read session {}", path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(session),
            Err(err) => {
                tracing::warn!(path = %path.display(), "invalid session file, using defaults: {err}");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("create session directory")?;
            }
        }
        let file =
            File::create(path).with_context(|| format!("write session {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).context("serialize session")?;
        writeln!(writer)?;
        writer.flush().context("flush session")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_restores_defaults() {
        let mut session = SessionContext::default();
        session.toggle_guide();
        session.engine = EngineSelection::Synergy;
        session.selections.expertise = "Novice".to_string();
        session.reset();
        assert_eq!(session, SessionContext::default());
        assert_eq!(session.expertise(), "Expert");
        assert!(!session.guide_open);
    }

    #[test]
    fn default_selections_exist_in_knowledge_base() {
        let kb = crate::ontology::KnowledgeBase::builtin();
        let s = SessionContext::default().selections;
        assert!(s.user_profiles.iter().all(|p| kb.user_profiles.contains_key(p)));
        assert!(s.science_fields.iter().all(|f| kb.science_fields.contains_key(f)));
        assert!(s.structural_models.iter().all(|m| kb.structural_models.contains_key(m)));
        assert!(s.paradigms.iter().all(|p| kb.paradigms.contains_key(p)));
        let approaches = kb.mental_approach_labels();
        assert!(s.mental_approaches.iter().all(|a| approaches.contains(a)));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.json");
        let mut session = SessionContext::default();
        session.authors = "Jane Doe".to_string();
        session.engine = EngineSelection::Cerebras;
        session.save(&path).unwrap();
        assert_eq!(SessionContext::load(&path).unwrap(), session);
    }

    #[test]
    fn corrupt_or_missing_files_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.json");
        assert_eq!(SessionContext::load(&missing).unwrap(), SessionContext::default());
        let corrupt = dir.path().join("bad.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert_eq!(SessionContext::load(&corrupt).unwrap(), SessionContext::default());
    }

    #[test]
    fn read_failures_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SessionContext::load(dir.path()).is_err());
    }

    #[test]
    fn partial_files_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, r#"{"engine":"synergy"}"#).unwrap();
        let session = SessionContext::load(&path).unwrap();
        assert_eq!(session.engine, EngineSelection::Synergy);
        assert_eq!(session.selections.paradigms, vec!["Rationalism".to_string()]);
    }
}
