use std::fmt;

use crate::llm::LlmError;

/// Which model call of a synthesis failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Standalone,
    Foundation,
    Extension,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Standalone => "synthesis",
            Stage::Foundation => "foundation",
            Stage::Extension => "extension",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("missing API key for {provider}")]
    MissingApiKey { provider: String },
    #[error("no research or innovation inquiry supplied")]
    EmptyInquiry,
    #[error("{stage} call to {provider} failed: {source}")]
    ModelCall {
        stage: Stage,
        provider: String,
        #[source]
        source: LlmError,
    },
}

impl SynthesisError {
    /// Configuration and input errors are the caller's fault; model calls are upstream failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SynthesisError::MissingApiKey { .. } | SynthesisError::EmptyInquiry
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_stage_and_provider() {
        let err = SynthesisError::ModelCall {
            stage: Stage::Foundation,
            provider: "Cerebras".to_string(),
            source: LlmError::Status {
                status: 500,
                body: "boom".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "foundation call to Cerebras failed: API error 500: boom"
        );
        assert!(!err.is_client_error());
        assert!(SynthesisError::EmptyInquiry.is_client_error());
    }
}
