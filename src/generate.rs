use async_trait::async_trait;
use thiserror::Error;

/// Failure taxonomy for generation calls. Quota exhaustion aborts a running
/// batch/rewrite loop; anything else skips the current section and
/// continues.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generation quota exceeded")]
    QuotaExceeded,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GenerateError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, GenerateError::QuotaExceeded)
    }
}

/// Context handed to the generator for drafting one section.
#[derive(Debug, Clone)]
pub struct SectionPrompt {
    pub book_id: String,
    pub book_title: String,
    pub book_subtitle: Option<String>,
    pub chapter_title: String,
    pub section_title: String,
    pub audience_profile: String,
    pub style: String,
    pub instruction: Option<String>,
}

/// Targeted rewrite of an existing passage.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub text: String,
    pub style: String,
    pub instruction: Option<String>,
}

/// AI content-generation collaborator. Only the request/response contract
/// matters here; transport, auth, and model selection live behind the
/// implementation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_section(&self, prompt: &SectionPrompt) -> Result<String, GenerateError>;
    async fn rewrite_text(&self, request: &RewriteRequest) -> Result<String, GenerateError>;
}

/// Per-run settings the UI collects once and applies to every section in a
/// batch.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub audience_profile: String,
    pub style: String,
    pub instruction: Option<String>,
}
