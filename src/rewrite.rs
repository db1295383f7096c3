use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::batch::DEFAULT_PACING;
use crate::generate::GenerateError;
use crate::model::RewriteProgress;
use crate::notify::NotificationQueue;

/// One section of the cloned book, paired with the content it was cloned
/// with.
#[derive(Debug, Clone)]
pub struct RewriteSource {
    pub section_id: String,
    pub title: String,
    pub chapter_title: String,
    pub original_content: String,
}

#[derive(Debug, Clone)]
pub struct RewriteClone {
    pub new_book_id: String,
    /// Every section of the clone, in original book order.
    pub sections: Vec<RewriteSource>,
}

#[derive(Debug, Clone)]
pub struct SectionRewrite {
    pub new_book_id: String,
    pub section_id: String,
    pub original_content: String,
    pub style: String,
    pub chapter_title: String,
    pub section_title: String,
    pub book_title: String,
}

/// Clone-and-rewrite collaborator. `clone_book_for_rewrite` copies the whole
/// book server-side; `rewrite_section` generates the restyled content and
/// persists it onto the clone, returning the new text. The original book is
/// never written through this seam.
#[async_trait]
pub trait RewriteBackend: Send + Sync {
    async fn clone_book_for_rewrite(
        &self,
        book_id: &str,
        target_style: &str,
    ) -> anyhow::Result<RewriteClone>;
    async fn rewrite_section(&self, request: &SectionRewrite) -> Result<String, GenerateError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub new_book_id: String,
    pub rewritten: usize,
    pub skipped: usize,
    pub aborted_for_quota: bool,
}

/// Whole-book style transform: clone the book, then sequentially rewrite
/// every non-empty section of the clone. Failure policy mirrors the batch
/// runner; a partially rewritten clone is expected, recoverable state.
pub struct RewriteRunner {
    backend: Arc<dyn RewriteBackend>,
    notices: Arc<NotificationQueue>,
    progress: Arc<Mutex<RewriteProgress>>,
    pacing: Duration,
}

struct ProgressReset(Arc<Mutex<RewriteProgress>>);

impl Drop for ProgressReset {
    fn drop(&mut self) {
        *self.0.lock().expect("rewrite progress poisoned") = RewriteProgress::idle();
    }
}

impl RewriteRunner {
    pub fn new(backend: Arc<dyn RewriteBackend>, notices: Arc<NotificationQueue>) -> Self {
        Self {
            backend,
            notices,
            progress: Arc::new(Mutex::new(RewriteProgress::idle())),
            pacing: DEFAULT_PACING,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn progress(&self) -> RewriteProgress {
        self.progress.lock().expect("rewrite progress poisoned").clone()
    }

    /// Runs the transform and returns the new book id for navigation. The
    /// caller shows `book_title` in per-section prompts.
    pub async fn run(
        &self,
        book_id: &str,
        book_title: &str,
        target_style: &str,
    ) -> anyhow::Result<RewriteOutcome> {
        {
            let progress = self.progress.lock().expect("rewrite progress poisoned");
            if progress.is_running {
                self.notices
                    .warning("A style transform is already in progress.");
                anyhow::bail!("rewrite already running");
            }
        }

        let clone = self
            .backend
            .clone_book_for_rewrite(book_id, target_style)
            .await
            .inspect_err(|err| {
                self.notices
                    .error(format!("cloning the book failed: {err:#}"));
            })?;

        let targets: Vec<&RewriteSource> = clone
            .sections
            .iter()
            .filter(|s| !s.original_content.trim().is_empty())
            .collect();

        {
            let mut progress = self.progress.lock().expect("rewrite progress poisoned");
            *progress = RewriteProgress {
                is_running: true,
                current_index: 0,
                total_count: targets.len(),
                current_section_title: String::new(),
                new_book_id: Some(clone.new_book_id.clone()),
            };
        }
        let _reset = ProgressReset(Arc::clone(&self.progress));

        tracing::info!(
            book_id,
            new_book_id = %clone.new_book_id,
            total = targets.len(),
            "style transform started"
        );

        let mut outcome = RewriteOutcome {
            new_book_id: clone.new_book_id.clone(),
            ..RewriteOutcome::default()
        };

        for (index, source) in targets.iter().enumerate() {
            {
                let mut progress = self.progress.lock().expect("rewrite progress poisoned");
                progress.current_index = index;
                progress.current_section_title = source.title.clone();
            }

            let request = SectionRewrite {
                new_book_id: clone.new_book_id.clone(),
                section_id: source.section_id.clone(),
                original_content: source.original_content.clone(),
                style: target_style.to_owned(),
                chapter_title: source.chapter_title.clone(),
                section_title: source.title.clone(),
                book_title: book_title.to_owned(),
            };

            match self.backend.rewrite_section(&request).await {
                Ok(_content) => outcome.rewritten += 1,
                Err(err) if err.is_quota_exceeded() => {
                    self.notices.error(
                        "Generation quota exceeded; the new book is only partially restyled.",
                    );
                    outcome.aborted_for_quota = true;
                    tracing::warn!(index, "style transform aborted on quota");
                    break;
                }
                Err(err) => {
                    self.notices
                        .warning(format!("Skipped \"{}\": {err}", source.title));
                    tracing::warn!(section_id = %source.section_id, error = %err, "section skipped");
                    outcome.skipped += 1;
                }
            }

            if index + 1 < targets.len() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        tracing::info!(
            new_book_id = %outcome.new_book_id,
            rewritten = outcome.rewritten,
            skipped = outcome.skipped,
            aborted = outcome.aborted_for_quota,
            "style transform finished"
        );
        Ok(outcome)
    }
}
