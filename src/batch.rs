use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;

use crate::generate::{GenerateError, GenerationSettings, SectionPrompt, TextGenerator};
use crate::model::BatchProgress;
use crate::notify::{ConfirmPrompt, NotificationQueue};
use crate::store::ContentStore;
use crate::tree::DocumentTree;

/// Pacing between consecutive generation calls, to respect external rate
/// limits. Generation is strictly sequential; later sections may depend on
/// earlier ones having been written.
pub const DEFAULT_PACING: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub written: usize,
    pub skipped: usize,
    pub aborted_for_quota: bool,
}

/// Drives sequential generation over every unwritten section of a chapter.
/// Quota exhaustion aborts the remainder; any other failure skips the
/// section and continues — partial completion is expected and re-running
/// re-selects unwritten sections from scratch.
pub struct BatchRunner {
    store: Arc<dyn ContentStore>,
    generator: Arc<dyn TextGenerator>,
    confirm: Arc<dyn ConfirmPrompt>,
    notices: Arc<NotificationQueue>,
    progress: Arc<Mutex<BatchProgress>>,
    pacing: Duration,
}

/// Resets progress to idle on every exit path, including early returns.
struct ProgressReset(Arc<Mutex<BatchProgress>>);

impl Drop for ProgressReset {
    fn drop(&mut self) {
        *self.0.lock().expect("batch progress poisoned") = BatchProgress::idle();
    }
}

impl BatchRunner {
    pub fn new(
        store: Arc<dyn ContentStore>,
        generator: Arc<dyn TextGenerator>,
        confirm: Arc<dyn ConfirmPrompt>,
        notices: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            store,
            generator,
            confirm,
            notices,
            progress: Arc::new(Mutex::new(BatchProgress::idle())),
            pacing: DEFAULT_PACING,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress.lock().expect("batch progress poisoned").clone()
    }

    /// Batch-writes one chapter. See the struct docs for the failure
    /// policy; "no unwritten sections" is an informational no-op.
    pub async fn run_chapter(
        &self,
        tree: &mut DocumentTree,
        chapter_id: &str,
        settings: &GenerationSettings,
    ) -> anyhow::Result<BatchOutcome> {
        let targets = tree.unwritten_sections(chapter_id);
        if targets.is_empty() {
            self.notices
                .info("All sections of this chapter are already written.");
            return Ok(BatchOutcome::default());
        }

        let chapter_title = tree
            .chapter(chapter_id)
            .map(|c| c.title.clone())
            .with_context(|| format!("chapter not found: {chapter_id}"))?;

        let prompt = format!(
            "Generate content for {} unwritten section(s) of \"{chapter_title}\"? \
             This issues one AI call per section.",
            targets.len()
        );
        if !self.confirm.confirm("Batch write", &prompt).await {
            return Ok(BatchOutcome::default());
        }

        {
            let mut progress = self.progress.lock().expect("batch progress poisoned");
            if progress.is_running {
                self.notices
                    .warning("A batch run is already in progress.");
                return Ok(BatchOutcome::default());
            }
            *progress = BatchProgress {
                is_running: true,
                chapter_id: Some(chapter_id.to_owned()),
                current_index: 0,
                total_count: targets.len(),
                current_section_title: String::new(),
            };
        }
        let _reset = ProgressReset(Arc::clone(&self.progress));

        tracing::info!(chapter_id, total = targets.len(), "batch write started");
        let mut outcome = BatchOutcome::default();

        for (index, (section_id, section_title)) in targets.iter().enumerate() {
            {
                let mut progress = self.progress.lock().expect("batch progress poisoned");
                progress.current_index = index;
                progress.current_section_title = section_title.clone();
            }

            match self
                .generate_and_persist(tree, chapter_id, section_id, section_title, settings)
                .await
            {
                Ok(()) => outcome.written += 1,
                Err(err) if err.is_quota_exceeded() => {
                    self.notices.error(
                        "Generation quota exceeded; the remaining sections were not written.",
                    );
                    outcome.aborted_for_quota = true;
                    tracing::warn!(chapter_id, index, "batch aborted on quota");
                    break;
                }
                Err(err) => {
                    self.notices.warning(format!(
                        "Skipped \"{section_title}\": {err}"
                    ));
                    tracing::warn!(%section_id, error = %err, "section skipped");
                    outcome.skipped += 1;
                }
            }

            if index + 1 < targets.len() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        tracing::info!(
            chapter_id,
            written = outcome.written,
            skipped = outcome.skipped,
            aborted = outcome.aborted_for_quota,
            "batch write finished"
        );
        Ok(outcome)
    }

    /// Single-section write action: same generation and persistence path as
    /// the batch loop, without confirmation or pacing.
    pub async fn write_section(
        &self,
        tree: &mut DocumentTree,
        section_id: &str,
        settings: &GenerationSettings,
    ) -> anyhow::Result<()> {
        let chapter = tree
            .chapter_of_section(section_id)
            .with_context(|| format!("section not found: {section_id}"))?;
        let chapter_id = chapter.id.clone();
        let section_title = tree
            .section(section_id)
            .map(|s| s.title.clone())
            .with_context(|| format!("section not found: {section_id}"))?;

        self.generate_and_persist(tree, &chapter_id, section_id, &section_title, settings)
            .await
            .map_err(|err| match err {
                GenerateError::QuotaExceeded => {
                    self.notices
                        .error("Generation quota exceeded; the section was not written.");
                    anyhow::anyhow!("generation quota exceeded")
                }
                GenerateError::Other(err) => err.context("generate section"),
            })
    }

    async fn generate_and_persist(
        &self,
        tree: &mut DocumentTree,
        chapter_id: &str,
        section_id: &str,
        section_title: &str,
        settings: &GenerationSettings,
    ) -> Result<(), GenerateError> {
        let book = tree.book();
        let chapter_title = tree
            .chapter(chapter_id)
            .map(|c| c.title.clone())
            .unwrap_or_default();
        let prompt = SectionPrompt {
            book_id: book.id.clone(),
            book_title: book.title.clone(),
            book_subtitle: book.subtitle.clone(),
            chapter_title,
            section_title: section_title.to_owned(),
            audience_profile: settings.audience_profile.clone(),
            style: settings.style.clone(),
            instruction: settings.instruction.clone(),
        };

        let content = self.generator.generate_section(&prompt).await?;
        if content.trim().is_empty() {
            return Err(GenerateError::Other(anyhow::anyhow!(
                "generator returned empty content"
            )));
        }

        // Same path as a manual save, then mirror into the in-memory tree.
        self.store
            .save_section_content(section_id, &content)
            .await
            .context("persist generated content")
            .map_err(GenerateError::Other)?;
        tree.set_section_content(section_id, &content);
        Ok(())
    }
}
