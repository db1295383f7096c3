use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::store::{BufferPatch, ContentStore};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);
pub const SAVED_DISPLAY_WINDOW: Duration = Duration::from_millis(2000);

/// What a save writes to: a section's main content, or a named buffer.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum SaveTarget {
    Main { section_id: String },
    Draft { buffer_id: String },
}

impl SaveTarget {
    pub fn main(section_id: impl Into<String>) -> Self {
        SaveTarget::Main {
            section_id: section_id.into(),
        }
    }

    pub fn draft(buffer_id: impl Into<String>) -> Self {
        SaveTarget::Draft {
            buffer_id: buffer_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Default)]
struct TargetState {
    status: Option<SaveStatus>,
    saved_at: Option<Instant>,
    /// Last content the store confirmed. Saves of byte-identical content
    /// are skipped entirely.
    last_saved: Option<String>,
    /// Content waiting for the debounce to fire. Replaced by every new edit.
    pending: Option<String>,
    /// Bumped on every schedule/flush; a fired timer only acts if its
    /// generation is still current.
    generation: u64,
}

/// Debounced reconciliation of buffer edits with the persistence layer.
/// One independent timer per target; a failed save parks in `Error` until
/// the next edit or explicit flush retries with the latest content.
pub struct AutosavePipeline {
    store: Arc<dyn ContentStore>,
    debounce: Duration,
    saved_display: Duration,
    states: Arc<Mutex<HashMap<SaveTarget, TargetState>>>,
}

impl AutosavePipeline {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self::with_debounce(store, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(store: Arc<dyn ContentStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            saved_display: SAVED_DISPLAY_WINDOW,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seeds the last-confirmed-saved content for a freshly opened target so
    /// that flushing unedited content is a no-op.
    pub fn prime(&self, target: SaveTarget, content: &str) {
        let mut states = self.states.lock().expect("autosave state poisoned");
        let state = states.entry(target).or_default();
        if state.last_saved.is_none() {
            state.last_saved = Some(content.to_owned());
        }
    }

    /// Debounced trigger: replaces any pending save for this target and
    /// restarts the quiet period. The save that eventually fires persists
    /// the latest content, not a diff.
    pub fn schedule(&self, target: SaveTarget, content: &str) {
        let generation = {
            let mut states = self.states.lock().expect("autosave state poisoned");
            let state = states.entry(target.clone()).or_default();
            state.generation += 1;
            state.pending = Some(content.to_owned());
            state.generation
        };

        let store = Arc::clone(&self.store);
        let states = Arc::clone(&self.states);
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            fire_debounced(store, states, target, generation).await;
        });
    }

    /// Forced trigger: cancels any pending debounced save and persists
    /// `content` immediately, unless it matches the last confirmed save.
    pub async fn flush(&self, target: SaveTarget, content: &str) -> anyhow::Result<()> {
        {
            let mut states = self.states.lock().expect("autosave state poisoned");
            let state = states.entry(target.clone()).or_default();
            state.generation += 1;
            state.pending = None;
            if state.last_saved.as_deref() == Some(content) {
                return Ok(());
            }
            state.status = Some(SaveStatus::Saving);
        }

        let result = persist(&*self.store, &target, content).await;
        let mut states = self.states.lock().expect("autosave state poisoned");
        let state = states.entry(target.clone()).or_default();
        match &result {
            Ok(()) => {
                state.status = Some(SaveStatus::Saved);
                state.saved_at = Some(Instant::now());
                state.last_saved = Some(content.to_owned());
            }
            Err(err) => {
                tracing::warn!(?target, error = %format!("{err:#}"), "flush save failed");
                state.status = Some(SaveStatus::Error);
            }
        }
        result
    }

    /// Current state-machine position for a target. `Saved` decays to
    /// `Idle` after the display window.
    pub fn status(&self, target: &SaveTarget) -> SaveStatus {
        let states = self.states.lock().expect("autosave state poisoned");
        let Some(state) = states.get(target) else {
            return SaveStatus::Idle;
        };
        match state.status {
            Some(SaveStatus::Saved) => {
                let display_over = state
                    .saved_at
                    .is_none_or(|at| at.elapsed() >= self.saved_display);
                if display_over {
                    SaveStatus::Idle
                } else {
                    SaveStatus::Saved
                }
            }
            Some(status) => status,
            None => SaveStatus::Idle,
        }
    }

    pub fn last_saved(&self, target: &SaveTarget) -> Option<String> {
        let states = self.states.lock().expect("autosave state poisoned");
        states.get(target).and_then(|s| s.last_saved.clone())
    }
}

async fn fire_debounced(
    store: Arc<dyn ContentStore>,
    states: Arc<Mutex<HashMap<SaveTarget, TargetState>>>,
    target: SaveTarget,
    generation: u64,
) {
    let content = {
        let mut guard = states.lock().expect("autosave state poisoned");
        let Some(state) = guard.get_mut(&target) else {
            return;
        };
        if state.generation != generation {
            // A newer edit or a flush superseded this timer.
            return;
        }
        let Some(content) = state.pending.take() else {
            return;
        };
        if state.last_saved.as_deref() == Some(content.as_str()) {
            return;
        }
        state.status = Some(SaveStatus::Saving);
        content
    };

    let result = persist(&*store, &target, &content).await;
    let mut guard = states.lock().expect("autosave state poisoned");
    let Some(state) = guard.get_mut(&target) else {
        return;
    };
    match result {
        Ok(()) => {
            state.status = Some(SaveStatus::Saved);
            state.saved_at = Some(Instant::now());
            state.last_saved = Some(content);
        }
        Err(err) => {
            tracing::warn!(?target, error = %format!("{err:#}"), "autosave failed");
            state.status = Some(SaveStatus::Error);
        }
    }
}

async fn persist(
    store: &dyn ContentStore,
    target: &SaveTarget,
    content: &str,
) -> anyhow::Result<()> {
    match target {
        SaveTarget::Main { section_id } => store.save_section_content(section_id, content).await,
        SaveTarget::Draft { buffer_id } => {
            store
                .update_buffer(buffer_id, BufferPatch::content(content))
                .await
        }
    }
}
