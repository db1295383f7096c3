use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;

use crate::autosave::{AutosavePipeline, SaveTarget};
use crate::model::{Buffer, BufferKind};
use crate::notify::NotificationQueue;
use crate::store::{BufferPatch, ContentStore};
use crate::tree::DocumentTree;

/// Which buffer the editor is showing. Main is the section's own content
/// field; drafts are `Buffer` records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveBuffer {
    Main,
    Draft(String),
}

/// Per-section drafting buffers: the implicit Main plus named draft/memo
/// buffers. Seeds the two defaults on first access to a bufferless section,
/// never in read-only mode and at most once per section.
pub struct BufferManager {
    store: Arc<dyn ContentStore>,
    notices: Arc<NotificationQueue>,
    read_only: bool,
    section_id: Option<String>,
    book_id: Option<String>,
    buffers: Vec<Buffer>,
    active: ActiveBuffer,
    seeded: HashSet<String>,
    add_in_flight: bool,
}

impl BufferManager {
    pub fn new(store: Arc<dyn ContentStore>, notices: Arc<NotificationQueue>) -> Self {
        Self::with_read_only(store, notices, false)
    }

    pub fn with_read_only(
        store: Arc<dyn ContentStore>,
        notices: Arc<NotificationQueue>,
        read_only: bool,
    ) -> Self {
        Self {
            store,
            notices,
            read_only,
            section_id: None,
            book_id: None,
            buffers: Vec::new(),
            active: ActiveBuffer::Main,
            seeded: HashSet::new(),
            add_in_flight: false,
        }
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    pub fn active(&self) -> &ActiveBuffer {
        &self.active
    }

    pub fn section_id(&self) -> Option<&str> {
        self.section_id.as_deref()
    }

    fn active_target(&self) -> Option<SaveTarget> {
        let section_id = self.section_id.as_deref()?;
        Some(match &self.active {
            ActiveBuffer::Main => SaveTarget::main(section_id),
            ActiveBuffer::Draft(buffer_id) => SaveTarget::draft(buffer_id.clone()),
        })
    }

    fn active_content(&self, tree: &DocumentTree) -> Option<String> {
        match &self.active {
            ActiveBuffer::Main => {
                let section_id = self.section_id.as_deref()?;
                tree.section(section_id).map(|s| s.content.clone())
            }
            ActiveBuffer::Draft(buffer_id) => self
                .buffers
                .iter()
                .find(|b| &b.id == buffer_id)
                .map(|b| b.content.clone()),
        }
    }

    /// Flushes whatever is being edited so switching away never loses a
    /// pending debounced save.
    async fn flush_active(&self, tree: &DocumentTree, autosave: &AutosavePipeline) {
        let (Some(target), Some(content)) = (self.active_target(), self.active_content(tree))
        else {
            return;
        };
        if let Err(err) = autosave.flush(target, &content).await {
            self.notices
                .error(format!("save before switching failed: {err:#}"));
        }
    }

    /// Makes a section the active selection: flushes the buffer being left,
    /// loads (and if needed seeds) the section's buffers, and resets the
    /// active tab to Main.
    pub async fn open_section(
        &mut self,
        tree: &mut DocumentTree,
        autosave: &AutosavePipeline,
        section_id: &str,
    ) -> anyhow::Result<()> {
        self.flush_active(tree, autosave).await;

        let section = tree
            .section(section_id)
            .with_context(|| format!("section not found: {section_id}"))?;
        autosave.prime(SaveTarget::main(section_id), &section.content);

        self.section_id = Some(section_id.to_owned());
        self.book_id = Some(tree.book_id().to_owned());
        self.active = ActiveBuffer::Main;
        tree.set_active_section(Some(section_id.to_owned()));

        self.buffers = self.load_buffers(tree.book_id(), section_id).await?;
        for buffer in &self.buffers {
            autosave.prime(SaveTarget::draft(buffer.id.clone()), &buffer.content);
        }
        Ok(())
    }

    /// Fetches the section's buffers; an empty result set for a writable
    /// section is seeded with the two defaults before returning, so callers
    /// never observe a transient zero-buffer state.
    async fn load_buffers(&mut self, book_id: &str, section_id: &str) -> anyhow::Result<Vec<Buffer>> {
        let buffers = self
            .store
            .list_buffers(section_id)
            .await
            .context("list buffers")?;
        if !buffers.is_empty() || self.read_only || self.seeded.contains(section_id) {
            return Ok(buffers);
        }

        tracing::info!(section_id, "seeding default buffers");
        let draft = self
            .store
            .create_buffer(section_id, book_id, "Buffer 2", "", BufferKind::Draft)
            .await
            .context("seed default draft buffer")?;
        let memo = self
            .store
            .create_buffer(section_id, book_id, "Memo", "", BufferKind::Memo)
            .await
            .context("seed default memo buffer")?;
        // Marked seeded only once both defaults exist; a failed seeding
        // attempt is retried on the next open.
        self.seeded.insert(section_id.to_owned());
        Ok(vec![draft, memo])
    }

    fn next_label(&self, kind: BufferKind) -> String {
        let existing = self.buffers.iter().filter(|b| b.kind == kind).count();
        match kind {
            // "Buffer 1" is conceptually the Main tab.
            BufferKind::Draft => format!("Buffer {}", existing + 2),
            BufferKind::Memo => {
                if existing == 0 {
                    "Memo".to_owned()
                } else {
                    format!("Memo{}", existing + 1)
                }
            }
        }
    }

    /// Creates a buffer with an auto-derived label and makes it the active
    /// tab. Guarded against double submission while a request is in flight.
    pub async fn add_buffer(&mut self, kind: BufferKind) -> Option<&Buffer> {
        if self.add_in_flight {
            tracing::debug!("buffer creation already in flight");
            return None;
        }
        let (Some(section_id), Some(book_id)) = (self.section_id.clone(), self.book_id.clone())
        else {
            return None;
        };

        let label = self.next_label(kind);
        self.add_in_flight = true;
        let created = self
            .store
            .create_buffer(&section_id, &book_id, &label, "", kind)
            .await;
        self.add_in_flight = false;

        match created {
            Ok(buffer) => {
                self.active = ActiveBuffer::Draft(buffer.id.clone());
                self.buffers.push(buffer);
                self.buffers.last()
            }
            Err(err) => {
                self.notices.error(format!("add buffer failed: {err:#}"));
                None
            }
        }
    }

    /// Label change only; content is untouched.
    pub async fn rename_buffer(&mut self, buffer_id: &str, new_label: &str) {
        let new_label = new_label.trim();
        if new_label.is_empty() {
            return;
        }
        match self
            .store
            .update_buffer(buffer_id, BufferPatch::label(new_label))
            .await
        {
            Ok(()) => {
                if let Some(buffer) = self.buffers.iter_mut().find(|b| b.id == buffer_id) {
                    buffer.label = new_label.to_owned();
                }
            }
            Err(err) => self.notices.error(format!("rename buffer failed: {err:#}")),
        }
    }

    /// Removes a buffer; deleting the active tab falls back to Main.
    pub async fn delete_buffer(&mut self, buffer_id: &str) {
        match self.store.delete_buffer(buffer_id).await {
            Ok(()) => {
                self.buffers.retain(|b| b.id != buffer_id);
                if self.active == ActiveBuffer::Draft(buffer_id.to_owned()) {
                    self.active = ActiveBuffer::Main;
                }
            }
            Err(err) => self.notices.error(format!("delete buffer failed: {err:#}")),
        }
    }

    /// Switches the active tab, flushing the one being left first.
    pub async fn select_buffer(
        &mut self,
        tree: &DocumentTree,
        autosave: &AutosavePipeline,
        target: ActiveBuffer,
    ) {
        if self.active == target {
            return;
        }
        self.flush_active(tree, autosave).await;
        self.active = target;
    }

    /// Applies an edit to the in-memory copy of the active buffer and
    /// schedules a debounced autosave.
    pub fn edit_active(&mut self, tree: &mut DocumentTree, autosave: &AutosavePipeline, content: &str) {
        let Some(target) = self.active_target() else {
            return;
        };
        match &self.active {
            ActiveBuffer::Main => {
                if let Some(section_id) = self.section_id.as_deref() {
                    tree.set_section_content(section_id, content);
                }
            }
            ActiveBuffer::Draft(buffer_id) => {
                if let Some(buffer) = self.buffers.iter_mut().find(|b| &b.id == buffer_id) {
                    buffer.content = content.to_owned();
                }
            }
        }
        autosave.schedule(target, content);
    }

    /// "Use this draft as the real content": flushes pending edits, copies
    /// the buffer's content into the section's main content through the
    /// save path, and switches to Main. Adoption is a copy; the source
    /// buffer stays intact.
    pub async fn adopt_buffer(
        &mut self,
        tree: &mut DocumentTree,
        autosave: &AutosavePipeline,
        buffer_id: &str,
    ) -> anyhow::Result<()> {
        let section_id = self
            .section_id
            .clone()
            .context("no section is open")?;
        self.flush_active(tree, autosave).await;

        let content = self
            .buffers
            .iter()
            .find(|b| b.id == buffer_id)
            .map(|b| b.content.clone())
            .with_context(|| format!("buffer not found: {buffer_id}"))?;

        autosave
            .flush(SaveTarget::main(&section_id), &content)
            .await
            .context("adopt buffer into main")?;
        tree.set_section_content(&section_id, &content);
        self.active = ActiveBuffer::Main;
        tracing::info!(buffer_id, %section_id, "buffer adopted into main");
        Ok(())
    }
}
