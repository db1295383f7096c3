use std::sync::Mutex;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{Book, Buffer, BufferKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Partial update for a buffer. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct BufferPatch {
    pub content: Option<String>,
    pub label: Option<String>,
}

impl BufferPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            label: None,
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            content: None,
            label: Some(label.into()),
        }
    }
}

/// Persistence collaborator for book structure and content. Implementations
/// must return only after the mutation is durably applied or failed; callers
/// treat the outcome as fully resolved and never assume partial success.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create_chapter(&self, book_id: &str, title: &str) -> anyhow::Result<String>;
    async fn create_section(&self, chapter_id: &str, title: &str) -> anyhow::Result<String>;
    async fn rename_chapter(&self, chapter_id: &str, title: &str) -> anyhow::Result<()>;
    async fn rename_section(&self, section_id: &str, title: &str) -> anyhow::Result<()>;
    /// Cascades: all sections of the chapter and their buffers go with it.
    async fn delete_chapter(&self, chapter_id: &str, book_id: &str) -> anyhow::Result<()>;
    async fn delete_section(&self, section_id: &str, chapter_id: &str) -> anyhow::Result<()>;
    async fn move_chapter(
        &self,
        chapter_id: &str,
        book_id: &str,
        direction: MoveDirection,
    ) -> anyhow::Result<()>;
    async fn move_section(
        &self,
        section_id: &str,
        chapter_id: &str,
        direction: MoveDirection,
    ) -> anyhow::Result<()>;
    async fn save_section_content(&self, section_id: &str, content: &str) -> anyhow::Result<()>;

    async fn list_buffers(&self, section_id: &str) -> anyhow::Result<Vec<Buffer>>;
    async fn create_buffer(
        &self,
        section_id: &str,
        book_id: &str,
        label: &str,
        content: &str,
        kind: BufferKind,
    ) -> anyhow::Result<Buffer>;
    async fn update_buffer(&self, buffer_id: &str, patch: BufferPatch) -> anyhow::Result<()>;
    async fn delete_buffer(&self, buffer_id: &str) -> anyhow::Result<()>;
}

/// In-process store over plain mutex-guarded state. Backs tests and local
/// embedding; mirrors the ordering and cascade rules a remote document store
/// is expected to enforce.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    books: Vec<Book>,
    buffers: Vec<Buffer>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_book(&self, book: Book) {
        self.state.lock().expect("memory store poisoned").books.push(book);
    }

    /// Current persisted view of a book, if present.
    pub fn book(&self, book_id: &str) -> Option<Book> {
        self.state
            .lock()
            .expect("memory store poisoned")
            .books
            .iter()
            .find(|b| b.id == book_id)
            .cloned()
    }

    pub fn buffers_for_section(&self, section_id: &str) -> Vec<Buffer> {
        self.state
            .lock()
            .expect("memory store poisoned")
            .buffers
            .iter()
            .filter(|b| b.section_id == section_id)
            .cloned()
            .collect()
    }

    fn mint_id(prefix: &str) -> String {
        format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
    }
}

fn reindex_chapters(book: &mut Book) {
    for (idx, chapter) in book.chapters.iter_mut().enumerate() {
        chapter.order_index = idx;
    }
}

fn reindex_sections(chapter: &mut crate::model::Chapter) {
    for (idx, section) in chapter.sections.iter_mut().enumerate() {
        section.order_index = idx;
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_chapter(&self, book_id: &str, title: &str) -> anyhow::Result<String> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let book = state
            .books
            .iter_mut()
            .find(|b| b.id == book_id)
            .with_context(|| format!("book not found: {book_id}"))?;
        let id = Self::mint_id("ch");
        let order_index = book.chapters.len();
        book.chapters.push(crate::model::Chapter {
            id: id.clone(),
            title: title.to_owned(),
            summary: None,
            order_index,
            sections: Vec::new(),
        });
        Ok(id)
    }

    async fn create_section(&self, chapter_id: &str, title: &str) -> anyhow::Result<String> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let chapter = state
            .books
            .iter_mut()
            .flat_map(|b| b.chapters.iter_mut())
            .find(|c| c.id == chapter_id)
            .with_context(|| format!("chapter not found: {chapter_id}"))?;
        let id = Self::mint_id("sec");
        let order_index = chapter.sections.len();
        chapter.sections.push(crate::model::Section {
            id: id.clone(),
            title: title.to_owned(),
            order_index,
            content: String::new(),
        });
        Ok(id)
    }

    async fn rename_chapter(&self, chapter_id: &str, title: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let chapter = state
            .books
            .iter_mut()
            .flat_map(|b| b.chapters.iter_mut())
            .find(|c| c.id == chapter_id)
            .with_context(|| format!("chapter not found: {chapter_id}"))?;
        chapter.title = title.to_owned();
        Ok(())
    }

    async fn rename_section(&self, section_id: &str, title: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let section = state
            .books
            .iter_mut()
            .flat_map(|b| b.chapters.iter_mut())
            .flat_map(|c| c.sections.iter_mut())
            .find(|s| s.id == section_id)
            .with_context(|| format!("section not found: {section_id}"))?;
        section.title = title.to_owned();
        Ok(())
    }

    async fn delete_chapter(&self, chapter_id: &str, book_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");

        let section_ids: Vec<String> = state
            .books
            .iter()
            .filter(|b| b.id == book_id)
            .flat_map(|b| b.chapters.iter())
            .filter(|c| c.id == chapter_id)
            .flat_map(|c| c.sections.iter().map(|s| s.id.clone()))
            .collect();
        state
            .buffers
            .retain(|buf| !section_ids.contains(&buf.section_id));

        let book = state
            .books
            .iter_mut()
            .find(|b| b.id == book_id)
            .with_context(|| format!("book not found: {book_id}"))?;
        let before = book.chapters.len();
        book.chapters.retain(|c| c.id != chapter_id);
        if book.chapters.len() == before {
            anyhow::bail!("chapter not found: {chapter_id}");
        }
        reindex_chapters(book);
        Ok(())
    }

    async fn delete_section(&self, section_id: &str, chapter_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        state.buffers.retain(|buf| buf.section_id != section_id);

        let chapter = state
            .books
            .iter_mut()
            .flat_map(|b| b.chapters.iter_mut())
            .find(|c| c.id == chapter_id)
            .with_context(|| format!("chapter not found: {chapter_id}"))?;
        let before = chapter.sections.len();
        chapter.sections.retain(|s| s.id != section_id);
        if chapter.sections.len() == before {
            anyhow::bail!("section not found: {section_id}");
        }
        reindex_sections(chapter);
        Ok(())
    }

    async fn move_chapter(
        &self,
        chapter_id: &str,
        book_id: &str,
        direction: MoveDirection,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let book = state
            .books
            .iter_mut()
            .find(|b| b.id == book_id)
            .with_context(|| format!("book not found: {book_id}"))?;
        let idx = book
            .chapters
            .iter()
            .position(|c| c.id == chapter_id)
            .with_context(|| format!("chapter not found: {chapter_id}"))?;
        let target = match direction {
            MoveDirection::Up => idx.checked_sub(1),
            MoveDirection::Down => (idx + 1 < book.chapters.len()).then_some(idx + 1),
        };
        let Some(target) = target else {
            anyhow::bail!("chapter already at boundary: {chapter_id}");
        };
        book.chapters.swap(idx, target);
        book.chapters[idx].order_index = idx;
        book.chapters[target].order_index = target;
        Ok(())
    }

    async fn move_section(
        &self,
        section_id: &str,
        chapter_id: &str,
        direction: MoveDirection,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let chapter = state
            .books
            .iter_mut()
            .flat_map(|b| b.chapters.iter_mut())
            .find(|c| c.id == chapter_id)
            .with_context(|| format!("chapter not found: {chapter_id}"))?;
        let idx = chapter
            .sections
            .iter()
            .position(|s| s.id == section_id)
            .with_context(|| format!("section not found: {section_id}"))?;
        let target = match direction {
            MoveDirection::Up => idx.checked_sub(1),
            MoveDirection::Down => (idx + 1 < chapter.sections.len()).then_some(idx + 1),
        };
        let Some(target) = target else {
            anyhow::bail!("section already at boundary: {section_id}");
        };
        chapter.sections.swap(idx, target);
        chapter.sections[idx].order_index = idx;
        chapter.sections[target].order_index = target;
        Ok(())
    }

    async fn save_section_content(&self, section_id: &str, content: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let section = state
            .books
            .iter_mut()
            .flat_map(|b| b.chapters.iter_mut())
            .flat_map(|c| c.sections.iter_mut())
            .find(|s| s.id == section_id)
            .with_context(|| format!("section not found: {section_id}"))?;
        section.content = content.to_owned();
        Ok(())
    }

    async fn list_buffers(&self, section_id: &str) -> anyhow::Result<Vec<Buffer>> {
        Ok(self.buffers_for_section(section_id))
    }

    async fn create_buffer(
        &self,
        section_id: &str,
        book_id: &str,
        label: &str,
        content: &str,
        kind: BufferKind,
    ) -> anyhow::Result<Buffer> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let order_index = state
            .buffers
            .iter()
            .filter(|b| b.section_id == section_id)
            .count();
        let buffer = Buffer {
            id: Self::mint_id("buf"),
            section_id: section_id.to_owned(),
            book_id: book_id.to_owned(),
            label: label.to_owned(),
            content: content.to_owned(),
            kind,
            order_index,
        };
        state.buffers.push(buffer.clone());
        Ok(buffer)
    }

    async fn update_buffer(&self, buffer_id: &str, patch: BufferPatch) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let buffer = state
            .buffers
            .iter_mut()
            .find(|b| b.id == buffer_id)
            .with_context(|| format!("buffer not found: {buffer_id}"))?;
        if let Some(content) = patch.content {
            buffer.content = content;
        }
        if let Some(label) = patch.label {
            buffer.label = label;
        }
        Ok(())
    }

    async fn delete_buffer(&self, buffer_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        let before = state.buffers.len();
        state.buffers.retain(|b| b.id != buffer_id);
        if state.buffers.len() == before {
            anyhow::bail!("buffer not found: {buffer_id}");
        }
        Ok(())
    }
}
