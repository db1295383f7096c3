#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use bookwright::generate::{GenerateError, RewriteRequest, SectionPrompt, TextGenerator};
use bookwright::model::{Book, BookStatus};
use bookwright::notify::ConfirmPrompt;
use bookwright::rewrite::{RewriteBackend, RewriteClone, SectionRewrite};
use bookwright::store::{ContentStore, MemoryStore};
use bookwright::tree::DocumentTree;

pub fn empty_book(id: &str) -> Book {
    Book {
        id: id.to_owned(),
        title: "Test Book".to_owned(),
        subtitle: None,
        status: BookStatus::Draft,
        chapters: Vec::new(),
    }
}

/// Store + tree seeded with one chapter and the given section titles.
/// Returns (store, tree, chapter_id, section_ids).
pub async fn seeded_workspace(
    section_titles: &[&str],
) -> (Arc<MemoryStore>, DocumentTree, String, Vec<String>) {
    let store = Arc::new(MemoryStore::new());
    store.insert_book(empty_book("b1"));
    let chapter_id = store.create_chapter("b1", "Chapter One").await.unwrap();
    let mut section_ids = Vec::new();
    for title in section_titles {
        section_ids.push(store.create_section(&chapter_id, title).await.unwrap());
    }
    let tree = DocumentTree::new(store.book("b1").unwrap());
    (store, tree, chapter_id, section_ids)
}

pub struct AlwaysConfirm(pub bool);

#[async_trait]
impl ConfirmPrompt for AlwaysConfirm {
    async fn confirm(&self, _title: &str, _message: &str) -> bool {
        self.0
    }
}

/// Records prompts and answers from a script; an exhausted script keeps
/// answering with the fallback.
pub enum ScriptedReply {
    Content(String),
    Quota,
    Fail(String),
}

pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_titles(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next(&self) -> Result<String, GenerateError> {
        match self.replies.lock().unwrap().pop_front() {
            Some(ScriptedReply::Content(content)) => Ok(content),
            Some(ScriptedReply::Quota) => Err(GenerateError::QuotaExceeded),
            Some(ScriptedReply::Fail(message)) => {
                Err(GenerateError::Other(anyhow::anyhow!(message)))
            }
            None => Ok("generated".to_owned()),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_section(&self, prompt: &SectionPrompt) -> Result<String, GenerateError> {
        self.prompts
            .lock()
            .unwrap()
            .push(prompt.section_title.clone());
        self.next()
    }

    async fn rewrite_text(&self, request: &RewriteRequest) -> Result<String, GenerateError> {
        self.prompts.lock().unwrap().push(request.text.clone());
        self.next()
    }
}

/// Rewrite backend over two MemoryStores: the clone is materialized as a
/// second book, and rewrites persist only onto the clone.
pub struct ScriptedRewriteBackend {
    pub store: Arc<MemoryStore>,
    pub generator: ScriptedGenerator,
    pub rewritten: Mutex<Vec<String>>,
}

impl ScriptedRewriteBackend {
    pub fn new(store: Arc<MemoryStore>, replies: Vec<ScriptedReply>) -> Self {
        Self {
            store,
            generator: ScriptedGenerator::new(replies),
            rewritten: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RewriteBackend for ScriptedRewriteBackend {
    async fn clone_book_for_rewrite(
        &self,
        book_id: &str,
        _target_style: &str,
    ) -> anyhow::Result<RewriteClone> {
        let original = self
            .store
            .book(book_id)
            .ok_or_else(|| anyhow::anyhow!("book not found: {book_id}"))?;

        let new_book_id = format!("{book_id}_styled");
        let mut clone = original.clone();
        clone.id = new_book_id.clone();
        for chapter in &mut clone.chapters {
            chapter.id = format!("{}_styled", chapter.id);
            for section in &mut chapter.sections {
                section.id = format!("{}_styled", section.id);
            }
        }
        self.store.insert_book(clone);

        let sections = original
            .chapters
            .iter()
            .flat_map(|c| {
                c.sections.iter().map(|s| bookwright::rewrite::RewriteSource {
                    section_id: format!("{}_styled", s.id),
                    title: s.title.clone(),
                    chapter_title: c.title.clone(),
                    original_content: s.content.clone(),
                })
            })
            .collect();

        Ok(RewriteClone {
            new_book_id,
            sections,
        })
    }

    async fn rewrite_section(&self, request: &SectionRewrite) -> Result<String, GenerateError> {
        let content = self
            .generator
            .rewrite_text(&RewriteRequest {
                text: request.original_content.clone(),
                style: request.style.clone(),
                instruction: None,
            })
            .await?;
        self.store
            .save_section_content(&request.section_id, &content)
            .await
            .map_err(GenerateError::Other)?;
        self.rewritten.lock().unwrap().push(request.section_id.clone());
        Ok(content)
    }
}

/// ContentStore decorator that fails named operations and counts
/// content saves.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_ops: Mutex<Vec<&'static str>>,
    pub section_saves: Mutex<Vec<(String, String)>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_ops: Mutex::new(Vec::new()),
            section_saves: Mutex::new(Vec::new()),
        }
    }

    pub fn fail(&self, op: &'static str) {
        self.fail_ops.lock().unwrap().push(op);
    }

    pub fn clear_failures(&self) {
        self.fail_ops.lock().unwrap().clear();
    }

    pub fn save_count(&self) -> usize {
        self.section_saves.lock().unwrap().len()
    }

    fn check(&self, op: &str) -> anyhow::Result<()> {
        if self.fail_ops.lock().unwrap().contains(&op) {
            anyhow::bail!("injected failure: {op}");
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn create_chapter(&self, book_id: &str, title: &str) -> anyhow::Result<String> {
        self.check("create_chapter")?;
        self.inner.create_chapter(book_id, title).await
    }

    async fn create_section(&self, chapter_id: &str, title: &str) -> anyhow::Result<String> {
        self.check("create_section")?;
        self.inner.create_section(chapter_id, title).await
    }

    async fn rename_chapter(&self, chapter_id: &str, title: &str) -> anyhow::Result<()> {
        self.check("rename_chapter")?;
        self.inner.rename_chapter(chapter_id, title).await
    }

    async fn rename_section(&self, section_id: &str, title: &str) -> anyhow::Result<()> {
        self.check("rename_section")?;
        self.inner.rename_section(section_id, title).await
    }

    async fn delete_chapter(&self, chapter_id: &str, book_id: &str) -> anyhow::Result<()> {
        self.check("delete_chapter")?;
        self.inner.delete_chapter(chapter_id, book_id).await
    }

    async fn delete_section(&self, section_id: &str, chapter_id: &str) -> anyhow::Result<()> {
        self.check("delete_section")?;
        self.inner.delete_section(section_id, chapter_id).await
    }

    async fn move_chapter(
        &self,
        chapter_id: &str,
        book_id: &str,
        direction: bookwright::store::MoveDirection,
    ) -> anyhow::Result<()> {
        self.check("move_chapter")?;
        self.inner.move_chapter(chapter_id, book_id, direction).await
    }

    async fn move_section(
        &self,
        section_id: &str,
        chapter_id: &str,
        direction: bookwright::store::MoveDirection,
    ) -> anyhow::Result<()> {
        self.check("move_section")?;
        self.inner.move_section(section_id, chapter_id, direction).await
    }

    async fn save_section_content(&self, section_id: &str, content: &str) -> anyhow::Result<()> {
        self.check("save_section_content")?;
        self.section_saves
            .lock()
            .unwrap()
            .push((section_id.to_owned(), content.to_owned()));
        self.inner.save_section_content(section_id, content).await
    }

    async fn list_buffers(
        &self,
        section_id: &str,
    ) -> anyhow::Result<Vec<bookwright::model::Buffer>> {
        self.check("list_buffers")?;
        self.inner.list_buffers(section_id).await
    }

    async fn create_buffer(
        &self,
        section_id: &str,
        book_id: &str,
        label: &str,
        content: &str,
        kind: bookwright::model::BufferKind,
    ) -> anyhow::Result<bookwright::model::Buffer> {
        self.check("create_buffer")?;
        self.inner
            .create_buffer(section_id, book_id, label, content, kind)
            .await
    }

    async fn update_buffer(
        &self,
        buffer_id: &str,
        patch: bookwright::store::BufferPatch,
    ) -> anyhow::Result<()> {
        self.check("update_buffer")?;
        self.inner.update_buffer(buffer_id, patch).await
    }

    async fn delete_buffer(&self, buffer_id: &str) -> anyhow::Result<()> {
        self.check("delete_buffer")?;
        self.inner.delete_buffer(buffer_id).await
    }
}
