use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::notify::{ConfirmPrompt, NotificationQueue};
use crate::store::{ContentStore, MoveDirection};
use crate::tree::DocumentTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StructureOp {
    AddChapter,
    AddSection,
    RenameChapter,
    RenameSection,
    DeleteChapter,
    DeleteSection,
    MoveChapter,
    MoveSection,
}

/// Applies structural mutations: remote call first, local tree update only
/// after the store confirms. Store failures surface as transient error
/// notices and leave local state untouched; there is no automatic undo
/// beyond a full re-fetch by the host.
pub struct StructureMutator {
    store: Arc<dyn ContentStore>,
    confirm: Arc<dyn ConfirmPrompt>,
    notices: Arc<NotificationQueue>,
    in_flight: Arc<Mutex<HashSet<StructureOp>>>,
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<StructureOp>>>,
    op: StructureOp,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().expect("in-flight set poisoned").remove(&self.op);
    }
}

impl StructureMutator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        confirm: Arc<dyn ConfirmPrompt>,
        notices: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            store,
            confirm,
            notices,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Rejects re-entrant double submission of the same operation kind.
    fn begin(&self, op: StructureOp) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().expect("in-flight set poisoned");
        if !set.insert(op) {
            tracing::debug!(?op, "operation already in flight");
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            op,
        })
    }

    fn surface_failure(&self, what: &str, err: anyhow::Error) {
        tracing::warn!(what, error = %format!("{err:#}"), "structure mutation failed");
        self.notices.error(format!("{what} failed: {err:#}"));
    }

    /// Appends a chapter. An empty trimmed title cancels silently.
    pub async fn add_chapter(&self, tree: &mut DocumentTree, title: &str) -> Option<String> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        let _guard = self.begin(StructureOp::AddChapter)?;

        match self.store.create_chapter(tree.book_id(), title).await {
            Ok(chapter_id) => {
                tree.push_chapter(chapter_id.clone(), title.to_owned());
                tracing::info!(%chapter_id, title, "chapter added");
                Some(chapter_id)
            }
            Err(err) => {
                self.surface_failure("add chapter", err);
                None
            }
        }
    }

    /// Appends a section and makes it the active selection.
    pub async fn add_section(
        &self,
        tree: &mut DocumentTree,
        chapter_id: &str,
        title: &str,
    ) -> Option<String> {
        let title = title.trim();
        if title.is_empty() {
            return None;
        }
        let _guard = self.begin(StructureOp::AddSection)?;

        match self.store.create_section(chapter_id, title).await {
            Ok(section_id) => {
                tree.push_section(chapter_id, section_id.clone(), title.to_owned());
                tree.set_active_section(Some(section_id.clone()));
                tracing::info!(%section_id, chapter_id, title, "section added");
                Some(section_id)
            }
            Err(err) => {
                self.surface_failure("add section", err);
                None
            }
        }
    }

    /// No-op when the trimmed new title equals the current one.
    pub async fn rename_chapter(&self, tree: &mut DocumentTree, chapter_id: &str, new_title: &str) {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return;
        }
        if tree.chapter(chapter_id).map(|c| c.title.as_str()) == Some(new_title) {
            return;
        }
        let Some(_guard) = self.begin(StructureOp::RenameChapter) else {
            return;
        };

        match self.store.rename_chapter(chapter_id, new_title).await {
            Ok(()) => {
                tree.rename_chapter(chapter_id, new_title.to_owned());
            }
            Err(err) => self.surface_failure("rename chapter", err),
        }
    }

    pub async fn rename_section(&self, tree: &mut DocumentTree, section_id: &str, new_title: &str) {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return;
        }
        if tree.section(section_id).map(|s| s.title.as_str()) == Some(new_title) {
            return;
        }
        let Some(_guard) = self.begin(StructureOp::RenameSection) else {
            return;
        };

        match self.store.rename_section(section_id, new_title).await {
            Ok(()) => {
                tree.rename_section(section_id, new_title.to_owned());
            }
            Err(err) => self.surface_failure("rename section", err),
        }
    }

    /// Confirms, deletes remotely (cascading), then removes the chapter
    /// locally; selection falls back per the tree rules.
    pub async fn delete_chapter(&self, tree: &mut DocumentTree, chapter_id: &str) {
        let Some(chapter) = tree.chapter(chapter_id) else {
            return;
        };
        let prompt = format!("Delete chapter \"{}\" and all of its sections?", chapter.title);
        if !self.confirm.confirm("Delete chapter", &prompt).await {
            return;
        }
        let Some(_guard) = self.begin(StructureOp::DeleteChapter) else {
            return;
        };

        match self.store.delete_chapter(chapter_id, tree.book_id()).await {
            Ok(()) => {
                tree.remove_chapter(chapter_id);
                tracing::info!(chapter_id, "chapter deleted");
            }
            Err(err) => self.surface_failure("delete chapter", err),
        }
    }

    pub async fn delete_section(&self, tree: &mut DocumentTree, section_id: &str, chapter_id: &str) {
        let Some(section) = tree.section(section_id) else {
            return;
        };
        let prompt = format!("Delete section \"{}\"?", section.title);
        if !self.confirm.confirm("Delete section", &prompt).await {
            return;
        }
        let Some(_guard) = self.begin(StructureOp::DeleteSection) else {
            return;
        };

        match self.store.delete_section(section_id, chapter_id).await {
            Ok(()) => {
                tree.remove_section(chapter_id, section_id);
                tracing::info!(section_id, chapter_id, "section deleted");
            }
            Err(err) => self.surface_failure("delete section", err),
        }
    }

    /// Swaps with the adjacent chapter. At the boundary this is an
    /// informational no-op, not an error, and no store call is made.
    pub async fn move_chapter(&self, tree: &mut DocumentTree, chapter_id: &str, direction: MoveDirection) {
        match tree.move_is_boundary(chapter_id, None, direction) {
            None => return,
            Some(true) => {
                self.notices.info(boundary_notice(direction, "chapter"));
                return;
            }
            Some(false) => {}
        }
        let Some(_guard) = self.begin(StructureOp::MoveChapter) else {
            return;
        };

        match self
            .store
            .move_chapter(chapter_id, tree.book_id(), direction)
            .await
        {
            Ok(()) => {
                tree.move_chapter(chapter_id, direction);
            }
            Err(err) => self.surface_failure("move chapter", err),
        }
    }

    pub async fn move_section(
        &self,
        tree: &mut DocumentTree,
        section_id: &str,
        chapter_id: &str,
        direction: MoveDirection,
    ) {
        match tree.move_is_boundary(chapter_id, Some(section_id), direction) {
            None => return,
            Some(true) => {
                self.notices.info(boundary_notice(direction, "section"));
                return;
            }
            Some(false) => {}
        }
        let Some(_guard) = self.begin(StructureOp::MoveSection) else {
            return;
        };

        match self
            .store
            .move_section(section_id, chapter_id, direction)
            .await
        {
            Ok(()) => {
                tree.move_section(chapter_id, section_id, direction);
            }
            Err(err) => self.surface_failure("move section", err),
        }
    }
}

fn boundary_notice(direction: MoveDirection, what: &str) -> String {
    match direction {
        MoveDirection::Up => format!("This {what} is already first."),
        MoveDirection::Down => format!("This {what} is already last."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Book, BookStatus};
    use crate::notify::NoticeKind;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct Always(bool);

    #[async_trait]
    impl ConfirmPrompt for Always {
        async fn confirm(&self, _title: &str, _message: &str) -> bool {
            self.0
        }
    }

    fn fixture(confirm: bool) -> (Arc<MemoryStore>, StructureMutator, DocumentTree, Arc<NotificationQueue>) {
        let store = Arc::new(MemoryStore::new());
        let book = Book {
            id: "b1".to_owned(),
            title: "Book".to_owned(),
            subtitle: None,
            status: BookStatus::Draft,
            chapters: Vec::new(),
        };
        store.insert_book(book.clone());
        let notices = Arc::new(NotificationQueue::default());
        let mutator = StructureMutator::new(
            Arc::clone(&store) as Arc<dyn ContentStore>,
            Arc::new(Always(confirm)),
            Arc::clone(&notices),
        );
        (store, mutator, DocumentTree::new(book), notices)
    }

    #[tokio::test]
    async fn empty_title_cancels_silently() {
        let (_store, mutator, mut tree, notices) = fixture(true);
        assert!(mutator.add_chapter(&mut tree, "   ").await.is_none());
        assert!(tree.book().chapters.is_empty());
        assert!(notices.active().is_empty());
    }

    #[tokio::test]
    async fn add_section_selects_it() {
        let (_store, mutator, mut tree, _notices) = fixture(true);
        let ch = mutator.add_chapter(&mut tree, "Intro").await.unwrap();
        let sec = mutator.add_section(&mut tree, &ch, "A").await.unwrap();
        assert_eq!(tree.active_section_id(), Some(sec.as_str()));
        assert!(tree.order_indexes_are_dense());
    }

    #[tokio::test]
    async fn rename_to_same_title_is_a_noop() {
        let (store, mutator, mut tree, _notices) = fixture(true);
        let ch = mutator.add_chapter(&mut tree, "Intro").await.unwrap();

        mutator.rename_chapter(&mut tree, &ch, "  Intro ").await;
        assert_eq!(store.book("b1").unwrap().chapters[0].title, "Intro");

        mutator.rename_chapter(&mut tree, &ch, "Opening").await;
        assert_eq!(tree.chapter(&ch).unwrap().title, "Opening");
        assert_eq!(store.book("b1").unwrap().chapters[0].title, "Opening");
    }

    #[tokio::test]
    async fn declined_confirmation_leaves_chapter_in_place() {
        let (store, mutator, mut tree, _notices) = fixture(false);
        // Deletion prompts are declined; creation does not prompt.
        let ch = mutator.add_chapter(&mut tree, "Keep me").await.unwrap();
        mutator.delete_chapter(&mut tree, &ch).await;
        assert_eq!(tree.book().chapters.len(), 1);
        assert_eq!(store.book("b1").unwrap().chapters.len(), 1);
    }

    #[tokio::test]
    async fn boundary_move_notices_without_store_call() {
        let (store, mutator, mut tree, notices) = fixture(true);
        let ch = mutator.add_chapter(&mut tree, "Only").await.unwrap();

        mutator.move_chapter(&mut tree, &ch, MoveDirection::Up).await;
        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, NoticeKind::Info);
        assert_eq!(store.book("b1").unwrap().chapters[0].order_index, 0);
    }

    #[tokio::test]
    async fn store_failure_keeps_local_state_unchanged() {
        let (_store, mutator, mut tree, notices) = fixture(true);
        // Renaming a chapter the store has never seen fails remotely.
        tree.push_chapter("ghost".to_owned(), "Ghost".to_owned());

        mutator.rename_chapter(&mut tree, "ghost", "Haunted").await;
        assert_eq!(tree.chapter("ghost").unwrap().title, "Ghost");
        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, NoticeKind::Error);
    }
}
