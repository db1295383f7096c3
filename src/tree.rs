use crate::model::{Book, BookStatus, Chapter, Section};
use crate::store::MoveDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    AtBoundary,
}

/// In-memory Book → Chapters → Sections hierarchy plus the active-section
/// selection. Owns the ordering invariants: after any mutation,
/// `order_index` values are a contiguous 0-based permutation within their
/// parent.
#[derive(Debug, Clone)]
pub struct DocumentTree {
    book: Book,
    active_section_id: Option<String>,
}

impl DocumentTree {
    pub fn new(book: Book) -> Self {
        Self {
            book,
            active_section_id: None,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn book_id(&self) -> &str {
        &self.book.id
    }

    pub fn set_status(&mut self, status: BookStatus) {
        if !status.advanced_from(self.book.status) && status != self.book.status {
            tracing::debug!(?status, "manual status regression");
        }
        self.book.status = status;
    }

    pub fn active_section_id(&self) -> Option<&str> {
        self.active_section_id.as_deref()
    }

    pub fn set_active_section(&mut self, section_id: Option<String>) {
        self.active_section_id = section_id;
    }

    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.book.chapters.iter().find(|c| c.id == chapter_id)
    }

    fn chapter_mut(&mut self, chapter_id: &str) -> Option<&mut Chapter> {
        self.book.chapters.iter_mut().find(|c| c.id == chapter_id)
    }

    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.book
            .chapters
            .iter()
            .flat_map(|c| c.sections.iter())
            .find(|s| s.id == section_id)
    }

    /// The chapter a section belongs to. Every section belongs to exactly
    /// one chapter.
    pub fn chapter_of_section(&self, section_id: &str) -> Option<&Chapter> {
        self.book
            .chapters
            .iter()
            .find(|c| c.sections.iter().any(|s| s.id == section_id))
    }

    pub fn push_chapter(&mut self, id: String, title: String) -> &Chapter {
        let order_index = self.book.chapters.len();
        self.book.chapters.push(Chapter {
            id,
            title,
            summary: None,
            order_index,
            sections: Vec::new(),
        });
        self.book.chapters.last().expect("just pushed")
    }

    pub fn push_section(&mut self, chapter_id: &str, id: String, title: String) -> Option<&Section> {
        let chapter = self.chapter_mut(chapter_id)?;
        let order_index = chapter.sections.len();
        chapter.sections.push(Section {
            id,
            title,
            order_index,
            content: String::new(),
        });
        chapter.sections.last().map(|s| &*s)
    }

    pub fn rename_chapter(&mut self, chapter_id: &str, title: String) -> bool {
        match self.chapter_mut(chapter_id) {
            Some(chapter) => {
                chapter.title = title;
                true
            }
            None => false,
        }
    }

    pub fn rename_section(&mut self, section_id: &str, title: String) -> bool {
        match self.section_mut(section_id) {
            Some(section) => {
                section.title = title;
                true
            }
            None => false,
        }
    }

    fn section_mut(&mut self, section_id: &str) -> Option<&mut Section> {
        self.book
            .chapters
            .iter_mut()
            .flat_map(|c| c.sections.iter_mut())
            .find(|s| s.id == section_id)
    }

    pub fn set_section_content(&mut self, section_id: &str, content: &str) -> bool {
        match self.section_mut(section_id) {
            Some(section) => {
                section.content = content.to_owned();
                true
            }
            None => false,
        }
    }

    /// Removes a chapter and everything under it, reindexes the remainder,
    /// and moves the selection off the removed subtree if it pointed there.
    pub fn remove_chapter(&mut self, chapter_id: &str) -> Option<Chapter> {
        let idx = self.book.chapters.iter().position(|c| c.id == chapter_id)?;
        let removed = self.book.chapters.remove(idx);
        reindex_chapters(&mut self.book);

        if let Some(active) = &self.active_section_id
            && removed.sections.iter().any(|s| &s.id == active)
        {
            self.active_section_id = self.first_section_id();
        }
        Some(removed)
    }

    /// Removes a section, reindexes its siblings, and falls back the
    /// selection: next sibling first, then the first section found scanning
    /// chapters in order, then empty. The scan deliberately includes the
    /// current chapter, so deleting the last section of a chapter selects an
    /// earlier sibling before reaching into other chapters.
    pub fn remove_section(&mut self, chapter_id: &str, section_id: &str) -> Option<Section> {
        let chapter = self.chapter_mut(chapter_id)?;
        let idx = chapter.sections.iter().position(|s| s.id == section_id)?;
        let removed = chapter.sections.remove(idx);
        reindex_sections(chapter);

        if self.active_section_id.as_deref() == Some(section_id) {
            let next_sibling = self
                .chapter(chapter_id)
                .and_then(|c| c.sections.get(idx))
                .map(|s| s.id.clone());
            self.active_section_id = next_sibling.or_else(|| self.first_section_id());
        }
        Some(removed)
    }

    pub fn move_chapter(&mut self, chapter_id: &str, direction: MoveDirection) -> Option<MoveOutcome> {
        let idx = self.book.chapters.iter().position(|c| c.id == chapter_id)?;
        let Some(target) = neighbor(idx, self.book.chapters.len(), direction) else {
            return Some(MoveOutcome::AtBoundary);
        };
        self.book.chapters.swap(idx, target);
        self.book.chapters[idx].order_index = idx;
        self.book.chapters[target].order_index = target;
        Some(MoveOutcome::Moved)
    }

    pub fn move_section(
        &mut self,
        chapter_id: &str,
        section_id: &str,
        direction: MoveDirection,
    ) -> Option<MoveOutcome> {
        let chapter = self.chapter_mut(chapter_id)?;
        let idx = chapter.sections.iter().position(|s| s.id == section_id)?;
        let Some(target) = neighbor(idx, chapter.sections.len(), direction) else {
            return Some(MoveOutcome::AtBoundary);
        };
        chapter.sections.swap(idx, target);
        chapter.sections[idx].order_index = idx;
        chapter.sections[target].order_index = target;
        Some(MoveOutcome::Moved)
    }

    /// Whether a move would hit the first/last boundary, without mutating.
    pub fn move_is_boundary(&self, chapter_id: &str, section_id: Option<&str>, direction: MoveDirection) -> Option<bool> {
        match section_id {
            None => {
                let idx = self.book.chapters.iter().position(|c| c.id == chapter_id)?;
                Some(neighbor(idx, self.book.chapters.len(), direction).is_none())
            }
            Some(section_id) => {
                let chapter = self.chapter(chapter_id)?;
                let idx = chapter.sections.iter().position(|s| s.id == section_id)?;
                Some(neighbor(idx, chapter.sections.len(), direction).is_none())
            }
        }
    }

    /// First section of the first chapter that has one, scanning in order.
    pub fn first_section_id(&self) -> Option<String> {
        self.book
            .chapters
            .iter()
            .flat_map(|c| c.sections.first())
            .next()
            .map(|s| s.id.clone())
    }

    /// Work selection for the batch runner: (id, title) of every unwritten
    /// section of the chapter, in order.
    pub fn unwritten_sections(&self, chapter_id: &str) -> Vec<(String, String)> {
        self.chapter(chapter_id)
            .map(|c| {
                c.sections
                    .iter()
                    .filter(|s| s.is_unwritten())
                    .map(|s| (s.id.clone(), s.title.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Invariant check used by tests: order_index values are 0..n-1 in
    /// vector order, at both levels.
    pub fn order_indexes_are_dense(&self) -> bool {
        let chapters_ok = self
            .book
            .chapters
            .iter()
            .enumerate()
            .all(|(idx, c)| c.order_index == idx);
        let sections_ok = self.book.chapters.iter().all(|c| {
            c.sections
                .iter()
                .enumerate()
                .all(|(idx, s)| s.order_index == idx)
        });
        chapters_ok && sections_ok
    }
}

fn neighbor(idx: usize, len: usize, direction: MoveDirection) -> Option<usize> {
    match direction {
        MoveDirection::Up => idx.checked_sub(1),
        MoveDirection::Down => (idx + 1 < len).then_some(idx + 1),
    }
}

fn reindex_chapters(book: &mut Book) {
    for (idx, chapter) in book.chapters.iter_mut().enumerate() {
        chapter.order_index = idx;
    }
}

fn reindex_sections(chapter: &mut Chapter) {
    for (idx, section) in chapter.sections.iter_mut().enumerate() {
        section.order_index = idx;
    }
}
