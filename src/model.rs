use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Draft,
    Writing,
    Completed,
}

impl BookStatus {
    /// Whether `self` is a forward step from `previous`. Status never
    /// regresses automatically; manual edits may still set any value.
    pub fn advanced_from(self, previous: BookStatus) -> bool {
        self.rank() > previous.rank()
    }

    fn rank(self) -> u8 {
        match self {
            BookStatus::Draft => 0,
            BookStatus::Writing => 1,
            BookStatus::Completed => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub status: BookStatus,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub order_index: usize,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub order_index: usize,
    /// Opaque serialized rich-text blob. `""` means unwritten.
    pub content: String,
}

impl Section {
    pub fn is_unwritten(&self) -> bool {
        self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BufferKind {
    Draft,
    Memo,
}

/// A named drafting buffer attached to a section. The section's own
/// `content` field is the implicit Main buffer and is never a `Buffer`
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buffer {
    pub id: String,
    pub section_id: String,
    pub book_id: String,
    pub label: String,
    pub content: String,
    pub kind: BufferKind,
    pub order_index: usize,
}

/// Transient state of a running chapter batch. Never persisted; reset to
/// idle on completion, abort, or reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchProgress {
    pub is_running: bool,
    pub chapter_id: Option<String>,
    pub current_index: usize,
    pub total_count: usize,
    pub current_section_title: String,
}

impl BatchProgress {
    pub fn idle() -> Self {
        Self::default()
    }
}

/// Transient state of a running whole-book style rewrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteProgress {
    pub is_running: bool,
    pub current_index: usize,
    pub total_count: usize,
    pub current_section_title: String,
    pub new_book_id: Option<String>,
}

impl RewriteProgress {
    pub fn idle() -> Self {
        Self::default()
    }
}
