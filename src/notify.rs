use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Info,
    Warning,
    Error,
}

/// A transient user-visible message. The presentation layer drains these;
/// expired entries are pruned on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub posted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NotificationQueue {
    ttl: Duration,
    entries: Mutex<Vec<Notice>>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(Duration::seconds(8))
    }
}

impl NotificationQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(NoticeKind::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.push(NoticeKind::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(NoticeKind::Error, message.into());
    }

    fn push(&self, kind: NoticeKind, message: String) {
        match kind {
            NoticeKind::Info => tracing::info!(%message, "notice"),
            NoticeKind::Warning => tracing::warn!(%message, "notice"),
            NoticeKind::Error => tracing::error!(%message, "notice"),
        }
        let now = Utc::now();
        let mut entries = self.entries.lock().expect("notice queue poisoned");
        entries.push(Notice {
            kind,
            message,
            posted_at: now,
            expires_at: now + self.ttl,
        });
    }

    /// Unexpired notices in posting order.
    pub fn active(&self) -> Vec<Notice> {
        let now = Utc::now();
        let mut entries = self.entries.lock().expect("notice queue poisoned");
        entries.retain(|n| n.expires_at > now);
        entries.clone()
    }

    pub fn drain(&self) -> Vec<Notice> {
        let mut entries = self.entries.lock().expect("notice queue poisoned");
        std::mem::take(&mut *entries)
    }
}

/// Yes/no confirmation collaborator, asked before destructive structure
/// mutations and before starting a batch run.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, title: &str, message: &str) -> bool;
}
