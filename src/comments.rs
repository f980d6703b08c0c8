use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::ItemId;
use crate::identity::IdentityProvider;
use crate::storage::{self, Store};

/// RGB pairs for avatar gradients; a name always maps to the same entry.
pub const AVATAR_PALETTE: [((u8, u8, u8), (u8, u8, u8)); 6] = [
    ((139, 92, 246), (168, 85, 247)),
    ((59, 130, 246), (6, 182, 212)),
    ((16, 185, 129), (20, 184, 166)),
    ((249, 115, 22), (245, 158, 11)),
    ((236, 72, 153), (244, 63, 94)),
    ((99, 102, 241), (59, 130, 246)),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub item_id: ItemId,
    pub author: String,
    pub text: String,
    /// Creation instant, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Ordered, append-only comment list for one item. Exists only while the panel is shown.
pub struct CommentThread {
    store: Store,
    item_id: ItemId,
    comments: Vec<Comment>,
}

impl CommentThread {
    pub fn open(store: Store, item_id: ItemId) -> Result<Self> {
        let comments = match store.get(&storage::comments_key(item_id))? {
            Some(raw) => match serde_json::from_str::<Vec<Comment>>(&raw) {
                Ok(mut comments) => {
                    for comment in &mut comments {
                        comment.item_id = item_id;
                    }
                    comments
                }
                Err(err) => {
                    warn!(item_id, error = %err, "comments: stored thread is unreadable, starting empty");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Ok(Self {
            store,
            item_id,
            comments,
        })
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn list(&self) -> &[Comment] {
        &self.comments
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Appends a comment; returns `None` without touching storage when author or text is blank.
    pub fn append(
        &mut self,
        identity: &mut IdentityProvider,
        author: &str,
        text: &str,
    ) -> Result<Option<Comment>> {
        self.append_at(identity, author, text, Utc::now())
    }

    pub fn append_at(
        &mut self,
        identity: &mut IdentityProvider,
        author: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Comment>> {
        let author = author.trim();
        let text = text.trim();
        if author.is_empty() || text.is_empty() {
            return Ok(None);
        }

        let comment = Comment {
            id: Uuid::now_v7().to_string(),
            item_id: self.item_id,
            author: author.to_string(),
            text: text.to_string(),
            timestamp: now.timestamp_millis(),
        };

        let mut updated = self.comments.clone();
        updated.push(comment.clone());
        let raw = serde_json::to_string(&updated).context("comments: serialize thread")?;
        self.store
            .set(&storage::comments_key(self.item_id), &raw)?;
        self.comments = updated;

        identity.set_display_name(author)?;
        info!(item_id = self.item_id, id = %comment.id, "comments: appended");
        Ok(Some(comment))
    }
}

pub fn can_submit(author: &str, text: &str) -> bool {
    !author.trim().is_empty() && !text.trim().is_empty()
}

pub fn format_relative(timestamp_ms: i64, now: DateTime<Utc>) -> String {
    let diff = now.timestamp_millis() - timestamp_ms;
    let minutes = diff.div_euclid(60_000);
    let hours = diff.div_euclid(3_600_000);
    let days = diff.div_euclid(86_400_000);

    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else {
        absolute_date(timestamp_ms)
    }
}

fn absolute_date(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(date) => date.format("%-m/%-d/%Y").to_string(),
        None => String::new(),
    }
}

/// `hash = unit + ((hash << 5) - hash)` over UTF-16 units. Only the shifted operand is
/// truncated to 32 bits, the accumulator itself is not.
pub fn avatar_index(name: &str) -> usize {
    let mut hash: i64 = 0;
    for unit in name.encode_utf16() {
        let shifted = i64::from((hash as i32).wrapping_shl(5));
        hash = i64::from(unit) + shifted - hash;
    }
    (hash.unsigned_abs() % AVATAR_PALETTE.len() as u64) as usize
}

pub fn initials(name: &str) -> String {
    name.split(' ')
        .filter_map(|word| word.chars().next())
        .collect::<String>()
        .to_uppercase()
        .chars()
        .take(2)
        .collect()
}

pub fn count_label(count: usize) -> String {
    if count == 1 {
        "1 comment".to_string()
    } else {
        format!("{count} comments")
    }
}
