use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of a user. Carries no password material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub created: DateTime<Utc>,
}

/// A user row as stored, including the password hash. Only the auth layer sees this.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A post with its author, categories and derived counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub user_id: i64,
    pub username: String,
    pub categories: Vec<String>,
    pub likes: i64,
    pub dislikes: i64,
    pub comments_count: i64,
    /// The viewer's own vote, when the post was loaded for a signed-in viewer who voted.
    pub user_liked: Option<bool>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    pub likes: i64,
    pub dislikes: i64,
    pub user_liked: Option<bool>,
    pub created: DateTime<Utc>,
}

/// What a vote is cast on. Stored as two nullable columns guarded by a CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum VoteTarget {
    Post(i64),
    Comment(i64),
}

impl VoteTarget {
    /// Split into the `(post_id, comment_id)` column pair.
    pub fn columns(self) -> (Option<i64>, Option<i64>) {
        match self {
            VoteTarget::Post(id) => (Some(id), None),
            VoteTarget::Comment(id) => (None, Some(id)),
        }
    }

    /// Rebuild from the column pair. `None` when the row breaks the exclusive-or rule.
    pub fn from_columns(post_id: Option<i64>, comment_id: Option<i64>) -> Option<Self> {
        match (post_id, comment_id) {
            (Some(id), None) => Some(VoteTarget::Post(id)),
            (None, Some(id)) => Some(VoteTarget::Comment(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: i64,
    pub user_id: i64,
    pub target: VoteTarget,
    pub is_like: bool,
}
