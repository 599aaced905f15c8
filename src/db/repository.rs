// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{Category, Comment, Post, Session, User, UserRecord, Vote, VoteTarget};
use crate::db::{parse_db_time, to_db_time};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(rusqlite::Error),

    /// A UNIQUE or PRIMARY KEY constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A CHECK, FOREIGN KEY or NOT NULL constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, msg) = &err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation {
                let detail = msg.clone().unwrap_or_else(|| code.to_string());
                return match code.extended_code {
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        RepositoryError::Conflict(detail)
                    }
                    _ => RepositoryError::Constraint(detail),
                };
            }
        }
        RepositoryError::Sql(err)
    }
}

/// Repository trait - every storage operation the forum needs
#[async_trait]
pub trait ForumRepository: Send + Sync {
    async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError>;

    async fn username_exists(&self, username: &str) -> Result<bool, RepositoryError>;

    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError>;

    /// Includes the password hash; callers outside auth should use `find_user_by_id`.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError>;

    async fn delete_user(&self, id: i64) -> Result<bool, RepositoryError>;

    async fn insert_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, RepositoryError>;

    /// Owner of a session that is still live at `now`. Unknown and expired
    /// tokens both come back as `None`.
    async fn find_session_user(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError>;

    async fn delete_session(&self, token: &str) -> Result<bool, RepositoryError>;

    /// Purge expired sessions (returns count deleted)
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;

    async fn find_category_by_name(&self, name: &str)
        -> Result<Option<Category>, RepositoryError>;

    async fn create_category(&self, name: &str) -> Result<Category, RepositoryError>;

    /// Post row and its category links are written in one transaction.
    async fn create_post(
        &self,
        user_id: i64,
        title: &str,
        content: &str,
        category_ids: &[i64],
    ) -> Result<Post, RepositoryError>;

    /// `viewer` fills in `user_liked` with that user's vote, if any.
    async fn get_post(&self, id: i64, viewer: Option<i64>)
        -> Result<Option<Post>, RepositoryError>;

    /// Newest first
    async fn list_posts(&self, viewer: Option<i64>) -> Result<Vec<Post>, RepositoryError>;

    async fn delete_post(&self, id: i64) -> Result<bool, RepositoryError>;

    async fn create_comment(
        &self,
        post_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<Comment, RepositoryError>;

    async fn get_comment(
        &self,
        id: i64,
        viewer: Option<i64>,
    ) -> Result<Option<Comment>, RepositoryError>;

    /// Oldest first
    async fn list_comments(
        &self,
        post_id: i64,
        viewer: Option<i64>,
    ) -> Result<Vec<Comment>, RepositoryError>;

    async fn delete_comment(&self, id: i64) -> Result<bool, RepositoryError>;

    /// A second vote by the same user on the same target is a `Conflict`.
    async fn insert_vote(
        &self,
        user_id: i64,
        target: VoteTarget,
        is_like: bool,
    ) -> Result<Vote, RepositoryError>;

    async fn find_vote(
        &self,
        user_id: i64,
        target: VoteTarget,
    ) -> Result<Option<Vote>, RepositoryError>;

    async fn delete_vote(&self, id: i64) -> Result<bool, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteForumRepository {
    pool: DbPool,
}

impl SqliteForumRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const USER_COLUMNS: &str = "u.id, u.email, u.username, u.created";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        created: time_column(row, 3)?,
    })
}

fn load_user(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS),
        params![id],
        user_from_row,
    )
    .optional()
}

const POST_SELECT: &str = "
    SELECT p.id, p.title, p.content, p.user_id, u.username, p.created,
           (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id AND v.is_like = 1),
           (SELECT COUNT(*) FROM votes v WHERE v.post_id = p.id AND v.is_like = 0),
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
           (SELECT v.is_like FROM votes v WHERE v.post_id = p.id AND v.user_id = ?1)
    FROM posts p
    JOIN users u ON u.id = p.user_id";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        user_id: row.get(3)?,
        username: row.get(4)?,
        created: time_column(row, 5)?,
        likes: row.get(6)?,
        dislikes: row.get(7)?,
        comments_count: row.get(8)?,
        user_liked: row.get(9)?,
        categories: Vec::new(),
    })
}

fn post_categories(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT c.name FROM categories c
         JOIN post_categories pc ON pc.category_id = c.id
         WHERE pc.post_id = ?1
         ORDER BY c.name",
    )?;
    let names = stmt
        .query_map(params![post_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

// Row helpers bind the viewer as ?1; NULL matches no vote.
fn load_post(conn: &Connection, id: i64, viewer: Option<i64>) -> rusqlite::Result<Option<Post>> {
    let post = conn
        .query_row(
            &format!("{} WHERE p.id = ?2", POST_SELECT),
            params![viewer, id],
            post_from_row,
        )
        .optional()?;

    match post {
        Some(mut post) => {
            post.categories = post_categories(conn, post.id)?;
            Ok(Some(post))
        }
        None => Ok(None),
    }
}

const COMMENT_SELECT: &str = "
    SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.created,
           (SELECT COUNT(*) FROM votes v WHERE v.comment_id = c.id AND v.is_like = 1),
           (SELECT COUNT(*) FROM votes v WHERE v.comment_id = c.id AND v.is_like = 0),
           (SELECT v.is_like FROM votes v WHERE v.comment_id = c.id AND v.user_id = ?1)
    FROM comments c
    JOIN users u ON u.id = c.user_id";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        created: time_column(row, 5)?,
        likes: row.get(6)?,
        dislikes: row.get(7)?,
        user_liked: row.get(8)?,
    })
}

fn load_comment(
    conn: &Connection,
    id: i64,
    viewer: Option<i64>,
) -> rusqlite::Result<Option<Comment>> {
    conn.query_row(
        &format!("{} WHERE c.id = ?2", COMMENT_SELECT),
        params![viewer, id],
        comment_from_row,
    )
    .optional()
}

#[async_trait]
impl ForumRepository for SqliteForumRepository {
    async fn email_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
            params![username],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
    ) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO users (email, username, password) VALUES (?1, ?2, ?3)",
            params![email, username, password_hash],
        )?;
        let id = conn.last_insert_rowid();

        load_user(&conn, id)?
            .ok_or_else(|| RepositoryError::Corrupt(format!("user {} vanished after insert", id)))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let conn = self.pool.get()?;

        let result = conn.query_row(
            &format!(
                "SELECT {}, u.password FROM users u WHERE u.email = ?1",
                USER_COLUMNS
            ),
            params![email],
            |row| {
                Ok(UserRecord {
                    user: user_from_row(row)?,
                    password_hash: row.get(4)?,
                })
            },
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(load_user(&conn, id)?)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn insert_session(
        &self,
        token: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, RepositoryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![token, user_id, to_db_time(expires_at)],
        )?;

        let session = conn.query_row(
            "SELECT token, user_id, expires_at, created FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: time_column(row, 2)?,
                    created: time_column(row, 3)?,
                })
            },
        )?;
        Ok(session)
    }

    async fn find_session_user(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;

        // Token match and liveness in one statement so expiry is never observable on its own.
        let user = conn
            .query_row(
                &format!(
                    "SELECT {} FROM sessions s
                     JOIN users u ON u.id = s.user_id
                     WHERE s.token = ?1 AND s.expires_at > ?2",
                    USER_COLUMNS
                ),
                params![token, to_db_time(now)],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    async fn delete_session(&self, token: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![to_db_time(now)],
        )?;
        Ok(rows as u64)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    async fn find_category_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Category>, RepositoryError> {
        let conn = self.pool.get()?;
        let category = conn
            .query_row(
                "SELECT id, name FROM categories WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(category)
    }

    async fn create_category(&self, name: &str) -> Result<Category, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute("INSERT INTO categories (name) VALUES (?1)", params![name])?;
        Ok(Category {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    async fn create_post(
        &self,
        user_id: i64,
        title: &str,
        content: &str,
        category_ids: &[i64],
    ) -> Result<Post, RepositoryError> {
        let mut conn = self.pool.get()?;

        // Dropping the transaction without commit rolls it back
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO posts (title, content, user_id) VALUES (?1, ?2, ?3)",
            params![title, content, user_id],
        )?;
        let post_id = tx.last_insert_rowid();

        for category_id in category_ids {
            tx.execute(
                "INSERT OR IGNORE INTO post_categories (post_id, category_id) VALUES (?1, ?2)",
                params![post_id, category_id],
            )?;
        }
        tx.commit()?;

        load_post(&conn, post_id, None)?.ok_or_else(|| {
            RepositoryError::Corrupt(format!("post {} vanished after insert", post_id))
        })
    }

    async fn get_post(
        &self,
        id: i64,
        viewer: Option<i64>,
    ) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(load_post(&conn, id, viewer)?)
    }

    async fn list_posts(&self, viewer: Option<i64>) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY p.created DESC, p.id DESC", POST_SELECT))?;
        let mut posts = stmt
            .query_map(params![viewer], post_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for post in &mut posts {
            post.categories = post_categories(&conn, post.id)?;
        }
        Ok(posts)
    }

    async fn delete_post(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn create_comment(
        &self,
        post_id: i64,
        user_id: i64,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO comments (post_id, user_id, content) VALUES (?1, ?2, ?3)",
            params![post_id, user_id, content],
        )?;
        let id = conn.last_insert_rowid();

        load_comment(&conn, id, None)?
            .ok_or_else(|| RepositoryError::Corrupt(format!("comment {} vanished after insert", id)))
    }

    async fn get_comment(
        &self,
        id: i64,
        viewer: Option<i64>,
    ) -> Result<Option<Comment>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(load_comment(&conn, id, viewer)?)
    }

    async fn list_comments(
        &self,
        post_id: i64,
        viewer: Option<i64>,
    ) -> Result<Vec<Comment>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE c.post_id = ?2 ORDER BY c.created ASC, c.id ASC",
            COMMENT_SELECT
        ))?;
        let comments = stmt
            .query_map(params![viewer, post_id], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn insert_vote(
        &self,
        user_id: i64,
        target: VoteTarget,
        is_like: bool,
    ) -> Result<Vote, RepositoryError> {
        let conn = self.pool.get()?;
        let (post_id, comment_id) = target.columns();

        conn.execute(
            "INSERT INTO votes (user_id, post_id, comment_id, is_like) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, post_id, comment_id, is_like],
        )?;

        Ok(Vote {
            id: conn.last_insert_rowid(),
            user_id,
            target,
            is_like,
        })
    }

    async fn find_vote(
        &self,
        user_id: i64,
        target: VoteTarget,
    ) -> Result<Option<Vote>, RepositoryError> {
        let conn = self.pool.get()?;
        let (post_id, comment_id) = target.columns();

        let row: Option<(i64, Option<i64>, Option<i64>, bool)> = conn
            .query_row(
                "SELECT id, post_id, comment_id, is_like FROM votes
                 WHERE user_id = ?1 AND post_id IS ?2 AND comment_id IS ?3",
                params![user_id, post_id, comment_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match row {
            Some((id, post_id, comment_id, is_like)) => {
                let target = VoteTarget::from_columns(post_id, comment_id).ok_or_else(|| {
                    RepositoryError::Corrupt(format!("vote {} has no single target", id))
                })?;
                Ok(Some(Vote {
                    id,
                    user_id,
                    target,
                    is_like,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete_vote(&self, id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM votes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynForumRepository = Arc<dyn ForumRepository>;
