//! Data models for board-service
//!
//! Entities share the same audit shape (`created_at`/`updated_at` fields by
//! composition), carry a boolean soft-delete flag, and reference their parent
//! by id only. Children are found by querying on the parent id, never
//! through a mutable back-pointer collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    #[sqlx(rename = "admin")]
    #[serde(rename = "admin")]
    Admin,
    #[sqlx(rename = "user")]
    #[serde(rename = "user")]
    User,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Admin => "admin",
            MemberRole::User => "user",
        }
    }
}

/// A registered account.
///
/// `password_hash` is opaque here; hashing and verification live in the
/// excluded auth layer. The single `verification_token` slot serves both the
/// email-verification and password-reset flows.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub nickname: String,
    pub password_hash: String,
    pub role: MemberRole,
    pub verified: bool,
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A board post.
///
/// `author_nickname` is denormalized at creation time so writer searches and
/// listings need no join against members.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_nickname: String,
    pub title: String,
    pub body: String,
    pub view_count: i64,
    pub notice: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_nickname: String,
    pub post_id: Uuid,
    pub body: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A file attached to a post. `stored_key` is an opaque reference into the
/// external file store; this service never touches file bytes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub original_name: String,
    pub stored_key: String,
    pub size_bytes: i64,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

// ========== Creation parameters (ids/timestamps assigned by the store) ==========

#[derive(Debug, Clone)]
pub struct NewMember {
    pub nickname: String,
    pub password_hash: String,
    pub role: MemberRole,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub author_nickname: String,
    pub title: String,
    pub body: String,
    pub notice: bool,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: Uuid,
    pub author_nickname: String,
    pub post_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub post_id: Uuid,
    pub original_name: String,
    pub stored_key: String,
    pub size_bytes: i64,
}

// ========== Patches (None = leave the field unchanged) ==========

#[derive(Debug, Clone, Default)]
pub struct MemberPatch {
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub notice: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentPatch {
    pub body: Option<String>,
}
