//! Persistence traits for board entities.
//!
//! Services depend on these traits only. Two backends ship: a Postgres
//! implementation used in deployments and an in-memory implementation
//! used by tests and embedded setups. Both interpret the abstract
//! [`ComposedQuery`](crate::query::ComposedQuery) produced by the query
//! composer, so listing semantics cannot drift between them.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgAttachmentStore, PgCommentStore, PgMemberStore, PgPostStore};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Attachment, Comment, Member, NewAttachment, NewComment, NewMember, NewPost, Post};
use crate::query::ComposedQuery;

// ========== Paging ==========

/// Zero-based page index plus page size. Services clamp the size to the
/// configured bounds before this reaches a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn offset(&self) -> i64 {
        self.page as i64 * self.size as i64
    }

    pub fn limit(&self) -> i64 {
        self.size as i64
    }
}

/// One page of results plus the total row count for the whole filter.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub size: u32,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: i64, request: PageRequest) -> Self {
        let has_more = (request.page as i64 + 1) * (request.size as i64) < total_count;
        Self {
            items,
            total_count,
            page: request.page,
            size: request.size,
            has_more,
        }
    }
}

// ========== Entity stores ==========

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn insert(&self, new: NewMember) -> Result<Member>;

    /// Lookup excluding soft-deleted rows.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>>;

    /// Lookup including soft-deleted rows.
    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Member>>;

    /// Uniqueness probe. Spans soft-deleted rows, matching the unique index.
    async fn nickname_exists(&self, nickname: &str) -> Result<bool>;

    /// Persist mutable fields and refresh `updated_at`. Returns the stored
    /// row, or `None` when it vanished underneath the caller.
    async fn update(&self, member: &Member) -> Result<Option<Member>>;

    /// Mark deleted. `false` when no live row was found.
    async fn soft_delete(&self, id: Uuid) -> Result<bool>;

    /// Physically remove the row. `false` when it was already gone.
    async fn purge(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn insert(&self, new: NewPost) -> Result<Post>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>>;

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Post>>;

    async fn update(&self, post: &Post) -> Result<Option<Post>>;

    async fn soft_delete(&self, id: Uuid) -> Result<bool>;

    async fn purge(&self, id: Uuid) -> Result<bool>;

    /// Atomic view-count bump. Returns the new count, or `None` when the
    /// post is absent or soft-deleted. Never takes the mutation guard.
    async fn increment_view_count(&self, id: Uuid) -> Result<Option<i64>>;

    async fn find_page(&self, query: &ComposedQuery, page: PageRequest) -> Result<Page<Post>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn insert(&self, new: NewComment) -> Result<Comment>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>>;

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Comment>>;

    async fn update(&self, comment: &Comment) -> Result<Option<Comment>>;

    async fn soft_delete(&self, id: Uuid) -> Result<bool>;

    async fn purge(&self, id: Uuid) -> Result<bool>;

    /// Page of comments, optionally scoped to one post.
    async fn find_page(
        &self,
        post_id: Option<Uuid>,
        query: &ComposedQuery,
        page: PageRequest,
    ) -> Result<Page<Comment>>;
}

#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn insert(&self, new: NewAttachment) -> Result<Attachment>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>>;

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Attachment>>;

    async fn soft_delete(&self, id: Uuid) -> Result<bool>;

    async fn purge(&self, id: Uuid) -> Result<bool>;

    /// Live attachments of one post, oldest first.
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Attachment>>;
}
