//! In-memory store backend.
//!
//! Backs tests and embedded setups. State lives in [`DashMap`]s keyed by
//! entity id; listing filters rows through
//! [`Predicate::matches`](crate::query::Predicate::matches) so the
//! semantics match the Postgres backend clause for clause.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Attachment, Comment, Member, NewAttachment, NewComment, NewMember, NewPost, Post};
use crate::query::{ComposedQuery, OrderClause, SearchDoc, SortColumn, SortDirection};
use crate::store::{
    AttachmentStore, CommentStore, MemberStore, Page, PageRequest, PostStore,
};

/// One shared map per entity. Cloning shares state, so a single instance
/// can serve as every store trait at once.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    members: DashMap<Uuid, Member>,
    posts: DashMap<Uuid, Post>,
    comments: DashMap<Uuid, Comment>,
    attachments: DashMap<Uuid, Attachment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn post_doc(post: &Post) -> SearchDoc<'_> {
    SearchDoc {
        title: Some(&post.title),
        body: &post.body,
        writer: &post.author_nickname,
        deleted: post.deleted,
    }
}

fn comment_doc(comment: &Comment) -> SearchDoc<'_> {
    SearchDoc {
        title: None,
        body: &comment.body,
        writer: &comment.author_nickname,
        deleted: comment.deleted,
    }
}

fn directed(ord: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn compare_posts(a: &Post, b: &Post, ordering: &[OrderClause]) -> Ordering {
    for clause in ordering {
        let ord = match clause.column {
            SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
            SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortColumn::ViewCount => a.view_count.cmp(&b.view_count),
            SortColumn::Title => a.title.cmp(&b.title),
        };
        let ord = directed(ord, clause.direction);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    // Ties fall back to the id so pagination stays stable.
    a.id.cmp(&b.id)
}

fn compare_comments(a: &Comment, b: &Comment, ordering: &[OrderClause]) -> Ordering {
    for clause in ordering {
        let ord = match clause.column {
            SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
            SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            // Not sortable for comments; the composer never emits these.
            SortColumn::ViewCount | SortColumn::Title => Ordering::Equal,
        };
        let ord = directed(ord, clause.direction);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

fn paginate<T>(rows: Vec<T>, request: PageRequest) -> Page<T> {
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.size as usize)
        .collect();
    Page::new(items, total, request)
}

// ========== MemberStore ==========

#[async_trait]
impl MemberStore for MemoryStore {
    async fn insert(&self, new: NewMember) -> Result<Member> {
        let now = Utc::now();
        let member = Member {
            id: Uuid::new_v4(),
            nickname: new.nickname,
            password_hash: new.password_hash,
            role: new.role,
            verified: false,
            verification_token: None,
            verification_expires_at: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.members.insert(member.id, member.clone());
        Ok(member)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>> {
        Ok(self
            .members
            .get(&id)
            .filter(|m| !m.deleted)
            .map(|m| m.value().clone()))
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Member>> {
        Ok(self.members.get(&id).map(|m| m.value().clone()))
    }

    async fn nickname_exists(&self, nickname: &str) -> Result<bool> {
        Ok(self.members.iter().any(|m| m.nickname == nickname))
    }

    async fn update(&self, member: &Member) -> Result<Option<Member>> {
        match self.members.get_mut(&member.id) {
            Some(mut row) if !row.deleted => {
                row.nickname = member.nickname.clone();
                row.password_hash = member.password_hash.clone();
                row.verified = member.verified;
                row.verification_token = member.verification_token.clone();
                row.verification_expires_at = member.verification_expires_at;
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        match self.members.get_mut(&id) {
            Some(mut row) if !row.deleted => {
                row.deleted = true;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        Ok(self.members.remove(&id).is_some())
    }
}

// ========== PostStore ==========

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert(&self, new: NewPost) -> Result<Post> {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            author_id: new.author_id,
            author_nickname: new.author_nickname,
            title: new.title,
            body: new.body,
            view_count: 0,
            notice: new.notice,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.get(&id).filter(|p| !p.deleted).map(|p| p.value().clone()))
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Post>> {
        Ok(self.posts.get(&id).map(|p| p.value().clone()))
    }

    async fn update(&self, post: &Post) -> Result<Option<Post>> {
        match self.posts.get_mut(&post.id) {
            Some(mut row) if !row.deleted => {
                // View counts bypass the guard, so only the mutable fields
                // come from the caller's copy.
                row.title = post.title.clone();
                row.body = post.body.clone();
                row.notice = post.notice;
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        match self.posts.get_mut(&id) {
            Some(mut row) if !row.deleted => {
                row.deleted = true;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        Ok(self.posts.remove(&id).is_some())
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<Option<i64>> {
        match self.posts.get_mut(&id) {
            Some(mut row) if !row.deleted => {
                row.view_count += 1;
                Ok(Some(row.view_count))
            }
            _ => Ok(None),
        }
    }

    async fn find_page(&self, query: &ComposedQuery, page: PageRequest) -> Result<Page<Post>> {
        let mut rows: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| query.predicate.matches(&post_doc(p)))
            .map(|p| p.value().clone())
            .collect();
        rows.sort_by(|a, b| compare_posts(a, b, &query.ordering));
        Ok(paginate(rows, page))
    }
}

// ========== CommentStore ==========

#[async_trait]
impl CommentStore for MemoryStore {
    async fn insert(&self, new: NewComment) -> Result<Comment> {
        let now = Utc::now();
        let comment = Comment {
            id: Uuid::new_v4(),
            author_id: new.author_id,
            author_nickname: new.author_nickname,
            post_id: new.post_id,
            body: new.body,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        Ok(self
            .comments
            .get(&id)
            .filter(|c| !c.deleted)
            .map(|c| c.value().clone()))
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Comment>> {
        Ok(self.comments.get(&id).map(|c| c.value().clone()))
    }

    async fn update(&self, comment: &Comment) -> Result<Option<Comment>> {
        match self.comments.get_mut(&comment.id) {
            Some(mut row) if !row.deleted => {
                row.body = comment.body.clone();
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        match self.comments.get_mut(&id) {
            Some(mut row) if !row.deleted => {
                row.deleted = true;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        Ok(self.comments.remove(&id).is_some())
    }

    async fn find_page(
        &self,
        post_id: Option<Uuid>,
        query: &ComposedQuery,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        let mut rows: Vec<Comment> = self
            .comments
            .iter()
            .filter(|c| post_id.map_or(true, |id| c.post_id == id))
            .filter(|c| query.predicate.matches(&comment_doc(c)))
            .map(|c| c.value().clone())
            .collect();
        rows.sort_by(|a, b| compare_comments(a, b, &query.ordering));
        Ok(paginate(rows, page))
    }
}

// ========== AttachmentStore ==========

#[async_trait]
impl AttachmentStore for MemoryStore {
    async fn insert(&self, new: NewAttachment) -> Result<Attachment> {
        let attachment = Attachment {
            id: Uuid::new_v4(),
            post_id: new.post_id,
            original_name: new.original_name,
            stored_key: new.stored_key,
            size_bytes: new.size_bytes,
            deleted: false,
            created_at: Utc::now(),
        };
        self.attachments.insert(attachment.id, attachment.clone());
        Ok(attachment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>> {
        Ok(self
            .attachments
            .get(&id)
            .filter(|a| !a.deleted)
            .map(|a| a.value().clone()))
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Attachment>> {
        Ok(self.attachments.get(&id).map(|a| a.value().clone()))
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        match self.attachments.get_mut(&id) {
            Some(mut row) if !row.deleted => {
                row.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        Ok(self.attachments.remove(&id).is_some())
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Attachment>> {
        let mut rows: Vec<Attachment> = self
            .attachments
            .iter()
            .filter(|a| a.post_id == post_id && !a.deleted)
            .map(|a| a.value().clone())
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}
