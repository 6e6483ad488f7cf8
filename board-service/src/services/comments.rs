//! Comment operations.
//!
//! Comments carry their parent post id and the denormalized author
//! nickname; listing scopes by post id at the store level rather than
//! through the predicate tree.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::{BoardConfig, PagingConfig};
use crate::error::{BoardError, Result};
use crate::models::{Comment, CommentPatch, NewComment};
use crate::query::{QueryComposer, SearchSpec, SortSpec, Visibility};
use crate::services::{
    acquire_guard, clamp_page, require_admin, EntityKind, GuardKey, MutationLocks,
};
use crate::store::{CommentStore, MemberStore, Page, PageRequest, PostStore};

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentStore>,
    posts: Arc<dyn PostStore>,
    members: Arc<dyn MemberStore>,
    locks: MutationLocks,
    composer: QueryComposer,
    paging: PagingConfig,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentStore>,
        posts: Arc<dyn PostStore>,
        members: Arc<dyn MemberStore>,
        locks: MutationLocks,
        config: &BoardConfig,
    ) -> Self {
        Self {
            comments,
            posts,
            members,
            locks,
            composer: QueryComposer::for_comments(&config.sorting.comment_keys),
            paging: config.paging.clone(),
        }
    }

    /// Create a comment under an active post.
    pub async fn create(&self, post_id: Uuid, actor_id: Uuid, body: &str) -> Result<Comment> {
        self.posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| BoardError::NotFound(format!("post {post_id} not found")))?;
        let author = self
            .members
            .find_by_id(actor_id)
            .await?
            .ok_or_else(|| BoardError::NotFound(format!("member {actor_id} not found")))?;
        let comment = self
            .comments
            .insert(NewComment {
                author_id: author.id,
                author_nickname: author.nickname,
                post_id,
                body: body.to_string(),
            })
            .await?;
        tracing::info!(comment_id = %comment.id, post_id = %post_id, "comment created");
        Ok(comment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Comment> {
        self.load(id).await
    }

    /// Edit the body. Owner only; an unchanged body skips the store write.
    pub async fn update(&self, id: Uuid, actor_id: Uuid, patch: CommentPatch) -> Result<Comment> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Comment, id))?;
        let mut comment = self.load_owned(id, actor_id).await?;

        let mut changed = false;
        if let Some(body) = patch.body {
            if body != comment.body {
                comment.body = body;
                changed = true;
            }
        }
        if !changed {
            return Ok(comment);
        }
        self.comments
            .update(&comment)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Soft-delete one comment. Owner only.
    pub async fn delete(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Comment, id))?;
        self.load_owned(id, actor_id).await?;
        if !self.comments.soft_delete(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(comment_id = %id, "comment soft-deleted");
        Ok(())
    }

    /// Soft-delete a batch, guarded by the acting account. All ids are
    /// validated before any row is touched; duplicates collapse.
    pub async fn delete_all(&self, ids: &[Uuid], actor_id: Uuid) -> Result<()> {
        let _guard = acquire_guard(&self.locks, GuardKey::batch(EntityKind::Comment, actor_id))?;
        let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
        for &id in ids {
            if unique.contains(&id) {
                continue;
            }
            let comment = self.load(id).await?;
            if comment.author_id != actor_id {
                return Err(not_owner(id));
            }
            unique.push(id);
        }
        for &id in &unique {
            if !self.comments.soft_delete(id).await? {
                return Err(not_found(id));
            }
        }
        tracing::info!(actor_id = %actor_id, count = unique.len(), "comment batch soft-deleted");
        Ok(())
    }

    /// Paged search, optionally scoped to one post.
    pub async fn search(
        &self,
        post_id: Option<Uuid>,
        search: Option<&SearchSpec>,
        sorts: &[SortSpec],
        visibility: Visibility,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        let query = self.composer.compose(search, sorts, visibility);
        let page = clamp_page(page, &self.paging);
        self.comments.find_page(post_id, &query, page).await
    }

    /// Active comments of one post, newest first.
    pub async fn list_for_post(&self, post_id: Uuid, page: PageRequest) -> Result<Page<Comment>> {
        self.search(Some(post_id), None, &[], Visibility::Active, page)
            .await
    }

    /// Permanently remove a comment. Admin only; retention path, unguarded.
    pub async fn purge(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        require_admin(self.members.as_ref(), actor_id).await?;
        if !self.comments.purge(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(comment_id = %id, "comment purged");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Comment> {
        self.comments
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn load_owned(&self, id: Uuid, actor_id: Uuid) -> Result<Comment> {
        let comment = self.load(id).await?;
        if comment.author_id != actor_id {
            return Err(not_owner(id));
        }
        Ok(comment)
    }
}

fn not_found(id: Uuid) -> BoardError {
    BoardError::NotFound(format!("comment {id} not found"))
}

fn not_owner(id: Uuid) -> BoardError {
    BoardError::NotOwner(format!(
        "comment {id} does not belong to the acting account"
    ))
}
