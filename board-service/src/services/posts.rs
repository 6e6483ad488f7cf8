//! Post operations.
//!
//! Single-post mutations lock `post:<id>`; batch deletes lock the acting
//! account instead. View counting never takes the guard: the store-level
//! increment is atomic on its own and readers must not contend with
//! writers.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::{view_key, ViewDedup};
use crate::config::{BoardConfig, PagingConfig};
use crate::error::{BoardError, Result};
use crate::metrics;
use crate::models::{MemberRole, NewPost, Post, PostPatch};
use crate::query::{QueryComposer, SearchSpec, SortSpec, Visibility};
use crate::services::{
    acquire_guard, clamp_page, require_admin, EntityKind, GuardKey, MutationLocks,
};
use crate::store::{MemberStore, Page, PageRequest, PostStore};

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostStore>,
    members: Arc<dyn MemberStore>,
    locks: MutationLocks,
    view_dedup: Arc<dyn ViewDedup>,
    composer: QueryComposer,
    paging: PagingConfig,
    dedup_ttl: Duration,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostStore>,
        members: Arc<dyn MemberStore>,
        locks: MutationLocks,
        view_dedup: Arc<dyn ViewDedup>,
        config: &BoardConfig,
    ) -> Self {
        Self {
            posts,
            members,
            locks,
            view_dedup,
            composer: QueryComposer::for_posts(&config.sorting.post_keys),
            paging: config.paging.clone(),
            dedup_ttl: Duration::from_secs(config.view_dedup.ttl_secs),
        }
    }

    /// Create a post. The author must exist and be active; the notice
    /// flag needs the Admin role. The author nickname is denormalized
    /// onto the row for writer searches.
    pub async fn create(
        &self,
        actor_id: Uuid,
        title: &str,
        body: &str,
        notice: bool,
    ) -> Result<Post> {
        let author = self
            .members
            .find_by_id(actor_id)
            .await?
            .ok_or_else(|| BoardError::NotFound(format!("member {actor_id} not found")))?;
        if notice && author.role != MemberRole::Admin {
            return Err(BoardError::InvalidState(
                "notice flag requires the admin role".into(),
            ));
        }
        let post = self
            .posts
            .insert(NewPost {
                author_id: author.id,
                author_nickname: author.nickname,
                title: title.to_string(),
                body: body.to_string(),
                notice,
            })
            .await?;
        tracing::info!(post_id = %post.id, author_id = %actor_id, "post created");
        Ok(post)
    }

    pub async fn get(&self, id: Uuid) -> Result<Post> {
        self.load(id).await
    }

    /// Update title, body, or the notice flag. Owner only. Fields whose
    /// new value equals the current one are not rewritten; an entirely
    /// identical patch skips the store write, leaving `updated_at` alone.
    pub async fn update(&self, id: Uuid, actor_id: Uuid, patch: PostPatch) -> Result<Post> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Post, id))?;
        let mut post = self.load_owned(id, actor_id).await?;

        let mut changed = false;
        if let Some(title) = patch.title {
            if title != post.title {
                post.title = title;
                changed = true;
            }
        }
        if let Some(body) = patch.body {
            if body != post.body {
                post.body = body;
                changed = true;
            }
        }
        if let Some(notice) = patch.notice {
            if notice != post.notice {
                // Flipping the flag in either direction is an admin action.
                let actor = self
                    .members
                    .find_by_id(actor_id)
                    .await?
                    .ok_or_else(|| BoardError::NotFound(format!("member {actor_id} not found")))?;
                if actor.role != MemberRole::Admin {
                    return Err(BoardError::InvalidState(
                        "notice flag requires the admin role".into(),
                    ));
                }
                post.notice = notice;
                changed = true;
            }
        }
        if !changed {
            return Ok(post);
        }
        self.posts.update(&post).await?.ok_or_else(|| not_found(id))
    }

    /// Soft-delete one post. Owner only; of concurrent callers, exactly
    /// one observes the transition.
    pub async fn delete(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Post, id))?;
        self.load_owned(id, actor_id).await?;
        if !self.posts.soft_delete(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(post_id = %id, "post soft-deleted");
        Ok(())
    }

    /// Soft-delete a batch. Guarded by the acting account so one account
    /// runs at most one batch at a time. Every id must exist and belong
    /// to the actor before any row is touched; duplicates collapse.
    pub async fn delete_all(&self, ids: &[Uuid], actor_id: Uuid) -> Result<()> {
        let _guard = acquire_guard(&self.locks, GuardKey::batch(EntityKind::Post, actor_id))?;
        let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
        for &id in ids {
            if unique.contains(&id) {
                continue;
            }
            let post = self.load(id).await?;
            if post.author_id != actor_id {
                return Err(not_owner(id));
            }
            unique.push(id);
        }
        for &id in &unique {
            if !self.posts.soft_delete(id).await? {
                return Err(not_found(id));
            }
        }
        tracing::info!(actor_id = %actor_id, count = unique.len(), "post batch soft-deleted");
        Ok(())
    }

    /// Unconditional atomic increment. Returns the new count.
    pub async fn add_view_count(&self, id: Uuid) -> Result<i64> {
        self.posts
            .increment_view_count(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Increment once per visitor fingerprint inside the dedup window.
    /// Returns whether this call counted. When the dedup backend fails the
    /// view is counted without dedup; under-counting is the worse failure.
    pub async fn add_view_count_deduped(
        &self,
        id: Uuid,
        session_id: &str,
        client_addr: &str,
    ) -> Result<bool> {
        // Existence first, so absent posts fail before the cache is touched.
        self.load(id).await?;
        let key = view_key(id, session_id, client_addr);
        let first_sighting = match self.view_dedup.check_and_mark(&key, self.dedup_ttl).await {
            Ok(first) => first,
            Err(err) => {
                metrics::VIEW_DEDUP_DEGRADED.inc();
                tracing::warn!(error = %err, post_id = %id, "view dedup unavailable, counting without dedup");
                true
            }
        };
        if !first_sighting {
            metrics::VIEW_DEDUP_SUPPRESSED.inc();
            return Ok(false);
        }
        self.posts
            .increment_view_count(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        Ok(true)
    }

    /// Paged listing with optional keyword search and sort requests.
    pub async fn search(
        &self,
        search: Option<&SearchSpec>,
        sorts: &[SortSpec],
        visibility: Visibility,
        page: PageRequest,
    ) -> Result<Page<Post>> {
        let query = self.composer.compose(search, sorts, visibility);
        let page = clamp_page(page, &self.paging);
        self.posts.find_page(&query, page).await
    }

    /// Active posts, newest first.
    pub async fn list(&self, page: PageRequest) -> Result<Page<Post>> {
        self.search(None, &[], Visibility::Active, page).await
    }

    /// Permanently remove a post. Admin only; retention path, unguarded.
    pub async fn purge(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        require_admin(self.members.as_ref(), actor_id).await?;
        if !self.posts.purge(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(post_id = %id, "post purged");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Post> {
        self.posts
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn load_owned(&self, id: Uuid, actor_id: Uuid) -> Result<Post> {
        let post = self.load(id).await?;
        if post.author_id != actor_id {
            return Err(not_owner(id));
        }
        Ok(post)
    }
}

fn not_found(id: Uuid) -> BoardError {
    BoardError::NotFound(format!("post {id} not found"))
}

fn not_owner(id: Uuid) -> BoardError {
    BoardError::NotOwner(format!("post {id} does not belong to the acting account"))
}
