//! Attachment operations.
//!
//! Attachments have no owner column; rights derive from the parent
//! post's author. Ownership lookups use the including-deleted post read
//! so files can still be removed after their post was soft-deleted.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{BoardError, Result};
use crate::models::{Attachment, NewAttachment};
use crate::services::{acquire_guard, require_admin, EntityKind, GuardKey, MutationLocks};
use crate::store::{AttachmentStore, MemberStore, PostStore};

#[derive(Clone)]
pub struct AttachmentService {
    attachments: Arc<dyn AttachmentStore>,
    posts: Arc<dyn PostStore>,
    members: Arc<dyn MemberStore>,
    locks: MutationLocks,
}

impl AttachmentService {
    pub fn new(
        attachments: Arc<dyn AttachmentStore>,
        posts: Arc<dyn PostStore>,
        members: Arc<dyn MemberStore>,
        locks: MutationLocks,
    ) -> Self {
        Self {
            attachments,
            posts,
            members,
            locks,
        }
    }

    /// Record a stored file against an active post. Only the post's
    /// author may attach; the file bytes live in the external file store
    /// under `stored_key`.
    pub async fn attach(
        &self,
        post_id: Uuid,
        actor_id: Uuid,
        original_name: &str,
        stored_key: &str,
        size_bytes: i64,
    ) -> Result<Attachment> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| BoardError::NotFound(format!("post {post_id} not found")))?;
        if post.author_id != actor_id {
            return Err(BoardError::NotOwner(format!(
                "post {post_id} does not belong to the acting account"
            )));
        }
        let attachment = self
            .attachments
            .insert(NewAttachment {
                post_id,
                original_name: original_name.to_string(),
                stored_key: stored_key.to_string(),
                size_bytes,
            })
            .await?;
        tracing::info!(attachment_id = %attachment.id, post_id = %post_id, "attachment recorded");
        Ok(attachment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Attachment> {
        self.load(id).await
    }

    /// Live attachments of one post, oldest first.
    pub async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Attachment>> {
        self.attachments.list_for_post(post_id).await
    }

    /// Soft-delete one attachment. Post author only.
    pub async fn delete(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Attachment, id))?;
        let attachment = self.load(id).await?;
        self.check_owner(&attachment, actor_id).await?;
        if !self.attachments.soft_delete(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(attachment_id = %id, "attachment soft-deleted");
        Ok(())
    }

    /// Soft-delete a batch, guarded by the acting account. All ids are
    /// validated before any row is touched; duplicates collapse.
    pub async fn delete_all(&self, ids: &[Uuid], actor_id: Uuid) -> Result<()> {
        let _guard = acquire_guard(&self.locks, GuardKey::batch(EntityKind::Attachment, actor_id))?;
        let mut unique: Vec<Uuid> = Vec::with_capacity(ids.len());
        for &id in ids {
            if unique.contains(&id) {
                continue;
            }
            let attachment = self.load(id).await?;
            self.check_owner(&attachment, actor_id).await?;
            unique.push(id);
        }
        for &id in &unique {
            if !self.attachments.soft_delete(id).await? {
                return Err(not_found(id));
            }
        }
        tracing::info!(actor_id = %actor_id, count = unique.len(), "attachment batch soft-deleted");
        Ok(())
    }

    /// Permanently remove an attachment record. Admin only; the file
    /// itself is the external store's concern.
    pub async fn purge(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        require_admin(self.members.as_ref(), actor_id).await?;
        if !self.attachments.purge(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(attachment_id = %id, "attachment purged");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Attachment> {
        self.attachments
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Rights come from the parent post's author. The including-deleted
    /// read keeps cleanup possible after the post itself was removed.
    async fn check_owner(&self, attachment: &Attachment, actor_id: Uuid) -> Result<()> {
        let post = self
            .posts
            .find_by_id_any(attachment.post_id)
            .await?
            .ok_or_else(|| {
                BoardError::NotFound(format!("post {} not found", attachment.post_id))
            })?;
        if post.author_id != actor_id {
            return Err(BoardError::NotOwner(format!(
                "attachment {} does not belong to the acting account",
                attachment.id
            )));
        }
        Ok(())
    }
}

fn not_found(id: Uuid) -> BoardError {
    BoardError::NotFound(format!("attachment {id} not found"))
}
