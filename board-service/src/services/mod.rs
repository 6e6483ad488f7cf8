//! Business logic services.
//!
//! Each writing operation runs the same sequence: try-acquire the
//! mutation guard, load and validate, apply through the store, release
//! the guard on scope exit. A busy key fails fast with
//! `ConcurrentModification` instead of queueing. Read paths skip the
//! guard entirely.

pub mod attachments;
pub mod comments;
pub mod members;
pub mod posts;

pub use attachments::AttachmentService;
pub use comments::CommentService;
pub use members::MemberService;
pub use posts::PostService;

use std::fmt;

use keyed_lock::{KeyGuard, KeyedLock};
use uuid::Uuid;

use crate::config::PagingConfig;
use crate::error::{BoardError, Result};
use crate::metrics;
use crate::store::PageRequest;

/// Entity kinds. Used in guard keys, metric labels, and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Member,
    Post,
    Comment,
    Attachment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Member => "member",
            EntityKind::Post => "post",
            EntityKind::Comment => "comment",
            EntityKind::Attachment => "attachment",
        }
    }
}

/// Mutation guard key. Single-entity mutations lock the entity id; batch
/// deletes lock the acting account instead, so one account runs at most
/// one batch at a time without blocking unrelated entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardKey {
    kind: EntityKind,
    id: Uuid,
}

impl GuardKey {
    pub fn entity(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }

    pub fn batch(kind: EntityKind, actor_id: Uuid) -> Self {
        Self { kind, id: actor_id }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }
}

impl fmt::Display for GuardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// One registry shared by every service instance.
pub type MutationLocks = KeyedLock<GuardKey>;

/// Take the key or fail fast.
pub(crate) fn acquire_guard(locks: &MutationLocks, key: GuardKey) -> Result<KeyGuard<GuardKey>> {
    match locks.try_acquire(key.clone()) {
        Some(guard) => Ok(guard),
        None => {
            metrics::LOCK_REJECTED
                .with_label_values(&[key.kind.as_str()])
                .inc();
            tracing::debug!(key = %key, "mutation rejected, key already held");
            Err(BoardError::ConcurrentModification(format!(
                "{key} is being modified by another request"
            )))
        }
    }
}

/// Clamp caller paging to the configured bounds. Size zero selects the
/// default page size.
pub(crate) fn clamp_page(request: PageRequest, paging: &PagingConfig) -> PageRequest {
    let size = if request.size == 0 {
        paging.default_size
    } else {
        request.size.min(paging.max_size)
    };
    PageRequest::new(request.page, size)
}

/// Resolve the acting account and require the Admin role. Purge paths
/// share this; the post notice gate does its own check because it reports
/// `InvalidState` instead.
pub(crate) async fn require_admin(
    members: &dyn crate::store::MemberStore,
    actor_id: Uuid,
) -> Result<crate::models::Member> {
    let actor = members.find_by_id(actor_id).await?.ok_or_else(|| {
        BoardError::NotFound(format!("member {actor_id} not found"))
    })?;
    if actor.role != crate::models::MemberRole::Admin {
        return Err(BoardError::NotOwner("admin role required".into()));
    }
    Ok(actor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_key_display_is_kind_then_id() {
        let id = Uuid::nil();
        let key = GuardKey::entity(EntityKind::Post, id);
        assert_eq!(
            key.to_string(),
            "post:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn batch_and_entity_keys_share_the_kind_scope() {
        let actor = Uuid::new_v4();
        assert_eq!(
            GuardKey::batch(EntityKind::Comment, actor),
            GuardKey::entity(EntityKind::Comment, actor)
        );
        assert_ne!(
            GuardKey::batch(EntityKind::Comment, actor),
            GuardKey::batch(EntityKind::Post, actor)
        );
    }

    #[test]
    fn page_clamp_applies_default_and_ceiling() {
        let paging = PagingConfig {
            default_size: 20,
            max_size: 100,
        };
        assert_eq!(clamp_page(PageRequest::new(0, 0), &paging).size, 20);
        assert_eq!(clamp_page(PageRequest::new(0, 50), &paging).size, 50);
        assert_eq!(clamp_page(PageRequest::new(3, 500), &paging).size, 100);
        assert_eq!(clamp_page(PageRequest::new(3, 500), &paging).page, 3);
    }
}
