//! Member account operations.
//!
//! Every mutation takes the member's guard key first, so concurrent
//! edits, verification attempts, and reset requests on one account
//! resolve to a single winner. The verification token slot is shared by
//! the email-verification and password-reset flows; issuing either kind
//! of token overwrites the other.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use crate::error::{BoardError, Result};
use crate::models::{Member, MemberPatch, MemberRole, NewMember};
use crate::services::{acquire_guard, EntityKind, GuardKey, MutationLocks};
use crate::store::MemberStore;

/// Hours a verification or reset token stays valid.
const TOKEN_TTL_HOURS: i64 = 24;
const TOKEN_LEN: usize = 32;

#[derive(Clone)]
pub struct MemberService {
    members: Arc<dyn MemberStore>,
    locks: MutationLocks,
}

impl MemberService {
    pub fn new(members: Arc<dyn MemberStore>, locks: MutationLocks) -> Self {
        Self { members, locks }
    }

    /// Register an account. Nicknames are unique across all rows,
    /// soft-deleted included.
    pub async fn register(
        &self,
        nickname: &str,
        password_hash: &str,
        role: MemberRole,
    ) -> Result<Member> {
        if self.members.nickname_exists(nickname).await? {
            return Err(BoardError::InvalidState(format!(
                "nickname '{nickname}' is already in use"
            )));
        }
        let member = self
            .members
            .insert(NewMember {
                nickname: nickname.to_string(),
                password_hash: password_hash.to_string(),
                role,
            })
            .await?;
        tracing::info!(member_id = %member.id, "member registered");
        Ok(member)
    }

    pub async fn get(&self, id: Uuid) -> Result<Member> {
        self.load(id).await
    }

    /// Update profile fields. Owner only; an identical patch returns
    /// without touching the store.
    pub async fn update(&self, id: Uuid, actor_id: Uuid, patch: MemberPatch) -> Result<Member> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Member, id))?;
        let mut member = self.load_owned(id, actor_id).await?;

        let mut changed = false;
        if let Some(nickname) = patch.nickname {
            if nickname != member.nickname {
                if self.members.nickname_exists(&nickname).await? {
                    return Err(BoardError::InvalidState(format!(
                        "nickname '{nickname}' is already in use"
                    )));
                }
                member.nickname = nickname;
                changed = true;
            }
        }
        if !changed {
            return Ok(member);
        }
        self.persist(member).await
    }

    /// Replace the password hash. Owner only, verified accounts only. A
    /// successful change consumes any outstanding token.
    pub async fn change_password(&self, id: Uuid, actor_id: Uuid, new_hash: &str) -> Result<Member> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Member, id))?;
        let mut member = self.load_owned(id, actor_id).await?;
        if !member.verified {
            return Err(BoardError::InvalidState(
                "account must be verified before changing the password".into(),
            ));
        }
        if member.password_hash == new_hash {
            return Ok(member);
        }
        member.password_hash = new_hash.to_string();
        member.verification_token = None;
        member.verification_expires_at = None;
        self.persist(member).await
    }

    /// Issue a verification token for an unverified account. The token is
    /// handed to the caller for delivery; it is never logged.
    pub async fn issue_verification(&self, id: Uuid) -> Result<String> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Member, id))?;
        let mut member = self.load(id).await?;
        if member.verified {
            return Err(BoardError::InvalidState(
                "account is already verified".into(),
            ));
        }
        let token = generate_token();
        member.verification_token = Some(token.clone());
        member.verification_expires_at = Some(Utc::now() + Duration::hours(TOKEN_TTL_HOURS));
        self.persist(member).await?;
        tracing::info!(member_id = %id, "verification token issued");
        Ok(token)
    }

    /// Confirm a verification token. Verifying an already-verified account
    /// is a no-op.
    pub async fn verify(&self, id: Uuid, token: &str) -> Result<Member> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Member, id))?;
        let mut member = self.load(id).await?;
        if member.verified {
            return Ok(member);
        }
        match (&member.verification_token, member.verification_expires_at) {
            (Some(expected), Some(expires_at)) if expected == token => {
                if expires_at < Utc::now() {
                    return Err(BoardError::InvalidState(
                        "verification token expired".into(),
                    ));
                }
            }
            _ => {
                return Err(BoardError::InvalidState(
                    "verification token mismatch".into(),
                ))
            }
        }
        member.verified = true;
        member.verification_token = None;
        member.verification_expires_at = None;
        tracing::info!(member_id = %id, "member verified");
        self.persist(member).await
    }

    /// Issue a password-reset token. Guarded so concurrent duplicate
    /// requests cannot both fire the delivery side effect; the loser gets
    /// `ConcurrentModification` and no second token exists.
    pub async fn request_password_reset(&self, id: Uuid) -> Result<String> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Member, id))?;
        let mut member = self.load(id).await?;
        if !member.verified {
            return Err(BoardError::InvalidState(
                "account must be verified before resetting the password".into(),
            ));
        }
        let token = generate_token();
        member.verification_token = Some(token.clone());
        member.verification_expires_at = Some(Utc::now() + Duration::hours(TOKEN_TTL_HOURS));
        self.persist(member).await?;
        tracing::info!(member_id = %id, "password reset token issued");
        Ok(token)
    }

    /// Soft-delete the account. Owner only.
    pub async fn delete(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        let _guard = acquire_guard(&self.locks, GuardKey::entity(EntityKind::Member, id))?;
        self.load_owned(id, actor_id).await?;
        if !self.members.soft_delete(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(member_id = %id, "member soft-deleted");
        Ok(())
    }

    /// Permanently remove an account. Admin only; intended for retention
    /// jobs running without competing writers, so it skips the guard.
    pub async fn purge(&self, id: Uuid, actor_id: Uuid) -> Result<()> {
        super::require_admin(self.members.as_ref(), actor_id).await?;
        if !self.members.purge(id).await? {
            return Err(not_found(id));
        }
        tracing::info!(member_id = %id, "member purged");
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Member> {
        self.members
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn load_owned(&self, id: Uuid, actor_id: Uuid) -> Result<Member> {
        let member = self.load(id).await?;
        if member.id != actor_id {
            return Err(BoardError::NotOwner(format!(
                "member {id} is not the acting account"
            )));
        }
        Ok(member)
    }

    async fn persist(&self, member: Member) -> Result<Member> {
        self.members
            .update(&member)
            .await?
            .ok_or_else(|| not_found(member.id))
    }
}

fn not_found(id: Uuid) -> BoardError {
    BoardError::NotFound(format!("member {id} not found"))
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
