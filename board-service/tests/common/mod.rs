//! Shared fixtures for board-service integration tests.
//!
//! Builds the full service stack over the in-memory store. The slow
//! store wrappers inject a write delay so a guarded mutation stays in
//! flight long enough for competing callers to observe the held lock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use board_service::cache::MemoryViewDedup;
use board_service::config::BoardConfig;
use board_service::error::Result;
use board_service::models::{
    Attachment, Member, MemberRole, NewAttachment, NewMember, NewPost, Post,
};
use board_service::query::ComposedQuery;
use board_service::services::{
    AttachmentService, CommentService, MemberService, MutationLocks, PostService,
};
use board_service::store::{
    AttachmentStore, MemberStore, MemoryStore, Page, PageRequest, PostStore,
};

/// Per-store write delays. Zero means the store is used as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteDelays {
    pub posts: Duration,
    pub members: Duration,
    pub attachments: Duration,
}

/// The full service stack over one shared in-memory store.
pub struct TestWorld {
    pub config: BoardConfig,
    pub store: Arc<MemoryStore>,
    pub locks: MutationLocks,
    pub dedup: Arc<MemoryViewDedup>,
    pub members: MemberService,
    pub posts: PostService,
    pub comments: CommentService,
    pub attachments: AttachmentService,
}

pub fn build_world() -> TestWorld {
    build_world_custom(BoardConfig::default(), WriteDelays::default())
}

pub fn build_world_custom(config: BoardConfig, delays: WriteDelays) -> TestWorld {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let locks = MutationLocks::new();
    let dedup = Arc::new(MemoryViewDedup::new());

    let member_store: Arc<dyn MemberStore> = if delays.members.is_zero() {
        store.clone()
    } else {
        Arc::new(SlowMemberStore {
            inner: store.clone(),
            delay: delays.members,
        })
    };
    let post_store: Arc<dyn PostStore> = if delays.posts.is_zero() {
        store.clone()
    } else {
        Arc::new(SlowPostStore {
            inner: store.clone(),
            delay: delays.posts,
        })
    };
    let attachment_store: Arc<dyn AttachmentStore> = if delays.attachments.is_zero() {
        store.clone()
    } else {
        Arc::new(SlowAttachmentStore {
            inner: store.clone(),
            delay: delays.attachments,
        })
    };

    let members = MemberService::new(member_store.clone(), locks.clone());
    let posts = PostService::new(
        post_store.clone(),
        member_store.clone(),
        locks.clone(),
        dedup.clone(),
        &config,
    );
    let comments = CommentService::new(
        store.clone(),
        post_store.clone(),
        member_store.clone(),
        locks.clone(),
        &config,
    );
    let attachments = AttachmentService::new(
        attachment_store,
        post_store,
        member_store,
        locks.clone(),
    );

    TestWorld {
        config,
        store,
        locks,
        dedup,
        members,
        posts,
        comments,
        attachments,
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ========== Seed helpers ==========

pub async fn seed_member(world: &TestWorld, nickname: &str) -> Member {
    world
        .members
        .register(nickname, "hash", MemberRole::User)
        .await
        .expect("register member")
}

pub async fn seed_admin(world: &TestWorld, nickname: &str) -> Member {
    world
        .members
        .register(nickname, "hash", MemberRole::Admin)
        .await
        .expect("register admin")
}

pub async fn seed_verified_member(world: &TestWorld, nickname: &str) -> Member {
    let member = seed_member(world, nickname).await;
    let token = world
        .members
        .issue_verification(member.id)
        .await
        .expect("issue verification");
    world
        .members
        .verify(member.id, &token)
        .await
        .expect("verify member")
}

pub async fn seed_post(world: &TestWorld, author: &Member, title: &str, body: &str) -> Post {
    world
        .posts
        .create(author.id, title, body, false)
        .await
        .expect("create post")
}

// ========== Write-delayed store wrappers ==========

pub struct SlowPostStore {
    inner: Arc<dyn PostStore>,
    delay: Duration,
}

#[async_trait]
impl PostStore for SlowPostStore {
    async fn insert(&self, new: NewPost) -> Result<Post> {
        self.inner.insert(new).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Post>> {
        self.inner.find_by_id_any(id).await
    }

    async fn update(&self, post: &Post) -> Result<Option<Post>> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(post).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.soft_delete(id).await
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        self.inner.purge(id).await
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<Option<i64>> {
        self.inner.increment_view_count(id).await
    }

    async fn find_page(&self, query: &ComposedQuery, page: PageRequest) -> Result<Page<Post>> {
        self.inner.find_page(query, page).await
    }
}

pub struct SlowMemberStore {
    inner: Arc<dyn MemberStore>,
    delay: Duration,
}

#[async_trait]
impl MemberStore for SlowMemberStore {
    async fn insert(&self, new: NewMember) -> Result<Member> {
        self.inner.insert(new).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Member>> {
        self.inner.find_by_id_any(id).await
    }

    async fn nickname_exists(&self, nickname: &str) -> Result<bool> {
        self.inner.nickname_exists(nickname).await
    }

    async fn update(&self, member: &Member) -> Result<Option<Member>> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(member).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.soft_delete(id).await
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        self.inner.purge(id).await
    }
}

pub struct SlowAttachmentStore {
    inner: Arc<dyn AttachmentStore>,
    delay: Duration,
}

#[async_trait]
impl AttachmentStore for SlowAttachmentStore {
    async fn insert(&self, new: NewAttachment) -> Result<Attachment> {
        self.inner.insert(new).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Attachment>> {
        self.inner.find_by_id_any(id).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.soft_delete(id).await
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        self.inner.purge(id).await
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Attachment>> {
        self.inner.list_for_post(post_id).await
    }
}
