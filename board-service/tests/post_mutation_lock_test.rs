//! Post Mutation Guard Tests
//!
//! Concurrency and ownership semantics of guarded post mutations.
//!
//! Test Coverage:
//! - At-most-one-winner for concurrent updates and deletes
//! - Fail-fast rejection while a key is held, release on drop
//! - Ownership and soft-delete checks under the guard
//! - Identical-patch no-op
//! - Batch delete: all-or-nothing, actor-keyed guard
//! - Lock registry hygiene after operations

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;
use uuid::Uuid;

use board_service::config::BoardConfig;
use board_service::error::BoardError;
use board_service::models::PostPatch;
use board_service::services::{EntityKind, GuardKey};
use board_service::store::PostStore;

use common::{build_world, build_world_custom, seed_admin, seed_member, seed_post, WriteDelays};

const WRITERS: usize = 8;

fn slow_posts() -> WriteDelays {
    WriteDelays {
        posts: Duration::from_millis(200),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_have_single_winner() {
    // Test: N racing updates on one post -> one success, N-1 rejections
    let world = build_world_custom(BoardConfig::default(), slow_posts());
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "original", "body").await;

    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let posts = world.posts.clone();
        let barrier = Arc::clone(&barrier);
        let post_id = post.id;
        let actor_id = author.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let patch = PostPatch {
                title: Some(format!("title {i}")),
                ..Default::default()
            };
            posts.update(post_id, actor_id, patch).await
        }));
    }

    let mut winners = Vec::new();
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("update task should complete") {
            Ok(updated) => winners.push(updated),
            Err(BoardError::ConcurrentModification(_)) => rejected += 1,
            Err(other) => panic!("unexpected error kind: {other}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one update should win");
    assert_eq!(rejected, WRITERS - 1, "losers should fail with ConcurrentModification");

    let stored = world.posts.get(post.id).await.expect("post readable");
    assert_eq!(
        stored.title, winners[0].title,
        "store should reflect exactly the winner's mutation"
    );
    assert_eq!(world.locks.held_count(), 0, "registry should be empty after the race");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deletes_have_single_winner() {
    // Test: racing deletes -> one transition; losers get the lock error,
    // not NotFound
    let world = build_world_custom(BoardConfig::default(), slow_posts());
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "doomed", "body").await;

    let barrier = Arc::new(Barrier::new(WRITERS));
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let posts = world.posts.clone();
        let barrier = Arc::clone(&barrier);
        let post_id = post.id;
        let actor_id = author.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            posts.delete(post_id, actor_id).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("delete task should complete") {
            Ok(()) => succeeded += 1,
            Err(BoardError::ConcurrentModification(_)) => rejected += 1,
            Err(other) => panic!("unexpected error kind: {other}"),
        }
    }

    assert_eq!(succeeded, 1, "exactly one delete should be performed");
    assert_eq!(rejected, WRITERS - 1);

    assert!(matches!(
        world.posts.get(post.id).await,
        Err(BoardError::NotFound(_))
    ));
    let raw = PostStore::find_by_id_any(world.store.as_ref(), post.id)
        .await
        .expect("raw lookup")
        .expect("row still present");
    assert!(raw.deleted, "post should be soft-deleted, not purged");
}

#[tokio::test]
async fn test_redelete_after_completion_is_not_found() {
    // Test: sequential second delete sees absence, not contention
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "once", "body").await;

    world.posts.delete(post.id, author.id).await.expect("first delete");
    assert!(matches!(
        world.posts.delete(post.id, author.id).await,
        Err(BoardError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_held_key_fails_fast_and_drop_releases() {
    // Test: rejection while held requires no store slowness; dropping the
    // guard reopens the key
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "held", "body").await;

    let guard = world
        .locks
        .try_acquire(GuardKey::entity(EntityKind::Post, post.id))
        .expect("key should be free");

    let patch = PostPatch {
        title: Some("blocked".into()),
        ..Default::default()
    };
    assert!(matches!(
        world.posts.update(post.id, author.id, patch.clone()).await,
        Err(BoardError::ConcurrentModification(_))
    ));

    drop(guard);
    let updated = world
        .posts
        .update(post.id, author.id, patch)
        .await
        .expect("update after release");
    assert_eq!(updated.title, "blocked");
}

#[tokio::test]
async fn test_nonowner_update_and_delete_rejected() {
    // Test: ownership is checked under the guard and nothing mutates
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let stranger = seed_member(&world, "stranger").await;
    let post = seed_post(&world, &author, "mine", "body").await;

    let patch = PostPatch {
        title: Some("stolen".into()),
        ..Default::default()
    };
    assert!(matches!(
        world.posts.update(post.id, stranger.id, patch).await,
        Err(BoardError::NotOwner(_))
    ));
    assert!(matches!(
        world.posts.delete(post.id, stranger.id).await,
        Err(BoardError::NotOwner(_))
    ));

    let stored = world.posts.get(post.id).await.expect("post untouched");
    assert_eq!(stored.title, "mine");
    assert_eq!(world.locks.held_count(), 0, "failed attempts must not leak keys");
}

#[tokio::test]
async fn test_identical_patch_is_a_noop() {
    // Test: a patch equal to current values writes nothing
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "same", "body").await;

    let noop = PostPatch {
        title: Some("same".into()),
        body: Some("body".into()),
        notice: Some(false),
    };
    let unchanged = world
        .posts
        .update(post.id, author.id, noop)
        .await
        .expect("noop update");
    assert_eq!(unchanged.updated_at, post.updated_at, "no spurious write");

    let real = PostPatch {
        title: Some("different".into()),
        ..Default::default()
    };
    let changed = world
        .posts
        .update(post.id, author.id, real)
        .await
        .expect("real update");
    assert!(changed.updated_at > post.updated_at, "real change bumps updated_at");
}

#[tokio::test]
async fn test_update_soft_deleted_post_is_not_found() {
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "gone", "body").await;
    world.posts.delete(post.id, author.id).await.expect("delete");

    let patch = PostPatch {
        title: Some("zombie".into()),
        ..Default::default()
    };
    assert!(matches!(
        world.posts.update(post.id, author.id, patch).await,
        Err(BoardError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_notice_flag_requires_admin() {
    // Test: the notice gate applies on create and on update
    let world = build_world();
    let user = seed_member(&world, "plain-user").await;
    let admin = seed_admin(&world, "the-admin").await;

    assert!(matches!(
        world.posts.create(user.id, "pinned", "body", true).await,
        Err(BoardError::InvalidState(_))
    ));

    let post = seed_post(&world, &user, "normal", "body").await;
    let flag = PostPatch {
        notice: Some(true),
        ..Default::default()
    };
    assert!(matches!(
        world.posts.update(post.id, user.id, flag).await,
        Err(BoardError::InvalidState(_))
    ));

    let admin_post = world
        .posts
        .create(admin.id, "announcement", "body", true)
        .await
        .expect("admin creates notice");
    assert!(admin_post.notice);
}

#[tokio::test]
async fn test_create_requires_active_author() {
    let world = build_world();
    assert!(matches!(
        world.posts.create(Uuid::new_v4(), "ghost", "body", false).await,
        Err(BoardError::NotFound(_))
    ));

    let member = seed_member(&world, "leaver").await;
    world
        .members
        .delete(member.id, member.id)
        .await
        .expect("member self-delete");
    assert!(matches!(
        world.posts.create(member.id, "late", "body", false).await,
        Err(BoardError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_batch_delete_is_all_or_nothing() {
    // Test: one foreign id poisons the whole batch before any mutation
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let other = seed_member(&world, "other").await;
    let mine_a = seed_post(&world, &author, "mine a", "body").await;
    let mine_b = seed_post(&world, &author, "mine b", "body").await;
    let theirs = seed_post(&world, &other, "theirs", "body").await;

    assert!(matches!(
        world
            .posts
            .delete_all(&[mine_a.id, theirs.id, mine_b.id], author.id)
            .await,
        Err(BoardError::NotOwner(_))
    ));

    for id in [mine_a.id, mine_b.id, theirs.id] {
        assert!(world.posts.get(id).await.is_ok(), "no row may be touched");
    }
}

#[tokio::test]
async fn test_batch_delete_with_absent_id_is_not_found() {
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "kept", "body").await;

    assert!(matches!(
        world.posts.delete_all(&[post.id, Uuid::new_v4()], author.id).await,
        Err(BoardError::NotFound(_))
    ));
    assert!(world.posts.get(post.id).await.is_ok(), "batch must not partially apply");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_share_the_actor_key() {
    // Test: two batches by one actor race on (kind, actor); one wins
    let world = build_world_custom(BoardConfig::default(), slow_posts());
    let author = seed_member(&world, "author").await;
    let batch_a = [
        seed_post(&world, &author, "a1", "body").await.id,
        seed_post(&world, &author, "a2", "body").await.id,
    ];
    let batch_b = [
        seed_post(&world, &author, "b1", "body").await.id,
        seed_post(&world, &author, "b2", "body").await.id,
    ];

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for ids in [batch_a, batch_b] {
        let posts = world.posts.clone();
        let barrier = Arc::clone(&barrier);
        let actor_id = author.id;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            posts.delete_all(&ids, actor_id).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("batch task should complete") {
            Ok(()) => succeeded += 1,
            Err(BoardError::ConcurrentModification(_)) => rejected += 1,
            Err(other) => panic!("unexpected error kind: {other}"),
        }
    }
    assert_eq!(succeeded, 1, "one batch wins the actor key");
    assert_eq!(rejected, 1, "the other fails fast");

    let deleted: usize = {
        let mut count = 0;
        for id in batch_a.iter().chain(batch_b.iter()) {
            if world.posts.get(*id).await.is_err() {
                count += 1;
            }
        }
        count
    };
    assert_eq!(deleted, 2, "exactly the winning batch should be applied");
}

#[tokio::test]
async fn test_posts_and_comments_do_not_share_keys() {
    // Test: a held post key must not block comment mutations
    let world = build_world();
    let author = seed_member(&world, "author").await;
    let post = seed_post(&world, &author, "threaded", "body").await;
    let comment = world
        .comments
        .create(post.id, author.id, "first")
        .await
        .expect("create comment");

    let _guard = world
        .locks
        .try_acquire(GuardKey::entity(EntityKind::Post, post.id))
        .expect("post key free");

    world
        .comments
        .delete(comment.id, author.id)
        .await
        .expect("comment delete proceeds under a held post key");
}
