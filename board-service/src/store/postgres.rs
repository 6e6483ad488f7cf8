//! Postgres store backend.
//!
//! Predicate trees render to parameterized WHERE clauses; keyword terms
//! travel as bind values and never as SQL text. Ordering renders from the
//! closed [`SortColumn`] set, with the id appended as a tie-break so
//! pagination stays stable across requests.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::{Attachment, Comment, Member, NewAttachment, NewComment, NewMember, NewPost, Post};
use crate::query::{ComposedQuery, OrderClause, Predicate, SortColumn, SortDirection, TextField};
use crate::store::{
    AttachmentStore, CommentStore, MemberStore, Page, PageRequest, PostStore,
};

const MEMBER_COLUMNS: &str = "id, nickname, password_hash, role, verified, verification_token, \
     verification_expires_at, deleted, created_at, updated_at";
const POST_COLUMNS: &str =
    "id, author_id, author_nickname, title, body, view_count, notice, deleted, created_at, updated_at";
const COMMENT_COLUMNS: &str =
    "id, author_id, author_nickname, post_id, body, deleted, created_at, updated_at";
const ATTACHMENT_COLUMNS: &str =
    "id, post_id, original_name, stored_key, size_bytes, deleted, created_at";

/// Open a connection pool against the configured database.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.url)
        .await?;
    tracing::info!(
        max_connections = config.max_connections,
        "connected to postgres"
    );
    Ok(pool)
}

// ========== SQL rendering ==========

fn text_column(field: TextField) -> &'static str {
    match field {
        TextField::Title => "title",
        TextField::Body => "body",
        TextField::Writer => "author_nickname",
    }
}

fn sort_column(column: SortColumn) -> &'static str {
    match column {
        SortColumn::CreatedAt => "created_at",
        SortColumn::UpdatedAt => "updated_at",
        SortColumn::ViewCount => "view_count",
        SortColumn::Title => "title",
    }
}

fn direction_sql(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

/// Escape LIKE wildcards so keyword terms match literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Render a predicate to a WHERE fragment, pushing one bind value per
/// `Contains` leaf. Placeholders start after `base` already-bound
/// parameters. The composer never emits empty groups.
fn render_predicate(predicate: &Predicate, binds: &mut Vec<String>, base: usize) -> String {
    match predicate {
        Predicate::True => "TRUE".to_string(),
        Predicate::False => "FALSE".to_string(),
        Predicate::ActiveOnly => "deleted = FALSE".to_string(),
        Predicate::Contains { field, term } => {
            binds.push(format!("%{}%", escape_like(term)));
            format!("{} ILIKE ${}", text_column(*field), base + binds.len())
        }
        Predicate::Or(children) => render_group(children, " OR ", binds, base),
        Predicate::And(children) => render_group(children, " AND ", binds, base),
    }
}

fn render_group(children: &[Predicate], sep: &str, binds: &mut Vec<String>, base: usize) -> String {
    let parts: Vec<String> = children
        .iter()
        .map(|child| render_predicate(child, binds, base))
        .collect();
    format!("({})", parts.join(sep))
}

fn render_ordering(ordering: &[OrderClause]) -> String {
    let mut parts: Vec<String> = ordering
        .iter()
        .map(|clause| {
            format!(
                "{} {}",
                sort_column(clause.column),
                direction_sql(clause.direction)
            )
        })
        .collect();
    parts.push("id".to_string());
    format!("ORDER BY {}", parts.join(", "))
}

// ========== MemberStore ==========

#[derive(Clone)]
pub struct PgMemberStore {
    pool: PgPool,
}

impl PgMemberStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberStore for PgMemberStore {
    async fn insert(&self, new: NewMember) -> Result<Member> {
        let sql = format!(
            "INSERT INTO members (id, nickname, password_hash, role, verified, deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, FALSE, FALSE, NOW(), NOW()) \
             RETURNING {}",
            MEMBER_COLUMNS
        );
        let member = sqlx::query_as::<_, Member>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.nickname)
            .bind(&new.password_hash)
            .bind(new.role)
            .fetch_one(&self.pool)
            .await?;
        Ok(member)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>> {
        let sql = format!(
            "SELECT {} FROM members WHERE id = $1 AND deleted = FALSE",
            MEMBER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Member>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Member>> {
        let sql = format!("SELECT {} FROM members WHERE id = $1", MEMBER_COLUMNS);
        Ok(sqlx::query_as::<_, Member>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn nickname_exists(&self, nickname: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM members WHERE nickname = $1)",
        )
        .bind(nickname)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn update(&self, member: &Member) -> Result<Option<Member>> {
        let sql = format!(
            "UPDATE members \
             SET nickname = $2, password_hash = $3, verified = $4, \
                 verification_token = $5, verification_expires_at = $6, updated_at = NOW() \
             WHERE id = $1 AND deleted = FALSE \
             RETURNING {}",
            MEMBER_COLUMNS
        );
        Ok(sqlx::query_as::<_, Member>(&sql)
            .bind(member.id)
            .bind(&member.nickname)
            .bind(&member.password_hash)
            .bind(member.verified)
            .bind(&member.verification_token)
            .bind(member.verification_expires_at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE members SET deleted = TRUE, updated_at = NOW() \
             WHERE id = $1 AND deleted = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM members WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ========== PostStore ==========

#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert(&self, new: NewPost) -> Result<Post> {
        let sql = format!(
            "INSERT INTO posts (id, author_id, author_nickname, title, body, view_count, notice, deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 0, $6, FALSE, NOW(), NOW()) \
             RETURNING {}",
            POST_COLUMNS
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.author_id)
            .bind(&new.author_nickname)
            .bind(&new.title)
            .bind(&new.body)
            .bind(new.notice)
            .fetch_one(&self.pool)
            .await?;
        Ok(post)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE id = $1 AND deleted = FALSE",
            POST_COLUMNS
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update(&self, post: &Post) -> Result<Option<Post>> {
        // View counts move outside the guard, so the counter column is
        // deliberately absent here.
        let sql = format!(
            "UPDATE posts SET title = $2, body = $3, notice = $4, updated_at = NOW() \
             WHERE id = $1 AND deleted = FALSE \
             RETURNING {}",
            POST_COLUMNS
        );
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(post.id)
            .bind(&post.title)
            .bind(&post.body)
            .bind(post.notice)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE posts SET deleted = TRUE, updated_at = NOW() \
             WHERE id = $1 AND deleted = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<Option<i64>> {
        Ok(sqlx::query_scalar::<_, i64>(
            "UPDATE posts SET view_count = view_count + 1 \
             WHERE id = $1 AND deleted = FALSE \
             RETURNING view_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_page(&self, query: &ComposedQuery, page: PageRequest) -> Result<Page<Post>> {
        let mut binds = Vec::new();
        let filter = render_predicate(&query.predicate, &mut binds, 0);
        let order = render_ordering(&query.ordering);

        let select_sql = format!(
            "SELECT {} FROM posts WHERE {} {} LIMIT ${} OFFSET ${}",
            POST_COLUMNS,
            filter,
            order,
            binds.len() + 1,
            binds.len() + 2
        );
        let mut rows = sqlx::query_as::<_, Post>(&select_sql);
        for term in &binds {
            rows = rows.bind(term);
        }
        let items = rows
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM posts WHERE {}", filter);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        for term in &binds {
            count = count.bind(term);
        }
        let total_count = count.fetch_one(&self.pool).await?;

        Ok(Page::new(items, total_count, page))
    }
}

// ========== CommentStore ==========

#[derive(Clone)]
pub struct PgCommentStore {
    pool: PgPool,
}

impl PgCommentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommentStore for PgCommentStore {
    async fn insert(&self, new: NewComment) -> Result<Comment> {
        let sql = format!(
            "INSERT INTO comments (id, author_id, author_nickname, post_id, body, deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, NOW(), NOW()) \
             RETURNING {}",
            COMMENT_COLUMNS
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.author_id)
            .bind(&new.author_nickname)
            .bind(new.post_id)
            .bind(&new.body)
            .fetch_one(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE id = $1 AND deleted = FALSE",
            COMMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS);
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update(&self, comment: &Comment) -> Result<Option<Comment>> {
        let sql = format!(
            "UPDATE comments SET body = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted = FALSE \
             RETURNING {}",
            COMMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(comment.id)
            .bind(&comment.body)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE comments SET deleted = TRUE, updated_at = NOW() \
             WHERE id = $1 AND deleted = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_page(
        &self,
        post_id: Option<Uuid>,
        query: &ComposedQuery,
        page: PageRequest,
    ) -> Result<Page<Comment>> {
        // When scoped, the post id takes $1 and predicate binds shift by one.
        let (scope, base) = match post_id {
            Some(_) => ("post_id = $1 AND ", 1usize),
            None => ("", 0usize),
        };
        let mut binds = Vec::new();
        let filter = render_predicate(&query.predicate, &mut binds, base);
        let order = render_ordering(&query.ordering);

        let select_sql = format!(
            "SELECT {} FROM comments WHERE {}({}) {} LIMIT ${} OFFSET ${}",
            COMMENT_COLUMNS,
            scope,
            filter,
            order,
            base + binds.len() + 1,
            base + binds.len() + 2
        );
        let mut rows = sqlx::query_as::<_, Comment>(&select_sql);
        if let Some(id) = post_id {
            rows = rows.bind(id);
        }
        for term in &binds {
            rows = rows.bind(term);
        }
        let items = rows
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM comments WHERE {}({})", scope, filter);
        let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(id) = post_id {
            count = count.bind(id);
        }
        for term in &binds {
            count = count.bind(term);
        }
        let total_count = count.fetch_one(&self.pool).await?;

        Ok(Page::new(items, total_count, page))
    }
}

// ========== AttachmentStore ==========

#[derive(Clone)]
pub struct PgAttachmentStore {
    pool: PgPool,
}

impl PgAttachmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentStore for PgAttachmentStore {
    async fn insert(&self, new: NewAttachment) -> Result<Attachment> {
        let sql = format!(
            "INSERT INTO attachments (id, post_id, original_name, stored_key, size_bytes, deleted, created_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, NOW()) \
             RETURNING {}",
            ATTACHMENT_COLUMNS
        );
        let attachment = sqlx::query_as::<_, Attachment>(&sql)
            .bind(Uuid::new_v4())
            .bind(new.post_id)
            .bind(&new.original_name)
            .bind(&new.stored_key)
            .bind(new.size_bytes)
            .fetch_one(&self.pool)
            .await?;
        Ok(attachment)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Attachment>> {
        let sql = format!(
            "SELECT {} FROM attachments WHERE id = $1 AND deleted = FALSE",
            ATTACHMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Attachment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_id_any(&self, id: Uuid) -> Result<Option<Attachment>> {
        let sql = format!("SELECT {} FROM attachments WHERE id = $1", ATTACHMENT_COLUMNS);
        Ok(sqlx::query_as::<_, Attachment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("UPDATE attachments SET deleted = TRUE WHERE id = $1 AND deleted = FALSE")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM attachments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<Attachment>> {
        let sql = format!(
            "SELECT {} FROM attachments WHERE post_id = $1 AND deleted = FALSE ORDER BY created_at, id",
            ATTACHMENT_COLUMNS
        );
        Ok(sqlx::query_as::<_, Attachment>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?)
    }
}
