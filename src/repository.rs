use crate::{
    audit::AuditEntry,
    error::AppError,
    models::{
        ContentFilter, ContentRecord, ContentStatus, ModerationFilter, ModerationStats, Review,
        SubmitContentRequest, UpdateContentRequest, User, Verdict, VerificationResult,
    },
    session::Role,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Repository Trait
///
/// The persistence contract behind the moderation workflow. Every status write is
/// conditional on the record's current state, and verdict writes touch only the
/// verification columns, so admin decisions and late worker results never clobber
/// each other.
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// safely shareable across Axum's asynchronous task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Public Read Paths (approved only) ---
    async fn list_public_content(&self, filter: &ContentFilter) -> Vec<ContentRecord>;
    async fn get_public_content(&self, id: Uuid) -> Option<ContentRecord>;

    // --- Moderation Reads ---
    async fn get_content(&self, id: Uuid) -> Option<ContentRecord>;
    async fn list_content(&self, filter: &ModerationFilter) -> Vec<ContentRecord>;
    async fn list_content_by_author(&self, user_id: Uuid) -> Vec<ContentRecord>;
    async fn get_stats(&self) -> ModerationStats;

    // --- Content Writes ---
    /// Inserts a `pending` record with verdict `none`.
    async fn create_content(
        &self,
        req: SubmitContentRequest,
        created_by: Uuid,
    ) -> Result<ContentRecord, AppError>;
    /// `pending -> ai_verifying`. None if the record is missing or not pending.
    async fn begin_verification(&self, id: Uuid) -> Option<ContentRecord>;
    /// `pending|ai_verifying -> approved|rejected`. None if the record is missing, no
    /// longer reviewable, or carries an `error` verdict without the override.
    async fn set_review(&self, id: Uuid, review: Review) -> Option<ContentRecord>;
    /// `approved|rejected -> pending`, clearing review fields and the override.
    async fn reopen_content(&self, id: Uuid) -> Option<ContentRecord>;
    /// Partial edit of a non-terminal record. Content changes bump `version` and
    /// reset the verdict.
    async fn update_content(&self, id: Uuid, req: &UpdateContentRequest) -> Option<ContentRecord>;
    /// Writes a verdict for `version` of a non-terminal record. False when the record
    /// is gone, was edited since, or was already decided.
    async fn record_verdict(&self, id: Uuid, version: i32, verdict: &Verdict) -> bool;
    async fn delete_content(&self, id: Uuid) -> bool;

    // --- Users ---
    async fn get_user(&self, id: Uuid) -> Option<User>;
    async fn create_user(&self, user: User) -> Result<User, AppError>;
    async fn set_user_role(&self, id: Uuid, role: Role) -> Option<User>;

    // --- Audit ---
    async fn record_audit(&self, entry: AuditEntry) -> Result<AuditEntry, AppError>;
    /// Most recent first.
    async fn list_audit(&self, limit: i64) -> Vec<AuditEntry>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const CONTENT_COLUMNS: &str = "id, kind, title, title_ta, description, description_ta, body, body_ta, \
     category, tags, status, ai_verification_result, ai_verification_notes, approval_override, \
     version, created_by, reviewed_by, reviewed_at, created_at, updated_at";

/// ILIKE pattern matching `search` anywhere, with its own `%`, `_` and `\\` taken literally.
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by the PostgreSQL database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_content(
        &self,
        sql: &str,
        id: Uuid,
        context: &str,
    ) -> Option<ContentRecord> {
        sqlx::query_as::<_, ContentRecord>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("{} error: {:?}", context, e);
                None
            })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// list_public_content
    ///
    /// Builds the filter with QueryBuilder for safe parameterization.
    /// **Security**: `status = 'approved'` is part of the base query, not of the filter.
    async fn list_public_content(&self, filter: &ContentFilter) -> Vec<ContentRecord> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE status = 'approved'"
        ));

        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind);
        }

        if let Some(category) = &filter.category {
            builder.push(" AND category = ");
            builder.push_bind(category.clone());
        }

        if let Some(search) = &filter.search {
            let pattern = contains_pattern(search);
            builder.push(" AND (title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR title_ta ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR description ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR description_ta ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        let (limit, offset) = filter.limit_offset();
        builder.push(" ORDER BY updated_at DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        match builder
            .build_query_as::<ContentRecord>()
            .fetch_all(&self.pool)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("list_public_content error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_public_content(&self, id: Uuid) -> Option<ContentRecord> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE id = $1 AND status = 'approved'"
        );
        self.fetch_one_content(&sql, id, "get_public_content").await
    }

    async fn get_content(&self, id: Uuid) -> Option<ContentRecord> {
        let sql = format!("SELECT {CONTENT_COLUMNS} FROM content_items WHERE id = $1");
        self.fetch_one_content(&sql, id, "get_content").await
    }

    /// list_content
    ///
    /// Admin queue. Undecided records first, oldest first within a status.
    async fn list_content(&self, filter: &ModerationFilter) -> Vec<ContentRecord> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE TRUE"
        ));

        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind);
        }
        if let Some(verdict) = filter.verdict {
            builder.push(" AND ai_verification_result = ");
            builder.push_bind(verdict);
        }

        builder.push(
            " ORDER BY CASE WHEN status IN ('pending', 'ai_verifying') THEN 0 ELSE 1 END, created_at ASC",
        );

        match builder
            .build_query_as::<ContentRecord>()
            .fetch_all(&self.pool)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("list_content error: {:?}", e);
                vec![]
            }
        }
    }

    async fn list_content_by_author(&self, user_id: Uuid) -> Vec<ContentRecord> {
        let sql = format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE created_by = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, ContentRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_content_by_author error: {:?}", e);
                vec![]
            })
    }

    /// get_stats
    ///
    /// All counters in a single pass over `content_items`.
    async fn get_stats(&self) -> ModerationStats {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, i64, i64)>(
            r#"SELECT
                   COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'pending'),
                   COUNT(*) FILTER (WHERE status = 'ai_verifying'),
                   COUNT(*) FILTER (WHERE status = 'approved'),
                   COUNT(*) FILTER (WHERE status = 'rejected'),
                   COUNT(*) FILTER (WHERE ai_verification_result = 'error')
               FROM content_items"#,
        )
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok((total, pending, ai_verifying, approved, rejected, verification_errors)) => {
                ModerationStats {
                    total,
                    pending,
                    ai_verifying,
                    approved,
                    rejected,
                    verification_errors,
                }
            }
            Err(e) => {
                tracing::error!("get_stats error: {:?}", e);
                ModerationStats::default()
            }
        }
    }

    async fn create_content(
        &self,
        req: SubmitContentRequest,
        created_by: Uuid,
    ) -> Result<ContentRecord, AppError> {
        let sql = format!(
            r#"INSERT INTO content_items (
                   id, kind, title, title_ta, description, description_ta, body, body_ta,
                   category, tags, status, ai_verification_result, ai_verification_notes,
                   approval_override, version, created_by, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending', 'none', '', false, 1, $11, NOW(), NOW())
               RETURNING {CONTENT_COLUMNS}"#
        );

        let record = sqlx::query_as::<_, ContentRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.kind)
            .bind(req.title)
            .bind(req.title_ta)
            .bind(req.description)
            .bind(req.description_ta)
            .bind(req.body)
            .bind(req.body_ta)
            .bind(req.category)
            .bind(req.tags)
            .bind(created_by)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn begin_verification(&self, id: Uuid) -> Option<ContentRecord> {
        let sql = format!(
            r#"UPDATE content_items
               SET status = 'ai_verifying', updated_at = NOW()
               WHERE id = $1 AND status = 'pending'
               RETURNING {CONTENT_COLUMNS}"#
        );
        self.fetch_one_content(&sql, id, "begin_verification").await
    }

    /// set_review
    ///
    /// The eligibility check lives in the WHERE clause so that two racing admins
    /// cannot both decide the same record.
    async fn set_review(&self, id: Uuid, review: Review) -> Option<ContentRecord> {
        let sql = format!(
            r#"UPDATE content_items
               SET status = $2, reviewed_by = $3, reviewed_at = NOW(),
                   approval_override = $4, updated_at = NOW()
               WHERE id = $1
                 AND status IN ('pending', 'ai_verifying')
                 AND (NOT $5 OR ai_verification_result <> 'error')
               RETURNING {CONTENT_COLUMNS}"#
        );
        sqlx::query_as::<_, ContentRecord>(&sql)
            .bind(id)
            .bind(review.status)
            .bind(review.reviewed_by)
            .bind(review.approval_override)
            .bind(review.requires_clean_verdict())
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("set_review error: {:?}", e);
                None
            })
    }

    async fn reopen_content(&self, id: Uuid) -> Option<ContentRecord> {
        let sql = format!(
            r#"UPDATE content_items
               SET status = 'pending', reviewed_by = NULL, reviewed_at = NULL,
                   approval_override = false, updated_at = NOW()
               WHERE id = $1 AND status IN ('approved', 'rejected')
               RETURNING {CONTENT_COLUMNS}"#
        );
        self.fetch_one_content(&sql, id, "reopen_content").await
    }

    /// update_content
    ///
    /// COALESCE keeps columns whose field is `None`. A content change bumps the
    /// version and resets the advisory verdict, which no longer describes the text.
    async fn update_content(&self, id: Uuid, req: &UpdateContentRequest) -> Option<ContentRecord> {
        let sql = format!(
            r#"UPDATE content_items
               SET title = COALESCE($2, title),
                   title_ta = COALESCE($3, title_ta),
                   description = COALESCE($4, description),
                   description_ta = COALESCE($5, description_ta),
                   body = COALESCE($6, body),
                   body_ta = COALESCE($7, body_ta),
                   category = COALESCE($8, category),
                   tags = COALESCE($9, tags),
                   version = CASE WHEN $10 THEN version + 1 ELSE version END,
                   ai_verification_result = CASE WHEN $10 THEN 'none'::verification_result ELSE ai_verification_result END,
                   ai_verification_notes = CASE WHEN $10 THEN '' ELSE ai_verification_notes END,
                   updated_at = NOW()
               WHERE id = $1 AND status IN ('pending', 'ai_verifying')
               RETURNING {CONTENT_COLUMNS}"#
        );

        sqlx::query_as::<_, ContentRecord>(&sql)
            .bind(id)
            .bind(req.title.as_ref().map(|t| t.en.clone()))
            .bind(req.title.as_ref().map(|t| t.ta.clone()))
            .bind(req.description.as_ref().map(|t| t.en.clone()))
            .bind(req.description.as_ref().map(|t| t.ta.clone()))
            .bind(req.body.as_ref().map(|t| t.en.clone()))
            .bind(req.body.as_ref().map(|t| t.ta.clone()))
            .bind(req.category.clone())
            .bind(req.tags.clone())
            .bind(req.changes_content())
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_content error: {:?}", e);
                None
            })
    }

    /// record_verdict
    ///
    /// Field-scoped write: `status` is never touched here.
    async fn record_verdict(&self, id: Uuid, version: i32, verdict: &Verdict) -> bool {
        let result = sqlx::query(
            r#"UPDATE content_items
               SET ai_verification_result = $3, ai_verification_notes = $4, updated_at = NOW()
               WHERE id = $1 AND version = $2 AND status IN ('pending', 'ai_verifying')"#,
        )
        .bind(id)
        .bind(version)
        .bind(verdict.result)
        .bind(&verdict.notes)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("record_verdict error: {:?}", e);
                false
            }
        }
    }

    async fn delete_content(&self, id: Uuid) -> bool {
        match sqlx::query("DELETE FROM content_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_content error: {:?}", e);
                false
            }
        }
    }

    /// get_user
    ///
    /// Retrieves the profile (id, email, display name, role) behind an identity.
    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>("SELECT id, email, display_name, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    /// create_user
    ///
    /// Creates the mirroring profile after the first successful credential exchange.
    async fn create_user(&self, user: User) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(
            r#"INSERT INTO profiles (id, email, display_name, role) VALUES ($1, $2, $3, $4)
               ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
               RETURNING id, email, display_name, role"#,
        )
        .bind(user.id)
        .bind(user.email)
        .bind(user.display_name)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Option<User> {
        sqlx::query_as::<_, User>(
            "UPDATE profiles SET role = $2 WHERE id = $1 RETURNING id, email, display_name, role",
        )
        .bind(id)
        .bind(role)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("set_user_role error: {:?}", e);
            None
        })
    }

    async fn record_audit(&self, entry: AuditEntry) -> Result<AuditEntry, AppError> {
        let stored = sqlx::query_as::<_, AuditEntry>(
            r#"INSERT INTO audit_logs (id, action, performed_by, entity, entity_id, "timestamp", details)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, action, performed_by, entity, entity_id, "timestamp", details"#,
        )
        .bind(entry.id)
        .bind(entry.action)
        .bind(entry.performed_by)
        .bind(entry.entity)
        .bind(entry.entity_id)
        .bind(entry.timestamp)
        .bind(entry.details)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn list_audit(&self, limit: i64) -> Vec<AuditEntry> {
        sqlx::query_as::<_, AuditEntry>(
            r#"SELECT id, action, performed_by, entity, entity_id, "timestamp", details
               FROM audit_logs ORDER BY "timestamp" DESC LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_audit error: {:?}", e);
            vec![]
        })
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct MemoryTables {
    content: HashMap<Uuid, ContentRecord>,
    users: HashMap<Uuid, User>,
    audit: Vec<AuditEntry>,
}

/// MemoryRepository
///
/// A `Repository` held in process memory with the same conditional-write semantics as
/// the Postgres implementation. Backs the test-suite.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a profile, bypassing the credential exchange.
    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    /// Snapshot of the audit trail, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables.read().await.audit.clone()
    }
}

fn matches_search(record: &ContentRecord, search: &str) -> bool {
    let needle = search.to_lowercase();
    [
        &record.title,
        &record.title_ta,
        &record.description,
        &record.description_ta,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_public_content(&self, filter: &ContentFilter) -> Vec<ContentRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<ContentRecord> = tables
            .content
            .values()
            .filter(|r| r.is_public())
            .filter(|r| filter.kind.is_none_or(|k| r.kind == k))
            .filter(|r| filter.category.as_ref().is_none_or(|c| &r.category == c))
            .filter(|r| filter.search.as_ref().is_none_or(|s| matches_search(r, s)))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let (limit, offset) = filter.limit_offset();
        records
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect()
    }

    async fn get_public_content(&self, id: Uuid) -> Option<ContentRecord> {
        self.get_content(id).await.filter(|r| r.is_public())
    }

    async fn get_content(&self, id: Uuid) -> Option<ContentRecord> {
        self.tables.read().await.content.get(&id).cloned()
    }

    async fn list_content(&self, filter: &ModerationFilter) -> Vec<ContentRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<ContentRecord> = tables
            .content
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.kind.is_none_or(|k| r.kind == k))
            .filter(|r| filter.verdict.is_none_or(|v| r.ai_verification_result == v))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.status.is_terminal(), r.created_at));
        records
    }

    async fn list_content_by_author(&self, user_id: Uuid) -> Vec<ContentRecord> {
        let tables = self.tables.read().await;
        let mut records: Vec<ContentRecord> = tables
            .content
            .values()
            .filter(|r| r.created_by == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    async fn get_stats(&self) -> ModerationStats {
        let tables = self.tables.read().await;
        let count = |status: ContentStatus| {
            tables.content.values().filter(|r| r.status == status).count() as i64
        };
        ModerationStats {
            total: tables.content.len() as i64,
            pending: count(ContentStatus::Pending),
            ai_verifying: count(ContentStatus::AiVerifying),
            approved: count(ContentStatus::Approved),
            rejected: count(ContentStatus::Rejected),
            verification_errors: tables
                .content
                .values()
                .filter(|r| r.ai_verification_result == VerificationResult::Error)
                .count() as i64,
        }
    }

    async fn create_content(
        &self,
        req: SubmitContentRequest,
        created_by: Uuid,
    ) -> Result<ContentRecord, AppError> {
        let now = Utc::now();
        let record = ContentRecord {
            id: Uuid::new_v4(),
            kind: req.kind,
            title: req.title,
            title_ta: req.title_ta,
            description: req.description,
            description_ta: req.description_ta,
            body: req.body,
            body_ta: req.body_ta,
            category: req.category,
            tags: req.tags,
            status: ContentStatus::Pending,
            ai_verification_result: VerificationResult::None,
            ai_verification_notes: String::new(),
            approval_override: false,
            version: 1,
            created_by,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .content
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn begin_verification(&self, id: Uuid) -> Option<ContentRecord> {
        let mut tables = self.tables.write().await;
        let record = tables.content.get_mut(&id)?;
        if record.status != ContentStatus::Pending {
            return None;
        }
        record.status = ContentStatus::AiVerifying;
        record.updated_at = Utc::now();
        Some(record.clone())
    }

    async fn set_review(&self, id: Uuid, review: Review) -> Option<ContentRecord> {
        let mut tables = self.tables.write().await;
        let record = tables.content.get_mut(&id)?;
        if !ContentStatus::REVIEWABLE.contains(&record.status) {
            return None;
        }
        if review.requires_clean_verdict()
            && record.ai_verification_result == VerificationResult::Error
        {
            return None;
        }
        let now = Utc::now();
        record.status = review.status;
        record.reviewed_by = Some(review.reviewed_by);
        record.reviewed_at = Some(now);
        record.approval_override = review.approval_override;
        record.updated_at = now;
        Some(record.clone())
    }

    async fn reopen_content(&self, id: Uuid) -> Option<ContentRecord> {
        let mut tables = self.tables.write().await;
        let record = tables.content.get_mut(&id)?;
        if !record.status.is_terminal() {
            return None;
        }
        record.status = ContentStatus::Pending;
        record.reviewed_by = None;
        record.reviewed_at = None;
        record.approval_override = false;
        record.updated_at = Utc::now();
        Some(record.clone())
    }

    async fn update_content(&self, id: Uuid, req: &UpdateContentRequest) -> Option<ContentRecord> {
        let mut tables = self.tables.write().await;
        let record = tables.content.get_mut(&id)?;
        if record.status.is_terminal() {
            return None;
        }
        if let Some(title) = &req.title {
            record.title = title.en.clone();
            record.title_ta = title.ta.clone();
        }
        if let Some(description) = &req.description {
            record.description = description.en.clone();
            record.description_ta = description.ta.clone();
        }
        if let Some(body) = &req.body {
            record.body = body.en.clone();
            record.body_ta = body.ta.clone();
        }
        if let Some(category) = &req.category {
            record.category = category.clone();
        }
        if let Some(tags) = &req.tags {
            record.tags = tags.clone();
        }
        if req.changes_content() {
            record.version += 1;
            record.ai_verification_result = VerificationResult::None;
            record.ai_verification_notes.clear();
        }
        record.updated_at = Utc::now();
        Some(record.clone())
    }

    async fn record_verdict(&self, id: Uuid, version: i32, verdict: &Verdict) -> bool {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.content.get_mut(&id) else {
            return false;
        };
        if record.version != version || record.status.is_terminal() {
            return false;
        }
        record.ai_verification_result = verdict.result;
        record.ai_verification_notes = verdict.notes.clone();
        record.updated_at = Utc::now();
        true
    }

    async fn delete_content(&self, id: Uuid) -> bool {
        self.tables.write().await.content.remove(&id).is_some()
    }

    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.tables.read().await.users.get(&id).cloned()
    }

    async fn create_user(&self, user: User) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        let stored = tables.users.entry(user.id).or_insert(user);
        Ok(stored.clone())
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> Option<User> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&id)?;
        user.role = role;
        Some(user.clone())
    }

    async fn record_audit(&self, entry: AuditEntry) -> Result<AuditEntry, AppError> {
        self.tables.write().await.audit.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit(&self, limit: i64) -> Vec<AuditEntry> {
        let tables = self.tables.read().await;
        let mut entries = tables.audit.clone();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit.max(0) as usize);
        entries
    }
}
