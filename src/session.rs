use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Admin-class sessions are only honoured for this many hours after login.
pub const ADMIN_SESSION_TTL_HOURS: i64 = 24;

/// Role
///
/// The closed set of roles a profile can hold. All role decisions go through
/// `is_admin_class` / `accepted_by` rather than comparing strings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "user_role", rename_all = "kebab-case")]
#[ts(export)]
pub enum Role {
    User,
    Editor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Editor, Role::Admin, Role::SuperAdmin];
    pub const ADMIN_CLASS: [Role; 2] = [Role::Admin, Role::SuperAdmin];

    pub fn is_admin_class(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn class(&self) -> RoleClass {
        if self.is_admin_class() {
            RoleClass::Admin
        } else {
            RoleClass::Regular
        }
    }

    /// `super-admin` is accepted wherever `admin` is.
    pub fn accepted_by(&self, required: &[Role]) -> bool {
        required.contains(self) || (*self == Role::SuperAdmin && required.contains(&Role::Admin))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Editor => "editor",
            Role::Admin => "admin",
            Role::SuperAdmin => "super-admin",
        }
    }
}

/// Which slot of a session context a session lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleClass {
    Regular,
    Admin,
}

impl RoleClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleClass::Regular => "regular",
            RoleClass::Admin => "admin",
        }
    }
}

/// Identity
///
/// The resolved caller behind a session, as produced by the credential exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: Role,
}

/// Session
///
/// An immutable login record. Once issued it is only ever replaced or removed,
/// never mutated, so concurrent readers need no coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Session {
    pub identity: Identity,
    #[ts(type = "string")]
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: Identity, issued_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            issued_at,
        }
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }

    pub fn user_id(&self) -> Uuid {
        self.identity.user_id
    }

    /// Regular sessions never expire; admin-class ones expire strictly after the TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.role().is_admin_class()
            && now - self.issued_at > Duration::hours(ADMIN_SESSION_TTL_HOURS)
    }
}

/// Outcome of a lazy expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Active,
    Expired,
}

/// SessionStore
///
/// Persists the two session slots (regular and admin) of every session context.
/// A context is the per-client handle returned at login; it stands in for the
/// browser-local storage a client would otherwise keep its identity in.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stores `identity` in the slot matching its role class and clears the other slot.
    async fn issue_at(
        &self,
        context: Uuid,
        identity: Identity,
        issued_at: DateTime<Utc>,
    ) -> Result<Session, AppError>;

    /// Active session of the context, admin slot first.
    async fn current(&self, context: Uuid) -> Option<Session>;

    /// Removes every stored identity of the context.
    async fn clear(&self, context: Uuid);

    async fn issue(&self, context: Uuid, identity: Identity) -> Result<Session, AppError> {
        self.issue_at(context, identity, Utc::now()).await
    }

    /// Clears the context if `session` is an admin-class session past its window.
    async fn expire_at(&self, context: Uuid, session: &Session, now: DateTime<Utc>) -> Expiry {
        if session.is_expired_at(now) {
            tracing::info!(
                user_id = %session.user_id(),
                role = session.role().as_str(),
                "admin session expired, clearing context"
            );
            self.clear(context).await;
            Expiry::Expired
        } else {
            Expiry::Active
        }
    }

    async fn expire(&self, context: Uuid, session: &Session) -> Expiry {
        self.expire_at(context, session, Utc::now()).await
    }
}

/// SessionState
///
/// The shared handle to the session store held in `AppState`.
pub type SessionState = Arc<dyn SessionStore>;

// --- In-memory store ---

#[derive(Debug, Default, Clone)]
struct SessionSlots {
    regular: Option<Session>,
    admin: Option<Session>,
}

/// MemorySessionStore
///
/// Keeps session contexts in process memory. Used by the test-suite and by
/// tooling that runs without Postgres.
#[derive(Default)]
pub struct MemorySessionStore {
    contexts: RwLock<HashMap<Uuid, SessionSlots>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contexts holding at least one session.
    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn issue_at(
        &self,
        context: Uuid,
        identity: Identity,
        issued_at: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let session = Session::new(identity, issued_at);
        let slots = match session.role().class() {
            RoleClass::Admin => SessionSlots {
                regular: None,
                admin: Some(session.clone()),
            },
            RoleClass::Regular => SessionSlots {
                regular: Some(session.clone()),
                admin: None,
            },
        };
        self.contexts.write().await.insert(context, slots);
        Ok(session)
    }

    async fn current(&self, context: Uuid) -> Option<Session> {
        let contexts = self.contexts.read().await;
        let slots = contexts.get(&context)?;
        slots.admin.clone().or_else(|| slots.regular.clone())
    }

    async fn clear(&self, context: Uuid) {
        self.contexts.write().await.remove(&context);
    }
}

// --- Postgres store ---

#[derive(FromRow)]
struct SessionRow {
    user_id: Uuid,
    display_name: String,
    role: Role,
    issued_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session::new(
            Identity {
                user_id: row.user_id,
                display_name: row.display_name,
                role: row.role,
            },
            row.issued_at,
        )
    }
}

/// PostgresSessionStore
///
/// Session slots persisted in the `sessions` table, one row per (context, role class).
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PostgresSessionStore {
    /// Replaces the whole context inside one transaction so the two slots are
    /// never both populated.
    async fn issue_at(
        &self,
        context: Uuid,
        identity: Identity,
        issued_at: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM sessions WHERE context_id = $1")
            .bind(context)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"INSERT INTO sessions (context_id, role_class, user_id, display_name, role, issued_at)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(context)
        .bind(identity.role.class().as_str())
        .bind(identity.user_id)
        .bind(&identity.display_name)
        .bind(identity.role)
        .bind(issued_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Session::new(identity, issued_at))
    }

    async fn current(&self, context: Uuid) -> Option<Session> {
        sqlx::query_as::<_, SessionRow>(
            r#"SELECT user_id, display_name, role, issued_at
               FROM sessions
               WHERE context_id = $1
               ORDER BY CASE role_class WHEN 'admin' THEN 0 ELSE 1 END
               LIMIT 1"#,
        )
        .bind(context)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("session lookup error: {:?}", e);
            None
        })
        .map(Session::from)
    }

    async fn clear(&self, context: Uuid) {
        if let Err(e) = sqlx::query("DELETE FROM sessions WHERE context_id = $1")
            .bind(context)
            .execute(&self.pool)
            .await
        {
            tracing::error!("session clear error: {:?}", e);
        }
    }
}
