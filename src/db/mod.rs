mod mysql;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::discord::{RoleId, UserId};

pub use mysql::{MySqlSettings, MySqlStore};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("malformed row {row}: {reason}")]
    Malformed { row: String, reason: String },
}

impl DbError {
    pub(crate) fn malformed(row: impl fmt::Display, reason: impl Into<String>) -> Self {
        DbError::Malformed {
            row: row.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        use ApplicationStatus::*;
        match self {
            Pending => "pending",
            Approved => "approved",
            Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ApplicationStatus::*;
        match s {
            "pending" => Ok(Pending),
            "approved" => Ok(Approved),
            "rejected" => Ok(Rejected),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

/// One row of `applications` that still needs handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationRow {
    pub id: i64,
    pub discord_id: UserId,
    pub status: ApplicationStatus,
    pub reason: Option<String>,
}

/// A `discord_users` row whose cooldown has run out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownRow {
    pub discord_id: UserId,
    pub original_role: Option<RoleId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedUser {
    pub discord_id: UserId,
    pub username: String,
    pub original_role: Option<RoleId>,
}

/// Reads a stored original-role column. Rows written before roles were
/// nullable hold the literal `None`.
pub fn parse_original_role(row: impl fmt::Display, raw: Option<&str>) -> DbResult<Option<RoleId>> {
    match raw.map(str::trim) {
        None | Some("") | Some("None") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| DbError::malformed(row, format!("original role {raw:?} is not a snowflake"))),
    }
}

/// Opens one connection per poll cycle.
#[async_trait]
pub trait Store: Send + Sync {
    async fn connect(&self) -> DbResult<Box<dyn Connection>>;

    async fn ping(&self) -> DbResult<()> {
        let conn = self.connect().await?;
        conn.close().await
    }
}

/// Every statement autocommits.
#[async_trait]
pub trait Connection: Send {
    /// Rows with status `pending` that are not yet notified, in id order.
    async fn pending_submissions(&mut self) -> DbResult<Vec<DbResult<ApplicationRow>>>;

    /// Rows with status `approved` or `rejected` that are not yet notified, in id order.
    async fn final_decisions(&mut self) -> DbResult<Vec<DbResult<ApplicationRow>>>;

    async fn mark_notified(&mut self, application: i64) -> DbResult<()>;

    async fn upsert_tracked_user(&mut self, user: &TrackedUser) -> DbResult<()>;

    /// `false` when the user has no tracked row.
    async fn set_cooldown_expiry(&mut self, user: UserId, expiry: PrimitiveDateTime) -> DbResult<bool>;

    /// Tracked users whose cooldown expiry lies in the past.
    async fn expired_cooldowns(&mut self) -> DbResult<Vec<DbResult<CooldownRow>>>;

    async fn clear_cooldown_expiry(&mut self, user: UserId) -> DbResult<()>;

    async fn close(self: Box<Self>) -> DbResult<()>;
}
