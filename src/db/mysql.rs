use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode},
    ConnectOptions, Connection as _,
};
use time::PrimitiveDateTime;

use crate::discord::UserId;

use super::{parse_original_role, ApplicationRow, Connection, CooldownRow, DbError, DbResult, Store, TrackedUser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MySqlSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_ca: Option<PathBuf>,
}

/// Hands out a fresh, unpooled connection for every cycle.
pub struct MySqlStore {
    options: MySqlConnectOptions,
}

impl MySqlStore {
    pub fn new(settings: &MySqlSettings) -> Self {
        let mut options = MySqlConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);

        if let Some(ca) = &settings.ssl_ca {
            options = options.ssl_mode(MySqlSslMode::VerifyCa).ssl_ca(ca);
        }

        MySqlStore { options }
    }
}

#[async_trait]
impl Store for MySqlStore {
    async fn connect(&self) -> DbResult<Box<dyn Connection>> {
        let conn = self.options.connect().await?;
        Ok(Box::new(MySqlSession { conn }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
}

type RawApplication = (i64, String, String, Option<String>);

fn application_row((id, discord_id, status, reason): RawApplication) -> DbResult<ApplicationRow> {
    Ok(ApplicationRow {
        id,
        discord_id: discord_id
            .parse()
            .map_err(|_| DbError::malformed(id, format!("discordId {discord_id:?} is not a snowflake")))?,
        status: status.parse().map_err(|e| DbError::malformed(id, e))?,
        reason,
    })
}

fn cooldown_row((discord_id, original_role): (String, Option<String>)) -> DbResult<CooldownRow> {
    Ok(CooldownRow {
        discord_id: discord_id
            .parse::<UserId>()
            .map_err(|_| DbError::malformed(&discord_id, "discord_id is not a snowflake"))?,
        original_role: parse_original_role(&discord_id, original_role.as_deref())?,
    })
}

impl MySqlSession {
    async fn applications(&mut self, sql: &'static str) -> DbResult<Vec<DbResult<ApplicationRow>>> {
        let rows: Vec<RawApplication> = sqlx::query_as(sql).fetch_all(&mut self.conn).await?;
        Ok(rows.into_iter().map(application_row).collect())
    }
}

#[async_trait]
impl Connection for MySqlSession {
    async fn pending_submissions(&mut self) -> DbResult<Vec<DbResult<ApplicationRow>>> {
        self.applications(
            "SELECT id, CAST(discordId AS CHAR), status, reason FROM applications \
             WHERE status = 'pending' AND notified = 0 ORDER BY id",
        )
        .await
    }

    async fn final_decisions(&mut self) -> DbResult<Vec<DbResult<ApplicationRow>>> {
        self.applications(
            "SELECT id, CAST(discordId AS CHAR), status, reason FROM applications \
             WHERE status IN ('approved', 'rejected') AND notified = 0 ORDER BY id",
        )
        .await
    }

    async fn mark_notified(&mut self, application: i64) -> DbResult<()> {
        sqlx::query("UPDATE applications SET notified = 1 WHERE id = ?")
            .bind(application)
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn upsert_tracked_user(&mut self, user: &TrackedUser) -> DbResult<()> {
        let discord_id = user.discord_id.to_string();
        let original_role = user.original_role.map(|role| role.to_string());
        sqlx::query(
            "INSERT INTO discord_users (discord_id, username, original_applicant_role_id) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE username = ?, original_applicant_role_id = ?",
        )
        .bind(&discord_id)
        .bind(&user.username)
        .bind(&original_role)
        .bind(&user.username)
        .bind(&original_role)
        .execute(&mut self.conn)
        .await?;
        Ok(())
    }

    async fn set_cooldown_expiry(&mut self, user: UserId, expiry: PrimitiveDateTime) -> DbResult<bool> {
        let result = sqlx::query("UPDATE discord_users SET cooldown_expiry = ? WHERE discord_id = ?")
            .bind(expiry)
            .bind(user.to_string())
            .execute(&mut self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn expired_cooldowns(&mut self) -> DbResult<Vec<DbResult<CooldownRow>>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT CAST(discord_id AS CHAR), CAST(original_applicant_role_id AS CHAR) FROM discord_users \
             WHERE cooldown_expiry IS NOT NULL AND cooldown_expiry < UTC_TIMESTAMP()",
        )
        .fetch_all(&mut self.conn)
        .await?;
        Ok(rows.into_iter().map(cooldown_row).collect())
    }

    async fn clear_cooldown_expiry(&mut self, user: UserId) -> DbResult<()> {
        sqlx::query("UPDATE discord_users SET cooldown_expiry = NULL WHERE discord_id = ?")
            .bind(user.to_string())
            .execute(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}
