use std::{fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

use crate::{
    db::MySqlSettings,
    discord::{ChannelId, GuildId},
    roles::{RoleKind, Roles},
};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_POLL_SECONDS: u64 = 10;
const DEFAULT_COOLDOWN_POLL_SECONDS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub api_base: String,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub roles: Roles,
    pub mysql: MySqlSettings,
    pub poll_interval: Duration,
    pub cooldown_poll_interval: Duration,
    pub health_addr: Option<SocketAddr>,
}

// keeps the token and password out of logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base", &self.api_base)
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("roles", &self.roles)
            .field("mysql_host", &self.mysql.host)
            .field("mysql_database", &self.mysql.database)
            .field("poll_interval", &self.poll_interval)
            .field("cooldown_poll_interval", &self.cooldown_poll_interval)
            .field("health_addr", &self.health_addr)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Config, ConfigError> {
        Config::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
        let env = Env(lookup);

        let role = |kind: RoleKind| env.parse(kind.env_key());
        let roles = Roles {
            applicant: role(RoleKind::Applicant)?,
            premium_applicant: role(RoleKind::PremiumApplicant)?,
            awaiting_decision: role(RoleKind::AwaitingDecision)?,
            whitelisted: role(RoleKind::Whitelisted)?,
            cooldown: role(RoleKind::Cooldown)?,
        };

        Ok(Config {
            bot_token: env.required("BOT_TOKEN")?,
            api_base: env.optional("DISCORD_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_owned()),
            guild_id: env.parse("GUILD_ID")?,
            channel_id: env.parse("TARGET_CHANNEL_ID")?,
            roles,
            mysql: MySqlSettings {
                host: env.required("MYSQL_HOST")?,
                port: env.parse_or("MYSQL_PORT", DEFAULT_MYSQL_PORT)?,
                user: env.required("MYSQL_USER")?,
                password: env.required("MYSQL_PASSWORD")?,
                database: env.required("MYSQL_DATABASE")?,
                ssl_ca: env.optional("MYSQL_SSL_CA").map(PathBuf::from),
            },
            poll_interval: env.seconds("POLL_SECONDS", DEFAULT_POLL_SECONDS)?,
            cooldown_poll_interval: env.seconds("COOLDOWN_POLL_SECONDS", DEFAULT_COOLDOWN_POLL_SECONDS)?,
            health_addr: env.optional("HEALTH_ADDR").map(|raw| parse("HEALTH_ADDR", &raw)).transpose()?,
        })
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parse<T>(&self, key: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        parse(key, &self.required(key)?)
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(key) {
            Some(raw) => parse(key, &raw),
            None => Ok(default),
        }
    }

    fn seconds(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        match self.parse_or(key, default)? {
            0 => Err(ConfigError::Invalid {
                key,
                reason: "must be at least one second".to_owned(),
            }),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
