mod http;
mod ids;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpPlatform;
pub use ids::{ChannelId, GuildId, RoleId, UserId};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("discord api returned {status}: {message}")]
    Api { status: u16, code: Option<u64>, message: String },

    #[error("invalid audit log reason: {0}")]
    InvalidReason(#[from] reqwest::header::InvalidHeaderValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: UserId,
    pub name: String,
    pub roles: Vec<RoleId>,
}

impl Member {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: GuildId,
    pub roles: Vec<RoleId>,
}

impl Guild {
    /// `None` when the guild has no such role.
    pub fn role(&self, id: RoleId) -> Option<RoleId> {
        self.roles.contains(&id).then_some(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub image_url: Option<String>,
}

/// The slice of the chat platform the bridge talks to.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn guild(&self, id: GuildId) -> Result<Option<Guild>, PlatformError>;

    async fn channel(&self, id: ChannelId) -> Result<Option<Channel>, PlatformError>;

    /// Roster lookup without a network round trip.
    async fn cached_member(&self, guild: GuildId, user: UserId) -> Option<Member>;

    /// `Ok(None)` when the platform does not know the member.
    async fn fetch_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>, PlatformError>;

    /// Grants `add` and revokes `remove`, recording `reason` in the audit log.
    /// Roles outside both lists are left as they are on the platform.
    async fn edit_member_roles(
        &self,
        guild: GuildId,
        user: UserId,
        add: &[RoleId],
        remove: &[RoleId],
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<(), PlatformError>;
}

pub async fn resolve_member(
    platform: &dyn ChatPlatform,
    guild: &Guild,
    user: UserId,
) -> Result<Option<Member>, PlatformError> {
    if let Some(member) = platform.cached_member(guild.id, user).await {
        return Ok(Some(member));
    }
    platform.fetch_member(guild.id, user).await
}

/// Adds then removes roles. `None` role references are dropped, and nothing
/// is sent when the member already matches.
pub async fn manage_roles(
    platform: &dyn ChatPlatform,
    guild: &Guild,
    member: Option<&Member>,
    add: &[Option<RoleId>],
    remove: &[Option<RoleId>],
    reason: &str,
) -> Result<(), PlatformError> {
    let Some(member) = member else {
        return Ok(());
    };

    let changes = RoleChanges::between(&member.roles, add, remove);
    if changes.is_empty() {
        tracing::debug!(member = %member.id, reason, "roles already in place");
        return Ok(());
    }

    platform
        .edit_member_roles(guild.id, member.id, &changes.add, &changes.remove, reason)
        .await?;
    tracing::debug!(member = %member.id, reason, added = ?changes.add, removed = ?changes.remove, "roles updated");
    Ok(())
}

/// The roles a member gains and loses; removal wins when a role is in both.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RoleChanges {
    pub add: Vec<RoleId>,
    pub remove: Vec<RoleId>,
}

impl RoleChanges {
    pub(crate) fn between(current: &[RoleId], add: &[Option<RoleId>], remove: &[Option<RoleId>]) -> Self {
        let removed = |role: &RoleId| remove.iter().flatten().any(|r| r == role);

        let mut changes = RoleChanges::default();
        for role in add.iter().flatten() {
            if !current.contains(role) && !removed(role) && !changes.add.contains(role) {
                changes.add.push(*role);
            }
        }
        for role in remove.iter().flatten() {
            if current.contains(role) && !changes.remove.contains(role) {
                changes.remove.push(*role);
            }
        }
        changes
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }

    /// Applies the changes to a known role list.
    pub(crate) fn apply(&self, roles: &mut Vec<RoleId>) {
        for role in &self.add {
            if !roles.contains(role) {
                roles.push(*role);
            }
        }
        roles.retain(|role| !self.remove.contains(role));
    }
}
