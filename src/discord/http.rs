use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use super::{
    Channel, ChannelId, ChatPlatform, Embed, Guild, GuildId, Member, PlatformError, RoleChanges, RoleId, UserId,
};

const MEMBER_TTL: Duration = Duration::from_secs(60);
const AUDIT_LOG_REASON: &str = "X-Audit-Log-Reason";

// json error codes meaning "no such thing"
const UNKNOWN_CHANNEL: u64 = 10003;
const UNKNOWN_GUILD: u64 = 10004;
const UNKNOWN_MEMBER: u64 = 10007;
const UNKNOWN_USER: u64 = 10013;

#[derive(Deserialize)]
struct GuildPayload {
    id: GuildId,
    roles: Vec<RolePayload>,
}

#[derive(Deserialize)]
struct RolePayload {
    id: RoleId,
}

#[derive(Deserialize)]
struct ChannelPayload {
    id: ChannelId,
}

#[derive(Deserialize)]
struct MemberPayload {
    user: UserPayload,
    roles: Vec<RoleId>,
}

#[derive(Deserialize)]
struct UserPayload {
    id: UserId,
    username: String,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: String,
}

impl From<MemberPayload> for Member {
    fn from(MemberPayload { user, roles }: MemberPayload) -> Self {
        Member {
            id: user.id,
            name: user.username,
            roles,
        }
    }
}

/// REST client for the Discord API with a short-lived member roster.
pub struct HttpPlatform {
    client: Client,
    api_base: String,
    member_ttl: Duration,
    roster: RwLock<HashMap<(GuildId, UserId), (Instant, Member)>>,
}

impl HttpPlatform {
    pub fn new(token: &str, api_base: &str) -> Result<Self, PlatformError> {
        let mut auth = header::HeaderValue::from_str(&format!("Bot {token}"))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("DiscordBot (whitelist-bridge, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()?;

        Ok(HttpPlatform {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
            member_ttl: MEMBER_TTL,
            roster: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    // stale entries are dropped on every write so the roster stays bounded
    async fn remember(&self, guild: GuildId, member: &Member) {
        let mut roster = self.roster.write().await;
        roster.retain(|_, (fetched_at, _)| fetched_at.elapsed() < self.member_ttl);
        roster.insert((guild, member.id), (Instant::now(), member.clone()));
    }

    async fn touch(&self, guild: GuildId, user: UserId, changes: &RoleChanges) {
        if let Some((_, member)) = self.roster.write().await.get_mut(&(guild, user)) {
            changes.apply(&mut member.roles);
        }
    }

    async fn role_request(
        &self,
        method: Method,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &header::HeaderValue,
    ) -> Result<(), PlatformError> {
        let url = self.url(&format!("/guilds/{guild}/members/{user}/roles/{role}"));
        let response = self
            .client
            .request(method, url)
            .header(AUDIT_LOG_REASON, reason.clone())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn forget(&self, guild: GuildId, user: UserId) {
        self.roster.write().await.remove(&(guild, user));
    }
}

async fn check(response: Response) -> Result<Response, PlatformError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body: ApiErrorBody = response.json().await.unwrap_or_default();
    Err(PlatformError::Api {
        status,
        code: body.code,
        message: body.message,
    })
}

/// Maps "unknown entity" responses to `Ok(None)`.
fn absent_if_unknown<T>(result: Result<T, PlatformError>) -> Result<Option<T>, PlatformError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(PlatformError::Api { status, code, .. })
            if status == StatusCode::NOT_FOUND.as_u16()
                && matches!(code, Some(UNKNOWN_CHANNEL | UNKNOWN_GUILD | UNKNOWN_MEMBER | UNKNOWN_USER)) =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ChatPlatform for HttpPlatform {
    async fn guild(&self, id: GuildId) -> Result<Option<Guild>, PlatformError> {
        let result: Result<Guild, PlatformError> = async {
            let response = check(self.client.get(self.url(&format!("/guilds/{id}"))).send().await?).await?;
            let GuildPayload { id, roles } = response.json().await?;
            Ok(Guild {
                id,
                roles: roles.into_iter().map(|role| role.id).collect(),
            })
        }
        .await;
        absent_if_unknown(result)
    }

    async fn channel(&self, id: ChannelId) -> Result<Option<Channel>, PlatformError> {
        let result: Result<Channel, PlatformError> = async {
            let response = check(self.client.get(self.url(&format!("/channels/{id}"))).send().await?).await?;
            let ChannelPayload { id } = response.json().await?;
            Ok(Channel { id })
        }
        .await;
        absent_if_unknown(result)
    }

    async fn cached_member(&self, guild: GuildId, user: UserId) -> Option<Member> {
        let roster = self.roster.read().await;
        let (fetched_at, member) = roster.get(&(guild, user))?;
        (fetched_at.elapsed() < self.member_ttl).then(|| member.clone())
    }

    async fn fetch_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>, PlatformError> {
        let result: Result<Member, PlatformError> = async {
            let response = check(
                self.client
                    .get(self.url(&format!("/guilds/{guild}/members/{user}")))
                    .send()
                    .await?,
            )
            .await?;
            let member: MemberPayload = response.json().await?;
            Ok(Member::from(member))
        }
        .await;

        let member = absent_if_unknown(result)?;
        match &member {
            Some(member) => self.remember(guild, member).await,
            None => self.forget(guild, user).await,
        }
        Ok(member)
    }

    async fn edit_member_roles(
        &self,
        guild: GuildId,
        user: UserId,
        add: &[RoleId],
        remove: &[RoleId],
        reason: &str,
    ) -> Result<(), PlatformError> {
        let reason = header::HeaderValue::from_str(reason)?;

        // one role per request, so roles granted elsewhere are never overwritten
        let result: Result<(), PlatformError> = async {
            for role in add {
                self.role_request(Method::PUT, guild, user, *role, &reason).await?;
            }
            for role in remove {
                self.role_request(Method::DELETE, guild, user, *role, &reason).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                let changes = RoleChanges {
                    add: add.to_vec(),
                    remove: remove.to_vec(),
                };
                self.touch(guild, user, &changes).await;
                Ok(())
            }
            Err(e) => {
                self.forget(guild, user).await;
                Err(e)
            }
        }
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<(), PlatformError> {
        let mut payload = json!({
            "title": embed.title,
            "description": embed.description,
            "color": embed.color,
        });
        if let Some(url) = &embed.image_url {
            payload["image"] = json!({ "url": url });
        }

        check(
            self.client
                .post(self.url(&format!("/channels/{channel}/messages")))
                .json(&json!({ "embeds": [payload] }))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}
