#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use time::{macros::datetime, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use whitelist_bridge::{
    clock::Clock,
    db::{ApplicationRow, Connection, CooldownRow, DbError, DbResult, Store, TrackedUser, parse_original_role},
    discord::{Channel, ChannelId, ChatPlatform, Embed, Guild, GuildId, Member, PlatformError, RoleId, UserId},
    reconcile::Reconciler,
    res::Templates,
    roles::Roles,
};

pub const GUILD: GuildId = GuildId(1322660458888695818);
pub const CHANNEL: ChannelId = ChannelId(1411033400541708339);

pub const ROLES: Roles = Roles {
    applicant: RoleId(101),
    premium_applicant: RoleId(102),
    awaiting_decision: RoleId(103),
    whitelisted: RoleId(104),
    cooldown: RoleId(105),
};

pub struct ManualClock(Mutex<OffsetDateTime>);

impl ManualClock {
    pub fn new() -> Self {
        ManualClock(Mutex::new(datetime!(2025-09-01 12:00 UTC)))
    }

    pub fn advance(&self, by: time::Duration) {
        *self.0.lock().unwrap() += by;
    }

    pub fn now_primitive(&self) -> PrimitiveDateTime {
        let now = self.now().to_offset(UtcOffset::UTC);
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().unwrap()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub member: UserId,
    pub added: Vec<RoleId>,
    pub removed: Vec<RoleId>,
    pub reason: String,
}

pub struct FakePlatform {
    pub guild: Mutex<Option<Guild>>,
    pub channel: Mutex<Option<Channel>>,
    pub members: Mutex<HashMap<UserId, Member>>,
    pub edits: Mutex<Vec<Edit>>,
    pub sent: Mutex<Vec<(ChannelId, Embed)>>,
    pub deny_edits_for: Mutex<HashSet<UserId>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let guild_roles = [ROLES.applicant, ROLES.premium_applicant, ROLES.awaiting_decision, ROLES.whitelisted, ROLES.cooldown];
        FakePlatform {
            guild: Mutex::new(Some(Guild {
                id: GUILD,
                roles: guild_roles.to_vec(),
            })),
            channel: Mutex::new(Some(Channel { id: CHANNEL })),
            members: Mutex::new(HashMap::new()),
            edits: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            deny_edits_for: Mutex::new(HashSet::new()),
        }
    }

    pub fn add_member(&self, id: u64, name: &str, roles: &[RoleId]) {
        self.members.lock().unwrap().insert(
            UserId(id),
            Member {
                id: UserId(id),
                name: name.to_owned(),
                roles: roles.to_vec(),
            },
        );
    }

    pub fn roles_of(&self, id: u64) -> Vec<RoleId> {
        self.members.lock().unwrap()[&UserId(id)].roles.clone()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(ChannelId, Embed)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn guild(&self, id: GuildId) -> Result<Option<Guild>, PlatformError> {
        Ok(self.guild.lock().unwrap().clone().filter(|guild| guild.id == id))
    }

    async fn channel(&self, id: ChannelId) -> Result<Option<Channel>, PlatformError> {
        Ok(self.channel.lock().unwrap().filter(|channel| channel.id == id))
    }

    async fn cached_member(&self, _guild: GuildId, user: UserId) -> Option<Member> {
        self.members.lock().unwrap().get(&user).cloned()
    }

    async fn fetch_member(&self, _guild: GuildId, _user: UserId) -> Result<Option<Member>, PlatformError> {
        Ok(None)
    }

    async fn edit_member_roles(
        &self,
        _guild: GuildId,
        user: UserId,
        add: &[RoleId],
        remove: &[RoleId],
        reason: &str,
    ) -> Result<(), PlatformError> {
        if self.deny_edits_for.lock().unwrap().contains(&user) {
            return Err(PlatformError::Api {
                status: 403,
                code: Some(50013),
                message: "Missing Permissions".to_owned(),
            });
        }

        let mut members = self.members.lock().unwrap();
        let member = members.get_mut(&user).expect("edit for unknown member");
        for role in add {
            if !member.roles.contains(role) {
                member.roles.push(*role);
            }
        }
        member.roles.retain(|role| !remove.contains(role));
        self.edits.lock().unwrap().push(Edit {
            member: user,
            added: add.to_vec(),
            removed: remove.to_vec(),
            reason: reason.to_owned(),
        });
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<(), PlatformError> {
        self.sent.lock().unwrap().push((channel, embed.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationRecord {
    pub id: i64,
    pub discord_id: String,
    pub status: String,
    pub reason: Option<String>,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub original_role: Option<String>,
    pub cooldown_expiry: Option<PrimitiveDateTime>,
}

#[derive(Default)]
pub struct Tables {
    pub applications: Vec<ApplicationRecord>,
    pub users: BTreeMap<String, UserRecord>,
    pub opened: usize,
    pub closed: usize,
}

/// In-memory `applications` / `discord_users` with the same predicates as
/// the MySQL queries; "now" comes from the test clock.
pub struct FakeStore {
    pub tables: Arc<Mutex<Tables>>,
    clock: Arc<ManualClock>,
}

impl FakeStore {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        FakeStore {
            tables: Arc::new(Mutex::new(Tables::default())),
            clock,
        }
    }

    pub fn add_application(&self, id: i64, discord_id: &str, status: &str, reason: Option<&str>) {
        self.tables.lock().unwrap().applications.push(ApplicationRecord {
            id,
            discord_id: discord_id.to_owned(),
            status: status.to_owned(),
            reason: reason.map(str::to_owned),
            notified: false,
        });
    }

    pub fn add_user(&self, discord_id: &str, original_role: Option<&str>, cooldown_expiry: Option<PrimitiveDateTime>) {
        self.tables.lock().unwrap().users.insert(
            discord_id.to_owned(),
            UserRecord {
                username: "someone".to_owned(),
                original_role: original_role.map(str::to_owned),
                cooldown_expiry,
            },
        );
    }

    pub fn application(&self, id: i64) -> ApplicationRecord {
        self.tables
            .lock()
            .unwrap()
            .applications
            .iter()
            .find(|app| app.id == id)
            .cloned()
            .expect("no such application")
    }

    pub fn user(&self, discord_id: &str) -> Option<UserRecord> {
        self.tables.lock().unwrap().users.get(discord_id).cloned()
    }

    pub fn connections(&self) -> (usize, usize) {
        let tables = self.tables.lock().unwrap();
        (tables.opened, tables.closed)
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn connect(&self) -> DbResult<Box<dyn Connection>> {
        self.tables.lock().unwrap().opened += 1;
        Ok(Box::new(FakeConnection {
            tables: self.tables.clone(),
            clock: self.clock.clone(),
        }))
    }
}

struct FakeConnection {
    tables: Arc<Mutex<Tables>>,
    clock: Arc<ManualClock>,
}

fn to_row(app: &ApplicationRecord) -> DbResult<ApplicationRow> {
    let malformed = |reason: String| DbError::Malformed {
        row: app.id.to_string(),
        reason,
    };
    Ok(ApplicationRow {
        id: app.id,
        discord_id: app.discord_id.parse().map_err(|_| malformed("bad discordId".to_owned()))?,
        status: app.status.parse().map_err(malformed)?,
        reason: app.reason.clone(),
    })
}

impl FakeConnection {
    fn applications(&self, statuses: &[&str]) -> Vec<DbResult<ApplicationRow>> {
        let tables = self.tables.lock().unwrap();
        let mut apps: Vec<_> = tables
            .applications
            .iter()
            .filter(|app| !app.notified && statuses.contains(&app.status.as_str()))
            .collect();
        apps.sort_by_key(|app| app.id);
        apps.into_iter().map(to_row).collect()
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn pending_submissions(&mut self) -> DbResult<Vec<DbResult<ApplicationRow>>> {
        Ok(self.applications(&["pending"]))
    }

    async fn final_decisions(&mut self) -> DbResult<Vec<DbResult<ApplicationRow>>> {
        Ok(self.applications(&["approved", "rejected"]))
    }

    async fn mark_notified(&mut self, application: i64) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();
        for app in tables.applications.iter_mut().filter(|app| app.id == application) {
            app.notified = true;
        }
        Ok(())
    }

    async fn upsert_tracked_user(&mut self, user: &TrackedUser) -> DbResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let record = tables.users.entry(user.discord_id.to_string()).or_insert(UserRecord {
            username: String::new(),
            original_role: None,
            cooldown_expiry: None,
        });
        record.username = user.username.clone();
        record.original_role = user.original_role.map(|role| role.to_string());
        Ok(())
    }

    async fn set_cooldown_expiry(&mut self, user: UserId, expiry: PrimitiveDateTime) -> DbResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        match tables.users.get_mut(&user.to_string()) {
            Some(record) => {
                record.cooldown_expiry = Some(expiry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expired_cooldowns(&mut self) -> DbResult<Vec<DbResult<CooldownRow>>> {
        let now = self.clock.now_primitive();
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .filter(|(_, record)| record.cooldown_expiry.is_some_and(|expiry| expiry < now))
            .map(|(discord_id, record)| -> DbResult<CooldownRow> {
                Ok(CooldownRow {
                    discord_id: discord_id.parse().map_err(|_| DbError::Malformed {
                        row: discord_id.clone(),
                        reason: "bad discord_id".to_owned(),
                    })?,
                    original_role: parse_original_role(discord_id, record.original_role.as_deref())?,
                })
            })
            .collect())
    }

    async fn clear_cooldown_expiry(&mut self, user: UserId) -> DbResult<()> {
        if let Some(record) = self.tables.lock().unwrap().users.get_mut(&user.to_string()) {
            record.cooldown_expiry = None;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> DbResult<()> {
        self.tables.lock().unwrap().closed += 1;
        Ok(())
    }
}

pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub store: Arc<FakeStore>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(FakeStore::new(clock.clone()));
        let reconciler = Reconciler::new(
            platform.clone(),
            store.clone(),
            ROLES,
            GUILD,
            CHANNEL,
            Templates::builtin().unwrap(),
            clock.clone(),
        );
        Harness {
            platform,
            store,
            clock,
            reconciler,
        }
    }
}

/// The subset of `roles` that belongs to the review flow.
pub fn flow_roles(roles: &[RoleId]) -> Vec<RoleId> {
    let flow = [ROLES.applicant, ROLES.premium_applicant, ROLES.awaiting_decision, ROLES.whitelisted, ROLES.cooldown];
    roles.iter().copied().filter(|role| flow.contains(role)).collect()
}
