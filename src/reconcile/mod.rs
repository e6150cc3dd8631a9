//! The three polling reconcilers.
//!
//! Each cycle opens its own database connection, walks the qualifying rows in
//! order and writes the row's done-marker (`notified`, or a cleared cooldown
//! expiry) only after every chat-side effect for that row went through. A row
//! that fails is logged and left for the next tick; the rest of the batch
//! carries on.

mod cooldown;
mod decisions;
mod intake;
mod runner;

use std::{fmt, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::warn;

use crate::{
    clock::Clock,
    db::{Connection, DbError, Store},
    discord::{ChannelId, ChatPlatform, GuildId, PlatformError},
    res::Templates,
    roles::Roles,
};

pub use runner::{LastCycle, Status};

/// How long a rejected applicant waits before reapplying.
pub const COOLDOWN_DURATION: time::Duration = time::Duration::hours(24);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cycle {
    Intake,
    Decisions,
    Cooldowns,
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Cycle::*;
        f.write_str(match self {
            Intake => "intake",
            Decisions => "decisions",
            Cooldowns => "cooldowns",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum Outcome {
    Done,
    Skipped,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        *self == CycleReport::default()
    }

    fn tally(&mut self, cycle: Cycle, row: impl fmt::Display, result: Result<Outcome, ReconcileError>) {
        match result {
            Ok(Outcome::Done) => self.processed += 1,
            Ok(Outcome::Skipped) => {
                tracing::debug!(%cycle, %row, "row skipped, left for a later tick");
                self.skipped += 1;
            }
            Err(e) => {
                warn!(%cycle, %row, error = %e, "row failed, will retry next tick");
                self.failed += 1;
            }
        }
    }

    fn malformed(&mut self, cycle: Cycle, error: DbError) {
        warn!(%cycle, %error, "skipping malformed row");
        self.failed += 1;
    }
}

pub struct Reconciler {
    platform: Arc<dyn ChatPlatform>,
    store: Arc<dyn Store>,
    roles: Roles,
    guild_id: GuildId,
    channel_id: ChannelId,
    templates: Templates,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn Store>,
        roles: Roles,
        guild_id: GuildId,
        channel_id: ChannelId,
        templates: Templates,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Reconciler {
            platform,
            store,
            roles,
            guild_id,
            channel_id,
            templates,
            clock,
        }
    }

    pub async fn run_cycle(&self, cycle: Cycle) -> Result<CycleReport, ReconcileError> {
        use Cycle::*;
        match cycle {
            Intake => self.intake_cycle().await,
            Decisions => self.decision_cycle().await,
            Cooldowns => self.cooldown_cycle().await,
        }
    }

    fn cooldown_expiry(&self) -> PrimitiveDateTime {
        let expiry: OffsetDateTime = (self.clock.now() + COOLDOWN_DURATION).to_offset(UtcOffset::UTC);
        PrimitiveDateTime::new(expiry.date(), expiry.time())
    }
}

/// Closes a cycle's connection whatever the cycle's outcome.
async fn release(cycle: Cycle, conn: Box<dyn Connection>) {
    if let Err(e) = conn.close().await {
        warn!(%cycle, error = %e, "closing database connection failed");
    }
}
