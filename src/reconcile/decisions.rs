use tracing::{info, warn};

use crate::{
    db::{ApplicationRow, ApplicationStatus, Connection},
    discord::{manage_roles, resolve_member, Channel, Guild},
};

use super::{release, Cycle, CycleReport, Outcome, ReconcileError, Reconciler};

impl Reconciler {
    /// Applies approvals and rejections and announces them.
    ///
    /// Nothing is touched when either the guild or the announcement channel
    /// cannot be resolved, so every decision stays pending for the next tick.
    pub async fn decision_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let Some(guild) = self.platform.guild(self.guild_id).await? else {
            warn!(guild = %self.guild_id, "guild unavailable, skipping decisions");
            return Ok(CycleReport::default());
        };
        let Some(channel) = self.platform.channel(self.channel_id).await? else {
            warn!(channel = %self.channel_id, "announcement channel unavailable, skipping decisions");
            return Ok(CycleReport::default());
        };

        let mut conn = self.store.connect().await?;
        let report = self.decision_rows(&guild, channel, conn.as_mut()).await;
        release(Cycle::Decisions, conn).await;
        report
    }

    async fn decision_rows(
        &self,
        guild: &Guild,
        channel: Channel,
        conn: &mut dyn Connection,
    ) -> Result<CycleReport, ReconcileError> {
        let mut report = CycleReport::default();
        for row in conn.final_decisions().await? {
            match row {
                Ok(row) => {
                    let result = self.decision_row(guild, channel, conn, &row).await;
                    report.tally(Cycle::Decisions, row.id, result);
                }
                Err(e) => report.malformed(Cycle::Decisions, e),
            }
        }
        Ok(report)
    }

    async fn decision_row(
        &self,
        guild: &Guild,
        channel: Channel,
        conn: &mut dyn Connection,
        row: &ApplicationRow,
    ) -> Result<Outcome, ReconcileError> {
        let Some(member) = resolve_member(self.platform.as_ref(), guild, row.discord_id).await? else {
            return Ok(Outcome::Skipped);
        };
        info!(application = row.id, status = %row.status, member = %member.name, "processing decision");

        let awaiting = guild.role(self.roles.awaiting_decision);
        let embed = match row.status {
            ApplicationStatus::Approved => {
                manage_roles(
                    self.platform.as_ref(),
                    guild,
                    Some(&member),
                    &[guild.role(self.roles.whitelisted)],
                    &[awaiting],
                    "Application Approved",
                )
                .await?;
                self.templates.accepted.render(&member, None)
            }
            ApplicationStatus::Rejected => {
                manage_roles(
                    self.platform.as_ref(),
                    guild,
                    Some(&member),
                    &[guild.role(self.roles.cooldown)],
                    &[awaiting],
                    "Application Rejected",
                )
                .await?;

                if !conn.set_cooldown_expiry(member.id, self.cooldown_expiry()).await? {
                    warn!(application = row.id, member = %member.id, "no tracked user row, cooldown will not expire");
                }
                self.templates.rejected.render(&member, row.reason.as_deref())
            }
            ApplicationStatus::Pending => {
                warn!(application = row.id, "pending row among decisions");
                return Ok(Outcome::Skipped);
            }
        };

        self.platform.send_embed(channel.id, &embed).await?;
        conn.mark_notified(row.id).await?;
        Ok(Outcome::Done)
    }
}
