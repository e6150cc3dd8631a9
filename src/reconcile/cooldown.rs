use tracing::{info, warn};

use crate::{
    db::{Connection, CooldownRow},
    discord::{manage_roles, resolve_member, Guild},
};

use super::{release, Cycle, CycleReport, Outcome, ReconcileError, Reconciler};

impl Reconciler {
    /// Hands rejected applicants their applicant role back once the
    /// cooldown has passed. Clearing the expiry is the only done-marker.
    pub async fn cooldown_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let Some(guild) = self.platform.guild(self.guild_id).await? else {
            warn!(guild = %self.guild_id, "guild unavailable, skipping cooldowns");
            return Ok(CycleReport::default());
        };

        let mut conn = self.store.connect().await?;
        let report = self.cooldown_rows(&guild, conn.as_mut()).await;
        release(Cycle::Cooldowns, conn).await;
        report
    }

    async fn cooldown_rows(&self, guild: &Guild, conn: &mut dyn Connection) -> Result<CycleReport, ReconcileError> {
        let mut report = CycleReport::default();
        for row in conn.expired_cooldowns().await? {
            match row {
                Ok(row) => {
                    let result = self.cooldown_row(guild, conn, &row).await;
                    report.tally(Cycle::Cooldowns, row.discord_id, result);
                }
                Err(e) => report.malformed(Cycle::Cooldowns, e),
            }
        }
        Ok(report)
    }

    async fn cooldown_row(
        &self,
        guild: &Guild,
        conn: &mut dyn Connection,
        row: &CooldownRow,
    ) -> Result<Outcome, ReconcileError> {
        let Some(member) = resolve_member(self.platform.as_ref(), guild, row.discord_id).await? else {
            return Ok(Outcome::Skipped);
        };
        let original = row.original_role.and_then(|role| self.roles.kind_of(role));
        info!(member = %member.name, ?original, "cooldown expired, restoring applicant role");

        manage_roles(
            self.platform.as_ref(),
            guild,
            Some(&member),
            &[row.original_role.and_then(|role| guild.role(role))],
            &[guild.role(self.roles.cooldown)],
            "Cooldown Expired",
        )
        .await?;

        conn.clear_cooldown_expiry(member.id).await?;
        Ok(Outcome::Done)
    }
}
