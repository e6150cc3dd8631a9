use tracing::{info, warn};

use crate::{
    db::{ApplicationRow, Connection, TrackedUser},
    discord::{manage_roles, resolve_member, Guild},
};

use super::{release, Cycle, CycleReport, Outcome, ReconcileError, Reconciler};

impl Reconciler {
    /// Moves freshly submitted applicants into the awaiting-decision role,
    /// remembering which applicant role they came from.
    pub async fn intake_cycle(&self) -> Result<CycleReport, ReconcileError> {
        let Some(guild) = self.platform.guild(self.guild_id).await? else {
            warn!(guild = %self.guild_id, "guild unavailable, skipping intake");
            return Ok(CycleReport::default());
        };

        let mut conn = self.store.connect().await?;
        let report = self.intake_rows(&guild, conn.as_mut()).await;
        release(Cycle::Intake, conn).await;
        report
    }

    async fn intake_rows(&self, guild: &Guild, conn: &mut dyn Connection) -> Result<CycleReport, ReconcileError> {
        let mut report = CycleReport::default();
        for row in conn.pending_submissions().await? {
            match row {
                Ok(row) => {
                    let result = self.intake_row(guild, conn, &row).await;
                    report.tally(Cycle::Intake, row.id, result);
                }
                Err(e) => report.malformed(Cycle::Intake, e),
            }
        }
        Ok(report)
    }

    async fn intake_row(
        &self,
        guild: &Guild,
        conn: &mut dyn Connection,
        row: &ApplicationRow,
    ) -> Result<Outcome, ReconcileError> {
        let Some(member) = resolve_member(self.platform.as_ref(), guild, row.discord_id).await? else {
            return Ok(Outcome::Skipped);
        };
        let original = self.roles.original_role(&member);
        info!(application = row.id, member = %member.name, ?original, "processing new submission");

        let original_role = original.map(|kind| self.roles.id(kind));
        conn.upsert_tracked_user(&TrackedUser {
            discord_id: member.id,
            username: member.name.clone(),
            original_role,
        })
        .await?;

        manage_roles(
            self.platform.as_ref(),
            guild,
            Some(&member),
            &[guild.role(self.roles.awaiting_decision)],
            &[guild.role(self.roles.applicant), guild.role(self.roles.premium_applicant)],
            "Application Submitted",
        )
        .await?;

        conn.mark_notified(row.id).await?;
        Ok(Outcome::Done)
    }
}
