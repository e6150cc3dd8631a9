use crate::discord::{Member, RoleId};

/// The five roles the review flow moves members between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Applicant,
    PremiumApplicant,
    AwaitingDecision,
    Whitelisted,
    Cooldown,
}

impl RoleKind {
    pub const ALL: [RoleKind; 5] = [
        RoleKind::Applicant,
        RoleKind::PremiumApplicant,
        RoleKind::AwaitingDecision,
        RoleKind::Whitelisted,
        RoleKind::Cooldown,
    ];

    pub fn env_key(&self) -> &'static str {
        use RoleKind::*;
        match self {
            Applicant => "APPLICANT_ROLE_ID",
            PremiumApplicant => "PREMIUM_APPLICANT_ROLE_ID",
            AwaitingDecision => "AWAITING_DECISION_ROLE_ID",
            Whitelisted => "WHITELISTED_ROLE_ID",
            Cooldown => "COOLDOWN_ROLE_ID",
        }
    }
}

/// Configured role id for every [`RoleKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roles {
    pub applicant: RoleId,
    pub premium_applicant: RoleId,
    pub awaiting_decision: RoleId,
    pub whitelisted: RoleId,
    pub cooldown: RoleId,
}

impl Roles {
    pub fn id(&self, kind: RoleKind) -> RoleId {
        use RoleKind::*;
        match kind {
            Applicant => self.applicant,
            PremiumApplicant => self.premium_applicant,
            AwaitingDecision => self.awaiting_decision,
            Whitelisted => self.whitelisted,
            Cooldown => self.cooldown,
        }
    }

    pub fn kind_of(&self, id: RoleId) -> Option<RoleKind> {
        RoleKind::ALL.into_iter().find(|kind| self.id(*kind) == id)
    }

    /// The applicant role a member held before entering review.
    ///
    /// Premium wins when both are held; `None` when neither is.
    pub fn original_role(&self, member: &Member) -> Option<RoleKind> {
        if member.has_role(self.premium_applicant) {
            Some(RoleKind::PremiumApplicant)
        } else if member.has_role(self.applicant) {
            Some(RoleKind::Applicant)
        } else {
            None
        }
    }
}
