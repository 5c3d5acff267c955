// 👥 Actors and approval tiers
//
// Every workflow call carries the acting user explicitly. Roles are free-form
// strings (petugas, bendahara, manajer, ...); the role → tier mapping lives in
// ValidationConfig so clinics can rename roles without code changes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor id written into `approved_by` when a record is auto-approved
pub const SYSTEM_ACTOR_ID: &str = "system";

// ============================================================================
// APPROVAL TIER
// ============================================================================

/// Authority tier, ordered from least to most authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalTier {
    /// Can enter and submit records but approve nothing
    None,
    Supervisor,
    Manager,
}

impl ApprovalTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalTier::None => "none",
            ApprovalTier::Supervisor => "supervisor",
            ApprovalTier::Manager => "manager",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(ApprovalTier::None),
            "supervisor" => Some(ApprovalTier::Supervisor),
            "manager" => Some(ApprovalTier::Manager),
            _ => None,
        }
    }

    /// True when an actor holding `self` may decide a record requiring `required`
    pub fn covers(&self, required: ApprovalTier) -> bool {
        *self >= required
    }
}

impl fmt::Display for ApprovalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ACTOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: role.into(),
        }
    }

    /// The workflow itself, used for auto-approval
    pub fn system() -> Self {
        Actor::new(SYSTEM_ACTOR_ID, SYSTEM_ACTOR_ID)
    }

    pub fn is_system(&self) -> bool {
        self.id == SYSTEM_ACTOR_ID
    }
}
