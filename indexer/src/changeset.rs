//! Changesets: repository mutations derived from events.
//!
//! A [`Changeset`] is a serializable command describing one atomic
//! repository mutation. Changesets are the sole output of event processing
//! and the sole input to persistence, decoupling "what happened on-chain"
//! from "how it's stored". They are created by handlers and die after being
//! applied or logged; they are never retried or persisted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::types::{Address, StrategyId};

/// A pointer to off-chain metadata (protocol + content id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPointer {
    /// Metadata protocol; 1 means IPFS.
    pub protocol: u64,
    /// Content identifier within the protocol.
    pub pointer: String,
}

/// Role a member holds on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectRoleName {
    /// Profile owner.
    Owner,
    /// Profile member.
    Member,
}

impl ProjectRoleName {
    /// Returns the role name as stored in the repository.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }
}

/// Review status of a round application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Submitted, awaiting review.
    Pending,
    /// Accepted into the round.
    Approved,
    /// Rejected by a round manager.
    Rejected,
}

impl ApplicationStatus {
    /// Returns the status as stored in the repository.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// A new project row, derived from `Registry.ProfileCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    /// Chain the project lives on.
    pub chain_id: u64,
    /// Profile id (bytes32 hex).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Anchor contract address, if any.
    pub anchor_address: Option<Address>,
    /// Metadata content id.
    pub metadata_cid: Option<String>,
    /// Resolved metadata document.
    pub metadata: Option<serde_json::Value>,
    /// Block the project was created at.
    pub created_at_block: u64,
    /// Block the project was last updated at.
    pub updated_at_block: u64,
}

/// Partial update of a project row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New metadata content id.
    pub metadata_cid: Option<String>,
    /// New resolved metadata document.
    pub metadata: Option<serde_json::Value>,
    /// Block of the update.
    pub updated_at_block: Option<u64>,
}

/// A project role membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProjectRole {
    /// Chain the project lives on.
    pub chain_id: u64,
    /// Project (profile) id.
    pub project_id: String,
    /// Member address.
    pub address: Address,
    /// Role held by the address.
    pub role: ProjectRoleName,
    /// Block the role was granted at.
    pub created_at_block: u64,
}

/// A role granted before its profile exists.
///
/// `Registry.RoleGranted` can precede `Registry.ProfileCreated` within the
/// same transaction; the role is parked here and attached to the project
/// when the profile arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPendingProjectRole {
    /// Chain the role was granted on.
    pub chain_id: u64,
    /// Role hash (equals the future profile id).
    pub role: String,
    /// Grantee address.
    pub address: Address,
    /// Block the role was granted at.
    pub created_at_block: u64,
}

/// A new round row, derived from `Allo.PoolCreated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRound {
    /// Chain the round lives on.
    pub chain_id: u64,
    /// Pool id.
    pub id: String,
    /// Owning project (profile) id.
    pub project_id: String,
    /// Strategy contract address.
    pub strategy_address: Address,
    /// Strategy variant id.
    pub strategy_id: StrategyId,
    /// Human-readable strategy name, empty when the variant is unknown.
    pub strategy_name: String,
    /// Matching token address.
    pub token: Address,
    /// Match amount committed to the round.
    pub match_amount: Decimal,
    /// Total funded amount in token units.
    pub funded_amount: Decimal,
    /// Total funded amount in USD.
    pub funded_amount_in_usd: Decimal,
    /// Metadata content id.
    pub metadata_cid: Option<String>,
    /// Resolved metadata document.
    pub metadata: Option<serde_json::Value>,
    /// Application window start.
    pub applications_start_time: Option<DateTime<Utc>>,
    /// Application window end.
    pub applications_end_time: Option<DateTime<Utc>>,
    /// Donation window start.
    pub donations_start_time: Option<DateTime<Utc>>,
    /// Donation window end.
    pub donations_end_time: Option<DateTime<Utc>>,
    /// Block the round was created at.
    pub created_at_block: u64,
    /// Block the round was last updated at.
    pub updated_at_block: u64,
}

/// Partial update of a round row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundUpdate {
    /// New match amount.
    pub match_amount: Option<Decimal>,
    /// New metadata content id.
    pub metadata_cid: Option<String>,
    /// New resolved metadata document.
    pub metadata: Option<serde_json::Value>,
    /// New application window start.
    pub applications_start_time: Option<DateTime<Utc>>,
    /// New application window end.
    pub applications_end_time: Option<DateTime<Utc>>,
    /// New donation window start.
    pub donations_start_time: Option<DateTime<Utc>>,
    /// New donation window end.
    pub donations_end_time: Option<DateTime<Utc>>,
    /// Block of the update.
    pub updated_at_block: Option<u64>,
}

/// A new application row, derived from `Strategy.Registered`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    /// Chain the application lives on.
    pub chain_id: u64,
    /// Round the application targets.
    pub round_id: String,
    /// Application id (recipient id).
    pub id: String,
    /// Applying project id.
    pub project_id: String,
    /// Review status.
    pub status: ApplicationStatus,
    /// Metadata content id.
    pub metadata_cid: Option<String>,
    /// Resolved metadata document.
    pub metadata: Option<serde_json::Value>,
    /// Block the application was created at.
    pub created_at_block: u64,
    /// Block the application was last updated at.
    pub updated_at_block: u64,
}

/// Partial update of an application row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationUpdate {
    /// New review status.
    pub status: Option<ApplicationStatus>,
    /// New metadata content id.
    pub metadata_cid: Option<String>,
    /// New resolved metadata document.
    pub metadata: Option<serde_json::Value>,
    /// Block of the update.
    pub updated_at_block: Option<u64>,
}

/// One atomic repository mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Changeset {
    /// Insert a project row.
    InsertProject(NewProject),

    /// Patch a project row.
    UpdateProject {
        /// Chain of the project.
        chain_id: u64,
        /// Project id.
        project_id: String,
        /// Fields to update.
        update: ProjectUpdate,
    },

    /// Insert a project role row.
    InsertProjectRole(NewProjectRole),

    /// Delete one project role membership.
    DeleteProjectRole {
        /// Chain of the project.
        chain_id: u64,
        /// Project id.
        project_id: String,
        /// Member address.
        address: Address,
        /// Role to remove.
        role: ProjectRoleName,
    },

    /// Park a role granted before its profile exists.
    InsertPendingProjectRole(NewPendingProjectRole),

    /// Drop all parked roles for a role hash, after they were attached.
    DeletePendingProjectRoles {
        /// Chain of the roles.
        chain_id: u64,
        /// Role hash.
        role: String,
    },

    /// Insert a round row.
    InsertRound(NewRound),

    /// Patch a round row.
    UpdateRound {
        /// Chain of the round.
        chain_id: u64,
        /// Round id.
        round_id: String,
        /// Fields to update.
        update: RoundUpdate,
    },

    /// Add to a round's funded totals.
    IncrementRoundFundedAmount {
        /// Chain of the round.
        chain_id: u64,
        /// Round id.
        round_id: String,
        /// Amount in token units.
        amount: Decimal,
        /// Amount in USD.
        amount_in_usd: Decimal,
    },

    /// Insert an application row.
    InsertApplication(NewApplication),

    /// Patch an application row.
    UpdateApplication {
        /// Chain of the application.
        chain_id: u64,
        /// Round of the application.
        round_id: String,
        /// Application id.
        application_id: String,
        /// Fields to update.
        update: ApplicationUpdate,
    },
}

impl Changeset {
    /// Returns the kind tag of this changeset.
    #[must_use]
    pub const fn kind(&self) -> ChangesetKind {
        match self {
            Self::InsertProject(_) => ChangesetKind::InsertProject,
            Self::UpdateProject { .. } => ChangesetKind::UpdateProject,
            Self::InsertProjectRole(_) => ChangesetKind::InsertProjectRole,
            Self::DeleteProjectRole { .. } => ChangesetKind::DeleteProjectRole,
            Self::InsertPendingProjectRole(_) => ChangesetKind::InsertPendingProjectRole,
            Self::DeletePendingProjectRoles { .. } => ChangesetKind::DeletePendingProjectRoles,
            Self::InsertRound(_) => ChangesetKind::InsertRound,
            Self::UpdateRound { .. } => ChangesetKind::UpdateRound,
            Self::IncrementRoundFundedAmount { .. } => ChangesetKind::IncrementRoundFundedAmount,
            Self::InsertApplication(_) => ChangesetKind::InsertApplication,
            Self::UpdateApplication { .. } => ChangesetKind::UpdateApplication,
        }
    }
}

/// Kind tags for [`Changeset`] variants, used by the data loader's handler
/// registry and for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangesetKind {
    /// See [`Changeset::InsertProject`].
    InsertProject,
    /// See [`Changeset::UpdateProject`].
    UpdateProject,
    /// See [`Changeset::InsertProjectRole`].
    InsertProjectRole,
    /// See [`Changeset::DeleteProjectRole`].
    DeleteProjectRole,
    /// See [`Changeset::InsertPendingProjectRole`].
    InsertPendingProjectRole,
    /// See [`Changeset::DeletePendingProjectRoles`].
    DeletePendingProjectRoles,
    /// See [`Changeset::InsertRound`].
    InsertRound,
    /// See [`Changeset::UpdateRound`].
    UpdateRound,
    /// See [`Changeset::IncrementRoundFundedAmount`].
    IncrementRoundFundedAmount,
    /// See [`Changeset::InsertApplication`].
    InsertApplication,
    /// See [`Changeset::UpdateApplication`].
    UpdateApplication,
}

impl ChangesetKind {
    /// All kinds the pipeline can produce.
    pub const ALL: [Self; 11] = [
        Self::InsertProject,
        Self::UpdateProject,
        Self::InsertProjectRole,
        Self::DeleteProjectRole,
        Self::InsertPendingProjectRole,
        Self::DeletePendingProjectRoles,
        Self::InsertRound,
        Self::UpdateRound,
        Self::IncrementRoundFundedAmount,
        Self::InsertApplication,
        Self::UpdateApplication,
    ];

    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsertProject => "InsertProject",
            Self::UpdateProject => "UpdateProject",
            Self::InsertProjectRole => "InsertProjectRole",
            Self::DeleteProjectRole => "DeleteProjectRole",
            Self::InsertPendingProjectRole => "InsertPendingProjectRole",
            Self::DeletePendingProjectRoles => "DeletePendingProjectRoles",
            Self::InsertRound => "InsertRound",
            Self::UpdateRound => "UpdateRound",
            Self::IncrementRoundFundedAmount => "IncrementRoundFundedAmount",
            Self::InsertApplication => "InsertApplication",
            Self::UpdateApplication => "UpdateApplication",
        }
    }
}

impl std::fmt::Display for ChangesetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changeset_kind_roundtrip() {
        let changeset = Changeset::DeletePendingProjectRoles {
            chain_id: 1,
            role: "0xrole".to_string(),
        };
        assert_eq!(changeset.kind(), ChangesetKind::DeletePendingProjectRoles);
        assert_eq!(changeset.kind().as_str(), "DeletePendingProjectRoles");
    }

    #[test]
    fn test_changeset_kind_all_is_exhaustive() {
        // One representative changeset per variant must map into ALL.
        let increments = Changeset::IncrementRoundFundedAmount {
            chain_id: 1,
            round_id: "1".to_string(),
            amount: Decimal::new(100, 0),
            amount_in_usd: Decimal::new(5, 1),
        };
        assert!(ChangesetKind::ALL.contains(&increments.kind()));
        assert_eq!(ChangesetKind::ALL.len(), 11);
    }

    #[test]
    fn test_project_role_name_as_str() {
        assert_eq!(ProjectRoleName::Owner.as_str(), "owner");
        assert_eq!(ProjectRoleName::Member.as_str(), "member");
    }

    #[test]
    fn test_application_status_as_str() {
        assert_eq!(ApplicationStatus::Pending.as_str(), "PENDING");
        assert_eq!(ApplicationStatus::Approved.as_str(), "APPROVED");
        assert_eq!(ApplicationStatus::Rejected.as_str(), "REJECTED");
    }

    #[test]
    fn test_updates_default_to_untouched() {
        assert_eq!(ProjectUpdate::default(), ProjectUpdate::default());
        assert!(RoundUpdate::default().match_amount.is_none());
        assert!(ApplicationUpdate::default().status.is_none());
    }
}
