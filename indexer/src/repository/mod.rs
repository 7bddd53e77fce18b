//! Repository port for domain records.
//!
//! The data loader writes through this port exclusively; handlers use its
//! read methods to resolve pending roles and strategy-address round lookups.
//! The port is keyed by `(chain_id, id)` or `(chain_id, strategy_address)`.

pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::changeset::{
    ApplicationUpdate, NewApplication, NewPendingProjectRole, NewProject, NewProjectRole,
    NewRound, ProjectRoleName, ProjectUpdate, RoundUpdate,
};
use crate::error::RepositoryError;
use crate::events::types::Address;

pub use postgres::{PgEventsRegistry, PgRepository};

/// CRUD and increment operations over projects, rounds and applications.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Inserts a project row.
    async fn insert_project(&self, project: &NewProject) -> Result<(), RepositoryError>;

    /// Patches a project row.
    async fn update_project(
        &self,
        chain_id: u64,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<(), RepositoryError>;

    /// Returns true if a project row exists.
    async fn project_exists(&self, chain_id: u64, project_id: &str)
        -> Result<bool, RepositoryError>;

    /// Inserts a project role row.
    async fn insert_project_role(&self, role: &NewProjectRole) -> Result<(), RepositoryError>;

    /// Deletes one project role membership.
    async fn delete_project_role(
        &self,
        chain_id: u64,
        project_id: &str,
        address: &Address,
        role: ProjectRoleName,
    ) -> Result<(), RepositoryError>;

    /// Parks a role granted before its profile exists.
    async fn insert_pending_project_role(
        &self,
        role: &NewPendingProjectRole,
    ) -> Result<(), RepositoryError>;

    /// Lists parked roles for a role hash.
    async fn get_pending_project_roles(
        &self,
        chain_id: u64,
        role: &str,
    ) -> Result<Vec<NewPendingProjectRole>, RepositoryError>;

    /// Drops all parked roles for a role hash.
    async fn delete_pending_project_roles(
        &self,
        chain_id: u64,
        role: &str,
    ) -> Result<(), RepositoryError>;

    /// Inserts a round row.
    async fn insert_round(&self, round: &NewRound) -> Result<(), RepositoryError>;

    /// Patches a round row.
    async fn update_round(
        &self,
        chain_id: u64,
        round_id: &str,
        update: &RoundUpdate,
    ) -> Result<(), RepositoryError>;

    /// Adds to a round's funded totals.
    async fn increment_round_funded_amount(
        &self,
        chain_id: u64,
        round_id: &str,
        amount: Decimal,
        amount_in_usd: Decimal,
    ) -> Result<(), RepositoryError>;

    /// Returns the matching token of a round.
    async fn get_round_token(
        &self,
        chain_id: u64,
        round_id: &str,
    ) -> Result<Option<Address>, RepositoryError>;

    /// Resolves the round owned by a strategy contract.
    async fn get_round_id_by_strategy_address(
        &self,
        chain_id: u64,
        strategy_address: &Address,
    ) -> Result<Option<String>, RepositoryError>;

    /// Inserts an application row.
    async fn insert_application(&self, application: &NewApplication)
        -> Result<(), RepositoryError>;

    /// Patches an application row.
    async fn update_application(
        &self,
        chain_id: u64,
        round_id: &str,
        application_id: &str,
        update: &ApplicationUpdate,
    ) -> Result<(), RepositoryError>;
}
