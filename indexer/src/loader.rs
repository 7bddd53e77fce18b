//! Data loader: applies changesets to the repository.
//!
//! Application is sequential and stops at the first failure, so later
//! changesets never run against state their predecessors failed to
//! establish. The whole list is validated against the registered kinds
//! before anything executes; a single unknown kind rejects the batch.

use std::collections::HashSet;
use std::sync::Arc;

use crate::changeset::{Changeset, ChangesetKind};
use crate::error::{LoaderError, RepositoryError};
use crate::repository::Repository;

/// Outcome counters for one batch of changesets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Changesets attempted, including the failing one.
    pub num_executed: usize,
    /// Changesets applied successfully.
    pub num_successful: usize,
    /// Changesets that failed (0 or 1 under early-stop).
    pub num_failed: usize,
    /// Kinds applied successfully, in application order.
    pub applied: Vec<ChangesetKind>,
    /// Human-readable failure descriptions.
    pub errors: Vec<String>,
}

impl ExecutionResult {
    /// Returns true if every changeset in the batch applied.
    #[must_use]
    pub fn is_fully_successful(&self) -> bool {
        self.num_failed == 0
    }
}

/// Applies changesets through the repository port.
pub struct DataLoader {
    repository: Arc<dyn Repository>,
    registered: HashSet<ChangesetKind>,
}

impl DataLoader {
    /// Creates a loader handling every changeset kind.
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self::with_registered(repository, ChangesetKind::ALL)
    }

    /// Creates a loader handling only the given kinds.
    #[must_use]
    pub fn with_registered(
        repository: Arc<dyn Repository>,
        kinds: impl IntoIterator<Item = ChangesetKind>,
    ) -> Self {
        Self {
            repository,
            registered: kinds.into_iter().collect(),
        }
    }

    /// Applies a batch of changesets in order, stopping at the first
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::UnknownChangesets`] if any changeset kind is
    /// not registered; in that case nothing is applied, including valid
    /// changesets earlier in the list.
    pub async fn apply_changes(
        &self,
        changesets: &[Changeset],
    ) -> Result<ExecutionResult, LoaderError> {
        let mut unknown: Vec<&'static str> = Vec::new();
        for kind in changesets.iter().map(Changeset::kind) {
            if !self.registered.contains(&kind) && !unknown.contains(&kind.as_str()) {
                unknown.push(kind.as_str());
            }
        }
        if !unknown.is_empty() {
            return Err(LoaderError::UnknownChangesets(unknown));
        }

        let mut result = ExecutionResult::default();
        for changeset in changesets {
            result.num_executed += 1;
            match self.apply(changeset).await {
                Ok(()) => {
                    result.num_successful += 1;
                    result.applied.push(changeset.kind());
                }
                Err(e) => {
                    result.num_failed += 1;
                    result.errors.push(format!(
                        "Failed to apply changeset {}: {e}",
                        changeset.kind()
                    ));
                    break;
                }
            }
        }
        Ok(result)
    }

    async fn apply(&self, changeset: &Changeset) -> Result<(), RepositoryError> {
        match changeset {
            Changeset::InsertProject(project) => self.repository.insert_project(project).await,
            Changeset::UpdateProject {
                chain_id,
                project_id,
                update,
            } => {
                self.repository
                    .update_project(*chain_id, project_id, update)
                    .await
            }
            Changeset::InsertProjectRole(role) => {
                self.repository.insert_project_role(role).await
            }
            Changeset::DeleteProjectRole {
                chain_id,
                project_id,
                address,
                role,
            } => {
                self.repository
                    .delete_project_role(*chain_id, project_id, address, *role)
                    .await
            }
            Changeset::InsertPendingProjectRole(role) => {
                self.repository.insert_pending_project_role(role).await
            }
            Changeset::DeletePendingProjectRoles { chain_id, role } => {
                self.repository
                    .delete_pending_project_roles(*chain_id, role)
                    .await
            }
            Changeset::InsertRound(round) => self.repository.insert_round(round).await,
            Changeset::UpdateRound {
                chain_id,
                round_id,
                update,
            } => {
                self.repository
                    .update_round(*chain_id, round_id, update)
                    .await
            }
            Changeset::IncrementRoundFundedAmount {
                chain_id,
                round_id,
                amount,
                amount_in_usd,
            } => {
                self.repository
                    .increment_round_funded_amount(*chain_id, round_id, *amount, *amount_in_usd)
                    .await
            }
            Changeset::InsertApplication(application) => {
                self.repository.insert_application(application).await
            }
            Changeset::UpdateApplication {
                chain_id,
                round_id,
                application_id,
                update,
            } => {
                self.repository
                    .update_application(*chain_id, round_id, application_id, update)
                    .await
            }
        }
    }
}
