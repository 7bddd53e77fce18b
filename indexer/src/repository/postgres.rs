//! Postgres-backed repository and checkpoint store.
//!
//! Inserts use upsert semantics: changesets are replayed after a restart
//! (at-least-once delivery), so every write must tolerate seeing the same
//! event twice.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::changeset::{
    ApplicationUpdate, NewApplication, NewPendingProjectRole, NewProject, NewProjectRole,
    NewRound, ProjectRoleName, ProjectUpdate, RoundUpdate,
};
use crate::error::{RegistryError, RepositoryError};
use crate::events::types::{Address, ProcessorEvent};
use crate::registry::EventsRegistry;

use super::Repository;

/// [`Repository`] implementation over a Postgres pool.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Creates a repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_project(&self, project: &NewProject) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO projects (
                chain_id, id, name, anchor_address, metadata_cid, metadata,
                created_at_block, updated_at_block
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (chain_id, id) DO UPDATE SET
                name = EXCLUDED.name,
                anchor_address = EXCLUDED.anchor_address,
                metadata_cid = EXCLUDED.metadata_cid,
                metadata = EXCLUDED.metadata,
                updated_at_block = EXCLUDED.updated_at_block
            ",
        )
        .bind(project.chain_id as i64)
        .bind(&project.id)
        .bind(&project.name)
        .bind(project.anchor_address.as_ref().map(Address::as_str))
        .bind(&project.metadata_cid)
        .bind(&project.metadata)
        .bind(project.created_at_block as i64)
        .bind(project.updated_at_block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_project(
        &self,
        chain_id: u64,
        project_id: &str,
        update: &ProjectUpdate,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE projects SET
                name = COALESCE($3, name),
                metadata_cid = COALESCE($4, metadata_cid),
                metadata = COALESCE($5, metadata),
                updated_at_block = COALESCE($6, updated_at_block)
            WHERE chain_id = $1 AND id = $2
            ",
        )
        .bind(chain_id as i64)
        .bind(project_id)
        .bind(&update.name)
        .bind(&update.metadata_cid)
        .bind(&update.metadata)
        .bind(update.updated_at_block.map(|b| b as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn project_exists(
        &self,
        chain_id: u64,
        project_id: &str,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM projects WHERE chain_id = $1 AND id = $2")
            .bind(chain_id as i64)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_project_role(&self, role: &NewProjectRole) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO project_roles (chain_id, project_id, address, role, created_at_block)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chain_id, project_id, address, role) DO NOTHING
            ",
        )
        .bind(role.chain_id as i64)
        .bind(&role.project_id)
        .bind(role.address.as_str())
        .bind(role.role.as_str())
        .bind(role.created_at_block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_project_role(
        &self,
        chain_id: u64,
        project_id: &str,
        address: &Address,
        role: ProjectRoleName,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            DELETE FROM project_roles
            WHERE chain_id = $1 AND project_id = $2 AND address = $3 AND role = $4
            ",
        )
        .bind(chain_id as i64)
        .bind(project_id)
        .bind(address.as_str())
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_pending_project_role(
        &self,
        role: &NewPendingProjectRole,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO pending_project_roles (chain_id, role, address, created_at_block)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (chain_id, role, address) DO NOTHING
            ",
        )
        .bind(role.chain_id as i64)
        .bind(&role.role)
        .bind(role.address.as_str())
        .bind(role.created_at_block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_pending_project_roles(
        &self,
        chain_id: u64,
        role: &str,
    ) -> Result<Vec<NewPendingProjectRole>, RepositoryError> {
        let rows = sqlx::query(
            r"
            SELECT role, address, created_at_block
            FROM pending_project_roles
            WHERE chain_id = $1 AND role = $2
            ",
        )
        .bind(chain_id as i64)
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(NewPendingProjectRole {
                    chain_id,
                    role: row.try_get("role")?,
                    address: Address::new(row.try_get::<String, _>("address")?),
                    created_at_block: row.try_get::<i64, _>("created_at_block")? as u64,
                })
            })
            .collect()
    }

    async fn delete_pending_project_roles(
        &self,
        chain_id: u64,
        role: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM pending_project_roles WHERE chain_id = $1 AND role = $2")
            .bind(chain_id as i64)
            .bind(role)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_round(&self, round: &NewRound) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO rounds (
                chain_id, id, project_id, strategy_address, strategy_id, strategy_name,
                token, match_amount, funded_amount, funded_amount_in_usd,
                metadata_cid, metadata,
                applications_start_time, applications_end_time,
                donations_start_time, donations_end_time,
                created_at_block, updated_at_block
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (chain_id, id) DO UPDATE SET
                project_id = EXCLUDED.project_id,
                strategy_address = EXCLUDED.strategy_address,
                strategy_id = EXCLUDED.strategy_id,
                strategy_name = EXCLUDED.strategy_name,
                token = EXCLUDED.token,
                match_amount = EXCLUDED.match_amount,
                metadata_cid = EXCLUDED.metadata_cid,
                metadata = EXCLUDED.metadata,
                updated_at_block = EXCLUDED.updated_at_block
            ",
        )
        .bind(round.chain_id as i64)
        .bind(&round.id)
        .bind(&round.project_id)
        .bind(round.strategy_address.as_str())
        .bind(round.strategy_id.as_str())
        .bind(&round.strategy_name)
        .bind(round.token.as_str())
        .bind(round.match_amount)
        .bind(round.funded_amount)
        .bind(round.funded_amount_in_usd)
        .bind(&round.metadata_cid)
        .bind(&round.metadata)
        .bind(round.applications_start_time)
        .bind(round.applications_end_time)
        .bind(round.donations_start_time)
        .bind(round.donations_end_time)
        .bind(round.created_at_block as i64)
        .bind(round.updated_at_block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_round(
        &self,
        chain_id: u64,
        round_id: &str,
        update: &RoundUpdate,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE rounds SET
                match_amount = COALESCE($3, match_amount),
                metadata_cid = COALESCE($4, metadata_cid),
                metadata = COALESCE($5, metadata),
                applications_start_time = COALESCE($6, applications_start_time),
                applications_end_time = COALESCE($7, applications_end_time),
                donations_start_time = COALESCE($8, donations_start_time),
                donations_end_time = COALESCE($9, donations_end_time),
                updated_at_block = COALESCE($10, updated_at_block)
            WHERE chain_id = $1 AND id = $2
            ",
        )
        .bind(chain_id as i64)
        .bind(round_id)
        .bind(update.match_amount)
        .bind(&update.metadata_cid)
        .bind(&update.metadata)
        .bind(update.applications_start_time)
        .bind(update.applications_end_time)
        .bind(update.donations_start_time)
        .bind(update.donations_end_time)
        .bind(update.updated_at_block.map(|b| b as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment_round_funded_amount(
        &self,
        chain_id: u64,
        round_id: &str,
        amount: Decimal,
        amount_in_usd: Decimal,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE rounds SET
                funded_amount = funded_amount + $3,
                funded_amount_in_usd = funded_amount_in_usd + $4
            WHERE chain_id = $1 AND id = $2
            ",
        )
        .bind(chain_id as i64)
        .bind(round_id)
        .bind(amount)
        .bind(amount_in_usd)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_round_token(
        &self,
        chain_id: u64,
        round_id: &str,
    ) -> Result<Option<Address>, RepositoryError> {
        let row = sqlx::query("SELECT token FROM rounds WHERE chain_id = $1 AND id = $2")
            .bind(chain_id as i64)
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            r.try_get::<String, _>("token")
                .map(Address::new)
                .map_err(RepositoryError::from)
        })
        .transpose()
    }

    async fn get_round_id_by_strategy_address(
        &self,
        chain_id: u64,
        strategy_address: &Address,
    ) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id FROM rounds WHERE chain_id = $1 AND strategy_address = $2",
        )
        .bind(chain_id as i64)
        .bind(strategy_address.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_get("id").map_err(RepositoryError::from))
            .transpose()
    }

    async fn insert_application(
        &self,
        application: &NewApplication,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO applications (
                chain_id, round_id, id, project_id, status, metadata_cid, metadata,
                created_at_block, updated_at_block
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (chain_id, round_id, id) DO UPDATE SET
                status = EXCLUDED.status,
                metadata_cid = EXCLUDED.metadata_cid,
                metadata = EXCLUDED.metadata,
                updated_at_block = EXCLUDED.updated_at_block
            ",
        )
        .bind(application.chain_id as i64)
        .bind(&application.round_id)
        .bind(&application.id)
        .bind(&application.project_id)
        .bind(application.status.as_str())
        .bind(&application.metadata_cid)
        .bind(&application.metadata)
        .bind(application.created_at_block as i64)
        .bind(application.updated_at_block as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_application(
        &self,
        chain_id: u64,
        round_id: &str,
        application_id: &str,
        update: &ApplicationUpdate,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE applications SET
                status = COALESCE($4, status),
                metadata_cid = COALESCE($5, metadata_cid),
                metadata = COALESCE($6, metadata),
                updated_at_block = COALESCE($7, updated_at_block)
            WHERE chain_id = $1 AND round_id = $2 AND id = $3
            ",
        )
        .bind(chain_id as i64)
        .bind(round_id)
        .bind(application_id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(&update.metadata_cid)
        .bind(&update.metadata)
        .bind(update.updated_at_block.map(|b| b as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Durable checkpoint store over Postgres.
///
/// One row per chain; the whole event is stored as JSON so the resume
/// position survives restarts.
pub struct PgEventsRegistry {
    pool: PgPool,
    chain_id: u64,
}

impl PgEventsRegistry {
    /// Creates a checkpoint store for one chain.
    #[must_use]
    pub const fn new(pool: PgPool, chain_id: u64) -> Self {
        Self { pool, chain_id }
    }
}

#[async_trait]
impl EventsRegistry for PgEventsRegistry {
    async fn last_processed_event(&self) -> Result<Option<ProcessorEvent>, RegistryError> {
        let row = sqlx::query("SELECT event FROM checkpoints WHERE chain_id = $1")
            .bind(self.chain_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RegistryError::Storage(e.to_string()))?;

        row.map(|r| {
            let value: serde_json::Value = r
                .try_get("event")
                .map_err(|e| RegistryError::Storage(e.to_string()))?;
            serde_json::from_value(value).map_err(|e| RegistryError::Storage(e.to_string()))
        })
        .transpose()
    }

    async fn save_last_processed_event(
        &mut self,
        event: &ProcessorEvent,
    ) -> Result<(), RegistryError> {
        let value =
            serde_json::to_value(event).map_err(|e| RegistryError::Storage(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO checkpoints (chain_id, event)
            VALUES ($1, $2)
            ON CONFLICT (chain_id) DO UPDATE SET event = EXCLUDED.event
            ",
        )
        .bind(self.chain_id as i64)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| RegistryError::Storage(e.to_string()))?;
        Ok(())
    }
}
