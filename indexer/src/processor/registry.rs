//! Profile registry contract events.
//!
//! Role grants and profile creation can land in either order within one
//! transaction, so `RoleGranted` for a profile that does not exist yet is
//! parked as a pending role and attached when `ProfileCreated` arrives.

use serde::Deserialize;

use crate::changeset::{
    Changeset, MetadataPointer, NewPendingProjectRole, NewProject, NewProjectRole, ProjectRoleName,
    ProjectUpdate,
};
use crate::error::ProcessingError;
use crate::events::types::{Address, ProcessorEvent};

use super::{decode_params, unsupported, EventProcessor};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileCreatedParams {
    profile_id: String,
    name: String,
    metadata: MetadataPointer,
    owner: Address,
    #[serde(default)]
    anchor: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileNameUpdatedParams {
    profile_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileMetadataUpdatedParams {
    profile_id: String,
    metadata: MetadataPointer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleChangedParams {
    role: String,
    account: Address,
}

/// Dispatches a Registry event to its handler.
pub(crate) async fn process(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    match event.event_name.as_str() {
        "ProfileCreated" => profile_created(processor, event).await,
        "ProfileNameUpdated" => profile_name_updated(event),
        "ProfileMetadataUpdated" => profile_metadata_updated(processor, event).await,
        "RoleGranted" => role_granted(processor, event).await,
        "RoleRevoked" => role_revoked(processor, event).await,
        _ => Err(unsupported(event)),
    }
}

/// `ProfileCreated`: a project row, its owner role, and any roles that were
/// granted before the profile existed.
async fn profile_created(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: ProfileCreatedParams = decode_params(event)?;
    let metadata = processor.resolve_metadata(&params.metadata).await?;

    let mut changesets = vec![
        Changeset::InsertProject(NewProject {
            chain_id: event.chain_id,
            id: params.profile_id.clone(),
            name: params.name,
            anchor_address: params.anchor,
            metadata_cid: Some(params.metadata.pointer),
            metadata,
            created_at_block: event.block_number,
            updated_at_block: event.block_number,
        }),
        Changeset::InsertProjectRole(NewProjectRole {
            chain_id: event.chain_id,
            project_id: params.profile_id.clone(),
            address: params.owner,
            role: ProjectRoleName::Owner,
            created_at_block: event.block_number,
        }),
    ];

    // The role hash of a profile equals its id, so roles parked under it
    // belong to this project.
    let pending = processor
        .pending_project_roles(event.chain_id, &params.profile_id)
        .await?;
    if !pending.is_empty() {
        for role in &pending {
            changesets.push(Changeset::InsertProjectRole(NewProjectRole {
                chain_id: event.chain_id,
                project_id: params.profile_id.clone(),
                address: role.address.clone(),
                role: ProjectRoleName::Member,
                created_at_block: role.created_at_block,
            }));
        }
        changesets.push(Changeset::DeletePendingProjectRoles {
            chain_id: event.chain_id,
            role: params.profile_id,
        });
    }

    Ok(changesets)
}

/// `ProfileNameUpdated`: rename only, metadata untouched.
fn profile_name_updated(event: &ProcessorEvent) -> Result<Vec<Changeset>, ProcessingError> {
    let params: ProfileNameUpdatedParams = decode_params(event)?;

    Ok(vec![Changeset::UpdateProject {
        chain_id: event.chain_id,
        project_id: params.profile_id,
        update: ProjectUpdate {
            name: Some(params.name),
            updated_at_block: Some(event.block_number),
            ..ProjectUpdate::default()
        },
    }])
}

/// `ProfileMetadataUpdated`: re-resolve and patch the metadata document.
async fn profile_metadata_updated(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: ProfileMetadataUpdatedParams = decode_params(event)?;
    let metadata = processor.resolve_metadata(&params.metadata).await?;

    Ok(vec![Changeset::UpdateProject {
        chain_id: event.chain_id,
        project_id: params.profile_id,
        update: ProjectUpdate {
            metadata_cid: Some(params.metadata.pointer),
            metadata,
            updated_at_block: Some(event.block_number),
            ..ProjectUpdate::default()
        },
    }])
}

/// `RoleGranted`: member role if the project exists, parked otherwise.
async fn role_granted(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: RoleChangedParams = decode_params(event)?;

    if processor.project_exists(event.chain_id, &params.role).await? {
        Ok(vec![Changeset::InsertProjectRole(NewProjectRole {
            chain_id: event.chain_id,
            project_id: params.role,
            address: params.account,
            role: ProjectRoleName::Member,
            created_at_block: event.block_number,
        })])
    } else {
        Ok(vec![Changeset::InsertPendingProjectRole(
            NewPendingProjectRole {
                chain_id: event.chain_id,
                role: params.role,
                address: params.account,
                created_at_block: event.block_number,
            },
        )])
    }
}

/// `RoleRevoked`: removal is a no-op when the project never materialized.
async fn role_revoked(
    processor: &EventProcessor,
    event: &ProcessorEvent,
) -> Result<Vec<Changeset>, ProcessingError> {
    let params: RoleChangedParams = decode_params(event)?;

    if processor.project_exists(event.chain_id, &params.role).await? {
        Ok(vec![Changeset::DeleteProjectRole {
            chain_id: event.chain_id,
            project_id: params.role,
            address: params.account,
            role: ProjectRoleName::Member,
        }])
    } else {
        Ok(Vec::new())
    }
}
