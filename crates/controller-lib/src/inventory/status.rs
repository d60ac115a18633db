//! Archetype status resolution

use super::{collect_instances, group_instances, InventorySource};
use crate::archetype::ArchetypeSpec;
use crate::error::InventoryError;
use crate::models::{ArchetypeStatus, Instance};
use tracing::debug;

/// Build the observed status of an archetype from already collected instances
pub fn status_from_instances(instances: &[Instance], spec: &ArchetypeSpec) -> ArchetypeStatus {
    ArchetypeStatus {
        clusters: group_instances(instances, &spec.name_prefix),
    }
}

/// Query the inventory and resolve the archetype's clusters.
///
/// Only inventory errors are returned; they are not retried here.
pub async fn resolve_status(
    source: &dyn InventorySource,
    spec: &ArchetypeSpec,
) -> Result<ArchetypeStatus, InventoryError> {
    let instances = collect_instances(source).await?;
    let status = status_from_instances(&instances, spec);

    debug!(
        prefix = %spec.name_prefix,
        instances = instances.len(),
        clusters = status.len(),
        "Resolved archetype status"
    );

    Ok(status)
}
