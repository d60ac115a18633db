//! Cloud inventory and cluster discovery
//!
//! This module turns the running instances reported by the cloud into
//! per-archetype cluster status. Cluster identity is derived purely from the
//! `Name` tag of each instance, see [`group_instances`].

mod aws_cli;
mod grouping;
mod status;

pub use aws_cli::{parse_describe_instances, AwsCliInventory, RUNNING_STATE_CODE};
pub use grouping::{cluster_name_for, group_instances};
pub use status::{resolve_status, status_from_instances};

use crate::error::InventoryError;
use crate::models::Instance;
use async_trait::async_trait;
use tracing::debug;

/// One page of running instances
#[derive(Debug, Clone, Default)]
pub struct InventoryPage {
    pub instances: Vec<Instance>,
    /// Token for the next page, `None` on the last page
    pub next_token: Option<String>,
}

/// Paginated source of running instances
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Fetch the page starting at `token` (`None` for the first page)
    async fn list_page(&self, token: Option<String>) -> Result<InventoryPage, InventoryError>;
}

/// Drain every page of `source`. Errors abort the drain; there are no retries.
pub async fn collect_instances(
    source: &dyn InventorySource,
) -> Result<Vec<Instance>, InventoryError> {
    let mut instances = Vec::new();
    let mut token = None;
    let mut pages = 0usize;

    loop {
        let page = source.list_page(token).await?;
        pages += 1;
        instances.extend(page.instances);

        match page.next_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }

    debug!(pages, instances = instances.len(), "Collected inventory");
    Ok(instances)
}

/// In-memory inventory, optionally split into fixed size pages
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    instances: Vec<Instance>,
    page_size: Option<usize>,
}

impl StaticInventory {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            instances,
            page_size: None,
        }
    }

    /// Serve the instances `page_size` at a time
    pub fn paginated(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Load instances from a JSON array of `{"name", "created_at"}` objects
    pub fn from_json(json: &str) -> Result<Self, InventoryError> {
        let instances: Vec<Instance> = serde_json::from_str(json)?;
        Ok(Self::new(instances))
    }
}

#[async_trait]
impl InventorySource for StaticInventory {
    async fn list_page(&self, token: Option<String>) -> Result<InventoryPage, InventoryError> {
        let Some(page_size) = self.page_size else {
            return Ok(InventoryPage {
                instances: self.instances.clone(),
                next_token: None,
            });
        };

        let start = match token {
            Some(t) => t
                .parse::<usize>()
                .map_err(|_| InventoryError::Query(format!("invalid page token {:?}", t)))?,
            None => 0,
        };
        let end = (start + page_size).min(self.instances.len());
        let instances = self.instances.get(start..end).unwrap_or_default().to_vec();
        let next_token = (end < self.instances.len()).then(|| end.to_string());

        Ok(InventoryPage {
            instances,
            next_token,
        })
    }
}
