//! DNS Provider Seam
//!
//! The resolver and orchestrator only talk to the provider through this
//! trait, so the Route53 client can be swapped for an in-memory fake.

use async_trait::async_trait;

use crate::error::HookResult;
use crate::types::{ChangeBatch, ChangeInfo, ChangeStatus, Zone};

/// Record-management operations the hook needs from a DNS provider
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every hosted zone in the account
    async fn list_zones(&self) -> HookResult<Vec<Zone>>;

    /// Submit a change batch against a zone
    async fn submit_change_batch(&self, zone_id: &str, batch: &ChangeBatch)
        -> HookResult<ChangeInfo>;

    /// Current propagation status of a submitted change
    async fn get_change_status(&self, change_id: &str) -> HookResult<ChangeStatus>;

    /// Current TXT values (quoted) published at `record_name`
    async fn find_txt_values(&self, zone_id: &str, record_name: &str)
        -> HookResult<Vec<String>>;

    fn provider_name(&self) -> &str;
}
