//! # Persistence contracts
//!
//! Interface-only: the worker owns these traits and nothing else. SQL-backed
//! implementations live with their deployments; [`crate::memory`] provides
//! the in-memory reference used by local development and tests.
//!
//! Transactional grouping is deliberately not required. Each step is
//! idempotent enough under pub/sub redelivery given the ingest endpoint's
//! HTTP-status contract.

use crate::model::{CampaignTotals, Device, DeliveryLog, SubscriberAddress};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// An opaque persistence failure. The pipeline treats these as transient
/// wherever a retry is safe.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// The active addresses of the given subscribers of `merchant_id`, each
    /// bundled with that subscription's notification radius.
    ///
    /// One row per qualifying address: a subscriber with several addresses
    /// appears several times, and any one row passing the radius filter
    /// qualifies the subscriber. Inactive addresses are filtered by the
    /// query, not the caller.
    ///
    /// # Errors
    ///
    /// Any failure here is transient from the pipeline's point of view.
    async fn find_subscriber_addresses(
        &self,
        merchant_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<Vec<SubscriberAddress>, StoreError>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Active devices for the given users.
    ///
    /// # Errors
    ///
    /// Any failure here is transient from the pipeline's point of view.
    async fn find_devices_for_users(&self, user_ids: &[Uuid]) -> Result<Vec<Device>, StoreError>;

    /// Removes a device whose token the delivery provider rejected.
    ///
    /// # Errors
    ///
    /// Failures are warned and swallowed by the caller; the device will be
    /// retried for deletion after the next campaign that hits it.
    async fn delete_device(&self, device_id: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Inserts the per-recipient delivery logs of one campaign attempt.
    ///
    /// # Errors
    ///
    /// Best-effort: the sends already happened, so the caller logs and moves
    /// on rather than triggering a redelivery.
    async fn batch_create_logs(&self, logs: &[DeliveryLog]) -> Result<(), StoreError>;

    /// Writes the campaign's final totals. Redelivered attempts overwrite
    /// with the newer attempt's numbers.
    ///
    /// # Errors
    ///
    /// Best-effort, as with [`CampaignStore::batch_create_logs`].
    async fn update_status(&self, totals: CampaignTotals) -> Result<(), StoreError>;
}
