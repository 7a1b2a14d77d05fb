//! In-memory implementation of the persistence contracts.
//!
//! Backs local development (the loopback transport needs *some* store) and
//! every pipeline test. Not a cache: state lives for the process only.

use crate::model::{CampaignTotals, Device, DeliveryLog, SubscriberAddress};
use crate::store::{CampaignStore, DeviceStore, StoreError, SubscriptionStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    subscriptions: RwLock<Vec<(Uuid, SubscriberAddress)>>,
    devices: RwLock<Vec<Device>>,
    logs: RwLock<Vec<DeliveryLog>>,
    campaigns: RwLock<HashMap<Uuid, (u32, u32)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber address row for `merchant_id`.
    pub async fn add_subscription(&self, merchant_id: Uuid, row: SubscriberAddress) {
        self.subscriptions.write().await.push((merchant_id, row));
    }

    pub async fn add_device(&self, device: Device) {
        self.devices.write().await.push(device);
    }

    pub async fn logs(&self) -> Vec<DeliveryLog> {
        self.logs.read().await.clone()
    }

    pub async fn campaign_totals(&self, notification_id: Uuid) -> Option<(u32, u32)> {
        self.campaigns.read().await.get(&notification_id).copied()
    }

    pub async fn device_ids(&self) -> Vec<Uuid> {
        self.devices.read().await.iter().map(|d| d.id).collect()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_subscriber_addresses(
        &self,
        merchant_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<Vec<SubscriberAddress>, StoreError> {
        Ok(self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|(m, row)| {
                *m == merchant_id
                    && row.address.is_active
                    && user_ids.contains(&row.address.owner_id)
            })
            .map(|(_, row)| row.clone())
            .collect())
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn find_devices_for_users(&self, user_ids: &[Uuid]) -> Result<Vec<Device>, StoreError> {
        Ok(self
            .devices
            .read()
            .await
            .iter()
            .filter(|d| d.is_active && user_ids.contains(&d.user_id))
            .cloned()
            .collect())
    }

    async fn delete_device(&self, device_id: Uuid) -> Result<(), StoreError> {
        self.devices.write().await.retain(|d| d.id != device_id);
        Ok(())
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn batch_create_logs(&self, logs: &[DeliveryLog]) -> Result<(), StoreError> {
        self.logs.write().await.extend_from_slice(logs);
        Ok(())
    }

    async fn update_status(&self, totals: CampaignTotals) -> Result<(), StoreError> {
        self.campaigns
            .write()
            .await
            .insert(totals.notification_id, (totals.total_sent, totals.total_failed));
        Ok(())
    }
}
