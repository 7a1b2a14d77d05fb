//! # The geo fan-out pipeline
//!
//! One `process` call per inbound campaign event. The steps run strictly in
//! order: validate ids, re-filter candidates by road distance against each
//! subscription's radius, load devices, send in provider-capped batches,
//! evict dead tokens, then best-effort persist logs and totals.
//!
//! Errors split by where they happen. Before any push goes out, persistence
//! failures surface as retryable so the transport redelivers. After pushes
//! have gone out, local recovery always wins: a redelivery would duplicate
//! user-visible notifications, so late failures are logged and swallowed.

use crate::delivery::{FCM_BATCH_LIMIT, PushDelivery};
use crate::error::ProcessError;
use crate::event::NotificationEvent;
use crate::model::{CampaignTotals, DeliveryLog, DeliveryStatus, Device};
use crate::store::{CampaignStore, DeviceStore, SubscriptionStore};
use async_trait::async_trait;
use hawker_roadgraph::{Coordinate, RouteResult, Router};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Fixed title of every merchant-open push.
pub const MERCHANT_OPEN_TITLE: &str = "Merchant Open Notification";

/// Log message recorded for tokens the provider classified as dead.
pub const INVALID_TOKEN_MESSAGE: &str = "invalid or unregistered token";

/// The road-distance seam between the pipeline and the routing engine.
#[async_trait]
pub trait RoadDistance: Send + Sync {
    /// One result per target, in target order.
    async fn one_to_many(&self, source: Coordinate, targets: &[Coordinate]) -> Vec<RouteResult>;
}

#[async_trait]
impl RoadDistance for Router {
    async fn one_to_many(&self, source: Coordinate, targets: &[Coordinate]) -> Vec<RouteResult> {
        Router::one_to_many(self, source, targets).await
    }
}

/// Summary of one completed campaign attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignReport {
    pub notification_id: Uuid,
    pub matched_subscribers: usize,
    pub devices: usize,
    pub total_sent: u32,
    pub total_failed: u32,
}

impl CampaignReport {
    const fn empty(notification_id: Uuid) -> Self {
        Self {
            notification_id,
            matched_subscribers: 0,
            devices: 0,
            total_sent: 0,
            total_failed: 0,
        }
    }
}

pub struct FanoutPipeline {
    router: Arc<dyn RoadDistance>,
    subscriptions: Arc<dyn SubscriptionStore>,
    devices: Arc<dyn DeviceStore>,
    campaigns: Arc<dyn CampaignStore>,
    delivery: Arc<dyn PushDelivery>,
}

impl FanoutPipeline {
    pub fn new(
        router: Arc<dyn RoadDistance>,
        subscriptions: Arc<dyn SubscriptionStore>,
        devices: Arc<dyn DeviceStore>,
        campaigns: Arc<dyn CampaignStore>,
        delivery: Arc<dyn PushDelivery>,
    ) -> Self {
        Self {
            router,
            subscriptions,
            devices,
            campaigns,
            delivery,
        }
    }

    /// Runs one campaign attempt end to end.
    ///
    /// # Errors
    ///
    /// [`ProcessError::Malformed`] when the event's ids do not parse (give
    /// up), [`ProcessError::Retryable`] when a pre-send persistence step
    /// fails (redeliver). Everything after the first push is handled
    /// locally and never surfaces.
    pub async fn process(&self, event: &NotificationEvent) -> Result<CampaignReport, ProcessError> {
        let started = Instant::now();

        // Step 1: ids must be well-formed; bad subscriber entries are
        // dropped rather than poisoning the campaign.
        let notification_id = Uuid::parse_str(&event.notification_id).map_err(|_| {
            ProcessError::Malformed(format!(
                "notification_id {:?} is not a UUID",
                event.notification_id
            ))
        })?;
        let merchant_id = Uuid::parse_str(&event.merchant_id).map_err(|_| {
            ProcessError::Malformed(format!("merchant_id {:?} is not a UUID", event.merchant_id))
        })?;
        let subscriber_ids: Vec<Uuid> = event
            .subscriber_ids
            .iter()
            .filter_map(|raw| Uuid::parse_str(raw).ok())
            .collect();
        if subscriber_ids.len() < event.subscriber_ids.len() {
            debug!(
                dropped = event.subscriber_ids.len() - subscriber_ids.len(),
                "dropped unparseable subscriber ids"
            );
        }

        // Step 2: nothing to do.
        if subscriber_ids.is_empty() {
            info!("campaign has no candidate subscribers");
            return Ok(CampaignReport::empty(notification_id));
        }

        // Step 3: re-filter candidates by road distance. Any one qualifying
        // address qualifies the subscriber.
        let candidate_rows = self
            .subscriptions
            .find_subscriber_addresses(merchant_id, &subscriber_ids)
            .await?;
        let targets: Vec<Coordinate> = candidate_rows
            .iter()
            .map(|row| Coordinate::new(row.address.lat, row.address.lng))
            .collect();
        let routes = self.router.one_to_many(event.coordinate(), &targets).await;

        let mut matched: Vec<Uuid> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        for (row, route) in candidate_rows.iter().zip(&routes) {
            if route.reachable
                && route.distance_km * 1000.0 <= row.notification_radius_m
                && seen.insert(row.address.owner_id)
            {
                matched.push(row.address.owner_id);
            }
        }
        if matched.is_empty() {
            info!("no subscriber within road-distance radius");
            return Ok(CampaignReport::empty(notification_id));
        }

        // Step 4: device lookup.
        let devices = self.devices.find_devices_for_users(&matched).await?;
        if devices.is_empty() {
            info!(
                matched_subscribers = matched.len(),
                "matched subscribers have no active devices"
            );
            return Ok(CampaignReport {
                matched_subscribers: matched.len(),
                ..CampaignReport::empty(notification_id)
            });
        }

        // Step 5: content.
        let (body, data) = build_content(event);

        // Step 6: batch sends, capped at the provider's limit. A transport
        // failure burns its chunk, not the campaign.
        let sent_at = chrono::Utc::now();
        let mut logs: Vec<DeliveryLog> = Vec::with_capacity(devices.len());
        let mut invalid_tokens: HashSet<String> = HashSet::new();
        let mut total_sent: u32 = 0;
        let mut total_failed: u32 = 0;

        for chunk in devices.chunks(FCM_BATCH_LIMIT) {
            let tokens: Vec<String> = chunk.iter().map(|d| d.push_token.clone()).collect();
            match self
                .delivery
                .send_batch(&tokens, MERCHANT_OPEN_TITLE, &body, &data)
                .await
            {
                Ok(outcome) => {
                    total_sent += outcome.success_count;
                    total_failed += outcome.failure_count;
                    let chunk_invalid: HashSet<&String> = outcome.invalid_tokens.iter().collect();
                    for device in chunk {
                        if chunk_invalid.contains(&device.push_token) {
                            invalid_tokens.insert(device.push_token.clone());
                            logs.push(log_row(
                                notification_id,
                                device,
                                DeliveryStatus::Failed,
                                Some(INVALID_TOKEN_MESSAGE.to_string()),
                                sent_at,
                            ));
                        } else {
                            logs.push(log_row(
                                notification_id,
                                device,
                                DeliveryStatus::Sent,
                                None,
                                sent_at,
                            ));
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, chunk = chunk.len(), "delivery batch failed");
                    #[expect(clippy::cast_possible_truncation)]
                    let chunk_len = chunk.len() as u32;
                    total_failed += chunk_len;
                    for device in chunk {
                        logs.push(log_row(
                            notification_id,
                            device,
                            DeliveryStatus::Failed,
                            Some(err.to_string()),
                            sent_at,
                        ));
                    }
                }
            }
        }

        // Step 7: evict dead tokens so the next campaign skips them. A
        // failed delete is only a warning.
        for device in devices.iter().filter(|d| invalid_tokens.contains(&d.push_token)) {
            if let Err(err) = self.devices.delete_device(device.id).await {
                warn!(device_id = %device.id, error = %err, "failed to delete invalid device");
            }
        }

        // Step 8: best-effort persistence. The sends already happened;
        // surfacing an error here would trade metrics drift for duplicate
        // pushes.
        if let Err(err) = self.campaigns.batch_create_logs(&logs).await {
            warn!(error = %err, "failed to persist delivery logs");
        }
        if let Err(err) = self
            .campaigns
            .update_status(CampaignTotals {
                notification_id,
                total_sent,
                total_failed,
            })
            .await
        {
            warn!(error = %err, "failed to update campaign totals");
        }

        let report = CampaignReport {
            notification_id,
            matched_subscribers: matched.len(),
            devices: devices.len(),
            total_sent,
            total_failed,
        };
        info!(
            matched_subscribers = report.matched_subscribers,
            devices = report.devices,
            total_sent = report.total_sent,
            total_failed = report.total_failed,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "campaign complete"
        );
        Ok(report)
    }
}

fn build_content(event: &NotificationEvent) -> (String, HashMap<String, String>) {
    let mut body = format!(
        "{} has opened at {}",
        event.location_name, event.full_address
    );
    if let Some(hint) = &event.hint_message {
        body.push_str(" - ");
        body.push_str(hint);
    }
    let data = HashMap::from([
        ("notification_id".to_string(), event.notification_id.clone()),
        ("merchant_id".to_string(), event.merchant_id.clone()),
        ("latitude".to_string(), event.latitude.to_string()),
        ("longitude".to_string(), event.longitude.to_string()),
        ("location_name".to_string(), event.location_name.clone()),
        ("full_address".to_string(), event.full_address.clone()),
    ]);
    (body, data)
}

fn log_row(
    notification_id: Uuid,
    device: &Device,
    status: DeliveryStatus,
    error_message: Option<String>,
    sent_at: chrono::DateTime<chrono::Utc>,
) -> DeliveryLog {
    DeliveryLog {
        notification_id,
        user_id: device.user_id,
        device_id: device.id,
        status,
        error_message,
        sent_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{BatchOutcome, DeliveryError};
    use crate::memory::MemoryStore;
    use crate::model::{Address, Platform, SubscriberAddress};
    use crate::store::StoreError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records batch sizes and plays back scripted per-chunk behavior.
    #[derive(Default)]
    struct ScriptedDelivery {
        sizes: Mutex<Vec<usize>>,
        invalid_tokens: Vec<String>,
        transport_fail_chunks: Vec<usize>,
        calls: AtomicUsize,
    }

    impl ScriptedDelivery {
        fn ok() -> Self {
            Self::default()
        }

        fn with_invalid(invalid_tokens: Vec<String>) -> Self {
            Self {
                invalid_tokens,
                ..Self::default()
            }
        }

        fn failing_chunk(chunk: usize) -> Self {
            Self {
                transport_fail_chunks: vec![chunk],
                ..Self::default()
            }
        }

        fn sizes(&self) -> Vec<usize> {
            self.sizes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushDelivery for ScriptedDelivery {
        async fn send_batch(
            &self,
            tokens: &[String],
            _title: &str,
            _body: &str,
            _data: &HashMap<String, String>,
        ) -> Result<BatchOutcome, DeliveryError> {
            let chunk = self.calls.fetch_add(1, Ordering::SeqCst);
            self.sizes.lock().unwrap().push(tokens.len());
            if self.transport_fail_chunks.contains(&chunk) {
                return Err(DeliveryError::Transport("synthetic outage".to_string()));
            }
            let invalid: Vec<String> = tokens
                .iter()
                .filter(|t| self.invalid_tokens.contains(t))
                .cloned()
                .collect();
            #[expect(clippy::cast_possible_truncation)]
            let outcome = BatchOutcome {
                success_count: (tokens.len() - invalid.len()) as u32,
                failure_count: invalid.len() as u32,
                invalid_tokens: invalid,
            };
            Ok(outcome)
        }
    }

    /// Returns the same canned answer for every target.
    struct FixedDistance(RouteResult);

    #[async_trait]
    impl RoadDistance for FixedDistance {
        async fn one_to_many(
            &self,
            _source: Coordinate,
            targets: &[Coordinate],
        ) -> Vec<RouteResult> {
            vec![self.0; targets.len()]
        }
    }

    struct FailingSubscriptions;

    #[async_trait]
    impl SubscriptionStore for FailingSubscriptions {
        async fn find_subscriber_addresses(
            &self,
            _merchant_id: Uuid,
            _user_ids: &[Uuid],
        ) -> Result<Vec<crate::model::SubscriberAddress>, StoreError> {
            Err(StoreError("connection reset".to_string()))
        }
    }

    const MERCHANT_COORD: Coordinate = Coordinate::new(25.035, 121.566);

    fn event_for(subscribers: &[Uuid]) -> NotificationEvent {
        NotificationEvent {
            request_id: None,
            notification_id: Uuid::new_v4().to_string(),
            merchant_id: Uuid::new_v4().to_string(),
            latitude: MERCHANT_COORD.lat,
            longitude: MERCHANT_COORD.lng,
            location_name: "Night Market Stand".to_string(),
            full_address: "100 Xinyi Rd, Taipei".to_string(),
            hint_message: None,
            subscriber_ids: subscribers.iter().map(Uuid::to_string).collect(),
        }
    }

    fn address_row(user_id: Uuid, coord: Coordinate, radius_m: f64) -> SubscriberAddress {
        SubscriberAddress {
            address: Address {
                id: Uuid::new_v4(),
                owner_id: user_id,
                lat: coord.lat,
                lng: coord.lng,
                is_active: true,
                is_primary: true,
            },
            notification_radius_m: radius_m,
        }
    }

    fn device_for(user_id: Uuid, token: &str) -> Device {
        Device {
            id: Uuid::new_v4(),
            user_id,
            push_token: token.to_string(),
            platform: Platform::Android,
            is_active: true,
        }
    }

    fn pipeline_with(
        store: &Arc<MemoryStore>,
        delivery: Arc<dyn PushDelivery>,
        router: Arc<dyn RoadDistance>,
    ) -> FanoutPipeline {
        FanoutPipeline::new(
            router,
            Arc::clone(store) as Arc<dyn SubscriptionStore>,
            Arc::clone(store) as Arc<dyn DeviceStore>,
            Arc::clone(store) as Arc<dyn CampaignStore>,
            delivery,
        )
    }

    /// Great-circle distances are exactly what the radius filter sees when
    /// routing is disabled, which keeps these tests honest about numbers.
    fn haversine_router() -> Arc<dyn RoadDistance> {
        Arc::new(Router::disabled())
    }

    #[tokio::test]
    async fn malformed_ids_are_non_retryable() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(&store, Arc::new(ScriptedDelivery::ok()), haversine_router());

        let mut event = event_for(&[Uuid::new_v4()]);
        event.notification_id = "not-a-uuid".to_string();
        let err = pipeline.process(&event).await.unwrap_err();
        assert!(matches!(err, ProcessError::Malformed(_)));

        let mut event = event_for(&[Uuid::new_v4()]);
        event.merchant_id = "also-not-a-uuid".to_string();
        let err = pipeline.process(&event).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn subscription_store_failure_is_retryable() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = FanoutPipeline::new(
            haversine_router(),
            Arc::new(FailingSubscriptions),
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            Arc::clone(&store) as Arc<dyn CampaignStore>,
            Arc::new(ScriptedDelivery::ok()),
        );

        let err = pipeline.process(&event_for(&[Uuid::new_v4()])).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn no_candidates_short_circuits() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline_with(&store, Arc::new(ScriptedDelivery::ok()), haversine_router());

        let event = event_for(&[]);
        let report = pipeline.process(&event).await.unwrap();
        assert_eq!(report.matched_subscribers, 0);
        assert!(store.logs().await.is_empty());
        let id = Uuid::parse_str(&event.notification_id).unwrap();
        assert_eq!(store.campaign_totals(id).await, None);
    }

    #[tokio::test]
    async fn unparseable_subscriber_ids_are_dropped_silently() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = {
            let mut e = event_for(&[user]);
            e.subscriber_ids.push("garbage".to_string());
            e
        };
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        // ~111 m north of the merchant.
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 500.0),
            )
            .await;
        store.add_device(device_for(user, "token-a")).await;

        let pipeline = pipeline_with(&store, Arc::new(ScriptedDelivery::ok()), haversine_router());
        let report = pipeline.process(&event).await.unwrap();
        assert_eq!(report.matched_subscribers, 1);
        assert_eq!(report.total_sent, 1);
    }

    #[tokio::test]
    async fn radius_filter_compares_road_distance_to_subscription_radius() {
        let store = Arc::new(MemoryStore::new());
        let near_enough = Uuid::new_v4();
        let too_strict = Uuid::new_v4();
        let event = event_for(&[near_enough, too_strict]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();

        // The same address (~111 m away); only the radius differs.
        let address = Coordinate::new(25.034, 121.566);
        store
            .add_subscription(merchant, address_row(near_enough, address, 500.0))
            .await;
        store
            .add_subscription(merchant, address_row(too_strict, address, 50.0))
            .await;
        store.add_device(device_for(near_enough, "token-near")).await;
        store.add_device(device_for(too_strict, "token-strict")).await;

        let pipeline = pipeline_with(&store, Arc::new(ScriptedDelivery::ok()), haversine_router());
        let report = pipeline.process(&event).await.unwrap();

        assert_eq!(report.matched_subscribers, 1);
        assert_eq!(report.total_sent, 1);
        let logs = store.logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn unreachable_addresses_never_qualify() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = event_for(&[user]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 10_000.0),
            )
            .await;
        store.add_device(device_for(user, "token-a")).await;

        // Ten meters away but across a river with no bridge.
        let router = Arc::new(FixedDistance(RouteResult {
            distance_km: 0.01,
            duration_min: 0.1,
            reachable: false,
        }));
        let pipeline = pipeline_with(&store, Arc::new(ScriptedDelivery::ok()), router);
        let report = pipeline.process(&event).await.unwrap();
        assert_eq!(report.matched_subscribers, 0);
        assert!(store.logs().await.is_empty());
    }

    #[tokio::test]
    async fn batches_respect_the_provider_cap() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = event_for(&[user]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 500.0),
            )
            .await;
        for i in 0..1200 {
            store.add_device(device_for(user, &format!("token-{i}"))).await;
        }

        let delivery = Arc::new(ScriptedDelivery::ok());
        let pipeline = pipeline_with(
            &store,
            Arc::clone(&delivery) as Arc<dyn PushDelivery>,
            haversine_router(),
        );
        let report = pipeline.process(&event).await.unwrap();

        assert_eq!(delivery.sizes(), vec![500, 500, 200]);
        assert_eq!(report.total_sent, 1200);
        assert_eq!(report.total_failed, 0);
    }

    #[tokio::test]
    async fn invalid_tokens_are_logged_failed_and_their_devices_deleted() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = event_for(&[user]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 500.0),
            )
            .await;
        for i in 0..30 {
            store.add_device(device_for(user, &format!("token-{i}"))).await;
        }

        let delivery = Arc::new(ScriptedDelivery::with_invalid(vec![
            "token-3".to_string(),
            "token-17".to_string(),
        ]));
        let pipeline = pipeline_with(
            &store,
            Arc::clone(&delivery) as Arc<dyn PushDelivery>,
            haversine_router(),
        );
        let report = pipeline.process(&event).await.unwrap();

        assert_eq!(report.total_sent, 28);
        assert_eq!(report.total_failed, 2);
        // Exactly the two invalid devices were deleted.
        assert_eq!(store.device_ids().await.len(), 28);

        let logs = store.logs().await;
        assert_eq!(logs.len(), 30);
        let failed: Vec<_> = logs
            .iter()
            .filter(|l| l.status == DeliveryStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(
            failed
                .iter()
                .all(|l| l.error_message.as_deref() == Some(INVALID_TOKEN_MESSAGE))
        );
    }

    #[tokio::test]
    async fn transport_error_burns_only_its_chunk() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = event_for(&[user]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 500.0),
            )
            .await;
        for i in 0..600 {
            store.add_device(device_for(user, &format!("token-{i}"))).await;
        }

        let delivery = Arc::new(ScriptedDelivery::failing_chunk(0));
        let pipeline = pipeline_with(
            &store,
            Arc::clone(&delivery) as Arc<dyn PushDelivery>,
            haversine_router(),
        );
        let report = pipeline.process(&event).await.unwrap();

        assert_eq!(delivery.sizes(), vec![500, 100]);
        assert_eq!(report.total_sent, 100);
        assert_eq!(report.total_failed, 500);

        let logs = store.logs().await;
        let outage_rows = logs
            .iter()
            .filter(|l| {
                l.error_message
                    .as_deref()
                    .is_some_and(|m| m.contains("synthetic outage"))
            })
            .count();
        assert_eq!(outage_rows, 500);
    }

    #[tokio::test]
    async fn matched_subscriber_without_devices_is_an_early_success() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = event_for(&[user]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 500.0),
            )
            .await;

        let pipeline = pipeline_with(&store, Arc::new(ScriptedDelivery::ok()), haversine_router());
        let report = pipeline.process(&event).await.unwrap();
        assert_eq!(report.matched_subscribers, 1);
        assert_eq!(report.devices, 0);
        let id = Uuid::parse_str(&event.notification_id).unwrap();
        assert_eq!(store.campaign_totals(id).await, None);
    }

    #[tokio::test]
    async fn subscriber_with_two_qualifying_addresses_is_pushed_once() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = event_for(&[user]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 500.0),
            )
            .await;
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.0345, 121.566), 500.0),
            )
            .await;
        store.add_device(device_for(user, "token-a")).await;

        let delivery = Arc::new(ScriptedDelivery::ok());
        let pipeline = pipeline_with(
            &store,
            Arc::clone(&delivery) as Arc<dyn PushDelivery>,
            haversine_router(),
        );
        let report = pipeline.process(&event).await.unwrap();
        assert_eq!(report.matched_subscribers, 1);
        assert_eq!(delivery.sizes(), vec![1]);
    }

    #[tokio::test]
    async fn redelivery_overwrites_campaign_totals() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let event = event_for(&[user]);
        let merchant = Uuid::parse_str(&event.merchant_id).unwrap();
        store
            .add_subscription(
                merchant,
                address_row(user, Coordinate::new(25.034, 121.566), 500.0),
            )
            .await;
        store.add_device(device_for(user, "token-a")).await;

        let pipeline = pipeline_with(&store, Arc::new(ScriptedDelivery::ok()), haversine_router());
        pipeline.process(&event).await.unwrap();
        pipeline.process(&event).await.unwrap();

        // One aggregate row, holding the newest attempt's numbers; the
        // duplicate push itself is the accepted cost of redelivery.
        let id = Uuid::parse_str(&event.notification_id).unwrap();
        assert_eq!(store.campaign_totals(id).await, Some((1, 0)));
        assert_eq!(store.logs().await.len(), 2);
    }

    #[test]
    fn notification_body_includes_address_and_optional_hint() {
        let mut event = event_for(&[]);
        let (body, data) = build_content(&event);
        assert_eq!(body, "Night Market Stand has opened at 100 Xinyi Rd, Taipei");
        assert_eq!(data["location_name"], "Night Market Stand");
        assert_eq!(data["latitude"], "25.035");

        event.hint_message = Some("second floor".to_string());
        let (body, _) = build_content(&event);
        assert_eq!(
            body,
            "Night Market Stand has opened at 100 Xinyi Rd, Taipei - second floor"
        );
    }
}

