//! Notification queue — idempotent enqueue, listings, and dead-letter
//! recovery.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::audit::{AuditRecord, action};
use crate::error::{DeliveryError, Error, StoreError};
use crate::notify::metrics::{DeliveryMetrics, MetricsSnapshot};
use crate::notify::model::{OutboundMessage, OutboundStatus};
use crate::notify::worker::{DeliveryWorker, DispatchSummary};
use crate::store::TriageStore;

/// Cap on `list_by_customer` results.
const CUSTOMER_LIST_LIMIT: usize = 200;

/// Default page size for the dead-letter operations view.
const DEAD_LETTER_PAGE_DEFAULT: usize = 50;

/// Clamp bounds for dead-letter paging and bulk requeue.
const BATCH_MIN: usize = 1;
const BATCH_MAX: usize = 500;

/// Actor name on queue audit rows.
const AUDIT_ACTOR: &str = "notify";

/// Everything needed to enqueue one notification.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Idempotency token for the logical event this message belongs to.
    pub correlation_key: String,
}

/// Outbound-message queue façade over the store and delivery worker.
pub struct NotificationQueue {
    store: Arc<dyn TriageStore>,
    worker: Arc<DeliveryWorker>,
    metrics: Arc<DeliveryMetrics>,
}

impl NotificationQueue {
    pub fn new(
        store: Arc<dyn TriageStore>,
        worker: Arc<DeliveryWorker>,
        metrics: Arc<DeliveryMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            worker,
            metrics,
        })
    }

    /// Enqueue a notification and trigger an immediate dispatch pass.
    ///
    /// No-op (returns `None`) when a message with the same correlation key
    /// already reached `Sent`: repeated triage runs for one logical event
    /// must not notify twice.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Option<Uuid>, StoreError> {
        if self.store.correlation_sent(&request.correlation_key).await? {
            debug!(
                correlation_key = %request.correlation_key,
                "Notification already sent for this correlation key, skipping enqueue"
            );
            return Ok(None);
        }

        let message = OutboundMessage::new(
            request.customer_id,
            request.ticket_id,
            request.recipient,
            request.subject,
            request.body,
            request.correlation_key,
        );
        self.store.insert_outbound(&message).await?;
        self.store
            .record_audit(&AuditRecord::new(
                message.customer_id,
                message.ticket_id,
                AUDIT_ACTOR,
                action::NOTIFICATION_ENQUEUED,
                serde_json::json!({
                    "message_id": message.id,
                    "recipient": message.recipient,
                    "subject": message.subject,
                    "correlation_key": message.correlation_key,
                }),
            ))
            .await?;

        info!(
            message_id = %message.id,
            recipient = %message.recipient,
            "Notification enqueued"
        );

        let id = message.id;
        self.worker.dispatch_pending().await?;
        Ok(Some(id))
    }

    /// Run one dispatch pass now.
    pub async fn dispatch_pending(&self) -> Result<DispatchSummary, StoreError> {
        self.worker.dispatch_pending().await
    }

    /// Up to 200 most-recent messages for a customer, optionally filtered
    /// by status.
    pub async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<OutboundStatus>,
    ) -> Result<Vec<OutboundMessage>, StoreError> {
        self.store
            .outbound_for_customer(customer_id, status, CUSTOMER_LIST_LIMIT)
            .await
    }

    /// Operations view: most recently dead-lettered messages. Page size
    /// defaults to 50 and is clamped to [1, 500].
    pub async fn recent_dead_letters(
        &self,
        page_size: Option<usize>,
    ) -> Result<Vec<OutboundMessage>, StoreError> {
        let limit = page_size
            .unwrap_or(DEAD_LETTER_PAGE_DEFAULT)
            .clamp(BATCH_MIN, BATCH_MAX);
        self.store.recent_dead_letters(limit).await
    }

    /// Revive up to `take` dead letters (clamped to [1, 500]), oldest
    /// first, then trigger a dispatch pass. Returns the count revived.
    pub async fn retry_dead_letters(&self, take: usize) -> Result<usize, StoreError> {
        let take = take.clamp(BATCH_MIN, BATCH_MAX);
        let batch = self.store.oldest_dead_letters(take).await?;
        let mut revived = 0usize;

        for mut message in batch {
            message.revive();
            self.store.update_outbound(&message).await?;
            self.store
                .record_audit(&AuditRecord::new(
                    message.customer_id,
                    message.ticket_id,
                    AUDIT_ACTOR,
                    action::DEAD_LETTER_REQUEUED,
                    serde_json::json!({
                        "message_id": message.id,
                        "correlation_key": message.correlation_key,
                    }),
                ))
                .await?;
            revived += 1;
        }

        if revived > 0 {
            info!(revived, "Dead letters requeued");
        }
        self.worker.dispatch_pending().await?;
        Ok(revived)
    }

    /// Revive a single message. Fails explicitly unless it is dead-lettered.
    pub async fn retry_dead_letter(&self, id: Uuid) -> Result<OutboundMessage, Error> {
        let mut message = self
            .store
            .get_outbound(id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "outbound message",
                id: id.to_string(),
            })?;

        if message.status != OutboundStatus::DeadLetter {
            return Err(DeliveryError::NotDeadLetter {
                id,
                status: message.status.to_string(),
            }
            .into());
        }

        message.revive();
        self.store.update_outbound(&message).await?;
        self.store
            .record_audit(&AuditRecord::new(
                message.customer_id,
                message.ticket_id,
                AUDIT_ACTOR,
                action::DEAD_LETTER_REQUEUED,
                serde_json::json!({
                    "message_id": message.id,
                    "correlation_key": message.correlation_key,
                }),
            ))
            .await?;

        self.worker.dispatch_pending().await?;
        let refreshed = self
            .store
            .get_outbound(id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "outbound message",
                id: id.to_string(),
            })?;
        Ok(refreshed)
    }

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Run a dispatch pass on a fixed interval, alongside the passes triggered
/// by `enqueue`.
pub fn spawn_dispatch_task(
    queue: Arc<NotificationQueue>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = queue.dispatch_pending().await {
                error!(error = %e, "Background dispatch pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::notify::transport::NotificationTransport;
    use crate::store::LibSqlStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Transport whose behavior can be flipped between passes.
    struct SwitchTransport {
        fail: AtomicBool,
        calls: AtomicU32,
    }

    impl SwitchTransport {
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(true),
                calls: AtomicU32::new(0),
            })
        }

        fn succeeding() -> Arc<Self> {
            Arc::new(Self {
                fail: AtomicBool::new(false),
                calls: AtomicU32::new(0),
            })
        }

        fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationTransport for SwitchTransport {
        fn name(&self) -> &'static str {
            "switch"
        }

        async fn deliver(&self, _message: &OutboundMessage) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(TransportError::Send("induced failure".into()))
            } else {
                Ok(())
            }
        }
    }

    async fn setup(
        transport: Arc<SwitchTransport>,
        max_retry_count: u32,
    ) -> (Arc<LibSqlStore>, Arc<NotificationQueue>) {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let metrics = Arc::new(DeliveryMetrics::new());
        let worker = Arc::new(DeliveryWorker::new(
            store.clone(),
            transport,
            metrics.clone(),
            max_retry_count,
            "worker-test",
        ));
        let queue = NotificationQueue::new(store.clone(), worker, metrics);
        (store, queue)
    }

    fn request(key: &str) -> EnqueueRequest {
        EnqueueRequest {
            customer_id: Uuid::new_v4(),
            ticket_id: None,
            recipient: "alice@example.com".into(),
            subject: "Re: ticket".into(),
            body: "body".into(),
            correlation_key: key.into(),
        }
    }

    #[tokio::test]
    async fn enqueue_dispatches_immediately() {
        let transport = SwitchTransport::succeeding();
        let (store, queue) = setup(transport.clone(), 3).await;

        let id = queue.enqueue(request("k1")).await.unwrap().unwrap();
        assert_eq!(transport.calls(), 1);

        let loaded = store.get_outbound(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OutboundStatus::Sent);
    }

    #[tokio::test]
    async fn repeat_enqueue_after_sent_is_noop() {
        let transport = SwitchTransport::succeeding();
        let (store, queue) = setup(transport.clone(), 3).await;
        let customer = Uuid::new_v4();

        let mut req = request("same-event");
        req.customer_id = customer;
        assert!(queue.enqueue(req.clone()).await.unwrap().is_some());
        assert!(queue.enqueue(req.clone()).await.unwrap().is_none());
        assert!(queue.enqueue(req).await.unwrap().is_none());

        assert_eq!(transport.calls(), 1);
        let all = store
            .outbound_for_customer(customer, None, 200)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn repeat_enqueue_before_sent_inserts_again() {
        // The correlation check only guards against re-sending an already
        // Sent event, not against parallel still-pending copies.
        let transport = SwitchTransport::failing();
        let (store, queue) = setup(transport.clone(), 1).await;
        let mut req = request("pending-event");
        let customer = Uuid::new_v4();
        req.customer_id = customer;

        assert!(queue.enqueue(req.clone()).await.unwrap().is_some());
        assert!(queue.enqueue(req).await.unwrap().is_some());

        let all = store
            .outbound_for_customer(customer, None, 200)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn dead_letter_then_bulk_retry_then_success() {
        let transport = SwitchTransport::failing();
        let (store, queue) = setup(transport.clone(), 3).await;

        let id = queue.enqueue(request("k1")).await.unwrap().unwrap();
        let loaded = store.get_outbound(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OutboundStatus::DeadLetter);
        assert_eq!(loaded.attempt_count, 3);

        // Revive: counters reset, message pending again
        transport.set_fail(false);
        let revived = queue.retry_dead_letters(10).await.unwrap();
        assert_eq!(revived, 1);

        let loaded = store.get_outbound(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OutboundStatus::Sent);
        assert!(loaded.last_error.is_none());
    }

    #[tokio::test]
    async fn bulk_retry_resets_counters_even_when_redelivery_fails() {
        let transport = SwitchTransport::failing();
        let (store, queue) = setup(transport.clone(), 1).await;

        let id = queue.enqueue(request("k1")).await.unwrap().unwrap();
        assert_eq!(
            store.get_outbound(id).await.unwrap().unwrap().status,
            OutboundStatus::DeadLetter
        );

        // Still failing: revived, one fresh attempt, dead-lettered again
        let revived = queue.retry_dead_letters(10).await.unwrap();
        assert_eq!(revived, 1);
        let loaded = store.get_outbound(id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OutboundStatus::DeadLetter);
        assert_eq!(loaded.attempt_count, 1, "attempt count restarted from zero");
    }

    #[tokio::test]
    async fn retry_single_rejects_non_dead_letter() {
        let transport = SwitchTransport::succeeding();
        let (_store, queue) = setup(transport, 3).await;

        let id = queue.enqueue(request("k1")).await.unwrap().unwrap();
        let err = queue.retry_dead_letter(id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Delivery(DeliveryError::NotDeadLetter { .. })
        ));
    }

    #[tokio::test]
    async fn retry_single_missing_message_is_not_found() {
        let transport = SwitchTransport::succeeding();
        let (_store, queue) = setup(transport, 3).await;
        let err = queue.retry_dead_letter(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn retry_single_revives_and_redelivers() {
        let transport = SwitchTransport::failing();
        let (store, queue) = setup(transport.clone(), 1).await;

        let id = queue.enqueue(request("k1")).await.unwrap().unwrap();
        assert_eq!(
            store.get_outbound(id).await.unwrap().unwrap().status,
            OutboundStatus::DeadLetter
        );

        transport.set_fail(false);
        let refreshed = queue.retry_dead_letter(id).await.unwrap();
        assert_eq!(refreshed.status, OutboundStatus::Sent);
    }

    #[tokio::test]
    async fn dead_letter_view_pages_and_clamps() {
        let transport = SwitchTransport::failing();
        let (_store, queue) = setup(transport, 1).await;

        for i in 0..3 {
            queue
                .enqueue(request(&format!("k{i}")))
                .await
                .unwrap()
                .unwrap();
        }

        let page = queue.recent_dead_letters(None).await.unwrap();
        assert_eq!(page.len(), 3);
        let page = queue.recent_dead_letters(Some(2)).await.unwrap();
        assert_eq!(page.len(), 2);
        // 0 clamps up to 1
        let page = queue.recent_dead_letters(Some(0)).await.unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn metrics_snapshot_tracks_outcomes() {
        let transport = SwitchTransport::failing();
        let (_store, queue) = setup(transport.clone(), 2).await;

        queue.enqueue(request("k1")).await.unwrap();
        let snap = queue.metrics();
        assert_eq!(snap.failed_attempts, 2);
        assert_eq!(snap.dead_lettered, 1);
        assert_eq!(snap.sent, 0);

        transport.set_fail(false);
        queue.retry_dead_letters(1).await.unwrap();
        let snap = queue.metrics();
        assert_eq!(snap.sent, 1);
        assert_eq!(snap.queue_depth, 0);
    }
}
