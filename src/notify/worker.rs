//! Delivery worker — drains the notification queue with a bounded retry
//! budget.
//!
//! Per message and per pass: `remaining = max_retry_count - attempt_count`.
//! A message with no budget left dead-letters without a send; otherwise the
//! worker attempts up to `remaining` deliveries back-to-back and
//! dead-letters on exhaustion. Each message is claimed before any attempt,
//! so overlapping passes (scheduled tick vs enqueue-triggered) cannot
//! double-send.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::audit::{AuditRecord, action};
use crate::error::StoreError;
use crate::notify::metrics::DeliveryMetrics;
use crate::notify::model::{OutboundMessage, OutboundStatus};
use crate::notify::transport::NotificationTransport;
use crate::store::TriageStore;

/// Claims older than this are treated as abandoned and taken over.
const CLAIM_STALE_MINUTES: i64 = 5;

/// Actor name on delivery audit rows.
const AUDIT_ACTOR: &str = "delivery";

/// Outcome counts for one dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Messages this pass worked on (claimed).
    pub processed: usize,
    pub sent: usize,
    pub dead_lettered: usize,
    /// Messages skipped because another worker holds the claim.
    pub skipped_claimed: usize,
}

/// Dequeues and sends outbound messages.
pub struct DeliveryWorker {
    store: Arc<dyn TriageStore>,
    transport: Arc<dyn NotificationTransport>,
    metrics: Arc<DeliveryMetrics>,
    max_retry_count: u32,
    worker_id: String,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn TriageStore>,
        transport: Arc<dyn NotificationTransport>,
        metrics: Arc<DeliveryMetrics>,
        max_retry_count: u32,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            metrics,
            max_retry_count,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// One dispatch pass: load all Pending/Failed messages oldest-first and
    /// drive each through its remaining retry budget.
    pub async fn dispatch_pending(&self) -> Result<DispatchSummary, StoreError> {
        let depth = self.store.queue_depth().await?;
        self.metrics.set_queue_depth(depth);
        debug!(queue_depth = depth, worker = %self.worker_id, "Dispatch pass starting");

        let batch = self.store.dispatchable_outbound().await?;
        let mut summary = DispatchSummary::default();

        for message in batch {
            let stale_before = Utc::now() - chrono::Duration::minutes(CLAIM_STALE_MINUTES);
            if !self
                .store
                .claim_outbound(message.id, &self.worker_id, stale_before)
                .await?
            {
                debug!(
                    message_id = %message.id,
                    worker = %self.worker_id,
                    "Message claimed by another worker, skipping"
                );
                summary.skipped_claimed += 1;
                continue;
            }

            let mut message = message;
            message.claimed_by = Some(self.worker_id.clone());
            message.claimed_at = Some(Utc::now());
            self.deliver_with_budget(&mut message, &mut summary).await?;
        }

        let depth = self.store.queue_depth().await?;
        self.metrics.set_queue_depth(depth);
        info!(
            queue_depth = depth,
            processed = summary.processed,
            sent = summary.sent,
            dead_lettered = summary.dead_lettered,
            skipped = summary.skipped_claimed,
            "Dispatch pass complete"
        );
        Ok(summary)
    }

    /// Drive one claimed message through its remaining attempts.
    async fn deliver_with_budget(
        &self,
        message: &mut OutboundMessage,
        summary: &mut DispatchSummary,
    ) -> Result<(), StoreError> {
        summary.processed += 1;

        let remaining = message.remaining_attempts(self.max_retry_count);
        if remaining <= 0 {
            self.dead_letter(message, "exceeded retry limit").await?;
            summary.dead_lettered += 1;
            return Ok(());
        }

        for _ in 0..remaining {
            message.attempt_count += 1;
            self.audit(
                message,
                action::DELIVERY_ATTEMPT,
                serde_json::json!({
                    "attempt": message.attempt_count,
                    "transport": self.transport.name(),
                }),
            )
            .await?;

            match self.transport.deliver(message).await {
                Ok(()) => {
                    message.status = OutboundStatus::Sent;
                    message.sent_at = Some(Utc::now());
                    message.last_error = None;
                    message.claimed_by = None;
                    message.claimed_at = None;
                    self.store.update_outbound(message).await?;
                    self.metrics.record_sent();
                    self.audit(
                        message,
                        action::DELIVERY_SUCCEEDED,
                        serde_json::json!({ "attempt": message.attempt_count }),
                    )
                    .await?;
                    info!(
                        message_id = %message.id,
                        attempts = message.attempt_count,
                        "Outbound message sent"
                    );
                    summary.sent += 1;
                    return Ok(());
                }
                Err(e) => {
                    message.status = OutboundStatus::Failed;
                    message.last_error = Some(e.to_string());
                    self.store.update_outbound(message).await?;
                    self.metrics.record_failed_attempt();
                    self.audit(
                        message,
                        action::DELIVERY_FAILED,
                        serde_json::json!({
                            "attempt": message.attempt_count,
                            "error": e.to_string(),
                        }),
                    )
                    .await?;
                    warn!(
                        message_id = %message.id,
                        attempt = message.attempt_count,
                        error = %e,
                        "Delivery attempt failed"
                    );
                }
            }
        }

        let reason = message
            .last_error
            .clone()
            .unwrap_or_else(|| "delivery failed".to_string());
        self.dead_letter(message, &reason).await?;
        summary.dead_lettered += 1;
        Ok(())
    }

    async fn dead_letter(
        &self,
        message: &mut OutboundMessage,
        reason: &str,
    ) -> Result<(), StoreError> {
        message.status = OutboundStatus::DeadLetter;
        message.dead_lettered_at = Some(Utc::now());
        message.last_error = Some(reason.to_string());
        message.claimed_by = None;
        message.claimed_at = None;
        self.store.update_outbound(message).await?;
        self.metrics.record_dead_lettered();
        self.audit(
            message,
            action::DEAD_LETTERED,
            serde_json::json!({
                "reason": reason,
                "attempt_count": message.attempt_count,
            }),
        )
        .await?;
        warn!(
            message_id = %message.id,
            attempts = message.attempt_count,
            reason,
            "Outbound message dead-lettered"
        );
        Ok(())
    }

    async fn audit(
        &self,
        message: &OutboundMessage,
        audit_action: &str,
        detail: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut detail = detail;
        detail["message_id"] = serde_json::Value::String(message.id.to_string());
        detail["correlation_key"] =
            serde_json::Value::String(message.correlation_key.clone());
        self.store
            .record_audit(&AuditRecord::new(
                message.customer_id,
                message.ticket_id,
                AUDIT_ACTOR,
                audit_action,
                detail,
            ))
            .await
    }
}
