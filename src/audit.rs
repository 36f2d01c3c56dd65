//! Audit records.
//!
//! Every mutating action in the pipeline writes one row with a structured
//! JSON detail payload — enough to reconstruct intent after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audit action labels. Kept as constants so callers and tests agree on
/// the exact strings.
pub mod action {
    pub const SUGGESTION_CREATED: &str = "suggestion created";
    pub const AUTO_RESPONSE_SENT: &str = "auto-response sent";
    pub const SUGGESTION_APPROVED: &str = "suggestion approved";
    pub const SUGGESTION_DISCARDED: &str = "suggestion discarded";
    pub const STATUS_TRANSITION: &str = "status transition";
    pub const NOTIFICATION_ENQUEUED: &str = "notification enqueued";
    pub const DELIVERY_ATTEMPT: &str = "delivery attempt";
    pub const DELIVERY_SUCCEEDED: &str = "delivery succeeded";
    pub const DELIVERY_FAILED: &str = "delivery failed";
    pub const DEAD_LETTERED: &str = "dead-lettered";
    pub const DEAD_LETTER_REQUEUED: &str = "dead-letter requeued";
}

/// One audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub ticket_id: Option<Uuid>,
    /// Who acted: a user id, or a system actor like "triage" / "delivery".
    pub actor: String,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        customer_id: Uuid,
        ticket_id: Option<Uuid>,
        actor: impl Into<String>,
        action: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            ticket_id,
            actor: actor.into(),
            action: action.into(),
            detail,
            created_at: Utc::now(),
        }
    }
}
