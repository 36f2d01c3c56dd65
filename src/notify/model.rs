//! Outbound-message data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status. `Sent` and `DeadLetter` are terminal; a dead letter may
/// be revived to `Pending` with its attempt count and error cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundStatus {
    Pending,
    Failed,
    Sent,
    DeadLetter,
}

impl std::fmt::Display for OutboundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Failed => write!(f, "failed"),
            Self::Sent => write!(f, "sent"),
            Self::DeadLetter => write!(f, "dead_letter"),
        }
    }
}

impl std::str::FromStr for OutboundStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "failed" => Ok(Self::Failed),
            "sent" => Ok(Self::Sent),
            "dead_letter" => Ok(Self::DeadLetter),
            _ => Err(format!("Unknown outbound status: {}", s)),
        }
    }
}

/// One outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Idempotency token for one logical event.
    pub correlation_key: String,
    pub status: OutboundStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    /// Worker currently holding this message, if any.
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub dead_lettered_at: Option<DateTime<Utc>>,
}

impl OutboundMessage {
    pub fn new(
        customer_id: Uuid,
        ticket_id: Option<Uuid>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        correlation_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            customer_id,
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            correlation_key: correlation_key.into(),
            status: OutboundStatus::Pending,
            attempt_count: 0,
            last_error: None,
            claimed_by: None,
            claimed_at: None,
            created_at: Utc::now(),
            sent_at: None,
            dead_lettered_at: None,
        }
    }

    /// Attempts left under `max_retry_count`.
    pub fn remaining_attempts(&self, max_retry_count: u32) -> i64 {
        max_retry_count as i64 - self.attempt_count as i64
    }

    /// Reset a dead letter back to `Pending` for another delivery cycle.
    /// Only meaningful from `DeadLetter`; callers check the status first.
    pub fn revive(&mut self) {
        self.status = OutboundStatus::Pending;
        self.attempt_count = 0;
        self.last_error = None;
        self.claimed_by = None;
        self.claimed_at = None;
        self.dead_lettered_at = None;
    }
}
