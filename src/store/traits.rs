//! Unified `TriageStore` trait — single async interface for all
//! persistence used by the triage pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::error::StoreError;
use crate::notify::model::{OutboundMessage, OutboundStatus};
use crate::policy::CustomerAiPolicy;
use crate::suggest::model::Suggestion;
use crate::ticket::{Ticket, TicketMessage};

/// A published knowledge-base article, as read by the suggestion
/// generator. Article CRUD belongs to an external collaborator; only the
/// read path (plus an insert used by intake/tests) lives here.
#[derive(Debug, Clone)]
pub struct KnowledgeArticle {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub body: String,
    pub published: bool,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeArticle {
    pub fn new(
        customer_id: Uuid,
        title: impl Into<String>,
        body: impl Into<String>,
        published: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            title: title.into(),
            body: body.into(),
            published,
            updated_at: Utc::now(),
        }
    }
}

/// Backend-agnostic store covering tickets, suggestions, policies,
/// knowledge articles, outbound messages, and the audit log.
#[async_trait]
pub trait TriageStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError>;

    // ── Tickets ─────────────────────────────────────────────────────

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError>;

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// Persist the full mutable state of a ticket.
    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), StoreError>;

    // ── Ticket messages ─────────────────────────────────────────────

    async fn append_message(&self, message: &TicketMessage) -> Result<(), StoreError>;

    /// Up to `limit` most-recent messages, returned in chronological order.
    async fn recent_messages(
        &self,
        ticket_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TicketMessage>, StoreError>;

    // ── Suggestions ─────────────────────────────────────────────────

    async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<(), StoreError>;

    async fn update_suggestion(&self, suggestion: &Suggestion) -> Result<(), StoreError>;

    /// The active suggestion: most recently created with status
    /// `PendingApproval`, if any.
    async fn latest_pending_suggestion(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<Suggestion>, StoreError>;

    // ── Automation policy ───────────────────────────────────────────

    /// The tenant's policy, or the default (suggest-only) when unset.
    async fn policy_for(&self, customer_id: Uuid) -> Result<CustomerAiPolicy, StoreError>;

    async fn set_policy(
        &self,
        customer_id: Uuid,
        policy: &CustomerAiPolicy,
    ) -> Result<(), StoreError>;

    // ── Knowledge articles ──────────────────────────────────────────

    async fn insert_article(&self, article: &KnowledgeArticle) -> Result<(), StoreError>;

    /// Up to `limit` most-recently-updated *published* articles for the
    /// tenant.
    async fn relevant_articles(
        &self,
        customer_id: Uuid,
        limit: usize,
    ) -> Result<Vec<KnowledgeArticle>, StoreError>;

    // ── Outbound messages ───────────────────────────────────────────

    async fn insert_outbound(&self, message: &OutboundMessage) -> Result<(), StoreError>;

    /// Persist the full delivery state of a message (status, attempts,
    /// error, claim, timestamps).
    async fn update_outbound(&self, message: &OutboundMessage) -> Result<(), StoreError>;

    async fn get_outbound(&self, id: Uuid) -> Result<Option<OutboundMessage>, StoreError>;

    /// Whether any message with this correlation key has reached `Sent`.
    async fn correlation_sent(&self, correlation_key: &str) -> Result<bool, StoreError>;

    /// All `Pending` and `Failed` messages, oldest first (FIFO).
    async fn dispatchable_outbound(&self) -> Result<Vec<OutboundMessage>, StoreError>;

    /// CAS-claim a message for `worker_id`. Succeeds when the message is
    /// unclaimed, already ours, or the existing claim is older than
    /// `stale_before`. Returns whether the claim was taken.
    async fn claim_outbound(
        &self,
        id: Uuid,
        worker_id: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Up to `limit` dead letters, oldest first (recovery order).
    async fn oldest_dead_letters(&self, limit: usize) -> Result<Vec<OutboundMessage>, StoreError>;

    /// Up to `limit` dead letters, newest first (operations view).
    async fn recent_dead_letters(&self, limit: usize) -> Result<Vec<OutboundMessage>, StoreError>;

    /// Up to `limit` most-recent messages for a customer, optionally
    /// filtered by status.
    async fn outbound_for_customer(
        &self,
        customer_id: Uuid,
        status: Option<OutboundStatus>,
        limit: usize,
    ) -> Result<Vec<OutboundMessage>, StoreError>;

    /// Count of messages still owed a delivery (`Pending` + `Failed`).
    async fn queue_depth(&self) -> Result<u64, StoreError>;

    // ── Audit ───────────────────────────────────────────────────────

    async fn record_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Most-recent audit rows for a ticket.
    async fn audit_for_ticket(
        &self,
        ticket_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StoreError>;
}
