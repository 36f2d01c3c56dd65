//! Triage orchestration — suggestion runs, human disposition, and ticket
//! messaging.
//!
//! `run_suggestion` is the trigger-event entry point: build context, draft
//! a suggestion (generative or fallback, never failing), gate it through the
//! tenant's policy, and either auto-send or hold for approval. The ticket's
//! category and priority are overwritten immediately in both branches,
//! before any human confirmation.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::access::AccessContext;
use crate::audit::{AuditRecord, action};
use crate::error::{Error, Result, StoreError};
use crate::notify::queue::{EnqueueRequest, NotificationQueue};
use crate::store::TriageStore;
use crate::suggest::generator::SuggestionGenerator;
use crate::suggest::model::{RiskLevel, Suggestion, SuggestionStatus, TicketCategory};
use crate::suggest::prompt::{
    ContextArticle, ContextMessage, MAX_CONTEXT_ARTICLES, MAX_CONTEXT_MESSAGES, TriageContext,
};
use crate::ticket::{
    MessageAuthor, MessageSource, Ticket, TicketMessage, TicketPriority, TicketStatus, state,
};

/// Actor name on triage audit rows not attributable to a user.
const AUDIT_ACTOR: &str = "triage";

/// What caused a suggestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageTrigger {
    TicketCreated,
    TicketUpdated,
    Manual,
}

impl std::fmt::Display for TriageTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TicketCreated => write!(f, "ticket_created"),
            Self::TicketUpdated => write!(f, "ticket_updated"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Result shape returned to the surrounding API.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionOutcome {
    pub ticket_id: Uuid,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub draft_response: String,
    pub risk: RiskLevel,
    pub confidence: f32,
    pub status: SuggestionStatus,
    pub auto_response_sent: bool,
}

impl SuggestionOutcome {
    fn from_suggestion(suggestion: &Suggestion, auto_response_sent: bool) -> Self {
        Self {
            ticket_id: suggestion.ticket_id,
            category: suggestion.category,
            priority: suggestion.priority,
            draft_response: suggestion.draft_response.clone(),
            risk: suggestion.risk,
            confidence: suggestion.confidence,
            status: suggestion.status,
            auto_response_sent,
        }
    }
}

/// Ticket-triage service consumed in-process by the surrounding API.
pub struct TriageService {
    store: Arc<dyn TriageStore>,
    generator: SuggestionGenerator,
    queue: Arc<NotificationQueue>,
}

impl TriageService {
    pub fn new(
        store: Arc<dyn TriageStore>,
        generator: SuggestionGenerator,
        queue: Arc<NotificationQueue>,
    ) -> Self {
        Self {
            store,
            generator,
            queue,
        }
    }

    async fn load_ticket(&self, ticket_id: Uuid) -> Result<Ticket> {
        self.store
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| {
                Error::Store(StoreError::NotFound {
                    entity: "ticket",
                    id: ticket_id.to_string(),
                })
            })
    }

    /// Run the suggestion pipeline for a ticket.
    ///
    /// Never fails because of the generative backend; only missing tickets,
    /// tenant-boundary violations, and store errors surface.
    pub async fn run_suggestion(
        &self,
        ticket_id: Uuid,
        trigger: TriageTrigger,
        ctx: &AccessContext,
    ) -> Result<SuggestionOutcome> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        ctx.ensure_access(ticket.customer_id)?;

        let messages = self
            .store
            .recent_messages(ticket_id, MAX_CONTEXT_MESSAGES)
            .await?;
        let articles = self
            .store
            .relevant_articles(ticket.customer_id, MAX_CONTEXT_ARTICLES)
            .await?;
        let context = TriageContext {
            subject: ticket.subject.clone(),
            summary: ticket.summary.clone(),
            messages: messages
                .iter()
                .map(|m| ContextMessage {
                    author: m.author.to_string(),
                    body: m.body.clone(),
                })
                .collect(),
            articles: articles
                .into_iter()
                .map(|a| ContextArticle {
                    title: a.title,
                    body: a.body,
                })
                .collect(),
        };

        let draft = self.generator.generate(&context).await;

        let policy = self.store.policy_for(ticket.customer_id).await?;
        let auto_send = policy.allows_auto_send(&draft);
        let status = if auto_send {
            SuggestionStatus::AutoSent
        } else {
            SuggestionStatus::PendingApproval
        };

        let suggestion = Suggestion::from_draft(ticket_id, &draft, status);
        self.store.insert_suggestion(&suggestion).await?;

        // Triage fields land on the ticket immediately, in both branches.
        ticket.category = suggestion.category.label().to_string();
        ticket.priority = suggestion.priority;
        ticket.updated_at = Utc::now();
        self.store.update_ticket(&ticket).await?;

        let detail = serde_json::json!({
            "suggestion_id": suggestion.id,
            "trigger": trigger.to_string(),
            "backend": self.generator.backend_name(),
            "category": suggestion.category.label(),
            "priority": suggestion.priority.label(),
            "risk": suggestion.risk.label(),
            "confidence": suggestion.confidence,
            "prompt_hash": suggestion.prompt_hash,
        });

        if auto_send {
            self.append_message_inner(
                &mut ticket,
                MessageAuthor::Agent,
                MessageSource::Ai,
                &suggestion.draft_response,
            )
            .await?;
            self.queue
                .enqueue(EnqueueRequest {
                    customer_id: ticket.customer_id,
                    ticket_id: Some(ticket.id),
                    recipient: ticket.creator_contact.clone(),
                    subject: format!("Re: {} [{}]", ticket.subject, ticket.reference),
                    body: suggestion.draft_response.clone(),
                    correlation_key: format!("ticket:{}:auto-response", ticket.id),
                })
                .await?;
            self.store
                .record_audit(&AuditRecord::new(
                    ticket.customer_id,
                    Some(ticket.id),
                    AUDIT_ACTOR,
                    action::AUTO_RESPONSE_SENT,
                    detail,
                ))
                .await?;
        } else {
            self.store
                .record_audit(&AuditRecord::new(
                    ticket.customer_id,
                    Some(ticket.id),
                    AUDIT_ACTOR,
                    action::SUGGESTION_CREATED,
                    detail,
                ))
                .await?;
        }

        info!(
            ticket_id = %ticket.id,
            category = %suggestion.category,
            confidence = suggestion.confidence,
            auto_send,
            "Suggestion run complete"
        );
        Ok(SuggestionOutcome::from_suggestion(&suggestion, auto_send))
    }

    /// Approve the active suggestion, optionally with edited text.
    ///
    /// Returns `Ok(None)`, not an error, when the ticket has no pending
    /// suggestion. Requires the manage capability.
    pub async fn approve_suggestion(
        &self,
        ticket_id: Uuid,
        edited_text: Option<String>,
        ctx: &AccessContext,
    ) -> Result<Option<SuggestionOutcome>> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        ctx.ensure_manage(ticket.customer_id, "approve suggestions")?;

        let Some(mut suggestion) = self.store.latest_pending_suggestion(ticket_id).await? else {
            return Ok(None);
        };

        let edited = edited_text.is_some();
        if let Some(text) = edited_text {
            suggestion.draft_response = text;
        }
        suggestion.status = SuggestionStatus::Approved;
        suggestion.processed_by = Some(ctx.user_id);
        suggestion.updated_at = Utc::now();
        self.store.update_suggestion(&suggestion).await?;

        self.append_message_inner(
            &mut ticket,
            MessageAuthor::Agent,
            MessageSource::Ai,
            &suggestion.draft_response,
        )
        .await?;
        self.queue
            .enqueue(EnqueueRequest {
                customer_id: ticket.customer_id,
                ticket_id: Some(ticket.id),
                recipient: ticket.creator_contact.clone(),
                subject: format!("Re: {} [{}]", ticket.subject, ticket.reference),
                body: suggestion.draft_response.clone(),
                correlation_key: format!("suggestion:{}:approved", suggestion.id),
            })
            .await?;
        self.store
            .record_audit(&AuditRecord::new(
                ticket.customer_id,
                Some(ticket.id),
                ctx.user_id.to_string(),
                action::SUGGESTION_APPROVED,
                serde_json::json!({
                    "suggestion_id": suggestion.id,
                    "edited": edited,
                }),
            ))
            .await?;

        info!(ticket_id = %ticket.id, suggestion_id = %suggestion.id, edited, "Suggestion approved");
        Ok(Some(SuggestionOutcome::from_suggestion(&suggestion, false)))
    }

    /// Discard the active suggestion. No message, no notification.
    pub async fn discard_suggestion(
        &self,
        ticket_id: Uuid,
        ctx: &AccessContext,
    ) -> Result<Option<SuggestionOutcome>> {
        let ticket = self.load_ticket(ticket_id).await?;
        ctx.ensure_manage(ticket.customer_id, "discard suggestions")?;

        let Some(mut suggestion) = self.store.latest_pending_suggestion(ticket_id).await? else {
            return Ok(None);
        };

        suggestion.status = SuggestionStatus::Discarded;
        suggestion.processed_by = Some(ctx.user_id);
        suggestion.updated_at = Utc::now();
        self.store.update_suggestion(&suggestion).await?;
        self.store
            .record_audit(&AuditRecord::new(
                ticket.customer_id,
                Some(ticket.id),
                ctx.user_id.to_string(),
                action::SUGGESTION_DISCARDED,
                serde_json::json!({ "suggestion_id": suggestion.id }),
            ))
            .await?;

        info!(ticket_id = %ticket.id, suggestion_id = %suggestion.id, "Suggestion discarded");
        Ok(Some(SuggestionOutcome::from_suggestion(&suggestion, false)))
    }

    /// Append a message to a ticket, applying the implicit status
    /// transitions driven by authorship.
    pub async fn add_message(
        &self,
        ticket_id: Uuid,
        author: MessageAuthor,
        source: MessageSource,
        body: impl Into<String>,
        ctx: &AccessContext,
    ) -> Result<TicketMessage> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        ctx.ensure_access(ticket.customer_id)?;
        self.append_message_inner(&mut ticket, author, source, &body.into())
            .await
    }

    /// Explicitly move a ticket along the status table.
    pub async fn transition_ticket(
        &self,
        ticket_id: Uuid,
        to: TicketStatus,
        ctx: &AccessContext,
    ) -> Result<Ticket> {
        let mut ticket = self.load_ticket(ticket_id).await?;
        ctx.ensure_access(ticket.customer_id)?;

        let from = ticket.status;
        if state::transition(&mut ticket, to)? {
            self.store.update_ticket(&ticket).await?;
            self.store
                .record_audit(&AuditRecord::new(
                    ticket.customer_id,
                    Some(ticket.id),
                    ctx.user_id.to_string(),
                    action::STATUS_TRANSITION,
                    serde_json::json!({
                        "from": from.to_string(),
                        "to": to.to_string(),
                        "trigger": "explicit",
                    }),
                ))
                .await?;
        }
        Ok(ticket)
    }

    /// Persist a message and apply any implicit status transition it
    /// triggers; both routed through the guarded state machine.
    async fn append_message_inner(
        &self,
        ticket: &mut Ticket,
        author: MessageAuthor,
        source: MessageSource,
        body: &str,
    ) -> Result<TicketMessage> {
        let message = TicketMessage::new(ticket.id, author, source, body);
        self.store.append_message(&message).await?;

        if let Some((from, to)) = state::on_message_appended(ticket, author)? {
            self.store.update_ticket(ticket).await?;
            self.store
                .record_audit(&AuditRecord::new(
                    ticket.customer_id,
                    Some(ticket.id),
                    AUDIT_ACTOR,
                    action::STATUS_TRANSITION,
                    serde_json::json!({
                        "from": from.to_string(),
                        "to": to.to_string(),
                        "trigger": "message",
                        "author": author.to_string(),
                    }),
                ))
                .await?;
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessRole;
    use crate::error::{AccessError, TransportError};
    use crate::notify::metrics::DeliveryMetrics;
    use crate::notify::model::{OutboundMessage, OutboundStatus};
    use crate::notify::transport::NotificationTransport;
    use crate::notify::worker::DeliveryWorker;
    use crate::policy::{AutomationMode, CustomerAiPolicy};
    use crate::store::LibSqlStore;
    use crate::suggest::generator::SuggestionBackend;
    use crate::suggest::model::SuggestionDraft;
    use crate::ticket::TicketChannel;
    use async_trait::async_trait;

    struct OkTransport;

    #[async_trait]
    impl NotificationTransport for OkTransport {
        fn name(&self) -> &'static str {
            "ok"
        }
        async fn deliver(&self, _m: &OutboundMessage) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    async fn service() -> (Arc<LibSqlStore>, TriageService) {
        service_with_generator(SuggestionGenerator::heuristic_only()).await
    }

    async fn service_with_generator(
        generator: SuggestionGenerator,
    ) -> (Arc<LibSqlStore>, TriageService) {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let metrics = Arc::new(DeliveryMetrics::new());
        let worker = Arc::new(DeliveryWorker::new(
            store.clone(),
            Arc::new(OkTransport),
            metrics.clone(),
            3,
            "worker-test",
        ));
        let queue = NotificationQueue::new(store.clone(), worker, metrics);
        let service = TriageService::new(store.clone(), generator, queue);
        (store, service)
    }

    async fn seed_ticket(store: &LibSqlStore, summary: &str) -> Ticket {
        let ticket = Ticket::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "reporter@example.com",
            TicketChannel::Email,
            "Need help",
            summary,
        );
        store.insert_ticket(&ticket).await.unwrap();
        ticket
    }

    fn operator_for(ticket: &Ticket) -> AccessContext {
        AccessContext::new(Uuid::new_v4(), AccessRole::Operator, ticket.customer_id)
    }

    fn end_user_for(ticket: &Ticket) -> AccessContext {
        AccessContext::new(ticket.creator_id, AccessRole::EndUser, ticket.customer_id)
    }

    // ── run_suggestion ──────────────────────────────────────────────

    #[tokio::test]
    async fn outage_under_default_policy_is_held_for_approval() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "Complete outage of the customer portal").await;

        let outcome = service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &operator_for(&ticket))
            .await
            .unwrap();

        assert_eq!(outcome.category, TicketCategory::ServiceIncident);
        assert_eq!(outcome.priority, TicketPriority::High);
        assert!((outcome.confidence - 0.83).abs() < f32::EPSILON);
        assert_eq!(outcome.status, SuggestionStatus::PendingApproval);
        assert!(!outcome.auto_response_sent);

        // Ticket fields overwritten immediately, before any approval
        let loaded = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(loaded.category, "ServiceIncident");
        assert_eq!(loaded.priority, TicketPriority::High);

        // Held: no message, no outbound
        assert!(store.recent_messages(ticket.id, 12).await.unwrap().is_empty());
        assert!(
            store
                .outbound_for_customer(ticket.customer_id, None, 200)
                .await
                .unwrap()
                .is_empty()
        );

        let audit = store.audit_for_ticket(ticket.id, 10).await.unwrap();
        assert!(audit.iter().any(|r| r.action == action::SUGGESTION_CREATED));
    }

    #[tokio::test]
    async fn password_reset_auto_sends_under_permissive_policy() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "Please reset my password for the VPN").await;
        store
            .set_policy(
                ticket.customer_id,
                &CustomerAiPolicy::new(AutomationMode::AutoRespondLowRisk, 0.20).unwrap(),
            )
            .await
            .unwrap();

        let outcome = service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &operator_for(&ticket))
            .await
            .unwrap();

        assert_eq!(outcome.category, TicketCategory::Access);
        assert!((outcome.confidence - 0.78).abs() < f32::EPSILON);
        assert_eq!(outcome.risk, RiskLevel::Low);
        assert_eq!(outcome.status, SuggestionStatus::AutoSent);
        assert!(outcome.auto_response_sent);

        // Exactly one AI-sourced agent message
        let messages = store.recent_messages(ticket.id, 12).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].author, MessageAuthor::Agent);
        assert_eq!(messages[0].source, MessageSource::Ai);

        // Notification delivered to the ticket creator
        let outbound = store
            .outbound_for_customer(ticket.customer_id, None, 200)
            .await
            .unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].recipient, "reporter@example.com");
        assert_eq!(outbound[0].status, OutboundStatus::Sent);

        let audit = store.audit_for_ticket(ticket.id, 20).await.unwrap();
        assert!(audit.iter().any(|r| r.action == action::AUTO_RESPONSE_SENT));
    }

    #[tokio::test]
    async fn high_risk_category_never_auto_sends() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "Dispute about our last invoice").await;
        store
            .set_policy(
                ticket.customer_id,
                &CustomerAiPolicy::new(AutomationMode::AutoRespondLowRisk, 0.0).unwrap(),
            )
            .await
            .unwrap();

        let outcome = service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &operator_for(&ticket))
            .await
            .unwrap();

        // BillingDispute is high risk AND restricted; held either way
        assert_eq!(outcome.category, TicketCategory::BillingDispute);
        assert_eq!(outcome.status, SuggestionStatus::PendingApproval);
        assert!(store.recent_messages(ticket.id, 12).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restricted_category_blocks_even_low_risk_high_confidence() {
        struct ConfidentBilling;

        #[async_trait]
        impl SuggestionBackend for ConfidentBilling {
            fn name(&self) -> &'static str {
                "confident-billing"
            }
            async fn draft(
                &self,
                _: &TriageContext,
            ) -> std::result::Result<SuggestionDraft, crate::error::GenerativeError> {
                Ok(SuggestionDraft {
                    category: TicketCategory::BillingDispute,
                    priority: TicketPriority::High,
                    risk: RiskLevel::Low,
                    confidence: 0.99,
                    draft_response: "Refund issued.".into(),
                    input_tokens: 1,
                    output_tokens: 1,
                    prompt_hash: "h".into(),
                })
            }
        }

        let generator = SuggestionGenerator::with_backend(Arc::new(ConfidentBilling));
        let (store, service) = service_with_generator(generator).await;
        let ticket = seed_ticket(&store, "anything").await;
        store
            .set_policy(
                ticket.customer_id,
                &CustomerAiPolicy::new(AutomationMode::AutoRespondLowRisk, 0.0).unwrap(),
            )
            .await
            .unwrap();

        let outcome = service
            .run_suggestion(ticket.id, TriageTrigger::Manual, &operator_for(&ticket))
            .await
            .unwrap();
        assert_eq!(outcome.status, SuggestionStatus::PendingApproval);
        assert!(!outcome.auto_response_sent);
    }

    #[tokio::test]
    async fn repeated_auto_runs_notify_once() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "reset my password please").await;
        store
            .set_policy(
                ticket.customer_id,
                &CustomerAiPolicy::new(AutomationMode::AutoRespondLowRisk, 0.20).unwrap(),
            )
            .await
            .unwrap();
        let ctx = operator_for(&ticket);

        service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &ctx)
            .await
            .unwrap();
        service
            .run_suggestion(ticket.id, TriageTrigger::TicketUpdated, &ctx)
            .await
            .unwrap();

        // Same correlation key: second enqueue is a no-op after the first Sent
        let outbound = store
            .outbound_for_customer(ticket.customer_id, None, 200)
            .await
            .unwrap();
        assert_eq!(outbound.len(), 1);
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let (_store, service) = service().await;
        let ctx = AccessContext::new(Uuid::new_v4(), AccessRole::PlatformOperator, Uuid::new_v4());
        let err = service
            .run_suggestion(Uuid::new_v4(), TriageTrigger::Manual, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn cross_tenant_caller_is_rejected() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "outage").await;
        let outsider = AccessContext::new(Uuid::new_v4(), AccessRole::Operator, Uuid::new_v4());

        let err = service
            .run_suggestion(ticket.id, TriageTrigger::Manual, &outsider)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::TenantBoundary { .. })
        ));
    }

    // ── approve / discard ───────────────────────────────────────────

    #[tokio::test]
    async fn approve_without_pending_returns_none() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "outage").await;

        let outcome = service
            .approve_suggestion(ticket.id, None, &operator_for(&ticket))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(store.recent_messages(ticket.id, 12).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approve_sends_message_and_notification() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "outage in production").await;
        let ctx = operator_for(&ticket);

        service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &ctx)
            .await
            .unwrap();
        let outcome = service
            .approve_suggestion(ticket.id, None, &ctx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.status, SuggestionStatus::Approved);

        let messages = store.recent_messages(ticket.id, 12).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].author, MessageAuthor::Agent);

        let outbound = store
            .outbound_for_customer(ticket.customer_id, None, 200)
            .await
            .unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].status, OutboundStatus::Sent);

        // No pending suggestion left
        assert!(
            store
                .latest_pending_suggestion(ticket.id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn approve_with_edited_text_overwrites_draft() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "outage").await;
        let ctx = operator_for(&ticket);

        service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &ctx)
            .await
            .unwrap();
        let outcome = service
            .approve_suggestion(ticket.id, Some("Hand-tuned reply.".into()), &ctx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.draft_response, "Hand-tuned reply.");
        let messages = store.recent_messages(ticket.id, 12).await.unwrap();
        assert_eq!(messages[0].body, "Hand-tuned reply.");
    }

    #[tokio::test]
    async fn approve_requires_manage_capability() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "outage").await;
        let operator = operator_for(&ticket);

        service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &operator)
            .await
            .unwrap();

        let err = service
            .approve_suggestion(ticket.id, None, &end_user_for(&ticket))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Access(AccessError::ManageRequired { .. })
        ));

        // Platform operators manage any tenant
        let platform =
            AccessContext::new(Uuid::new_v4(), AccessRole::PlatformOperator, Uuid::new_v4());
        assert!(
            service
                .approve_suggestion(ticket.id, None, &platform)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn discard_leaves_no_message_or_notification() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "outage").await;
        let ctx = operator_for(&ticket);

        service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &ctx)
            .await
            .unwrap();
        let outcome = service
            .discard_suggestion(ticket.id, &ctx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.status, SuggestionStatus::Discarded);
        assert!(store.recent_messages(ticket.id, 12).await.unwrap().is_empty());
        assert!(
            store
                .outbound_for_customer(ticket.customer_id, None, 200)
                .await
                .unwrap()
                .is_empty()
        );

        let audit = store.audit_for_ticket(ticket.id, 20).await.unwrap();
        assert!(audit.iter().any(|r| r.action == action::SUGGESTION_DISCARDED));
    }

    #[tokio::test]
    async fn approve_targets_most_recent_pending() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "outage").await;
        let ctx = operator_for(&ticket);

        // Two runs → two pending suggestions
        service
            .run_suggestion(ticket.id, TriageTrigger::TicketCreated, &ctx)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        service
            .run_suggestion(ticket.id, TriageTrigger::TicketUpdated, &ctx)
            .await
            .unwrap();

        let latest = store
            .latest_pending_suggestion(ticket.id)
            .await
            .unwrap()
            .unwrap();
        service
            .approve_suggestion(ticket.id, None, &ctx)
            .await
            .unwrap()
            .unwrap();

        // The older one is still pending; the newer is the one approved
        let remaining = store
            .latest_pending_suggestion(ticket.id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(remaining.id, latest.id);
    }

    // ── messaging & transitions ─────────────────────────────────────

    #[tokio::test]
    async fn auto_send_moves_in_progress_ticket_to_waiting_customer() {
        let (store, service) = service().await;
        let mut ticket = seed_ticket(&store, "please reset my password").await;
        ticket.status = TicketStatus::InProgress;
        store.update_ticket(&ticket).await.unwrap();
        store
            .set_policy(
                ticket.customer_id,
                &CustomerAiPolicy::new(AutomationMode::AutoRespondLowRisk, 0.20).unwrap(),
            )
            .await
            .unwrap();

        service
            .run_suggestion(ticket.id, TriageTrigger::TicketUpdated, &operator_for(&ticket))
            .await
            .unwrap();

        let loaded = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TicketStatus::WaitingCustomer);
    }

    #[tokio::test]
    async fn customer_reply_pulls_ticket_back_to_in_progress() {
        let (store, service) = service().await;
        let mut ticket = seed_ticket(&store, "anything").await;
        ticket.status = TicketStatus::WaitingCustomer;
        store.update_ticket(&ticket).await.unwrap();

        service
            .add_message(
                ticket.id,
                MessageAuthor::EndUser,
                MessageSource::Human,
                "It still doesn't work.",
                &end_user_for(&ticket),
            )
            .await
            .unwrap();

        let loaded = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TicketStatus::InProgress);
    }

    #[tokio::test]
    async fn explicit_transition_persists_and_rejects_bad_edges() {
        let (store, service) = service().await;
        let ticket = seed_ticket(&store, "anything").await;
        let ctx = operator_for(&ticket);

        let updated = service
            .transition_ticket(ticket.id, TicketStatus::Resolved, &ctx)
            .await
            .unwrap();
        assert_eq!(updated.status, TicketStatus::Resolved);
        assert!(updated.resolved_at.is_some());

        let err = service
            .transition_ticket(ticket.id, TicketStatus::Triaged, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ticket(_)));

        // State unchanged after the failed transition
        let loaded = store.get_ticket(ticket.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TicketStatus::Resolved);
    }
}
