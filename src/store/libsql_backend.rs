//! libSQL backend — async `TriageStore` implementation.
//!
//! Stores a single connection that is reused for all operations.
//! `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
//! Timestamps are RFC 3339 text; enums are stored by their canonical string
//! form and read back leniently.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::error::StoreError;
use crate::notify::model::{OutboundMessage, OutboundStatus};
use crate::policy::{AutomationMode, CustomerAiPolicy};
use crate::store::migrations;
use crate::store::traits::{KnowledgeArticle, TriageStore};
use crate::suggest::model::{RiskLevel, Suggestion, SuggestionStatus, TicketCategory};
use crate::ticket::{
    MessageAuthor, MessageSource, Ticket, TicketChannel, TicketMessage, TicketPriority,
    TicketStatus,
};

/// libSQL store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_optional_datetime(s: &Option<String>) -> Option<DateTime<Utc>> {
    s.as_ref().map(|s| parse_datetime(s))
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_optional_uuid(s: &Option<String>) -> Option<Uuid> {
    s.as_ref().map(|s| parse_uuid(s))
}

/// Convert `Option<String>` to a libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_uuid(u: Option<Uuid>) -> libsql::Value {
    opt_text_owned(u.map(|u| u.to_string()))
}

fn opt_datetime(d: Option<DateTime<Utc>>) -> libsql::Value {
    opt_text_owned(d.map(|d| d.to_rfc3339()))
}

// ── Row mappers ─────────────────────────────────────────────────────

const TICKET_COLUMNS: &str = "id, customer_id, creator_id, creator_contact, channel, status, \
     priority, category, subject, summary, assignee_id, created_at, updated_at, resolved_at, \
     reference";

fn row_to_ticket(row: &libsql::Row) -> Result<Ticket, libsql::Error> {
    let id: String = row.get(0)?;
    let customer_id: String = row.get(1)?;
    let creator_id: String = row.get(2)?;
    let channel: String = row.get(4)?;
    let status: String = row.get(5)?;
    let priority: String = row.get(6)?;
    let assignee_id: Option<String> = row.get(10).ok();
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;
    let resolved_at: Option<String> = row.get(13).ok();

    Ok(Ticket {
        id: parse_uuid(&id),
        customer_id: parse_uuid(&customer_id),
        creator_id: parse_uuid(&creator_id),
        creator_contact: row.get(3)?,
        channel: channel.parse().unwrap_or(TicketChannel::Portal),
        status: status.parse().unwrap_or(TicketStatus::New),
        priority: TicketPriority::normalize(&priority),
        category: row.get(7)?,
        subject: row.get(8)?,
        summary: row.get(9)?,
        assignee_id: parse_optional_uuid(&assignee_id),
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
        resolved_at: parse_optional_datetime(&resolved_at),
        reference: row.get(14)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, ticket_id, author, source, body, created_at";

fn row_to_message(row: &libsql::Row) -> Result<TicketMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let ticket_id: String = row.get(1)?;
    let author: String = row.get(2)?;
    let source: String = row.get(3)?;
    let created_at: String = row.get(5)?;

    Ok(TicketMessage {
        id: parse_uuid(&id),
        ticket_id: parse_uuid(&ticket_id),
        author: author.parse().unwrap_or(MessageAuthor::System),
        source: source.parse().unwrap_or(MessageSource::Human),
        body: row.get(4)?,
        created_at: parse_datetime(&created_at),
    })
}

const SUGGESTION_COLUMNS: &str = "id, ticket_id, draft_response, category, priority, risk, \
     confidence, status, processed_by, prompt_hash, created_at, updated_at";

fn row_to_suggestion(row: &libsql::Row) -> Result<Suggestion, libsql::Error> {
    let id: String = row.get(0)?;
    let ticket_id: String = row.get(1)?;
    let category: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let risk: String = row.get(5)?;
    let confidence: f64 = row.get(6)?;
    let status: String = row.get(7)?;
    let processed_by: Option<String> = row.get(8).ok();
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;

    Ok(Suggestion {
        id: parse_uuid(&id),
        ticket_id: parse_uuid(&ticket_id),
        draft_response: row.get(2)?,
        category: TicketCategory::normalize(&category),
        priority: TicketPriority::normalize(&priority),
        risk: RiskLevel::normalize(&risk),
        confidence: confidence as f32,
        status: status.parse().unwrap_or(SuggestionStatus::PendingApproval),
        processed_by: parse_optional_uuid(&processed_by),
        prompt_hash: row.get(9)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

const OUTBOUND_COLUMNS: &str = "id, ticket_id, customer_id, recipient, subject, body, \
     correlation_key, status, attempt_count, last_error, claimed_by, claimed_at, created_at, \
     sent_at, dead_lettered_at";

fn row_to_outbound(row: &libsql::Row) -> Result<OutboundMessage, libsql::Error> {
    let id: String = row.get(0)?;
    let ticket_id: Option<String> = row.get(1).ok();
    let customer_id: String = row.get(2)?;
    let status: String = row.get(7)?;
    let attempt_count: i64 = row.get(8)?;
    let last_error: Option<String> = row.get(9).ok();
    let claimed_by: Option<String> = row.get(10).ok();
    let claimed_at: Option<String> = row.get(11).ok();
    let created_at: String = row.get(12)?;
    let sent_at: Option<String> = row.get(13).ok();
    let dead_lettered_at: Option<String> = row.get(14).ok();

    Ok(OutboundMessage {
        id: parse_uuid(&id),
        ticket_id: parse_optional_uuid(&ticket_id),
        customer_id: parse_uuid(&customer_id),
        recipient: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        correlation_key: row.get(6)?,
        status: status.parse().unwrap_or(OutboundStatus::Pending),
        attempt_count: attempt_count.max(0) as u32,
        last_error,
        claimed_by,
        claimed_at: parse_optional_datetime(&claimed_at),
        created_at: parse_datetime(&created_at),
        sent_at: parse_optional_datetime(&sent_at),
        dead_lettered_at: parse_optional_datetime(&dead_lettered_at),
    })
}

const AUDIT_COLUMNS: &str = "id, customer_id, ticket_id, actor, action, detail, created_at";

fn row_to_audit(row: &libsql::Row) -> Result<AuditRecord, libsql::Error> {
    let id: String = row.get(0)?;
    let customer_id: String = row.get(1)?;
    let ticket_id: Option<String> = row.get(2).ok();
    let detail: String = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(AuditRecord {
        id: parse_uuid(&id),
        customer_id: parse_uuid(&customer_id),
        ticket_id: parse_optional_uuid(&ticket_id),
        actor: row.get(3)?,
        action: row.get(4)?,
        detail: serde_json::from_str(&detail).unwrap_or_else(|_| serde_json::json!({})),
        created_at: parse_datetime(&created_at),
    })
}

const ARTICLE_COLUMNS: &str = "id, customer_id, title, body, published, updated_at";

fn row_to_article(row: &libsql::Row) -> Result<KnowledgeArticle, libsql::Error> {
    let id: String = row.get(0)?;
    let customer_id: String = row.get(1)?;
    let published: i64 = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(KnowledgeArticle {
        id: parse_uuid(&id),
        customer_id: parse_uuid(&customer_id),
        title: row.get(2)?,
        body: row.get(3)?,
        published: published != 0,
        updated_at: parse_datetime(&updated_at),
    })
}

/// Collect every row of a query through a mapper.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    label: &str,
    map: impl Fn(&libsql::Row) -> Result<T, libsql::Error>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| StoreError::Query(format!("{label}: {e}")))?
    {
        out.push(map(&row).map_err(|e| StoreError::Query(format!("{label} row parse: {e}")))?);
    }
    Ok(out)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl TriageStore for LibSqlStore {
    async fn run_migrations(&self) -> Result<(), StoreError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Tickets ─────────────────────────────────────────────────────

    async fn insert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO tickets ({TICKET_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    ticket.id.to_string(),
                    ticket.customer_id.to_string(),
                    ticket.creator_id.to_string(),
                    ticket.creator_contact.clone(),
                    ticket.channel.to_string(),
                    ticket.status.to_string(),
                    ticket.priority.to_string(),
                    ticket.category.clone(),
                    ticket.subject.clone(),
                    ticket.summary.clone(),
                    opt_uuid(ticket.assignee_id),
                    ticket.created_at.to_rfc3339(),
                    ticket.updated_at.to_rfc3339(),
                    opt_datetime(ticket.resolved_at),
                    ticket.reference.clone(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_ticket: {e}")))?;

        debug!(ticket_id = %ticket.id, reference = %ticket.reference, "Ticket inserted");
        Ok(())
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_ticket: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_ticket(&row).map_err(|e| {
                StoreError::Query(format!("get_ticket row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_ticket: {e}"))),
        }
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE tickets SET status = ?1, priority = ?2, category = ?3, \
                 assignee_id = ?4, updated_at = ?5, resolved_at = ?6, subject = ?7, \
                 summary = ?8 WHERE id = ?9",
                params![
                    ticket.status.to_string(),
                    ticket.priority.to_string(),
                    ticket.category.clone(),
                    opt_uuid(ticket.assignee_id),
                    ticket.updated_at.to_rfc3339(),
                    opt_datetime(ticket.resolved_at),
                    ticket.subject.clone(),
                    ticket.summary.clone(),
                    ticket.id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_ticket: {e}")))?;
        Ok(())
    }

    // ── Ticket messages ─────────────────────────────────────────────

    async fn append_message(&self, message: &TicketMessage) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO ticket_messages ({MESSAGE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    message.id.to_string(),
                    message.ticket_id.to_string(),
                    message.author.to_string(),
                    message.source.to_string(),
                    message.body.clone(),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_message: {e}")))?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        ticket_id: Uuid,
        limit: usize,
    ) -> Result<Vec<TicketMessage>, StoreError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM ticket_messages WHERE ticket_id = ?1 \
                     ORDER BY created_at DESC LIMIT ?2"
                ),
                params![ticket_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("recent_messages: {e}")))?;

        let mut messages = collect_rows(rows, "recent_messages", row_to_message).await?;
        messages.reverse(); // chronological
        Ok(messages)
    }

    // ── Suggestions ─────────────────────────────────────────────────

    async fn insert_suggestion(&self, suggestion: &Suggestion) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO suggestions ({SUGGESTION_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    suggestion.id.to_string(),
                    suggestion.ticket_id.to_string(),
                    suggestion.draft_response.clone(),
                    suggestion.category.to_string(),
                    suggestion.priority.to_string(),
                    suggestion.risk.to_string(),
                    suggestion.confidence as f64,
                    suggestion.status.to_string(),
                    opt_uuid(suggestion.processed_by),
                    suggestion.prompt_hash.clone(),
                    suggestion.created_at.to_rfc3339(),
                    suggestion.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_suggestion: {e}")))?;

        debug!(
            suggestion_id = %suggestion.id,
            ticket_id = %suggestion.ticket_id,
            status = %suggestion.status,
            "Suggestion inserted"
        );
        Ok(())
    }

    async fn update_suggestion(&self, suggestion: &Suggestion) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE suggestions SET draft_response = ?1, status = ?2, processed_by = ?3, \
                 updated_at = ?4 WHERE id = ?5",
                params![
                    suggestion.draft_response.clone(),
                    suggestion.status.to_string(),
                    opt_uuid(suggestion.processed_by),
                    suggestion.updated_at.to_rfc3339(),
                    suggestion.id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_suggestion: {e}")))?;
        Ok(())
    }

    async fn latest_pending_suggestion(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<Suggestion>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {SUGGESTION_COLUMNS} FROM suggestions \
                     WHERE ticket_id = ?1 AND status = 'pending_approval' \
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![ticket_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("latest_pending_suggestion: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_suggestion(&row).map_err(|e| {
                StoreError::Query(format!("latest_pending_suggestion row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("latest_pending_suggestion: {e}"))),
        }
    }

    // ── Automation policy ───────────────────────────────────────────

    async fn policy_for(&self, customer_id: Uuid) -> Result<CustomerAiPolicy, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT mode, confidence_threshold FROM ai_policies WHERE customer_id = ?1",
                params![customer_id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("policy_for: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let mode: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("policy_for row parse: {e}")))?;
                let threshold: f64 = row
                    .get(1)
                    .map_err(|e| StoreError::Query(format!("policy_for row parse: {e}")))?;
                Ok(CustomerAiPolicy {
                    mode: mode.parse().unwrap_or(AutomationMode::SuggestOnly),
                    confidence_threshold: (threshold as f32).clamp(0.0, 1.0),
                })
            }
            Ok(None) => Ok(CustomerAiPolicy::default()),
            Err(e) => Err(StoreError::Query(format!("policy_for: {e}"))),
        }
    }

    async fn set_policy(
        &self,
        customer_id: Uuid,
        policy: &CustomerAiPolicy,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO ai_policies (customer_id, mode, confidence_threshold, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(customer_id) DO UPDATE SET mode = excluded.mode, \
                 confidence_threshold = excluded.confidence_threshold, \
                 updated_at = excluded.updated_at",
                params![
                    customer_id.to_string(),
                    policy.mode.to_string(),
                    policy.confidence_threshold as f64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("set_policy: {e}")))?;
        Ok(())
    }

    // ── Knowledge articles ──────────────────────────────────────────

    async fn insert_article(&self, article: &KnowledgeArticle) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO kb_articles ({ARTICLE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    article.id.to_string(),
                    article.customer_id.to_string(),
                    article.title.clone(),
                    article.body.clone(),
                    article.published as i64,
                    article.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_article: {e}")))?;
        Ok(())
    }

    async fn relevant_articles(
        &self,
        customer_id: Uuid,
        limit: usize,
    ) -> Result<Vec<KnowledgeArticle>, StoreError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ARTICLE_COLUMNS} FROM kb_articles \
                     WHERE customer_id = ?1 AND published = 1 \
                     ORDER BY updated_at DESC LIMIT ?2"
                ),
                params![customer_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("relevant_articles: {e}")))?;

        collect_rows(rows, "relevant_articles", row_to_article).await
    }

    // ── Outbound messages ───────────────────────────────────────────

    async fn insert_outbound(&self, message: &OutboundMessage) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO outbound_messages ({OUTBOUND_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    message.id.to_string(),
                    opt_uuid(message.ticket_id),
                    message.customer_id.to_string(),
                    message.recipient.clone(),
                    message.subject.clone(),
                    message.body.clone(),
                    message.correlation_key.clone(),
                    message.status.to_string(),
                    message.attempt_count as i64,
                    opt_text_owned(message.last_error.clone()),
                    opt_text_owned(message.claimed_by.clone()),
                    opt_datetime(message.claimed_at),
                    message.created_at.to_rfc3339(),
                    opt_datetime(message.sent_at),
                    opt_datetime(message.dead_lettered_at),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_outbound: {e}")))?;

        debug!(
            message_id = %message.id,
            correlation_key = %message.correlation_key,
            "Outbound message inserted"
        );
        Ok(())
    }

    async fn update_outbound(&self, message: &OutboundMessage) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE outbound_messages SET status = ?1, attempt_count = ?2, \
                 last_error = ?3, claimed_by = ?4, claimed_at = ?5, sent_at = ?6, \
                 dead_lettered_at = ?7 WHERE id = ?8",
                params![
                    message.status.to_string(),
                    message.attempt_count as i64,
                    opt_text_owned(message.last_error.clone()),
                    opt_text_owned(message.claimed_by.clone()),
                    opt_datetime(message.claimed_at),
                    opt_datetime(message.sent_at),
                    opt_datetime(message.dead_lettered_at),
                    message.id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_outbound: {e}")))?;
        Ok(())
    }

    async fn get_outbound(&self, id: Uuid) -> Result<Option<OutboundMessage>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {OUTBOUND_COLUMNS} FROM outbound_messages WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_outbound: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_outbound(&row).map_err(|e| {
                StoreError::Query(format!("get_outbound row parse: {e}"))
            })?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_outbound: {e}"))),
        }
    }

    async fn correlation_sent(&self, correlation_key: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM outbound_messages \
                 WHERE correlation_key = ?1 AND status = 'sent'",
                params![correlation_key],
            )
            .await
            .map_err(|e| StoreError::Query(format!("correlation_sent: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("correlation_sent row parse: {e}")))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(StoreError::Query(format!("correlation_sent: {e}"))),
        }
    }

    async fn dispatchable_outbound(&self) -> Result<Vec<OutboundMessage>, StoreError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages \
                     WHERE status IN ('pending', 'failed') ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("dispatchable_outbound: {e}")))?;

        collect_rows(rows, "dispatchable_outbound", row_to_outbound).await
    }

    async fn claim_outbound(
        &self,
        id: Uuid,
        worker_id: &str,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE outbound_messages SET claimed_by = ?1, claimed_at = ?2 \
                 WHERE id = ?3 AND (claimed_by IS NULL OR claimed_by = ?1 OR claimed_at < ?4)",
                params![
                    worker_id,
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    stale_before.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("claim_outbound: {e}")))?;

        Ok(affected > 0)
    }

    async fn oldest_dead_letters(&self, limit: usize) -> Result<Vec<OutboundMessage>, StoreError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages \
                     WHERE status = 'dead_letter' ORDER BY created_at ASC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("oldest_dead_letters: {e}")))?;

        collect_rows(rows, "oldest_dead_letters", row_to_outbound).await
    }

    async fn recent_dead_letters(&self, limit: usize) -> Result<Vec<OutboundMessage>, StoreError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages \
                     WHERE status = 'dead_letter' \
                     ORDER BY dead_lettered_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("recent_dead_letters: {e}")))?;

        collect_rows(rows, "recent_dead_letters", row_to_outbound).await
    }

    async fn outbound_for_customer(
        &self,
        customer_id: Uuid,
        status: Option<OutboundStatus>,
        limit: usize,
    ) -> Result<Vec<OutboundMessage>, StoreError> {
        let rows = match status {
            Some(status) => self
                .conn()
                .query(
                    &format!(
                        "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages \
                         WHERE customer_id = ?1 AND status = ?2 \
                         ORDER BY created_at DESC LIMIT ?3"
                    ),
                    params![customer_id.to_string(), status.to_string(), limit as i64],
                )
                .await,
            None => self
                .conn()
                .query(
                    &format!(
                        "SELECT {OUTBOUND_COLUMNS} FROM outbound_messages \
                         WHERE customer_id = ?1 ORDER BY created_at DESC LIMIT ?2"
                    ),
                    params![customer_id.to_string(), limit as i64],
                )
                .await,
        }
        .map_err(|e| StoreError::Query(format!("outbound_for_customer: {e}")))?;

        collect_rows(rows, "outbound_for_customer", row_to_outbound).await
    }

    async fn queue_depth(&self) -> Result<u64, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM outbound_messages WHERE status IN ('pending', 'failed')",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("queue_depth: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("queue_depth row parse: {e}")))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StoreError::Query(format!("queue_depth: {e}"))),
        }
    }

    // ── Audit ───────────────────────────────────────────────────────

    async fn record_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO audit_log ({AUDIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    record.id.to_string(),
                    record.customer_id.to_string(),
                    opt_uuid(record.ticket_id),
                    record.actor.clone(),
                    record.action.clone(),
                    record.detail.to_string(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("record_audit: {e}")))?;
        Ok(())
    }

    async fn audit_for_ticket(
        &self,
        ticket_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE ticket_id = ?1 \
                     ORDER BY created_at DESC LIMIT ?2"
                ),
                params![ticket_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("audit_for_ticket: {e}")))?;

        collect_rows(rows, "audit_for_ticket", row_to_audit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketChannel;

    async fn store() -> LibSqlStore {
        LibSqlStore::new_memory().await.unwrap()
    }

    fn ticket() -> Ticket {
        Ticket::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice@example.com",
            TicketChannel::Email,
            "Printer offline",
            "The office printer dropped off the network.",
        )
    }

    #[tokio::test]
    async fn ticket_round_trip() {
        let store = store().await;
        let mut t = ticket();
        t.assignee_id = Some(Uuid::new_v4());
        store.insert_ticket(&t).await.unwrap();

        let loaded = store.get_ticket(t.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, t.id);
        assert_eq!(loaded.customer_id, t.customer_id);
        assert_eq!(loaded.creator_contact, "alice@example.com");
        assert_eq!(loaded.status, TicketStatus::New);
        assert_eq!(loaded.priority, TicketPriority::Medium);
        assert_eq!(loaded.assignee_id, t.assignee_id);
        assert_eq!(loaded.reference, t.reference);
    }

    #[tokio::test]
    async fn ticket_update_persists_status_and_category() {
        let store = store().await;
        let mut t = ticket();
        store.insert_ticket(&t).await.unwrap();

        t.status = TicketStatus::Resolved;
        t.resolved_at = Some(Utc::now());
        t.category = "ServiceIncident".into();
        t.priority = TicketPriority::High;
        store.update_ticket(&t).await.unwrap();

        let loaded = store.get_ticket(t.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TicketStatus::Resolved);
        assert!(loaded.resolved_at.is_some());
        assert_eq!(loaded.category, "ServiceIncident");
        assert_eq!(loaded.priority, TicketPriority::High);
    }

    #[tokio::test]
    async fn local_database_file_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("triage.db");

        let store = LibSqlStore::new_local(&path).await.unwrap();
        let t = ticket();
        store.insert_ticket(&t).await.unwrap();
        drop(store);

        let store = LibSqlStore::new_local(&path).await.unwrap();
        let loaded = store.get_ticket(t.id).await.unwrap().unwrap();
        assert_eq!(loaded.reference, t.reference);
    }

    #[tokio::test]
    async fn missing_ticket_is_none() {
        let store = store().await;
        assert!(store.get_ticket(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_messages_chronological_and_capped() {
        let store = store().await;
        let t = ticket();
        store.insert_ticket(&t).await.unwrap();

        for i in 0..15 {
            let mut m = TicketMessage::new(
                t.id,
                MessageAuthor::EndUser,
                MessageSource::Human,
                format!("message {i}"),
            );
            m.created_at = Utc::now() + chrono::Duration::seconds(i);
            store.append_message(&m).await.unwrap();
        }

        let messages = store.recent_messages(t.id, 12).await.unwrap();
        assert_eq!(messages.len(), 12);
        // Oldest of the 12 most recent is message 3; last is message 14
        assert_eq!(messages.first().unwrap().body, "message 3");
        assert_eq!(messages.last().unwrap().body, "message 14");
    }

    #[tokio::test]
    async fn latest_pending_suggestion_picks_most_recent() {
        let store = store().await;
        let t = ticket();
        store.insert_ticket(&t).await.unwrap();

        let draft = crate::suggest::model::SuggestionDraft {
            category: TicketCategory::Access,
            priority: TicketPriority::Medium,
            risk: RiskLevel::Low,
            confidence: 0.78,
            draft_response: "first".into(),
            input_tokens: 1,
            output_tokens: 1,
            prompt_hash: "h".into(),
        };
        let mut first = Suggestion::from_draft(t.id, &draft, SuggestionStatus::PendingApproval);
        first.created_at = Utc::now() - chrono::Duration::seconds(10);
        store.insert_suggestion(&first).await.unwrap();

        let mut second = Suggestion::from_draft(t.id, &draft, SuggestionStatus::PendingApproval);
        second.draft_response = "second".into();
        store.insert_suggestion(&second).await.unwrap();

        let active = store.latest_pending_suggestion(t.id).await.unwrap().unwrap();
        assert_eq!(active.draft_response, "second");

        // Approving the active one leaves the older pending as active
        let mut approved = active;
        approved.status = SuggestionStatus::Approved;
        approved.updated_at = Utc::now();
        store.update_suggestion(&approved).await.unwrap();

        let active = store.latest_pending_suggestion(t.id).await.unwrap().unwrap();
        assert_eq!(active.draft_response, "first");
    }

    #[tokio::test]
    async fn policy_defaults_then_round_trips() {
        let store = store().await;
        let customer = Uuid::new_v4();

        let policy = store.policy_for(customer).await.unwrap();
        assert_eq!(policy, CustomerAiPolicy::default());

        let custom =
            CustomerAiPolicy::new(AutomationMode::AutoRespondLowRisk, 0.25).unwrap();
        store.set_policy(customer, &custom).await.unwrap();
        let loaded = store.policy_for(customer).await.unwrap();
        assert_eq!(loaded.mode, AutomationMode::AutoRespondLowRisk);
        assert!((loaded.confidence_threshold - 0.25).abs() < 0.001);

        // Upsert overwrites
        let back = CustomerAiPolicy::default();
        store.set_policy(customer, &back).await.unwrap();
        assert_eq!(store.policy_for(customer).await.unwrap().mode, AutomationMode::SuggestOnly);
    }

    #[tokio::test]
    async fn relevant_articles_filters_unpublished() {
        let store = store().await;
        let customer = Uuid::new_v4();

        store
            .insert_article(&KnowledgeArticle::new(customer, "Published", "body", true))
            .await
            .unwrap();
        store
            .insert_article(&KnowledgeArticle::new(customer, "Draft", "body", false))
            .await
            .unwrap();
        store
            .insert_article(&KnowledgeArticle::new(
                Uuid::new_v4(),
                "Other tenant",
                "body",
                true,
            ))
            .await
            .unwrap();

        let articles = store.relevant_articles(customer, 3).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Published");
    }

    #[tokio::test]
    async fn outbound_round_trip_and_queue_depth() {
        let store = store().await;
        let m = OutboundMessage::new(
            Uuid::new_v4(),
            None,
            "bob@example.com",
            "subject",
            "body",
            "key-1",
        );
        store.insert_outbound(&m).await.unwrap();
        assert_eq!(store.queue_depth().await.unwrap(), 1);

        let mut loaded = store.get_outbound(m.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, OutboundStatus::Pending);
        assert_eq!(loaded.attempt_count, 0);

        loaded.status = OutboundStatus::Sent;
        loaded.sent_at = Some(Utc::now());
        loaded.attempt_count = 1;
        store.update_outbound(&loaded).await.unwrap();

        assert_eq!(store.queue_depth().await.unwrap(), 0);
        assert!(store.correlation_sent("key-1").await.unwrap());
        assert!(!store.correlation_sent("key-2").await.unwrap());
    }

    #[tokio::test]
    async fn dispatchable_is_fifo_and_includes_failed() {
        let store = store().await;
        let customer = Uuid::new_v4();

        let mut first = OutboundMessage::new(customer, None, "a@x.com", "s", "b", "k1");
        first.created_at = Utc::now() - chrono::Duration::seconds(20);
        first.status = OutboundStatus::Failed;
        store.insert_outbound(&first).await.unwrap();

        let mut second = OutboundMessage::new(customer, None, "b@x.com", "s", "b", "k2");
        second.created_at = Utc::now() - chrono::Duration::seconds(10);
        store.insert_outbound(&second).await.unwrap();

        let mut sent = OutboundMessage::new(customer, None, "c@x.com", "s", "b", "k3");
        sent.status = OutboundStatus::Sent;
        store.insert_outbound(&sent).await.unwrap();

        let batch = store.dispatchable_outbound().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, first.id);
        assert_eq!(batch[1].id, second.id);
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_stale() {
        let store = store().await;
        let m = OutboundMessage::new(Uuid::new_v4(), None, "a@x.com", "s", "b", "k1");
        store.insert_outbound(&m).await.unwrap();

        let stale = Utc::now() - chrono::Duration::minutes(5);
        assert!(store.claim_outbound(m.id, "worker-a", stale).await.unwrap());
        // Another worker cannot take a fresh claim
        assert!(!store.claim_outbound(m.id, "worker-b", stale).await.unwrap());
        // The holder can re-claim
        assert!(store.claim_outbound(m.id, "worker-a", stale).await.unwrap());
        // Once the claim is stale, another worker takes over
        let future_cutoff = Utc::now() + chrono::Duration::minutes(1);
        assert!(
            store
                .claim_outbound(m.id, "worker-b", future_cutoff)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn dead_letter_views_and_customer_listing() {
        let store = store().await;
        let customer = Uuid::new_v4();

        let mut old = OutboundMessage::new(customer, None, "a@x.com", "s", "b", "k1");
        old.created_at = Utc::now() - chrono::Duration::seconds(30);
        old.status = OutboundStatus::DeadLetter;
        old.dead_lettered_at = Some(Utc::now() - chrono::Duration::seconds(30));
        store.insert_outbound(&old).await.unwrap();

        let mut newer = OutboundMessage::new(customer, None, "b@x.com", "s", "b", "k2");
        newer.status = OutboundStatus::DeadLetter;
        newer.dead_lettered_at = Some(Utc::now());
        store.insert_outbound(&newer).await.unwrap();

        let oldest = store.oldest_dead_letters(10).await.unwrap();
        assert_eq!(oldest[0].id, old.id);

        let recent = store.recent_dead_letters(10).await.unwrap();
        assert_eq!(recent[0].id, newer.id);

        let only_dead = store
            .outbound_for_customer(customer, Some(OutboundStatus::DeadLetter), 200)
            .await
            .unwrap();
        assert_eq!(only_dead.len(), 2);

        let none_sent = store
            .outbound_for_customer(customer, Some(OutboundStatus::Sent), 200)
            .await
            .unwrap();
        assert!(none_sent.is_empty());
    }

    #[tokio::test]
    async fn audit_round_trip() {
        let store = store().await;
        let t = ticket();
        store.insert_ticket(&t).await.unwrap();

        let rec = AuditRecord::new(
            t.customer_id,
            Some(t.id),
            "triage",
            crate::audit::action::SUGGESTION_CREATED,
            serde_json::json!({ "category": "Access", "confidence": 0.78 }),
        );
        store.record_audit(&rec).await.unwrap();

        let rows = store.audit_for_ticket(t.id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "suggestion created");
        assert_eq!(rows[0].detail["category"], "Access");
    }
}
