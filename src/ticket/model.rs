//! Ticket data model — tickets, messages, and their enums.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a ticket. Transitions are guarded by
/// [`crate::ticket::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    Triaged,
    InProgress,
    WaitingCustomer,
    Resolved,
    Closed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Triaged => write!(f, "triaged"),
            Self::InProgress => write!(f, "in_progress"),
            Self::WaitingCustomer => write!(f, "waiting_customer"),
            Self::Resolved => write!(f, "resolved"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "triaged" => Ok(Self::Triaged),
            "in_progress" => Ok(Self::InProgress),
            "waiting_customer" => Ok(Self::WaitingCustomer),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Unknown ticket status: {}", s)),
        }
    }
}

/// Ticket priority. Unrecognized inputs normalize to `Medium`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TicketPriority {
    /// Map arbitrary casing/spacing onto a canonical member; anything
    /// unrecognized becomes `Medium`.
    pub fn normalize(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }

    /// Canonical label, as exposed in suggestion payloads and audit detail.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Channel a ticket arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketChannel {
    Email,
    Portal,
    Phone,
    Api,
}

impl std::fmt::Display for TicketChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Portal => write!(f, "portal"),
            Self::Phone => write!(f, "phone"),
            Self::Api => write!(f, "api"),
        }
    }
}

impl std::str::FromStr for TicketChannel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "portal" => Ok(Self::Portal),
            "phone" => Ok(Self::Phone),
            "api" => Ok(Self::Api),
            _ => Err(format!("Unknown ticket channel: {}", s)),
        }
    }
}

/// Who authored a ticket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageAuthor {
    /// The customer-side requester.
    EndUser,
    /// A technician on the resolving side.
    Agent,
    /// The platform itself (notifications, system notes).
    System,
}

impl std::fmt::Display for MessageAuthor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndUser => write!(f, "end_user"),
            Self::Agent => write!(f, "agent"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageAuthor {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "end_user" => Ok(Self::EndUser),
            "agent" => Ok(Self::Agent),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown message author: {}", s)),
        }
    }
}

/// Where a message's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// Typed by a person.
    Human,
    /// Produced by the suggestion generator.
    Ai,
    /// Produced by a workflow rule.
    Automation,
}

impl std::fmt::Display for MessageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Ai => write!(f, "ai"),
            Self::Automation => write!(f, "automation"),
        }
    }
}

impl std::str::FromStr for MessageSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(Self::Human),
            "ai" => Ok(Self::Ai),
            "automation" => Ok(Self::Automation),
            _ => Err(format!("Unknown message source: {}", s)),
        }
    }
}

/// A support ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub creator_id: Uuid,
    /// Where notifications to the creator are delivered. Resolved by the
    /// intake collaborator when the ticket is created.
    pub creator_contact: String,
    pub channel: TicketChannel,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    /// Canonical category label (whitespace-normalized).
    pub category: String,
    pub subject: String,
    pub summary: String,
    pub assignee_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set iff status == Resolved; cleared on re-entering InProgress.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Human-facing reference code, e.g. `TKT-4H7Q2N`.
    pub reference: String,
}

impl Ticket {
    /// Create a new ticket in status `New`.
    pub fn new(
        customer_id: Uuid,
        creator_id: Uuid,
        creator_contact: impl Into<String>,
        channel: TicketChannel,
        subject: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            creator_id,
            creator_contact: creator_contact.into(),
            channel,
            status: TicketStatus::New,
            priority: TicketPriority::Medium,
            category: "GeneralRequest".to_string(),
            subject: subject.into(),
            summary: summary.into(),
            assignee_id: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            reference: generate_reference(),
        }
    }
}

/// A message on a ticket's thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author: MessageAuthor,
    pub source: MessageSource,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl TicketMessage {
    pub fn new(
        ticket_id: Uuid,
        author: MessageAuthor,
        source: MessageSource,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            author,
            source,
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

/// Generate a short human-facing reference code.
fn generate_reference() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("TKT-{}", suffix.to_ascii_uppercase())
}
