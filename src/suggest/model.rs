//! Suggestion data model — categories, risk, drafts, and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ticket::TicketPriority;

/// Closed ticket category set.
///
/// Free-text input is mapped onto a canonical member by [`TicketCategory::normalize`];
/// unrecognized values become `GeneralRequest` rather than propagating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TicketCategory {
    Access,
    ServiceIncident,
    BillingDispute,
    SecurityIncident,
    LegalRequest,
    #[default]
    GeneralRequest,
}

impl TicketCategory {
    /// Canonical label, as stored on tickets and shown to operators.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Access => "Access",
            Self::ServiceIncident => "ServiceIncident",
            Self::BillingDispute => "BillingDispute",
            Self::SecurityIncident => "SecurityIncident",
            Self::LegalRequest => "LegalRequest",
            Self::GeneralRequest => "GeneralRequest",
        }
    }

    /// Map free text onto a canonical member: strip all whitespace, compare
    /// case-insensitively, default to `GeneralRequest`.
    pub fn normalize(s: &str) -> Self {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "access" => Self::Access,
            "serviceincident" => Self::ServiceIncident,
            "billingdispute" => Self::BillingDispute,
            "securityincident" => Self::SecurityIncident,
            "legalrequest" => Self::LegalRequest,
            "generalrequest" => Self::GeneralRequest,
            _ => Self::GeneralRequest,
        }
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coarse three-tier risk classification gating automatic actions.
/// Unrecognized inputs normalize to `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn normalize(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Disposition of a suggestion.
///
/// `PendingApproval` may move to `Approved` or `Discarded`; `AutoSent` is
/// assigned at creation and never transitions further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    PendingApproval,
    Approved,
    AutoSent,
    Discarded,
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingApproval => write!(f, "pending_approval"),
            Self::Approved => write!(f, "approved"),
            Self::AutoSent => write!(f, "auto_sent"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

impl std::str::FromStr for SuggestionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "auto_sent" => Ok(Self::AutoSent),
            "discarded" => Ok(Self::Discarded),
            _ => Err(format!("Unknown suggestion status: {}", s)),
        }
    }
}

/// What a backend produces for one triage run, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionDraft {
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub draft_response: String,
    pub risk: RiskLevel,
    /// Clamped to [0, 1].
    pub confidence: f32,
    /// Cheap length-based proxy, not a real token count.
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Hex digest of the constructed prompt, for audit/traceability only.
    pub prompt_hash: String,
}

/// A persisted suggestion for a ticket.
///
/// Multiple suggestions may exist per ticket (re-runs); the active one is
/// the most recent with status `PendingApproval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub draft_response: String,
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub risk: RiskLevel,
    pub confidence: f32,
    pub status: SuggestionStatus,
    /// Operator who approved/discarded, when applicable.
    pub processed_by: Option<Uuid>,
    pub prompt_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Suggestion {
    /// Persistable suggestion from a backend draft.
    pub fn from_draft(ticket_id: Uuid, draft: &SuggestionDraft, status: SuggestionStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            draft_response: draft.draft_response.clone(),
            category: draft.category,
            priority: draft.priority,
            risk: draft.risk,
            confidence: draft.confidence.clamp(0.0, 1.0),
            status,
            processed_by: None,
            prompt_hash: draft.prompt_hash.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_normalization_strips_whitespace_and_case() {
        assert_eq!(
            TicketCategory::normalize("  Service Incident "),
            TicketCategory::ServiceIncident
        );
        assert_eq!(TicketCategory::normalize("ACCESS"), TicketCategory::Access);
        assert_eq!(
            TicketCategory::normalize("billing dispute"),
            TicketCategory::BillingDispute
        );
        assert_eq!(
            TicketCategory::normalize("legal\trequest"),
            TicketCategory::LegalRequest
        );
    }

    #[test]
    fn unknown_category_defaults_to_general() {
        assert_eq!(
            TicketCategory::normalize("HardwareSwap"),
            TicketCategory::GeneralRequest
        );
        assert_eq!(TicketCategory::normalize(""), TicketCategory::GeneralRequest);
    }

    #[test]
    fn risk_normalization_defaults_low() {
        assert_eq!(RiskLevel::normalize(" HIGH "), RiskLevel::High);
        assert_eq!(RiskLevel::normalize("medium"), RiskLevel::Medium);
        assert_eq!(RiskLevel::normalize("severe"), RiskLevel::Low);
    }

    #[test]
    fn suggestion_from_draft_clamps_confidence() {
        let draft = SuggestionDraft {
            category: TicketCategory::Access,
            priority: TicketPriority::Medium,
            draft_response: "draft".into(),
            risk: RiskLevel::Low,
            confidence: 1.4,
            input_tokens: 10,
            output_tokens: 5,
            prompt_hash: "abc".into(),
        };
        let s = Suggestion::from_draft(Uuid::new_v4(), &draft, SuggestionStatus::PendingApproval);
        assert!((s.confidence - 1.0).abs() < f32::EPSILON);
        assert_eq!(s.status, SuggestionStatus::PendingApproval);
        assert!(s.processed_by.is_none());
    }

    #[test]
    fn status_round_trips() {
        for status in [
            SuggestionStatus::PendingApproval,
            SuggestionStatus::Approved,
            SuggestionStatus::AutoSent,
            SuggestionStatus::Discarded,
        ] {
            let parsed: SuggestionStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
