//! Per-tenant automation policy — the gate between a suggestion and an
//! irreversible outbound reply.
//!
//! Sensitive categories never auto-send, whatever the confidence; the
//! restricted set is hard-coded, not tenant-configurable.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::suggest::model::{RiskLevel, SuggestionDraft, TicketCategory};

/// Categories that always require a human, regardless of confidence.
pub const RESTRICTED_CATEGORIES: [TicketCategory; 3] = [
    TicketCategory::SecurityIncident,
    TicketCategory::BillingDispute,
    TicketCategory::LegalRequest,
];

/// What a tenant allows the triage pipeline to do on its behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationMode {
    /// Suggestions are drafted but always held for human approval.
    #[default]
    SuggestOnly,
    /// Low-risk, high-confidence suggestions may be sent automatically.
    AutoRespondLowRisk,
}

impl std::fmt::Display for AutomationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SuggestOnly => write!(f, "suggest_only"),
            Self::AutoRespondLowRisk => write!(f, "auto_respond_low_risk"),
        }
    }
}

impl std::str::FromStr for AutomationMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suggest_only" => Ok(Self::SuggestOnly),
            "auto_respond_low_risk" => Ok(Self::AutoRespondLowRisk),
            _ => Err(format!("Unknown automation mode: {}", s)),
        }
    }
}

/// A tenant's automation policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomerAiPolicy {
    pub mode: AutomationMode,
    /// Minimum confidence for auto-send, in [0, 1].
    pub confidence_threshold: f32,
}

impl CustomerAiPolicy {
    /// Build a policy, rejecting thresholds outside [0, 1].
    pub fn new(mode: AutomationMode, confidence_threshold: f32) -> Result<Self, PolicyError> {
        if !(0.0..=1.0).contains(&confidence_threshold) || confidence_threshold.is_nan() {
            return Err(PolicyError::InvalidThreshold {
                value: confidence_threshold,
            });
        }
        Ok(Self {
            mode,
            confidence_threshold,
        })
    }

    /// Whether `draft` may be sent without human approval.
    ///
    /// True iff the tenant opted in, the risk is Low, the confidence meets
    /// the threshold, and the category is not restricted.
    pub fn allows_auto_send(&self, draft: &SuggestionDraft) -> bool {
        self.mode == AutomationMode::AutoRespondLowRisk
            && draft.risk == RiskLevel::Low
            && draft.confidence >= self.confidence_threshold
            && !RESTRICTED_CATEGORIES.contains(&draft.category)
    }
}

impl Default for CustomerAiPolicy {
    /// Suggest-only with a 0.80 threshold (inert until a tenant opts in).
    fn default() -> Self {
        Self {
            mode: AutomationMode::SuggestOnly,
            confidence_threshold: 0.80,
        }
    }
}
