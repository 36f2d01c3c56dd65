//! Deterministic keyword fallback.
//!
//! Total by construction: every ticket classifies to exactly one category
//! with a fixed canned response, so the composed generator always has a
//! suggestion even when the generative backend is down, slow, or spouting
//! garbage. Matching is case-insensitive substring over the concatenated
//! ticket text; the first matching rule wins.

use async_trait::async_trait;

use crate::error::GenerativeError;
use crate::suggest::generator::SuggestionBackend;
use crate::suggest::model::{RiskLevel, SuggestionDraft, TicketCategory};
use crate::suggest::prompt::{self, TriageContext};
use crate::ticket::TicketPriority;

/// One classification outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub risk: RiskLevel,
    pub confidence: f32,
}

/// Ordered keyword rules; earlier rules shadow later ones.
const RULES: &[(&[&str], Classification)] = &[
    (
        &["access", "login", "password", "mfa"],
        Classification {
            category: TicketCategory::Access,
            priority: TicketPriority::Medium,
            risk: RiskLevel::Low,
            confidence: 0.78,
        },
    ),
    (
        &["down", "outage", "offline"],
        Classification {
            category: TicketCategory::ServiceIncident,
            priority: TicketPriority::High,
            risk: RiskLevel::Low,
            confidence: 0.83,
        },
    ),
    (
        &["billing", "invoice"],
        Classification {
            category: TicketCategory::BillingDispute,
            priority: TicketPriority::High,
            risk: RiskLevel::High,
            confidence: 0.66,
        },
    ),
    (
        &["security", "breach", "phish", "legal"],
        Classification {
            category: TicketCategory::SecurityIncident,
            priority: TicketPriority::Critical,
            risk: RiskLevel::High,
            confidence: 0.61,
        },
    ),
];

/// Catch-all when no keyword matches.
const GENERAL: Classification = Classification {
    category: TicketCategory::GeneralRequest,
    priority: TicketPriority::Medium,
    risk: RiskLevel::Low,
    confidence: 0.78,
};

/// Fixed reply template per category.
pub fn canned_response(category: TicketCategory) -> &'static str {
    match category {
        TicketCategory::Access => {
            "Thanks for reaching out. It looks like you're having trouble signing in. \
             We've started the account checks on our side and will follow up shortly \
             with reset instructions if needed."
        }
        TicketCategory::ServiceIncident => {
            "Thanks for the report. We're treating this as a possible service incident \
             and our on-call engineer is investigating now. We'll keep you updated on \
             this ticket as we learn more."
        }
        TicketCategory::BillingDispute => {
            "Thanks for flagging this. We've routed your billing question to our \
             accounts team for review. They'll come back to you with a breakdown of \
             the charges in question."
        }
        TicketCategory::SecurityIncident => {
            "Thank you for reporting this. We take potential security issues very \
             seriously and have escalated your ticket to our security team for \
             immediate review. Please don't share further details over email."
        }
        TicketCategory::LegalRequest => {
            "Thank you for your message. Requests of this nature are handled by our \
             legal team; your ticket has been escalated to them and they will respond \
             directly."
        }
        TicketCategory::GeneralRequest => {
            "Thanks for getting in touch. Your request has been logged and a member \
             of our support team will pick it up shortly."
        }
    }
}

/// Classify free text by the rule table.
pub fn classify(text: &str) -> Classification {
    let lowered = text.to_lowercase();
    for (keywords, classification) in RULES {
        if keywords.iter().any(|k| lowered.contains(k)) {
            // The security rule splits: "legal" routes to the legal queue.
            if classification.category == TicketCategory::SecurityIncident
                && lowered.contains("legal")
            {
                return Classification {
                    category: TicketCategory::LegalRequest,
                    ..*classification
                };
            }
            return *classification;
        }
    }
    GENERAL
}

/// The fallback backend. Always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicBackend;

impl HeuristicBackend {
    pub fn new() -> Self {
        Self
    }

    /// Produce a draft without going through the async trait.
    pub fn draft_for(&self, context: &TriageContext) -> SuggestionDraft {
        let prompt_text = prompt::build_prompt(context);
        let classification = classify(&context.haystack());
        let draft_response = canned_response(classification.category).to_string();
        SuggestionDraft {
            category: classification.category,
            priority: classification.priority,
            risk: classification.risk,
            confidence: classification.confidence,
            input_tokens: prompt::estimate_tokens(&prompt_text),
            output_tokens: prompt::estimate_tokens(&draft_response),
            prompt_hash: prompt::prompt_hash(&prompt_text),
            draft_response,
        }
    }
}

#[async_trait]
impl SuggestionBackend for HeuristicBackend {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    async fn draft(&self, context: &TriageContext) -> Result<SuggestionDraft, GenerativeError> {
        Ok(self.draft_for(context))
    }
}
