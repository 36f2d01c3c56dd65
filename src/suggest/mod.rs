//! Suggestion generation — generative backend with a total deterministic
//! fallback.
//!
//! A triage run flows through:
//! 1. [`prompt`] — assemble ticket context into a prompt (hashed for audit)
//! 2. [`generator::SuggestionBackend`] — generative completion, if configured
//! 3. [`parse`] — defensive extraction of the structured payload
//! 4. [`heuristic`] — keyword fallback, reached on any backend failure
//!
//! The composed [`generator::SuggestionGenerator`] is total: ticket
//! workflows never fail because the generative backend is unavailable.

pub mod generator;
pub mod heuristic;
pub mod model;
pub mod parse;
pub mod prompt;

pub use generator::{GenerativeBackend, SuggestionBackend, SuggestionGenerator};
pub use heuristic::HeuristicBackend;
pub use model::{RiskLevel, Suggestion, SuggestionDraft, SuggestionStatus, TicketCategory};
pub use prompt::TriageContext;
