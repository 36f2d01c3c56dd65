//! Defensive parsing of generative completions.
//!
//! Backends return free text that should contain a JSON object. We take the
//! first *balanced* `{...}` substring (brace depth tracked outside string
//! literals), then read fields with lenient defaults. Only a missing object
//! or a missing draft is fatal — and "fatal" here just means the caller
//! falls through to the deterministic fallback.

use serde::Deserialize;

use crate::error::GenerativeError;
use crate::suggest::model::{RiskLevel, TicketCategory};
use crate::ticket::TicketPriority;

/// Default confidence when the payload omits or mangles the field.
const DEFAULT_CONFIDENCE: f32 = 0.75;

/// Raw payload as the backend wrote it, all fields optional.
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    risk: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default, alias = "draft_response", alias = "draft")]
    #[serde(rename = "draftResponse")]
    draft_response: Option<String>,
}

/// Normalized triage fields extracted from a completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSuggestion {
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub risk: RiskLevel,
    pub confidence: f32,
    pub draft_response: String,
}

/// Extract the first balanced `{...}` substring from free text.
///
/// Depth counting ignores braces inside JSON string literals and honors
/// backslash escapes, so drafts containing `{` don't break the scan.
pub fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a completion into normalized triage fields.
///
/// Missing object or missing/empty draft → `Unparsable`. Everything else is
/// defaulted: category GeneralRequest, priority Medium, risk Low,
/// confidence 0.75; confidence is clamped to [0, 1].
pub fn parse_completion(raw: &str) -> Result<ParsedSuggestion, GenerativeError> {
    let object = first_balanced_object(raw)
        .ok_or_else(|| GenerativeError::Unparsable("no JSON object in completion".into()))?;

    let payload: RawPayload = serde_json::from_str(object)
        .map_err(|e| GenerativeError::Unparsable(format!("JSON parse error: {e}")))?;

    let draft_response = match payload.draft_response {
        Some(d) if !d.trim().is_empty() => d,
        _ => {
            return Err(GenerativeError::Unparsable(
                "completion lacks a draft response".into(),
            ));
        }
    };

    Ok(ParsedSuggestion {
        category: TicketCategory::normalize(payload.category.as_deref().unwrap_or("")),
        priority: TicketPriority::normalize(payload.priority.as_deref().unwrap_or("")),
        risk: RiskLevel::normalize(payload.risk.as_deref().unwrap_or("")),
        confidence: payload
            .confidence
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0),
        draft_response,
    })
}
