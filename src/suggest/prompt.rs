//! Triage prompt construction.
//!
//! The prompt carries the ticket subject/summary, up to 12 recent thread
//! messages (chronological), and up to 3 published knowledge articles. Its
//! SHA-256 digest travels with the suggestion for audit — it is not a cache
//! key.

use sha2::{Digest, Sha256};

/// Most recent thread messages included in the prompt.
pub const MAX_CONTEXT_MESSAGES: usize = 12;

/// Knowledge articles included in the prompt.
pub const MAX_CONTEXT_ARTICLES: usize = 3;

/// Per-message body truncation (chars).
const MESSAGE_PREVIEW_CHARS: usize = 500;

/// Per-article body truncation (chars).
const ARTICLE_PREVIEW_CHARS: usize = 700;

/// A thread message as seen by the generator.
#[derive(Debug, Clone)]
pub struct ContextMessage {
    /// Author label, e.g. "end_user" or "agent".
    pub author: String,
    pub body: String,
}

/// A knowledge-article snippet as seen by the generator.
#[derive(Debug, Clone)]
pub struct ContextArticle {
    pub title: String,
    pub body: String,
}

/// Everything the suggestion backends see about a ticket.
#[derive(Debug, Clone, Default)]
pub struct TriageContext {
    pub subject: String,
    pub summary: String,
    /// Chronological, already capped at [`MAX_CONTEXT_MESSAGES`].
    pub messages: Vec<ContextMessage>,
    /// Already capped at [`MAX_CONTEXT_ARTICLES`].
    pub articles: Vec<ContextArticle>,
}

impl TriageContext {
    /// Concatenated free text used by the keyword fallback.
    pub fn haystack(&self) -> String {
        let mut text = String::with_capacity(256);
        text.push_str(&self.subject);
        text.push('\n');
        text.push_str(&self.summary);
        for msg in &self.messages {
            text.push('\n');
            text.push_str(&msg.body);
        }
        text
    }
}

/// Instruction block sent ahead of the ticket context.
pub fn system_prompt() -> String {
    "You are a support-ticket triage engine. Read the ticket and reply with ONLY a JSON object:\n\
     {\"category\": \"...\", \"priority\": \"...\", \"risk\": \"...\", \"confidence\": 0.0, \"draftResponse\": \"...\"}\n\n\
     Rules:\n\
     - category is one of: Access, ServiceIncident, BillingDispute, SecurityIncident, LegalRequest, GeneralRequest\n\
     - priority is one of: Low, Medium, High, Critical\n\
     - risk is one of: Low, Medium, High — how costly an incorrect automatic reply would be\n\
     - confidence is 0.0-1.0; high values only for straightforward requests\n\
     - draftResponse is a short, polite reply the requester could receive verbatim"
        .to_string()
}

/// Build the ticket-context prompt text.
pub fn build_prompt(context: &TriageContext) -> String {
    let mut prompt = String::with_capacity(1024);

    prompt.push_str(&format!("Subject: {}\n", context.subject));
    prompt.push_str(&format!("Summary: {}\n", context.summary));

    if !context.articles.is_empty() {
        prompt.push_str("\nRelevant knowledge articles:\n");
        for article in context.articles.iter().take(MAX_CONTEXT_ARTICLES) {
            let preview: String = article.body.chars().take(ARTICLE_PREVIEW_CHARS).collect();
            prompt.push_str(&format!("## {}\n{}\n", article.title, preview));
        }
    }

    if !context.messages.is_empty() {
        prompt.push_str("\nRecent thread (oldest first):\n");
        for (i, msg) in context
            .messages
            .iter()
            .take(MAX_CONTEXT_MESSAGES)
            .enumerate()
        {
            let preview: String = msg.body.chars().take(MESSAGE_PREVIEW_CHARS).collect();
            prompt.push_str(&format!("  [{}] {}: {}\n", i + 1, msg.author, preview));
        }
    }

    prompt
}

/// Lowercase hex SHA-256 of the prompt text.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Cheap token-count proxy: `max(1, chars/4)`.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64 / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TriageContext {
        TriageContext {
            subject: "VPN login fails".into(),
            summary: "User cannot log in to the VPN since this morning.".into(),
            messages: vec![
                ContextMessage {
                    author: "end_user".into(),
                    body: "I keep getting an MFA error.".into(),
                },
                ContextMessage {
                    author: "agent".into(),
                    body: "Which token are you using?".into(),
                },
            ],
            articles: vec![ContextArticle {
                title: "Resetting MFA tokens".into(),
                body: "Step 1: open the portal...".into(),
            }],
        }
    }

    #[test]
    fn prompt_includes_all_sections() {
        let prompt = build_prompt(&context());
        assert!(prompt.contains("Subject: VPN login fails"));
        assert!(prompt.contains("Summary: User cannot log in"));
        assert!(prompt.contains("Resetting MFA tokens"));
        assert!(prompt.contains("[1] end_user: I keep getting an MFA error."));
        assert!(prompt.contains("[2] agent: Which token are you using?"));
    }

    #[test]
    fn prompt_truncates_long_message_bodies() {
        let mut ctx = context();
        ctx.messages[0].body = "x".repeat(2000);
        let prompt = build_prompt(&ctx);
        assert!(prompt.len() < 1500);
    }

    #[test]
    fn prompt_caps_message_and_article_counts() {
        let mut ctx = context();
        ctx.messages = (0..20)
            .map(|i| ContextMessage {
                author: "end_user".into(),
                body: format!("message {}", i),
            })
            .collect();
        let prompt = build_prompt(&ctx);
        assert!(prompt.contains("message 11"));
        assert!(!prompt.contains("message 12"));
    }

    #[test]
    fn hash_is_stable_hex() {
        let a = prompt_hash("hello");
        let b = prompt_hash("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(prompt_hash("hello"), prompt_hash("hello!"));
    }

    #[test]
    fn token_estimate_has_floor_of_one() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn haystack_concatenates_subject_summary_and_bodies() {
        let hay = context().haystack();
        assert!(hay.contains("VPN login fails"));
        assert!(hay.contains("MFA error"));
        assert!(hay.contains("Which token"));
    }
}
