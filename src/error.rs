//! Error types for the triage core.
//!
//! Only access, validation, not-found, and infrastructure failures surface
//! to callers. Delivery failures live in `OutboundMessage` state and
//! generative-backend failures are recovered inside the suggestion
//! generator; neither crosses this boundary.

use uuid::Uuid;

/// Top-level error type for the triage core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Ticket error: {0}")]
    Ticket(#[from] TicketError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Tenant-boundary and capability errors. Always surfaced, never downgraded.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("user {user_id} may not access customer {customer_id}")]
    TenantBoundary { user_id: Uuid, customer_id: Uuid },

    #[error("manage capability required to {action} for customer {customer_id}")]
    ManageRequired { action: &'static str, customer_id: Uuid },
}

/// Ticket state-machine errors.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("invalid ticket status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Automation-policy validation errors.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("confidence threshold {value} is outside [0, 1]")]
    InvalidThreshold { value: f32 },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Delivery-queue request errors (distinct from per-attempt transport
/// failures, which are recorded as message state).
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("message {id} is {status}, only dead-lettered messages can be requeued")]
    NotDeadLetter { id: Uuid, status: String },
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Generative-backend failures. Never surfaced to triage callers — every
/// variant falls through to the deterministic fallback.
#[derive(Debug, thiserror::Error)]
pub enum GenerativeError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unparsable completion: {0}")]
    Unparsable(String),
}

/// Delivery-transport failures. Recorded on the outbound message and
/// retried within the budget; never thrown past the delivery worker.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// Result type alias for the triage core.
pub type Result<T> = std::result::Result<T, Error>;
