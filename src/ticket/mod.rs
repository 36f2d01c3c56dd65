//! Ticket domain — model, guarded status state machine, and messaging.
//!
//! Status moves only along the transition table in [`state`]; entering
//! `Resolved` stamps the resolved timestamp and re-entering `InProgress`
//! clears it. Message authorship drives two implicit transitions
//! (agent reply → WaitingCustomer, customer reply → InProgress), routed
//! through the same guard as explicit moves.

pub mod model;
pub mod state;

pub use model::{
    MessageAuthor, MessageSource, Ticket, TicketChannel, TicketMessage, TicketPriority,
    TicketStatus,
};
