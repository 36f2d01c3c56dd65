//! Guarded ticket status state machine.
//!
//! All moves — explicit or implicit — pass through [`transition`]. A
//! self-transition is a no-op; any edge not in the table fails with an
//! explicit error naming both states and leaves the ticket untouched.

use chrono::Utc;
use tracing::debug;

use crate::error::TicketError;
use crate::ticket::model::{MessageAuthor, Ticket, TicketStatus};

/// Allowed target states from a given status.
pub fn allowed_transitions(from: TicketStatus) -> &'static [TicketStatus] {
    use TicketStatus::*;
    match from {
        New => &[Triaged, InProgress, WaitingCustomer, Resolved, Closed],
        Triaged => &[InProgress, WaitingCustomer, Resolved, Closed],
        InProgress => &[WaitingCustomer, Resolved, Closed],
        WaitingCustomer => &[InProgress, Resolved, Closed],
        Resolved => &[Closed, InProgress],
        Closed => &[InProgress],
    }
}

/// Move `ticket` to `to`, enforcing the transition table.
///
/// Returns `Ok(true)` when the status changed, `Ok(false)` for the
/// self-transition no-op. Entering `Resolved` stamps `resolved_at`;
/// entering `InProgress` clears it (reopen semantics).
pub fn transition(ticket: &mut Ticket, to: TicketStatus) -> Result<bool, TicketError> {
    let from = ticket.status;
    if from == to {
        return Ok(false);
    }
    if !allowed_transitions(from).contains(&to) {
        return Err(TicketError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    ticket.status = to;
    ticket.updated_at = Utc::now();
    match to {
        TicketStatus::Resolved => ticket.resolved_at = Some(ticket.updated_at),
        TicketStatus::InProgress => ticket.resolved_at = None,
        _ => {}
    }

    debug!(ticket_id = %ticket.id, %from, %to, "Ticket status transition");
    Ok(true)
}

/// Apply the implicit transition triggered by a newly appended message.
///
/// A technician reply while `InProgress` hands the ticket to the customer
/// (`WaitingCustomer`); a customer reply while `WaitingCustomer` pulls it
/// back (`InProgress`). Both go through [`transition`]. Returns the
/// `(from, to)` pair when a move happened.
pub fn on_message_appended(
    ticket: &mut Ticket,
    author: MessageAuthor,
) -> Result<Option<(TicketStatus, TicketStatus)>, TicketError> {
    let from = ticket.status;
    let target = match (author, from) {
        (MessageAuthor::Agent, TicketStatus::InProgress) => TicketStatus::WaitingCustomer,
        (MessageAuthor::EndUser, TicketStatus::WaitingCustomer) => TicketStatus::InProgress,
        _ => return Ok(None),
    };
    transition(ticket, target)?;
    Ok(Some((from, target)))
}
