//! Entity Resolver
//!
//! Maps a parsed message to the contact and company it concerns. An inbound
//! reply inherits the association of the thread's latest outbound message
//! before any address lookup happens.

use super::models::Direction;
use super::relevance::RelevanceSet;
use crate::db::{Database, DbResult, EntityAssociation};
use crate::mail::ParsedMessage;

/// Outcome of resolving one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Counterpart is not tracked; the message must not be stored
    Irrelevant,
    /// Store the message with this association (possibly empty)
    Relevant(EntityAssociation),
}

/// Address on the other side of the conversation
///
/// The sender for inbound messages, the primary recipient otherwise.
pub fn counterpart(message: &ParsedMessage, direction: Direction) -> Option<&str> {
    match direction {
        Direction::Inbound => message.from.as_deref(),
        Direction::Outbound => message.primary_to(),
    }
}

/// Resolve `message` against the workspace directory
pub fn resolve(
    db: &Database,
    workspace_id: &str,
    relevance: &RelevanceSet,
    message: &ParsedMessage,
    direction: Direction,
) -> DbResult<Resolution> {
    let Some(address) = counterpart(message, direction).filter(|a| relevance.contains(a)) else {
        return Ok(Resolution::Irrelevant);
    };

    // Thread continuity wins over the sender's own directory entry
    if direction == Direction::Inbound {
        if let Some(thread_id) = message.thread_id.as_deref() {
            if let Some(association) = db.find_thread_outbound_association(workspace_id, thread_id)? {
                return Ok(Resolution::Relevant(association));
            }
        }
    }

    if let Some(contact) = db.find_contact_by_email(workspace_id, address)? {
        return Ok(Resolution::Relevant(EntityAssociation {
            contact_id: Some(contact.contact_id),
            company_id: contact.company_id,
        }));
    }

    let company_id = db.find_company_by_email(workspace_id, address)?;
    Ok(Resolution::Relevant(EntityAssociation {
        contact_id: None,
        company_id,
    }))
}
