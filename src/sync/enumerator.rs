//! Connection Enumerator
//!
//! Picks the mailbox connections that take part in a run.

use super::models::{CallerKind, RunContext};
use crate::db::{Database, DbResult, MailboxConnection};

/// Connections to process for `ctx`, in processing order
///
/// A user run covers the caller's personal mailbox in the active workspace
/// followed by the workspace's shared mailboxes. A scheduler run covers the
/// shared mailboxes of every workspace and never touches personal ones.
pub fn enumerate_connections(db: &Database, ctx: &RunContext) -> DbResult<Vec<MailboxConnection>> {
    match ctx.caller_kind {
        CallerKind::Scheduler => db.get_workspace_connections(None),
        CallerKind::User => {
            let Some(workspace_id) = ctx.workspace_id.as_deref() else {
                return Ok(Vec::new());
            };

            let mut connections = Vec::new();
            if let Some(user_id) = ctx.user_id.as_deref() {
                if let Some(personal) = db.get_personal_connection(workspace_id, user_id)? {
                    connections.push(personal);
                }
            }
            connections.extend(db.get_workspace_connections(Some(workspace_id))?);

            Ok(connections)
        }
    }
}
