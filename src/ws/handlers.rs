//! WebSocket message dispatch
//!
//! Authorization is checked here, then dispatched to role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::Role;
use std::sync::Arc;

use super::{admin, guest};

/// Return early with an UNAUTHORIZED error unless the connection is an admin
macro_rules! check_admin {
    ($role:expr, $action:expr) => {
        if $role != Role::Admin {
            tracing::warn!("{:?} connection tried to {}", $role, $action);
            return Some(ServerMessage::error(
                "UNAUTHORIZED",
                format!("Only admin can {}", $action),
            ));
        }
    };
}

/// Handle client messages and return optional response
pub async fn handle_message(
    msg: ClientMessage,
    role: Role,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CastVote {
            name,
            choice,
            user_id,
            photo_url,
            user_comment,
        } => guest::handle_cast_vote(state, name, choice, user_id, photo_url, user_comment).await,

        ClientMessage::DeleteVote { vote_id } => {
            guest::handle_delete_vote(state, role, vote_id).await
        }

        ClientMessage::GetState => guest::handle_get_state(state).await,

        ClientMessage::AdminSetLock { locked } => {
            check_admin!(role, "lock voting");
            admin::handle_set_lock(state, locked).await
        }

        ClientMessage::AdminReveal { winner } => {
            check_admin!(role, "reveal the result");
            admin::handle_reveal(state, winner).await
        }

        ClientMessage::AdminReset => {
            check_admin!(role, "reset the game");
            admin::handle_reset(state).await
        }

        ClientMessage::AdminSetMaxVotes { max_votes } => {
            check_admin!(role, "change the vote limit");
            admin::handle_set_max_votes(state, max_votes).await
        }
    }
}
