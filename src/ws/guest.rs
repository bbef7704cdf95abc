//! Guest message handlers
//!
//! Casting, undoing and reading votes. Dashboards may send these too.

use crate::engine::{CastOutcome, CastVote};
use crate::llm::generate_prediction;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{Gender, Role, UserId, VoteId};
use std::sync::Arc;

/// Trimmed, or `None` when blank
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub async fn handle_cast_vote(
    state: &Arc<AppState>,
    name: String,
    choice: Gender,
    user_id: UserId,
    photo_url: Option<String>,
    user_comment: Option<String>,
) -> Option<ServerMessage> {
    let name = name.trim().to_string();
    let user_id = user_id.trim().to_string();
    if name.is_empty() || user_id.is_empty() {
        return Some(ServerMessage::error(
            "INVALID_VOTE",
            "A name and a signed-in user are required to vote",
        ));
    }

    tracing::info!("Cast vote: {} ({}) -> {}", name, user_id, choice);

    let ai_message = generate_prediction(state.llm(), &name, choice).await;

    let outcome = state
        .engine
        .cast_vote(CastVote {
            name,
            choice,
            user_id,
            photo_url: non_blank(photo_url),
            ai_message: Some(ai_message.clone()),
            user_comment: non_blank(user_comment),
        })
        .await;

    let success = outcome.is_success();
    Some(ServerMessage::VoteResult {
        success,
        vote_id: outcome.vote_id().map(str::to_string),
        message: outcome.message().map(str::to_string),
        ai_message: match outcome {
            CastOutcome::Recorded { .. } => Some(ai_message),
            _ => None,
        },
    })
}

pub async fn handle_delete_vote(
    state: &Arc<AppState>,
    role: Role,
    vote_id: VoteId,
) -> Option<ServerMessage> {
    if role != Role::Admin {
        tracing::info!("{:?} connection deleting vote {}", role, vote_id);
    }

    let success = match state.engine.delete_vote(&vote_id).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Deleting vote {} failed: {}", vote_id, e);
            false
        }
    };

    Some(ServerMessage::VoteDeleted { vote_id, success })
}

pub async fn handle_get_state(state: &Arc<AppState>) -> Option<ServerMessage> {
    match state.engine.current_state().await {
        Ok(game) => Some(ServerMessage::state(game)),
        Err(e) => {
            tracing::error!("Reading game state failed: {}", e);
            Some(ServerMessage::error("CONNECTION_ERROR", "Connection error"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VOTE_REJECTED_MESSAGE;

    fn app() -> Arc<AppState> {
        Arc::new(AppState::in_memory("gender_reveal/gameState"))
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(None), None);
        assert_eq!(non_blank(Some("   ".to_string())), None);
        assert_eq!(non_blank(Some(" hi ".to_string())).as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_cast_vote_records_trimmed_fields_and_fallback_whisper() {
        let state = app();

        let response = handle_cast_vote(
            &state,
            "  Amy ".to_string(),
            Gender::Girl,
            "u1".to_string(),
            Some("".to_string()),
            Some(" so excited ".to_string()),
        )
        .await;

        let Some(ServerMessage::VoteResult {
            success,
            vote_id,
            message,
            ai_message,
        }) = response
        else {
            panic!("expected vote_result");
        };
        assert!(success);
        assert!(message.is_none());
        assert_eq!(ai_message.as_deref(), Some("You voted GIRL! Good luck! 🤞"));

        let game = state.engine.current_state().await.unwrap();
        let vote = &game.votes[0];
        assert_eq!(Some(&vote.id), vote_id.as_ref());
        assert_eq!(vote.name, "Amy");
        assert_eq!(vote.photo_url, None);
        assert_eq!(vote.user_comment.as_deref(), Some("so excited"));
        assert_eq!(vote.ai_message, ai_message);
    }

    #[tokio::test]
    async fn test_cast_vote_requires_name_and_user() {
        let state = app();

        for (name, user_id) in [(" ", "u1"), ("Amy", "")] {
            let response = handle_cast_vote(
                &state,
                name.to_string(),
                Gender::Boy,
                user_id.to_string(),
                None,
                None,
            )
            .await;
            match response {
                Some(ServerMessage::Error { code, .. }) => assert_eq!(code, "INVALID_VOTE"),
                other => panic!("unexpected response: {:?}", other),
            }
        }

        assert!(state.engine.current_state().await.unwrap().votes.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_cast_has_no_whisper() {
        let state = app();
        state.engine.admin_set_lock(true).await.unwrap();

        let response = handle_cast_vote(
            &state,
            "Amy".to_string(),
            Gender::Boy,
            "u1".to_string(),
            None,
            None,
        )
        .await;

        match response {
            Some(ServerMessage::VoteResult {
                success,
                vote_id,
                message,
                ai_message,
            }) => {
                assert!(!success);
                assert!(vote_id.is_none());
                assert_eq!(message.as_deref(), Some(VOTE_REJECTED_MESSAGE));
                assert!(ai_message.is_none());
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_unknown_vote_succeeds() {
        let state = app();

        match handle_delete_vote(&state, Role::Guest, "nope".to_string()).await {
            Some(ServerMessage::VoteDeleted { vote_id, success }) => {
                assert_eq!(vote_id, "nope");
                assert!(success);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dashboard_can_remove_any_vote() {
        let state = app();
        let vote_id = handle_cast_vote(&state, "Amy".into(), Gender::Girl, "u1".into(), None, None)
            .await
            .and_then(|msg| match msg {
                ServerMessage::VoteResult { vote_id, .. } => vote_id,
                _ => None,
            })
            .unwrap();

        match handle_delete_vote(&state, Role::Dashboard, vote_id).await {
            Some(ServerMessage::VoteDeleted { success, .. }) => assert!(success),
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(state.engine.current_state().await.unwrap().votes.is_empty());
    }
}
