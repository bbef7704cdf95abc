use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::store::StoreResult;
use crate::types::GameState;
use std::sync::Arc;

/// Subscribe to the game document and push every change to all WebSocket
/// clients. Seeds the default document when none exists yet.
pub async fn spawn_state_broadcaster(state: Arc<AppState>) -> StoreResult<()> {
    let tx = state.broadcast.clone();

    let subscription = state
        .sync
        .subscribe(move |game: &GameState| {
            tracing::debug!(
                "Game state changed: {} vote(s), locked={}, revealed={}",
                game.votes.len(),
                game.is_locked,
                game.is_revealed
            );
            // No receivers connected is fine
            let _ = tx.send(ServerMessage::state(game.clone()));
        })
        .await?;

    state.keep_subscription(subscription);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CastVote;
    use crate::types::Gender;
    use std::time::Duration;

    #[tokio::test]
    async fn test_changes_reach_broadcast_receivers() {
        let state = Arc::new(AppState::in_memory("gender_reveal/gameState"));
        let mut rx = state.broadcast.subscribe();

        spawn_state_broadcaster(state.clone()).await.unwrap();

        // Initial state from the subscription itself
        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(first, ServerMessage::State { ref state, .. } if state.votes.is_empty()));

        state
            .engine
            .cast_vote(CastVote {
                name: "Amy".to_string(),
                choice: Gender::Boy,
                user_id: "u1".to_string(),
                photo_url: None,
                ai_message: None,
                user_comment: None,
            })
            .await;

        // The seeding write may arrive before the vote
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if let ServerMessage::State { state: game, tally } = msg {
                if !game.votes.is_empty() {
                    assert_eq!(tally.boy, 1);
                    assert_eq!(state.sync.snapshot().votes.len(), 1);
                    break;
                }
            }
        }
    }
}
