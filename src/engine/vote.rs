use super::VoteEngine;
use crate::store::StoreResult;
use crate::types::*;

/// Shown for every rejected cast. Which precondition failed is not revealed.
pub const VOTE_REJECTED_MESSAGE: &str =
    "Vote failed (voting may be locked, full, or you have already voted)";

pub const CONNECTION_ERROR_MESSAGE: &str = "Connection error";

/// Input of a cast. Identity fields come from the identity provider.
#[derive(Debug, Clone)]
pub struct CastVote {
    pub name: String,
    pub choice: Gender,
    pub user_id: UserId,
    pub photo_url: Option<String>,
    pub ai_message: Option<String>,
    pub user_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    Recorded { vote_id: VoteId },
    /// Locked, revealed, full, or the user already voted
    Rejected { message: String },
    ConnectionError { message: String },
}

impl CastOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CastOutcome::Recorded { .. })
    }

    pub fn vote_id(&self) -> Option<&str> {
        match self {
            CastOutcome::Recorded { vote_id } => Some(vote_id),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            CastOutcome::Recorded { .. } => None,
            CastOutcome::Rejected { message } | CastOutcome::ConnectionError { message } => {
                Some(message)
            }
        }
    }
}

impl VoteEngine {
    /// Prepend a new vote unless voting is closed, full, or the user already voted
    pub async fn cast_vote(&self, vote: CastVote) -> CastOutcome {
        let record = VoteRecord {
            id: ulid::Ulid::new().to_string(),
            name: vote.name,
            choice: vote.choice,
            timestamp: chrono::Utc::now().timestamp_millis(),
            user_id: vote.user_id,
            photo_url: vote.photo_url,
            ai_message: vote.ai_message,
            user_comment: vote.user_comment,
        };

        let result = self
            .update_state(|mut state| {
                if !state.accepts_votes() || state.has_voted(&record.user_id) || state.is_full() {
                    return None;
                }
                state.votes.insert(0, record.clone());
                Some(state)
            })
            .await;

        match result {
            Ok(Some(_)) => {
                tracing::info!(
                    "Vote {} recorded: {} -> {}",
                    record.id,
                    record.user_id,
                    record.choice
                );
                CastOutcome::Recorded { vote_id: record.id }
            }
            Ok(None) => {
                tracing::info!("Vote from {} rejected", record.user_id);
                CastOutcome::Rejected {
                    message: VOTE_REJECTED_MESSAGE.to_string(),
                }
            }
            Err(e) => {
                tracing::error!("Vote from {} failed: {}", record.user_id, e);
                CastOutcome::ConnectionError {
                    message: CONNECTION_ERROR_MESSAGE.to_string(),
                }
            }
        }
    }

    /// Remove a vote by id. Deleting an id that is not present still succeeds.
    pub async fn delete_vote(&self, vote_id: &str) -> StoreResult<()> {
        self.update_state(|mut state| {
            state.votes.retain(|v| v.id != vote_id);
            Some(state)
        })
        .await?;

        tracing::info!("Vote {} deleted", vote_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{engine, UnreachableStore, PATH};
    use crate::store::DocumentStore;
    use std::sync::Arc;

    fn ballot(name: &str, choice: Gender, user_id: &str) -> CastVote {
        CastVote {
            name: name.to_string(),
            choice,
            user_id: user_id.to_string(),
            photo_url: None,
            ai_message: None,
            user_comment: None,
        }
    }

    #[tokio::test]
    async fn test_cast_vote_prepends_record() {
        let (engine, _store) = engine();

        let first = engine.cast_vote(ballot("Amy", Gender::Boy, "u1")).await;
        let mut second_ballot = ballot("Ben", Gender::Girl, "u2");
        second_ballot.photo_url = Some("https://example.com/ben.png".to_string());
        second_ballot.ai_message = Some("Hi Ben!".to_string());
        second_ballot.user_comment = Some("Definitely a girl".to_string());
        let second = engine.cast_vote(second_ballot).await;

        assert!(first.is_success());
        assert!(second.is_success());

        let state = engine.current_state().await.unwrap();
        assert_eq!(state.votes.len(), 2);
        assert_eq!(state.votes[0].id, second.vote_id().unwrap());
        assert_eq!(state.votes[0].user_comment.as_deref(), Some("Definitely a girl"));
        assert_eq!(state.votes[0].ai_message.as_deref(), Some("Hi Ben!"));
        assert_eq!(state.votes[1].id, first.vote_id().unwrap());
        assert_eq!(state.votes[1].name, "Amy");
        assert!(state.votes[1].timestamp > 0);
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let (engine, _store) = engine();

        let first = engine.cast_vote(ballot("Amy", Gender::Boy, "u1")).await;
        let second = engine.cast_vote(ballot("Amy2", Gender::Girl, "u1")).await;

        assert!(first.is_success());
        assert_eq!(
            second,
            CastOutcome::Rejected {
                message: VOTE_REJECTED_MESSAGE.to_string()
            }
        );

        let state = engine.current_state().await.unwrap();
        assert_eq!(state.votes.len(), 1);
        assert_eq!(state.votes[0].choice, Gender::Boy);
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let (engine, _store) = engine();
        engine.admin_set_max_votes(1).await.unwrap();

        assert!(engine.cast_vote(ballot("A", Gender::Boy, "u1")).await.is_success());
        let second = engine.cast_vote(ballot("B", Gender::Girl, "u2")).await;

        assert!(!second.is_success());
        assert_eq!(second.message(), Some(VOTE_REJECTED_MESSAGE));
        assert_eq!(engine.current_state().await.unwrap().votes.len(), 1);
    }

    #[tokio::test]
    async fn test_cast_rejected_while_locked_or_revealed() {
        let (engine, _store) = engine();
        engine.cast_vote(ballot("A", Gender::Boy, "u1")).await;

        engine.admin_set_lock(true).await.unwrap();
        let locked = engine.cast_vote(ballot("B", Gender::Girl, "u2")).await;
        assert!(!locked.is_success());

        engine.admin_set_lock(false).await.unwrap();
        engine.admin_reveal(Some(Gender::Girl)).await.unwrap();
        engine.admin_set_lock(false).await.unwrap();
        let revealed = engine.cast_vote(ballot("C", Gender::Girl, "u3")).await;
        assert!(!revealed.is_success());

        let state = engine.current_state().await.unwrap();
        assert_eq!(state.votes.len(), 1);
        assert_eq!(state.votes[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_cast_seeds_absent_document() {
        let (engine, store) = engine();
        assert!(store.get(PATH).await.unwrap().is_none());

        let outcome = engine.cast_vote(ballot("Amy", Gender::Boy, "u1")).await;

        assert!(outcome.is_success());
        let state = engine.current_state().await.unwrap();
        assert_eq!(state.max_votes, DEFAULT_MAX_VOTES);
        assert_eq!(state.votes.len(), 1);
    }

    #[tokio::test]
    async fn test_cast_reports_connection_error() {
        let engine = VoteEngine::new(Arc::new(UnreachableStore::new()), PATH);

        let outcome = engine.cast_vote(ballot("Amy", Gender::Boy, "u1")).await;

        assert_eq!(
            outcome,
            CastOutcome::ConnectionError {
                message: CONNECTION_ERROR_MESSAGE.to_string()
            }
        );
        assert_eq!(outcome.vote_id(), None);
    }

    #[tokio::test]
    async fn test_cast_leaves_unparseable_document_untouched() {
        let (engine, store) = engine();
        let doc = serde_json::json!({
            "votes": [
                { "id": "a", "name": "Amy", "choice": "GIRL", "timestamp": 2.5, "userId": "u1" },
                { "id": "b", "name": "Ben", "choice": "BOY", "timestamp": 1, "userId": "u2" }
            ],
            "maxVotes": 10
        });
        store.set(PATH, doc.clone()).await.unwrap();

        let outcome = engine.cast_vote(ballot("Cy", Gender::Girl, "u3")).await;
        assert!(matches!(outcome, CastOutcome::ConnectionError { .. }));

        let err = engine.delete_vote("b").await.unwrap_err();
        assert!(matches!(err, crate::store::StoreError::Malformed(_)));

        assert_eq!(store.get(PATH).await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn test_delete_vote_is_idempotent() {
        let (engine, _store) = engine();
        let kept = engine.cast_vote(ballot("A", Gender::Boy, "u1")).await;
        let removed = engine.cast_vote(ballot("B", Gender::Girl, "u2")).await;
        let removed_id = removed.vote_id().unwrap();

        engine.delete_vote(removed_id).await.unwrap();
        let after_first = engine.current_state().await.unwrap();
        engine.delete_vote(removed_id).await.unwrap();
        let after_second = engine.current_state().await.unwrap();

        assert_eq!(after_first.votes.len(), 1);
        assert_eq!(after_first.votes[0].id, kept.vote_id().unwrap());
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_delete_then_vote_again() {
        let (engine, _store) = engine();
        let first = engine.cast_vote(ballot("A", Gender::Boy, "u1")).await;

        engine.delete_vote(first.vote_id().unwrap()).await.unwrap();
        let again = engine.cast_vote(ballot("A", Gender::Girl, "u1")).await;

        assert!(again.is_success());
        let state = engine.current_state().await.unwrap();
        assert_eq!(state.votes.len(), 1);
        assert_eq!(state.votes[0].choice, Gender::Girl);
    }

    #[tokio::test]
    async fn test_delete_vote_surfaces_store_failure() {
        let engine = VoteEngine::new(Arc::new(UnreachableStore::new()), PATH);
        assert!(engine.delete_vote("missing").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_casts_respect_capacity_and_identity() {
        let (engine, _store) = engine();
        let engine = Arc::new(engine);
        engine.admin_set_max_votes(10).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..30 {
            let engine = engine.clone();
            // Every user tries twice
            let user_id = format!("u{}", i % 15);
            tasks.push(tokio::spawn(async move {
                engine
                    .cast_vote(ballot(&user_id, Gender::Boy, &user_id))
                    .await
            }));
        }

        let mut recorded = 0;
        for task in tasks {
            match task.await.unwrap() {
                CastOutcome::Recorded { .. } => recorded += 1,
                CastOutcome::Rejected { .. } => {}
                CastOutcome::ConnectionError { message } => panic!("unexpected: {}", message),
            }
        }

        let state = engine.current_state().await.unwrap();
        assert_eq!(recorded, 10);
        assert_eq!(state.votes.len(), 10);

        let mut users: Vec<_> = state.votes.iter().map(|v| v.user_id.clone()).collect();
        users.sort();
        users.dedup();
        assert_eq!(users.len(), 10);
    }
}
