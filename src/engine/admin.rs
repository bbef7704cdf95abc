use super::VoteEngine;
use crate::store::StoreResult;
use crate::types::*;

impl VoteEngine {
    /// Open or close voting. Votes and winner are left alone.
    pub async fn admin_set_lock(&self, locked: bool) -> StoreResult<()> {
        self.update_state(|mut state| {
            state.is_locked = locked;
            Some(state)
        })
        .await?;

        tracing::info!("Voting {}", if locked { "locked" } else { "unlocked" });
        Ok(())
    }

    /// Announce a winner, or withdraw the announcement with `None`.
    ///
    /// Revealing a winner also locks voting. Withdrawing does not unlock.
    pub async fn admin_reveal(&self, winner: Option<Gender>) -> StoreResult<()> {
        self.update_state(|mut state| {
            state.winner = winner;
            state.is_revealed = winner.is_some();
            if winner.is_some() {
                state.is_locked = true;
            }
            Some(state)
        })
        .await?;

        match winner {
            Some(w) => tracing::info!("Revealed winner: {}", w),
            None => tracing::info!("Reveal withdrawn"),
        }
        Ok(())
    }

    /// Overwrite the whole document with the default state.
    /// A plain set, not a transaction: the previous state is discarded anyway.
    pub async fn admin_reset(&self) -> StoreResult<()> {
        let doc = GameState::default().to_document()?;
        self.store.set(&self.path, doc).await?;

        tracing::info!("Game reset");
        Ok(())
    }

    /// Change the capacity. Existing votes above the new limit are kept.
    pub async fn admin_set_max_votes(&self, max_votes: u32) -> StoreResult<()> {
        self.update_state(|mut state| {
            state.max_votes = max_votes;
            Some(state)
        })
        .await?;

        tracing::info!("Max votes set to {}", max_votes);
        Ok(())
    }
}
