use crate::types::*;
use serde::{Deserialize, Serialize};

/// Version announced in the welcome message
pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identity fields come from the client's identity provider
    CastVote {
        name: String,
        choice: Gender,
        user_id: UserId,
        #[serde(default)]
        photo_url: Option<String>,
        #[serde(default)]
        user_comment: Option<String>,
    },
    /// Self-service undo or moderation
    DeleteVote {
        vote_id: VoteId,
    },
    GetState,
    // Admin-only messages
    AdminSetLock {
        locked: bool,
    },
    /// `null` withdraws a reveal
    AdminReveal {
        winner: Option<Gender>,
    },
    AdminReset,
    AdminSetMaxVotes {
        max_votes: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        protocol: String,
        role: Role,
        state: GameState,
        tally: Tally,
        server_now: String,
    },
    /// Pushed after every change of the game document
    State {
        state: GameState,
        tally: Tally,
    },
    VoteResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        vote_id: Option<VoteId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ai_message: Option<String>,
    },
    VoteDeleted {
        vote_id: VoteId,
        success: bool,
    },
    AdminAck {
        action: String,
    },
    Error {
        code: String,
        msg: String,
    },
}

impl ServerMessage {
    pub fn state(state: GameState) -> Self {
        let tally = state.tally();
        ServerMessage::State { state, tally }
    }

    pub fn error(code: &str, msg: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            msg: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cast_vote_optional_fields() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "t": "cast_vote",
            "name": "Amy",
            "choice": "GIRL",
            "user_id": "u1"
        }))
        .unwrap();

        match msg {
            ClientMessage::CastVote {
                choice,
                photo_url,
                user_comment,
                ..
            } => {
                assert_eq!(choice, Gender::Girl);
                assert!(photo_url.is_none());
                assert!(user_comment.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_reveal_accepts_null_winner() {
        let msg: ClientMessage =
            serde_json::from_value(json!({ "t": "admin_reveal", "winner": null })).unwrap();
        assert!(matches!(msg, ClientMessage::AdminReveal { winner: None }));

        let msg: ClientMessage =
            serde_json::from_value(json!({ "t": "admin_reveal", "winner": "BOY" })).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::AdminReveal {
                winner: Some(Gender::Boy)
            }
        ));
    }

    #[test]
    fn test_unknown_choice_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({
            "t": "cast_vote",
            "name": "Amy",
            "choice": "MAYBE",
            "user_id": "u1"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_state_message_carries_tally() {
        let mut state = GameState::default();
        state.votes.push(VoteRecord {
            id: "v1".to_string(),
            name: "Amy".to_string(),
            choice: Gender::Boy,
            timestamp: 1,
            user_id: "u1".to_string(),
            photo_url: None,
            ai_message: None,
            user_comment: None,
        });

        let value = serde_json::to_value(ServerMessage::state(state)).unwrap();

        assert_eq!(value["t"], "state");
        assert_eq!(value["tally"], json!({ "boy": 1, "girl": 0, "total": 1 }));
        assert_eq!(value["state"]["votes"][0]["userId"], "u1");
        assert_eq!(value["state"]["maxVotes"], 100);
    }

    #[test]
    fn test_vote_result_omits_empty_fields() {
        let value = serde_json::to_value(ServerMessage::VoteResult {
            success: false,
            vote_id: None,
            message: Some("nope".to_string()),
            ai_message: None,
        })
        .unwrap();

        assert_eq!(
            value,
            json!({ "t": "vote_result", "success": false, "message": "nope" })
        );
    }
}
