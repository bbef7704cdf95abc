use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque ID types for type safety
pub type VoteId = String;
pub type UserId = String;

/// Capacity of a freshly created game
pub const DEFAULT_MAX_VOTES: u32 = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Boy,
    Girl,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Boy => "BOY",
            Gender::Girl => "GIRL",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single guest's guess. Created by a cast, removed by a delete, never edited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub id: VoteId,
    pub name: String,
    pub choice: Gender,
    /// Unix milliseconds
    pub timestamp: i64,
    /// Stable identity from the identity provider; one vote per user
    pub user_id: UserId,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
}

/// The single shared game document.
///
/// Missing fields deserialize to their defaults so a partially written
/// document still reads as a well-formed state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    pub is_locked: bool,
    pub is_revealed: bool,
    pub winner: Option<Gender>,
    /// Newest first
    #[serde(deserialize_with = "null_as_empty")]
    pub votes: Vec<VoteRecord>,
    pub max_votes: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            is_locked: false,
            is_revealed: false,
            winner: None,
            votes: Vec::new(),
            max_votes: DEFAULT_MAX_VOTES,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<VoteRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    // Sparse lists from the remote store arrive with null holes
    let votes = Option::<Vec<Option<VoteRecord>>>::deserialize(deserializer)?;
    Ok(votes.into_iter().flatten().flatten().collect())
}

impl GameState {
    /// Parse a stored document, merging it over the default state.
    /// Absent documents parse as the default; anything serde rejects is an error.
    pub fn parse_document(value: Option<&Value>) -> Result<Self, serde_json::Error> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => serde_json::from_value(v.clone()),
        }
    }

    /// Lenient read for display: malformed documents read as the default.
    pub fn from_document(value: Option<&Value>) -> Self {
        Self::parse_document(value).unwrap_or_else(|e| {
            tracing::warn!("Stored game state is malformed ({}), using default", e);
            Self::default()
        })
    }

    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Whether new votes may be cast at all
    pub fn accepts_votes(&self) -> bool {
        !self.is_locked && !self.is_revealed
    }

    pub fn is_full(&self) -> bool {
        self.votes.len() >= self.max_votes as usize
    }

    pub fn vote_by_user(&self, user_id: &str) -> Option<&VoteRecord> {
        self.votes.iter().find(|v| v.user_id == user_id)
    }

    pub fn has_voted(&self, user_id: &str) -> bool {
        self.vote_by_user(user_id).is_some()
    }

    /// Count votes per choice
    pub fn tally(&self) -> Tally {
        let boy = self
            .votes
            .iter()
            .filter(|v| v.choice == Gender::Boy)
            .count() as u32;
        let total = self.votes.len() as u32;

        Tally {
            boy,
            girl: total - boy,
            total,
        }
    }
}

/// Per-choice vote counts for the dashboard
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tally {
    pub boy: u32,
    pub girl: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Dashboard,
    Admin,
}

impl Role {
    pub fn from_query(role: Option<&str>) -> Self {
        match role {
            Some("admin") => Role::Admin,
            Some("dashboard") => Role::Dashboard,
            _ => Role::Guest,
        }
    }
}
