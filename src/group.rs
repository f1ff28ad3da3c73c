use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use game_group_protocol::{
    GroupId, GroupSnapshot, LeaderboardEntry, Phase, PlayerId, RosterEntry,
};

pub const DEFAULT_MAX_PLAYERS: u32 = 5;
pub const DEFAULT_GAME_TIMER_SECONDS: u64 = 15;

/// Ranked `(username, score)` pairs, best first.
pub type Leaderboard = Vec<LeaderboardEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub max_players: u32,
    pub game_timer_seconds: u64,
    /// Join order is significant: it breaks leaderboard ties.
    pub players: Vec<PlayerId>,
    pub phase: Phase,
    /// Rounds started so far.
    #[serde(default)]
    pub round: u64,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players as usize
    }

    pub fn has_player(&self, player_id: &PlayerId) -> bool {
        self.players.contains(player_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub name: String,
    pub max_players: u32,
    pub game_timer_seconds: u64,
}

impl NewGroup {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_players: DEFAULT_MAX_PLAYERS,
            game_timer_seconds: DEFAULT_GAME_TIMER_SECONDS,
        }
    }
}
