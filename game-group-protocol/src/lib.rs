use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub type GroupId = Uuid;
pub type PlayerId = Uuid;

pub const JOIN_GROUP: &str = "join group";
pub const UPDATE_SCORE: &str = "update score";
pub const START_GAME: &str = "start game";
pub const UPDATE_LEADERBOARD: &str = "update leaderboard";
pub const END_GAME: &str = "end game";
pub const JOINED_GROUP: &str = "joined group";
pub const ERROR: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Waiting,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub username: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub username: String,
}

/// Point-in-time view of a group session, in join order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub id: GroupId,
    pub name: String,
    pub max_players: u32,
    pub game_timer_seconds: u64,
    pub players: Vec<RosterEntry>,
    pub phase: Phase,
    pub round: u64,
}

/// Events sent by a client over its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join group")]
    JoinGroup { group_id: GroupId },
    #[serde(rename = "update score")]
    UpdateScore { group_id: GroupId, delta: i64 },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinGroup { .. } => JOIN_GROUP,
            ClientEvent::UpdateScore { .. } => UPDATE_SCORE,
        }
    }

    pub fn group_id(&self) -> GroupId {
        match self {
            ClientEvent::JoinGroup { group_id } | ClientEvent::UpdateScore { group_id, .. } => {
                *group_id
            }
        }
    }
}

impl FromStr for ClientEvent {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Events sent by the server. The first three are fanned out to every
/// subscriber of a group; `JoinedGroup` and `Error` are direct replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "start game")]
    StartGame { group_id: GroupId },
    #[serde(rename = "update leaderboard")]
    UpdateLeaderboard {
        group_id: GroupId,
        leaderboard: Vec<LeaderboardEntry>,
    },
    #[serde(rename = "end game")]
    EndGame {
        group_id: GroupId,
        leaderboard: Vec<LeaderboardEntry>,
    },
    #[serde(rename = "joined group")]
    JoinedGroup { group: GroupSnapshot },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::StartGame { .. } => START_GAME,
            ServerEvent::UpdateLeaderboard { .. } => UPDATE_LEADERBOARD,
            ServerEvent::EndGame { .. } => END_GAME,
            ServerEvent::JoinedGroup { .. } => JOINED_GROUP,
            ServerEvent::Error { .. } => ERROR,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl FromStr for ServerEvent {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
