use crate::group::{Leaderboard, LeaderboardEntry, Player, PlayerId, RosterEntry};
use std::collections::HashMap;

/// Scores for one group, keyed by player.
///
/// Not synchronized on its own; the owning session serializes access.
#[derive(Debug, Default, Clone)]
pub struct ScoreLedger {
    roster: Vec<RosterEntry>,
    scores: HashMap<PlayerId, i64>,
}

impl ScoreLedger {
    pub fn new() -> Self {
        Default::default()
    }

    /// Seeds the ledger from stored records, keeping their order and scores.
    pub fn from_players(players: &[Player]) -> Self {
        let mut ledger = Self::new();
        for player in players {
            ledger.roster.push(RosterEntry {
                id: player.id,
                username: player.username.clone(),
            });
            ledger.scores.insert(player.id, player.score);
        }
        ledger
    }

    /// Adds a newly joined player at the end of the roster with a score of 0.
    pub fn insert(&mut self, player: &Player) {
        if self.contains(&player.id) {
            return;
        }
        self.roster.push(RosterEntry {
            id: player.id,
            username: player.username.clone(),
        });
        self.scores.insert(player.id, 0);
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.scores.contains_key(player_id)
    }

    pub fn score(&self, player_id: &PlayerId) -> Option<i64> {
        self.scores.get(player_id).copied()
    }

    /// Returns the new score, or `None` for a player the ledger doesn't know.
    pub fn apply_delta(&mut self, player_id: &PlayerId, delta: i64) -> Option<i64> {
        let score = self.scores.get_mut(player_id)?;
        *score = score.saturating_add(delta);
        Some(*score)
    }

    pub fn reset(&mut self) {
        self.scores.values_mut().for_each(|score| *score = 0);
    }

    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    /// Player records carrying their current scores, in join order.
    pub fn players(&self) -> Vec<Player> {
        self.roster
            .iter()
            .map(|entry| Player {
                id: entry.id,
                username: entry.username.clone(),
                score: self.score(&entry.id).unwrap_or_default(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> Leaderboard {
        rank(
            self.roster
                .iter()
                .map(|entry| (entry.username.as_str(), self.score(&entry.id).unwrap_or_default())),
        )
    }
}

/// Orders `(username, score)` pairs given in join order: highest score first,
/// equal scores keep their join order.
pub fn rank<'a>(entries: impl IntoIterator<Item = (&'a str, i64)>) -> Leaderboard {
    let mut leaderboard: Leaderboard = entries
        .into_iter()
        .map(|(username, score)| LeaderboardEntry {
            username: username.to_string(),
            score,
        })
        .collect();
    // sort_by is stable
    leaderboard.sort_by(|a, b| b.score.cmp(&a.score));
    leaderboard
}
