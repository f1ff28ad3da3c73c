use crate::group::{Group, GroupId, NewGroup, Phase, Player, PlayerId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("group is full")]
    CapacityExceeded,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of group and player records.
///
/// The session coordinator treats the in-memory session as the source of
/// truth while a group is live and writes back on joins and round ends.
#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn create_group(&self, group: NewGroup) -> Result<Group, StoreError>;

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;

    async fn get_group(&self, id: GroupId) -> Result<Group, StoreError>;

    async fn add_player_to_group(
        &self,
        group_id: GroupId,
        player_id: PlayerId,
    ) -> Result<Group, StoreError>;

    async fn save_group(&self, group: &Group) -> Result<(), StoreError>;

    async fn create_player(&self, username: &str) -> Result<Player, StoreError>;

    /// Removes a player that never made it into a group.
    async fn delete_player(&self, id: PlayerId) -> Result<(), StoreError>;

    /// Returns the known players among `ids`, in the order requested.
    async fn get_players_by_ids(&self, ids: &[PlayerId]) -> Result<Vec<Player>, StoreError>;

    async fn save_players(&self, players: &[Player]) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Inner {
    groups: HashMap<GroupId, Group>,
    players: HashMap<PlayerId, Player>,
}

#[derive(Clone, Default)]
pub struct InMemoryRosterStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRosterStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub async fn player_count(&self) -> usize {
        self.inner.read().await.players.len()
    }
}

#[async_trait]
impl RosterStore for InMemoryRosterStore {
    async fn create_group(&self, group: NewGroup) -> Result<Group, StoreError> {
        let group = Group {
            id: Uuid::new_v4(),
            name: group.name,
            max_players: group.max_players,
            game_timer_seconds: group.game_timer_seconds,
            players: Vec::new(),
            phase: Phase::Waiting,
            round: 0,
            created_at: chrono::Utc::now(),
        };
        self.inner
            .write()
            .await
            .groups
            .insert(group.id, group.clone());
        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let inner = self.inner.read().await;
        let mut groups: Vec<Group> = inner.groups.values().cloned().collect();
        groups.sort_by_key(|group| group.created_at);
        Ok(groups)
    }

    async fn get_group(&self, id: GroupId) -> Result<Group, StoreError> {
        self.inner
            .read()
            .await
            .groups
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("group"))
    }

    async fn add_player_to_group(
        &self,
        group_id: GroupId,
        player_id: PlayerId,
    ) -> Result<Group, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.players.contains_key(&player_id) {
            return Err(StoreError::NotFound("player"));
        }
        let group = inner
            .groups
            .get_mut(&group_id)
            .ok_or(StoreError::NotFound("group"))?;
        if group.has_player(&player_id) {
            return Ok(group.clone());
        }
        if group.is_full() {
            return Err(StoreError::CapacityExceeded);
        }
        group.players.push(player_id);
        Ok(group.clone())
    }

    async fn save_group(&self, group: &Group) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .groups
            .insert(group.id, group.clone());
        Ok(())
    }

    async fn create_player(&self, username: &str) -> Result<Player, StoreError> {
        let player = Player {
            id: Uuid::new_v4(),
            username: username.to_string(),
            score: 0,
        };
        self.inner
            .write()
            .await
            .players
            .insert(player.id, player.clone());
        Ok(player)
    }

    async fn delete_player(&self, id: PlayerId) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .players
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("player"))
    }

    async fn get_players_by_ids(&self, ids: &[PlayerId]) -> Result<Vec<Player>, StoreError> {
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.players.get(id).cloned())
            .collect())
    }

    async fn save_players(&self, players: &[Player]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for player in players {
            inner.players.insert(player.id, player.clone());
        }
        Ok(())
    }
}
