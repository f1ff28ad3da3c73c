use crate::{
    error::SessionError,
    gateway::Broadcaster,
    group::{Group, GroupId, GroupSnapshot, Leaderboard, Phase, Player, PlayerId},
    ledger::ScoreLedger,
    store::{RosterStore, StoreError},
    timer::RoundTimer,
};
use game_group_protocol::ServerEvent;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

pub const MIN_ROUND_START_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Roster size at which a waiting group starts its next round.
    pub round_start_threshold: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            round_start_threshold: MIN_ROUND_START_THRESHOLD,
        }
    }
}

struct GroupSession {
    group: Group,
    ledger: ScoreLedger,
    timer: Option<RoundTimer>,
    /// Set once the session has left the registry; holders must reload.
    closed: bool,
}

type SessionHandle = Arc<Mutex<GroupSession>>;

impl GroupSession {
    fn new(group: Group, ledger: ScoreLedger) -> Self {
        Self {
            group,
            ledger,
            timer: None,
            closed: false,
        }
    }

    fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            id: self.group.id,
            name: self.group.name.clone(),
            max_players: self.group.max_players,
            game_timer_seconds: self.group.game_timer_seconds,
            players: self.ledger.roster().to_vec(),
            phase: self.group.phase,
            round: self.group.round,
        }
    }

    /// Whether a player who is not yet a member could join right now.
    fn check_open(&self) -> Result<(), SessionError> {
        if self.group.phase == Phase::Running {
            return Err(SessionError::RoundInProgress);
        }
        if self.group.is_full() {
            return Err(SessionError::CapacityExceeded);
        }
        Ok(())
    }

    fn is_idle(&self) -> bool {
        !self.closed && self.group.phase == Phase::Waiting && self.timer.is_none()
    }
}

enum PersistJob {
    Save { group: Group, players: Vec<Player> },
    Flush(oneshot::Sender<()>),
}

type DegradedSet = Arc<StdMutex<HashSet<GroupId>>>;

fn lock_degraded(degraded: &DegradedSet) -> MutexGuard<'_, HashSet<GroupId>> {
    degraded.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    store: Arc<dyn RosterStore>,
    gateway: Arc<dyn Broadcaster>,
    config: CoordinatorConfig,
    sessions: RwLock<HashMap<GroupId, SessionHandle>>,
    /// Bumped whenever a session leaves the registry.
    evictions: AtomicU64,
    persist_tx: mpsc::UnboundedSender<PersistJob>,
    degraded: DegradedSet,
}

/// Owns the lifecycle of every live group.
///
/// Each group gets its own async mutex; joins, score updates and round
/// settlement for a group all run inside it, so they never interleave.
/// Different groups never contend beyond the brief registry lookup.
///
/// Only running groups stay resident. A waiting group is dropped from the
/// registry once the call that touched it finishes and is reloaded from the
/// store on next use.
#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

impl SessionCoordinator {
    /// Must be called from within a tokio runtime: it spawns the
    /// background persistence worker.
    pub fn new(
        store: Arc<dyn RosterStore>,
        gateway: Arc<dyn Broadcaster>,
        config: CoordinatorConfig,
    ) -> Self {
        let degraded = DegradedSet::default();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_worker(store.clone(), degraded.clone(), persist_rx));

        let config = CoordinatorConfig {
            round_start_threshold: config
                .round_start_threshold
                .max(MIN_ROUND_START_THRESHOLD),
        };

        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                config,
                sessions: Default::default(),
                evictions: AtomicU64::new(0),
                persist_tx,
                degraded,
            }),
        }
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.inner.config
    }

    pub async fn join(
        &self,
        group_id: GroupId,
        player_id: PlayerId,
    ) -> Result<GroupSnapshot, SessionError> {
        let (handle, mut session) = self.lock_session(group_id).await?;
        let result = self.join_locked(&handle, &mut session, player_id).await;
        self.evict_if_idle(&handle, &mut session).await;
        result
    }

    async fn join_locked(
        &self,
        handle: &SessionHandle,
        session: &mut GroupSession,
        player_id: PlayerId,
    ) -> Result<GroupSnapshot, SessionError> {
        let mut joined = false;

        if !session.group.has_player(&player_id) {
            session.check_open()?;
            let player = self
                .inner
                .store
                .get_players_by_ids(&[player_id])
                .await?
                .into_iter()
                .next()
                .ok_or(SessionError::NotFound("player"))?;
            self.enroll(session, &player).await?;
            joined = true;
        }

        Ok(self.after_join(handle, session, joined))
    }

    /// Creates a player record and joins it to the group in one step.
    ///
    /// The record is only created once the group is known to have room, and
    /// is removed again if the roster write fails.
    pub async fn join_new_player(
        &self,
        group_id: GroupId,
        username: &str,
    ) -> Result<(Player, GroupSnapshot), SessionError> {
        let (handle, mut session) = self.lock_session(group_id).await?;
        let result = self.join_new_player_locked(&handle, &mut session, username).await;
        self.evict_if_idle(&handle, &mut session).await;
        result
    }

    async fn join_new_player_locked(
        &self,
        handle: &SessionHandle,
        session: &mut GroupSession,
        username: &str,
    ) -> Result<(Player, GroupSnapshot), SessionError> {
        session.check_open()?;

        let player = self.inner.store.create_player(username).await?;
        if let Err(err) = self.enroll(session, &player).await {
            if let Err(cleanup) = self.inner.store.delete_player(player.id).await {
                warn!(
                    group_id = %session.group.id,
                    player_id = %player.id,
                    error = %cleanup,
                    "failed to remove unjoined player"
                );
            }
            return Err(err);
        }

        let snapshot = self.after_join(handle, session, true);
        Ok((player, snapshot))
    }

    pub async fn update_score(
        &self,
        group_id: GroupId,
        player_id: PlayerId,
        delta: i64,
    ) -> Result<Leaderboard, SessionError> {
        let (handle, mut session) = self.lock_session(group_id).await?;

        if !session.group.has_player(&player_id) {
            self.evict_if_idle(&handle, &mut session).await;
            return Err(SessionError::PlayerNotInGroup);
        }
        if session.group.phase != Phase::Running {
            self.evict_if_idle(&handle, &mut session).await;
            return Err(SessionError::RoundNotRunning);
        }

        let score = session
            .ledger
            .apply_delta(&player_id, delta)
            .ok_or(SessionError::PlayerNotInGroup)?;
        let leaderboard = session.ledger.snapshot();
        debug!(%group_id, %player_id, delta, score, "score updated");

        self.inner.gateway.emit(
            group_id,
            ServerEvent::UpdateLeaderboard {
                group_id,
                leaderboard: leaderboard.clone(),
            },
        );
        Ok(leaderboard)
    }

    pub async fn snapshot(&self, group_id: GroupId) -> Result<GroupSnapshot, SessionError> {
        let (handle, mut session) = self.lock_session(group_id).await?;
        let snapshot = session.snapshot();
        self.evict_if_idle(&handle, &mut session).await;
        Ok(snapshot)
    }

    /// Number of groups currently held in memory.
    pub async fn resident_groups(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub fn is_degraded(&self, group_id: GroupId) -> bool {
        lock_degraded(&self.inner.degraded).contains(&group_id)
    }

    pub fn degraded_groups(&self) -> Vec<GroupId> {
        lock_degraded(&self.inner.degraded).iter().copied().collect()
    }

    /// Waits until every store write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.inner.persist_tx.send(PersistJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Abandons every running round without announcing a result and drops
    /// all sessions. Later calls reload groups from the store.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = {
            let mut sessions = self.inner.sessions.write().await;
            self.inner.evictions.fetch_add(1, AtomicOrdering::SeqCst);
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in sessions {
            let mut session = session.lock().await;
            session.closed = true;
            if let Some(timer) = session.timer.take() {
                if timer.cancel() {
                    info!(
                        group_id = %session.group.id,
                        round = session.group.round,
                        "round abandoned on shutdown"
                    );
                }
            }
        }

        self.flush().await;
    }

    /// Writes the roster entry for `player` and adds them to the session.
    async fn enroll(&self, session: &mut GroupSession, player: &Player) -> Result<(), SessionError> {
        let group_id = session.group.id;
        self.inner
            .store
            .add_player_to_group(group_id, player.id)
            .await?;

        session.group.players.push(player.id);
        session.ledger.insert(player);
        info!(
            %group_id,
            player_id = %player.id,
            username = %player.username,
            roster = session.group.players.len(),
            "player joined group"
        );
        Ok(())
    }

    fn after_join(
        &self,
        handle: &SessionHandle,
        session: &mut GroupSession,
        joined: bool,
    ) -> GroupSnapshot {
        if session.group.phase == Phase::Waiting
            && session.group.players.len() >= self.inner.config.round_start_threshold
        {
            self.start_round(handle, session);
        } else if joined {
            // Queued behind any earlier save of this group, so the store
            // ends up with the newest roster.
            self.persist(session.group.clone(), Vec::new());
        }

        session.snapshot()
    }

    async fn session(&self, group_id: GroupId) -> Result<SessionHandle, SessionError> {
        loop {
            if let Some(session) = self.inner.sessions.read().await.get(&group_id) {
                return Ok(session.clone());
            }

            let evictions = self.inner.evictions.load(AtomicOrdering::SeqCst);
            // Queued writes may still describe this group; let them land first.
            self.flush().await;
            let loaded = self.load(group_id).await?;

            let mut sessions = self.inner.sessions.write().await;
            if let Some(resident) = sessions.get(&group_id) {
                return Ok(resident.clone());
            }
            // A session evicted while we read may have written after us.
            if self.inner.evictions.load(AtomicOrdering::SeqCst) != evictions {
                continue;
            }
            sessions.insert(group_id, loaded.clone());
            return Ok(loaded);
        }
    }

    async fn load(&self, group_id: GroupId) -> Result<SessionHandle, SessionError> {
        let mut group = self.inner.store.get_group(group_id).await?;
        let players = self.inner.store.get_players_by_ids(&group.players).await?;
        group.players = players.iter().map(|player| player.id).collect();
        if group.phase == Phase::Running {
            warn!(%group_id, "discarding a round left running in the store");
            group.phase = Phase::Waiting;
        }
        Ok(Arc::new(Mutex::new(GroupSession::new(
            group,
            ScoreLedger::from_players(&players),
        ))))
    }

    async fn lock_session(
        &self,
        group_id: GroupId,
    ) -> Result<(SessionHandle, OwnedMutexGuard<GroupSession>), SessionError> {
        loop {
            let handle = self.session(group_id).await?;
            let session = handle.clone().lock_owned().await;
            // A closed session left the registry while we waited; reload.
            if !session.closed {
                return Ok((handle, session));
            }
        }
    }

    /// Drops a waiting group from the registry. The caller must hold the
    /// session's lock.
    async fn evict_if_idle(&self, handle: &SessionHandle, session: &mut GroupSession) {
        if !session.is_idle() {
            return;
        }
        let group_id = session.group.id;
        let mut sessions = self.inner.sessions.write().await;
        if sessions
            .get(&group_id)
            .is_some_and(|resident| Arc::ptr_eq(resident, handle))
        {
            sessions.remove(&group_id);
            self.inner.evictions.fetch_add(1, AtomicOrdering::SeqCst);
            session.closed = true;
            debug!(%group_id, "idle group evicted");
        }
    }

    fn start_round(&self, handle: &SessionHandle, session: &mut GroupSession) {
        if let Some(stray) = session.timer.take() {
            stray.cancel();
        }

        session.group.round += 1;
        session.group.phase = Phase::Running;
        session.ledger.reset();

        let group_id = session.group.id;
        let round = session.group.round;
        let coordinator = Arc::downgrade(&self.inner);
        let target = Arc::downgrade(handle);
        session.timer = Some(RoundTimer::start(
            Duration::from_secs(session.group.game_timer_seconds),
            move || async move {
                if let (Some(inner), Some(session)) =
                    (Weak::upgrade(&coordinator), Weak::upgrade(&target))
                {
                    SessionCoordinator { inner }.settle(session, round).await;
                }
            },
        ));

        info!(
            %group_id,
            round,
            players = session.group.players.len(),
            seconds = session.group.game_timer_seconds,
            "round started"
        );
        self.inner
            .gateway
            .emit(group_id, ServerEvent::StartGame { group_id });
        self.persist(session.group.clone(), Vec::new());
    }

    /// Ends the round the timer was started for. The timer holds its own
    /// session, so an expiry can never settle a session loaded after it.
    async fn settle(&self, handle: SessionHandle, round: u64) {
        let mut session = handle.lock().await;
        let group_id = session.group.id;

        if session.closed || session.group.round != round || session.group.phase != Phase::Running {
            debug!(%group_id, round, "ignoring stale round expiry");
            return;
        }

        session.timer = None;
        session.group.phase = Phase::Waiting;
        let leaderboard = session.ledger.snapshot();
        info!(
            %group_id,
            round,
            leader = leaderboard.first().map(|entry| entry.username.as_str()),
            "round ended"
        );

        self.inner.gateway.emit(
            group_id,
            ServerEvent::EndGame {
                group_id,
                leaderboard,
            },
        );
        self.persist(session.group.clone(), session.ledger.players());
        self.evict_if_idle(&handle, &mut session).await;
    }

    fn persist(&self, group: Group, players: Vec<Player>) {
        let group_id = group.id;
        if self
            .inner
            .persist_tx
            .send(PersistJob::Save { group, players })
            .is_err()
        {
            warn!(%group_id, "persistence worker stopped; group state not saved");
            lock_degraded(&self.inner.degraded).insert(group_id);
        }
    }
}

/// Applies store writes in the order the coordinator queued them.
///
/// Player records from a failed write are kept and retried with the group's
/// next save; the group stays degraded until they land.
async fn persist_worker(
    store: Arc<dyn RosterStore>,
    degraded: DegradedSet,
    mut jobs: mpsc::UnboundedReceiver<PersistJob>,
) {
    let mut unsaved: HashMap<GroupId, Vec<Player>> = HashMap::new();

    while let Some(job) = jobs.recv().await {
        match job {
            PersistJob::Save { group, players } => {
                let group_id = group.id;
                let players = merge_players(unsaved.remove(&group_id), players);
                match save(store.as_ref(), &group, &players).await {
                    Ok(()) => {
                        if lock_degraded(&degraded).remove(&group_id) {
                            info!(%group_id, "group state persisted, degraded flag cleared");
                        }
                    }
                    Err(err) => {
                        warn!(%group_id, error = %err, "failed to persist group state");
                        if !players.is_empty() {
                            unsaved.insert(group_id, players);
                        }
                        lock_degraded(&degraded).insert(group_id);
                    }
                }
            }
            PersistJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// Newer records replace older ones for the same player.
fn merge_players(older: Option<Vec<Player>>, newer: Vec<Player>) -> Vec<Player> {
    let Some(mut merged) = older else {
        return newer;
    };
    for player in newer {
        match merged.iter_mut().find(|existing| existing.id == player.id) {
            Some(existing) => *existing = player,
            None => merged.push(player),
        }
    }
    merged
}

async fn save(store: &dyn RosterStore, group: &Group, players: &[Player]) -> Result<(), StoreError> {
    store.save_group(group).await?;
    if !players.is_empty() {
        store.save_players(players).await?;
    }
    Ok(())
}
