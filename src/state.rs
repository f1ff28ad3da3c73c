use crate::args::Args;
use crate::coordinator::{CoordinatorConfig, SessionCoordinator};
use crate::gateway::ChannelGateway;
use crate::store::RosterStore;
use std::sync::Arc;

/// Values applied to groups created without explicit settings.
#[derive(Debug, Clone, Copy)]
pub struct GroupDefaults {
    pub max_players: u32,
    pub game_timer_seconds: u64,
}

#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<dyn RosterStore>,
    pub gateway: ChannelGateway,
    pub coordinator: SessionCoordinator,
    pub defaults: GroupDefaults,
}

impl ServerState {
    pub fn new(store: Arc<dyn RosterStore>, args: &Args) -> Self {
        let gateway = ChannelGateway::new();
        let coordinator = SessionCoordinator::new(
            store.clone(),
            Arc::new(gateway.clone()),
            CoordinatorConfig {
                round_start_threshold: args.round_start_threshold as usize,
            },
        );
        Self {
            store,
            gateway,
            coordinator,
            defaults: GroupDefaults {
                max_players: args.default_max_players,
                game_timer_seconds: args.default_game_timer_seconds,
            },
        }
    }
}
