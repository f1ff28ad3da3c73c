use crate::group::{DEFAULT_GAME_TIMER_SECONDS, DEFAULT_MAX_PLAYERS};
use clap::Parser;
use std::net::SocketAddr;

#[derive(Parser, Debug, Clone)]
#[command(name = "game_group_server", about, version)]
pub struct Args {
    #[arg(long, env, default_value = "0.0.0.0:3000")]
    pub host: SocketAddr,

    /// Roster size that starts a round in a waiting group
    #[arg(long, env, default_value_t = 2, value_parser = clap::value_parser!(u32).range(2..))]
    pub round_start_threshold: u32,

    /// Capacity of groups created without an explicit one
    #[arg(long, env, default_value_t = DEFAULT_MAX_PLAYERS, value_parser = clap::value_parser!(u32).range(1..))]
    pub default_max_players: u32,

    /// Round length for groups created without an explicit one
    #[arg(long, env, default_value_t = DEFAULT_GAME_TIMER_SECONDS, value_parser = clap::value_parser!(u64).range(1..))]
    pub default_game_timer_seconds: u64,
}
