#![allow(dead_code)]

use clap::Parser;
use futures_util::StreamExt;
use game_group_server::{args::Args, state::ServerState, store::InMemoryRosterStore};
use reqwest::Client;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type WsRead = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

pub async fn spawn_app() -> SocketAddr {
    spawn_app_with(&[]).await
}

pub async fn spawn_app_with(extra_args: &[&str]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let host = addr.to_string();
    let mut argv = vec!["game_group_server", "--host", host.as_str()];
    argv.extend_from_slice(extra_args);
    let args = Args::parse_from(argv);

    tokio::spawn(async move {
        game_group_server::run(args).await.unwrap();
    });
    sleep(Duration::from_millis(100)).await;
    addr
}

/// Serves the app over a store the test keeps a handle to.
pub async fn spawn_app_on(store: InMemoryRosterStore) -> SocketAddr {
    let args = Args::parse_from(["game_group_server"]);
    let state = ServerState::new(Arc::new(store), &args);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, game_group_server::app(state))
            .await
            .unwrap();
    });
    addr
}

pub async fn create_group(
    client: &Client,
    addr: SocketAddr,
    name: &str,
    max_players: u32,
    game_timer_seconds: u64,
) -> String {
    let response = client
        .post(format!("http://{}/groups", addr))
        .json(&json!({
            "name": name,
            "max_players": max_players,
            "game_timer_seconds": game_timer_seconds,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

pub async fn join_over_http(
    client: &Client,
    addr: SocketAddr,
    group_id: &str,
    username: &str,
) -> reqwest::Response {
    client
        .post(format!("http://{}/groups/{}/join", addr, group_id))
        .json(&json!({ "username": username }))
        .send()
        .await
        .unwrap()
}

/// Reads until an event called `name` arrives, skipping everything else.
pub async fn next_event(read: &mut WsRead, name: &str) -> Value {
    timeout(Duration::from_secs(10), async {
        while let Some(msg) = read.next().await {
            if let Ok(Message::Text(text)) = msg {
                let parsed: Value = serde_json::from_str(&text).unwrap();
                if parsed["event"] == name {
                    return parsed;
                }
            }
        }
        panic!("connection closed before {name:?} arrived");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name:?}"))
}

pub fn leaderboard(event: &Value) -> Vec<(String, i64)> {
    event["data"]["leaderboard"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            (
                entry["username"].as_str().unwrap().to_string(),
                entry["score"].as_i64().unwrap(),
            )
        })
        .collect()
}
