//! Full bot run against a mock homeserver.

use std::time::Duration;

use echobot_config::{BotConfig, MatrixConfig, SyncConfig};
use echobot_runtime::{run_bot, BotError};
use httpmock::prelude::*;
use serde_json::json;
use tokio::time::timeout;

const BOT: &str = "@bot:server";
const TOKEN: &str = "syt_e2e";

fn config_for(server: &MockServer, replay_backlog: bool) -> BotConfig {
    BotConfig {
        matrix: MatrixConfig {
            server: server.base_url(),
            user_id: BOT.to_string(),
            access_token: TOKEN.to_string(),
            request_timeout_seconds: 5,
        },
        sync: SyncConfig {
            timeout_ms: 0,
            full_state: true,
            replay_backlog,
            channel_capacity: 8,
        },
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn bot_joins_invites_echoes_messages_and_fails_when_sync_breaks() {
    let server = MockServer::start_async().await;

    let whoami = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/_matrix/client/v3/account/whoami")
                .header("Authorization", format!("Bearer {TOKEN}"));
            then.status(200).json_body(json!({ "user_id": BOT }));
        })
        .await;

    // The initial sync is the only one sent without full_state.
    let initial_sync = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/_matrix/client/v3/sync")
                .query_param("full_state", "false");
            then.status(200).json_body(json!({
                "next_batch": "s1",
                "rooms": {
                    "invite": { "!new:server": { "invite_state": { "events": [
                        { "type": "m.room.member", "sender": "@alice:server", "state_key": BOT,
                          "content": { "membership": "invite" } }
                    ] } } },
                    "join": { "!abc:server": { "timeline": { "events": [
                        { "type": "m.room.message", "event_id": "$1", "sender": "@alice:server",
                          "content": { "msgtype": "m.text", "body": "hello" } },
                        { "type": "m.room.message", "event_id": "$2", "sender": BOT,
                          "content": { "msgtype": "m.text", "body": "You said: earlier" } }
                    ] } } }
                }
            }));
        })
        .await;

    let broken_sync = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/_matrix/client/v3/sync")
                .query_param("since", "s1");
            then.status(502).body("upstream unavailable");
        })
        .await;

    let join = server
        .mock_async(|when, then| {
            when.method(POST).path("/_matrix/client/v3/join/!new:server");
            then.status(200).json_body(json!({ "room_id": "!new:server" }));
        })
        .await;

    let reply = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path_contains("/_matrix/client/v3/rooms/!abc:server/send/m.room.message/")
                .json_body(json!({ "msgtype": "m.text", "body": "You said: hello" }));
            then.status(200).json_body(json!({ "event_id": "$reply" }));
        })
        .await;

    let config = config_for(&server, true);
    let error = timeout(
        Duration::from_secs(10),
        run_bot(&config, std::future::pending()),
    )
    .await
    .expect("bot ends when sync breaks")
    .expect_err("broken sync is fatal");

    assert!(matches!(error, BotError::Connectivity { .. }), "{error:?}");
    whoami.assert_async().await;
    initial_sync.assert_async().await;
    broken_sync.assert_async().await;
    join.assert_async().await;
    reply.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_token_stops_before_syncing() {
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/_matrix/client/v3/account/whoami");
            then.status(401).json_body(json!({
                "errcode": "M_UNKNOWN_TOKEN",
                "error": "Invalid access token passed."
            }));
        })
        .await;
    let sync = server
        .mock_async(|when, then| {
            when.method(GET).path("/_matrix/client/v3/sync");
            then.status(200).json_body(json!({ "next_batch": "s1" }));
        })
        .await;

    let error = run_bot(&config_for(&server, false), std::future::pending())
        .await
        .expect_err("token is rejected");

    assert!(matches!(error, BotError::Authentication { .. }));
    assert_eq!(error.exit_code(), 1);
    sync.assert_hits_async(0).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_homeserver_is_a_connectivity_error() {
    let config = BotConfig {
        matrix: MatrixConfig {
            server: "http://127.0.0.1:1".to_string(),
            user_id: BOT.to_string(),
            access_token: TOKEN.to_string(),
            request_timeout_seconds: 2,
        },
        sync: SyncConfig::default(),
    };

    let error = run_bot(&config, std::future::pending())
        .await
        .expect_err("nothing listens on port 1");

    assert!(matches!(error, BotError::Connectivity { .. }));
}
