//! Lobby HTTP API: creating a new game before connecting to it.

use serde::Deserialize;
use tracing::info;

use crate::error::{Result, SessionError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGameResponse {
    game_code: String,
}

/// HTTP origin serving the lobby API for a game socket URL.
///
/// `ws://` maps to `http://` and `wss://` to `https://`; anything else is
/// returned unchanged. A trailing slash is dropped.
pub fn http_base_from_ws(ws_url: &str) -> String {
    let base = if let Some(rest) = ws_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_url.to_owned()
    };
    base.trim_end_matches('/').to_owned()
}

/// Ask the server for a new game and return its code.
///
/// # Errors
///
/// Returns [`SessionError::Http`] for transport failures and non-success
/// statuses, and [`SessionError::Protocol`] if the reply has no usable code.
pub async fn create_game(client: &reqwest::Client, base_url: &str) -> Result<String> {
    let url = format!("{}/api/createGame", base_url.trim_end_matches('/'));
    let response = client.post(&url).send().await?.error_for_status()?;
    let body: CreateGameResponse = response.json().await?;
    if body.game_code.trim().is_empty() {
        return Err(SessionError::Protocol("server returned an empty game code".to_owned()));
    }
    info!(game_code = %body.game_code, "game created");
    Ok(body.game_code)
}
