//! Fan-app harvester
//!
//! Every endpoint is a JSON POST that answers `{"status": .., "content": ..}`
//! and authenticates with a `token` header. Three listings are harvested:
//! - `album`: albums per owner, paginated by page number
//! - `channel`: chat channels per followed star (server, then rooms)
//! - `live`: the live and radio feed, paged by an opaque `next` token, then
//!   one detail lookup per broadcast

pub mod album;
pub mod channel;
pub mod live;

pub use album::{album_state_label, file_type_label, unique_owners, AlbumExtractor, AlbumSource};
pub use channel::{ChannelExtractor, ChannelSource, RawChannel};
pub use live::{
    live_type_label, LiveDetailExtractor, LiveDetailSource, LiveListExtractor, LiveListSource,
    LIVE_FEED,
};

use crate::crawler::{post_json, ParentId};
use crate::HarvestError;
use reqwest::Client;
use serde_json::{json, Value};

pub const FRIENDS_PATH: &str = "/user/api/v1/friendships/friends/id";
pub const SERVER_JUMP_PATH: &str = "/im/api/v1/im/server/jump";
pub const LAST_MESSAGE_PATH: &str = "/im/api/v1/team/last/message/get";
pub const ROOM_INFO_PATH: &str = "/im/api/v1/im/team/room/info";
pub const LIVE_LIST_PATH: &str = "/live/api/v1/live/getLiveList";
pub const LIVE_DETAIL_PATH: &str = "/live/api/v1/live/getLiveOne";

/// `token` header for an optional session token
pub(crate) fn token_headers(token: Option<&str>) -> Vec<(&str, &str)> {
    token.map(|token| vec![("token", token)]).unwrap_or_default()
}

/// Authenticated client for one fan-app API host
#[derive(Debug, Clone)]
pub struct FanclubApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl FanclubApi {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POSTs `payload` to `path` and returns the response's `content`
    pub async fn content(&self, path: &str, payload: &Value) -> Result<Value, HarvestError> {
        let url = self.endpoint(path);
        let headers = token_headers(self.token.as_deref());
        let mut response = post_json(&self.client, &url, payload, &headers).await?;

        match response.get_mut("content").map(Value::take) {
            None | Some(Value::Null) => Err(HarvestError::parse(format!(
                "{} answered without content",
                url
            ))),
            Some(content) => Ok(content),
        }
    }

    /// Ids of the stars the account follows
    pub async fn friend_ids(&self) -> Result<Vec<ParentId>, HarvestError> {
        let content = self.content(FRIENDS_PATH, &json!({})).await?;
        let ids = content
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| HarvestError::parse("friend list has no data array"))?;

        Ok(ids.iter().filter_map(json_id).map(ParentId::from).collect())
    }
}

/// Reads an id the API sends either as a number or as a string
pub(crate) fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
