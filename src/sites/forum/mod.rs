//! Discussion forum harvester
//!
//! Two listings per group:
//! - the group's discussion table (`/group/{id}/discussion?start=N`, 50 per
//!   page, parent = group id) yields `Topic` records
//! - each topic's reply pages (`/group/topic/{id}/?start=N`, 100 per page,
//!   parent = topic id) yield `Reply` records; the first page also carries
//!   the topic's creation time and opening post
//!
//! Discussion tables list the most recently active topic first. Reply pages
//! run oldest first, so old replies are filtered rather than ending a walk.

mod parser;

pub use parser::{parse_reply_page, parse_topic_rows, RawReplyRow, RawTopicHeader, RawTopicRow};

use crate::crawler::{
    fetch_text, Cursor, DetailRecord, Extractor, FetchedPage, ListingOrder, PageSource, ParentId,
    Record, RecordKind,
};
use crate::recency::parse_timestamp;
use crate::HarvestError;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use url::Url;

/// Topics per discussion page
pub const TOPIC_PAGE_SIZE: usize = 50;

/// Replies per topic page
pub const REPLY_PAGE_SIZE: usize = 100;

fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Discussion listing of one group
pub struct ForumTopics {
    client: Client,
    base_url: String,
}

impl ForumTopics {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }

    pub fn page_url(&self, group: &ParentId, cursor: Cursor) -> String {
        format!(
            "{}/group/{}/discussion?start={}",
            self.base_url, group, cursor
        )
    }
}

#[async_trait]
impl PageSource for ForumTopics {
    type Item = RawTopicRow;
    type Detail = ();

    fn page_size(&self) -> usize {
        TOPIC_PAGE_SIZE
    }

    async fn fetch_page(
        &self,
        parent: &ParentId,
        cursor: Cursor,
        _with_detail: bool,
    ) -> Result<FetchedPage<RawTopicRow, ()>, HarvestError> {
        let url = self.page_url(parent, cursor);
        let body = fetch_text(&self.client, &url).await?;
        let rows = parse_topic_rows(&body)?;
        tracing::debug!("Parsed {} topic rows from {}", rows.len(), url);
        Ok(FetchedPage::new(rows))
    }
}

/// Reply pages of one topic
pub struct ForumReplies {
    client: Client,
    base_url: String,
}

impl ForumReplies {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }

    pub fn page_url(&self, topic: &ParentId, cursor: Cursor) -> String {
        format!("{}/group/topic/{}/?start={}", self.base_url, topic, cursor)
    }
}

#[async_trait]
impl PageSource for ForumReplies {
    type Item = RawReplyRow;
    type Detail = RawTopicHeader;

    fn page_size(&self) -> usize {
        REPLY_PAGE_SIZE
    }

    fn order(&self) -> ListingOrder {
        ListingOrder::OldestFirst
    }

    async fn fetch_page(
        &self,
        parent: &ParentId,
        cursor: Cursor,
        with_detail: bool,
    ) -> Result<FetchedPage<RawReplyRow, RawTopicHeader>, HarvestError> {
        let url = self.page_url(parent, cursor);
        let body = fetch_text(&self.client, &url).await?;
        let (replies, header) = parse_reply_page(&body, with_detail)?;
        tracing::debug!("Parsed {} replies from {}", replies.len(), url);
        Ok(FetchedPage::new(replies).with_detail(header))
    }
}

/// Returns the path segment following `marker` in a site URL
///
/// `https://host/group/topic/1001/` with marker `topic` yields `1001`.
pub fn id_after(href: &str, marker: &str) -> Option<String> {
    let url = Url::parse(href).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == marker)?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Builds `Topic` records from discussion rows
#[derive(Debug, Default, Clone, Copy)]
pub struct TopicExtractor;

impl Extractor for TopicExtractor {
    type Item = RawTopicRow;
    type Detail = ();

    fn extract(&self, parent: &ParentId, raw: &RawTopicRow) -> Result<Record, HarvestError> {
        let topic_url = raw
            .topic_url
            .as_deref()
            .ok_or_else(|| HarvestError::parse("topic URL not found"))?;
        let user_url = raw
            .user_url
            .as_deref()
            .ok_or_else(|| HarvestError::parse("user URL not found"))?;

        let topic_id = id_after(topic_url, "topic")
            .ok_or_else(|| HarvestError::parse(format!("no topic id in '{}'", topic_url)))?;
        let user_id = id_after(user_url, "people").unwrap_or_default();
        let reply_count = raw.reply_count.parse::<i64>().unwrap_or(0);

        Ok(
            Record::new(RecordKind::Topic, topic_id, parent.clone(), &raw.last_reply)
                .with("topic_url", topic_url)
                .with("title", raw.title.as_str())
                .with("user_name", raw.user_name.as_str())
                .with("user_id", user_id)
                .with("user_url", user_url)
                .with("group_id", parent.as_str())
                .with("reply_count", reply_count),
        )
    }
}

/// Splits `"2025-05-30 11:02:03 Shanghai"` into time and location
pub fn split_pubtime(pubtime: &str) -> Result<(String, String), HarvestError> {
    let parts: Vec<&str> = pubtime.trim().splitn(3, ' ').collect();
    if parts.len() < 3 {
        return Err(HarvestError::parse(format!(
            "invalid pubtime '{}'",
            pubtime.trim()
        )));
    }
    Ok((
        format!("{} {}", parts[0], parts[1]),
        parts[2].trim().to_string(),
    ))
}

/// Reads a like counter such as `赞 (3)`; anything unreadable counts as zero
pub fn parse_vote_count(vote: &str) -> i64 {
    vote.trim()
        .trim_matches(|c| c == '赞' || c == '(' || c == ')')
        .trim()
        .trim_matches(|c| c == '(' || c == ')')
        .trim()
        .parse()
        .unwrap_or(0)
}

/// Builds `Reply` records and the topic detail
///
/// `now` anchors year-less topic creation times; pass the gate's `now` so
/// the whole run reads short forms against one instant.
#[derive(Debug, Clone, Copy)]
pub struct ReplyExtractor {
    now: NaiveDateTime,
}

impl ReplyExtractor {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now }
    }
}

impl Extractor for ReplyExtractor {
    type Item = RawReplyRow;
    type Detail = RawTopicHeader;

    fn extract(&self, parent: &ParentId, raw: &RawReplyRow) -> Result<Record, HarvestError> {
        let cid = raw
            .data_cid
            .as_deref()
            .filter(|cid| !cid.is_empty())
            .ok_or_else(|| HarvestError::parse(format!("reply under {} has no data-cid", parent)))?;
        let (time, location) = split_pubtime(&raw.pubtime)?;

        Ok(Record::new(RecordKind::Reply, cid, parent.clone(), time)
            .with("topic_id", parent.as_str())
            .with("user_name", raw.user_name.clone().unwrap_or_default())
            .with("user_url", raw.user_url.clone().unwrap_or_default())
            .with("content", raw.content.trim())
            .with("ip", location)
            .with("like_count", parse_vote_count(&raw.vote)))
    }

    fn extract_detail(
        &self,
        parent: &ParentId,
        raw: &RawTopicHeader,
    ) -> Result<DetailRecord, HarvestError> {
        let (created_at, _) = parse_timestamp(&raw.create_time, self.now)
            .map_err(|e| HarvestError::parse(format!("topic {} create time: {}", parent, e)))?;

        Ok(DetailRecord {
            parent: parent.clone(),
            created_at: Some(created_at),
            body: raw.body.clone(),
        })
    }
}
