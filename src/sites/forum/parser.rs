//! Forum HTML parsing
//!
//! Turns listing documents into owned raw rows. `scraper::Html` is not
//! `Send`, so documents are parsed and dropped inside these functions and
//! never held across an await.

use crate::HarvestError;
use scraper::{ElementRef, Html, Selector};

/// One row of a group's discussion table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTopicRow {
    pub topic_url: Option<String>,
    pub title: String,
    pub user_name: String,
    pub user_url: Option<String>,
    pub reply_count: String,
    pub last_reply: String,
}

/// One reply on a topic page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReplyRow {
    pub data_cid: Option<String>,
    pub user_name: Option<String>,
    pub user_url: Option<String>,
    pub content: String,
    pub pubtime: String,
    pub vote: String,
}

/// Topic header shown above the first reply page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTopicHeader {
    pub create_time: String,
    pub body: String,
}

fn selector(css: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css).map_err(|e| HarvestError::parse(format!("bad selector '{}': {}", css, e)))
}

/// Concatenated text of the first match, untrimmed
fn first_text(scope: ElementRef<'_>, selector: &Selector) -> String {
    scope
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>())
        .unwrap_or_default()
}

fn first_attr(scope: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    scope
        .select(selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(str::to_string)
}

/// Parses the rows of a discussion listing (`table.olt`, header row excluded)
pub fn parse_topic_rows(html: &str) -> Result<Vec<RawTopicRow>, HarvestError> {
    let document = Html::parse_document(html);

    let row_selector = selector("table.olt tr:not(.th)")?;
    let title_link = selector("td.title a")?;
    let user_link = selector("td:nth-child(2) a")?;
    let reply_count = selector("td.r-count")?;
    let time = selector("td.time")?;

    let rows = document
        .select(&row_selector)
        .map(|row| RawTopicRow {
            topic_url: first_attr(row, &title_link, "href"),
            title: first_text(row, &title_link).trim().to_string(),
            user_name: first_text(row, &user_link).trim().to_string(),
            user_url: first_attr(row, &user_link, "href"),
            reply_count: first_text(row, &reply_count).trim().to_string(),
            last_reply: first_text(row, &time).trim().to_string(),
        })
        .collect();

    Ok(rows)
}

/// Parses the replies of a topic page, plus the topic header when asked
pub fn parse_reply_page(
    html: &str,
    with_header: bool,
) -> Result<(Vec<RawReplyRow>, Option<RawTopicHeader>), HarvestError> {
    let document = Html::parse_document(html);

    let item = selector(".comment-item")?;
    let avatar = selector(".user-face img")?;
    let profile = selector(".user-face a")?;
    let content = selector(".reply-content")?;
    let pubtime = selector(".pubtime")?;
    let vote = selector(".comment-vote")?;

    let replies = document
        .select(&item)
        .map(|reply| RawReplyRow {
            data_cid: reply.value().attr("data-cid").map(str::to_string),
            user_name: first_attr(reply, &avatar, "alt"),
            user_url: first_attr(reply, &profile, "href"),
            content: first_text(reply, &content),
            pubtime: first_text(reply, &pubtime),
            vote: first_text(reply, &vote),
        })
        .collect();

    let header = if with_header {
        let root = document.root_element();
        let create_time = selector(".create-time")?;
        let body = selector("#link-report > div > div")?;
        Some(RawTopicHeader {
            create_time: first_text(root, &create_time).trim().to_string(),
            body: first_text(root, &body).trim().to_string(),
        })
    } else {
        None
    };

    Ok((replies, header))
}
