//! Integration tests for the site harvesters
//!
//! These tests use wiremock to serve forum pages and the album API and run
//! a full harvest against a temporary database.

use chrono::NaiveDate;
use pagewalk::config::{
    AlbumEntry, Config, CrawlerConfig, FanclubConfig, ForumEntry, OutputConfig, RecencyConfig,
    UserAgentConfig,
};
use pagewalk::crawler::{Harvester, RecordKind, DETAIL_BODY};
use pagewalk::recency::FixedClock;
use pagewalk::state::{ParentStatus, WalkStop};
use pagewalk::storage::{RunStatus, Sink, SqliteStorage, Storage};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with no targets
fn create_test_config(db_path: &str) -> Config {
    Config {
        crawler: CrawlerConfig {
            page_delay_ms: 0,
            ..CrawlerConfig::default()
        },
        recency: RecencyConfig::default(),
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: db_path.to_string(),
        },
        forum: vec![],
        album: vec![],
        fanclub: None,
    }
}

fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    ))
}

fn listing(base: &str) -> String {
    format!(
        r#"<html><body><table class="olt">
  <tr class="th"><td>Topic</td><td>Author</td><td>Replies</td><td>Last</td></tr>
  <tr>
    <td class="title"><a href="{base}/group/topic/1001/">Fresh topic</a></td>
    <td><a href="{base}/people/alice/">alice</a></td>
    <td class="r-count">2</td>
    <td class="time">2025-05-30 10:15</td>
  </tr>
  <tr>
    <td class="title"><a href="{base}/group/topic/1002/">Broken topic</a></td>
    <td><a href="{base}/people/bob/">bob</a></td>
    <td class="r-count">7</td>
    <td class="time">2025-05-29 08:00</td>
  </tr>
  <tr>
    <td class="title"><a href="{base}/group/topic/0999/">Old topic</a></td>
    <td><a href="{base}/people/carol/">carol</a></td>
    <td class="r-count">40</td>
    <td class="time">2023-02-01</td>
  </tr>
</table></body></html>"#
    )
}

const TOPIC_1001: &str = r#"<html><body>
<div class="topic-doc">
  <span class="create-time">2025-05-28 09:00:01</span>
  <div id="link-report"><div class="rich-content"><div>Opening post</div></div></div>
</div>
<ul>
  <li class="comment-item" data-cid="c-1">
    <div class="user-face"><a href="https://forum.example.com/people/dave/"><img alt="dave"></a></div>
    <p class="reply-content">First!</p>
    <span class="pubtime">2025-05-30 11:02:03 Shanghai</span>
    <a class="comment-vote">赞 (3)</a>
  </li>
  <li class="comment-item" data-cid="c-2">
    <div class="user-face"><a href="https://forum.example.com/people/erin/"><img alt="erin"></a></div>
    <p class="reply-content">Second</p>
    <span class="pubtime">2025-05-30 12:00:00 Beijing</span>
  </li>
</ul>
</body></html>"#;

#[tokio::test]
async fn test_forum_harvest_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/group/g1/discussion"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&base_url)))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/group/topic/1001/"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOPIC_1001))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/group/topic/1002/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let mut config = create_test_config(db_path.to_str().unwrap());
    config.forum.push(ForumEntry {
        group_id: "g1".to_string(),
        base_url: base_url.clone(),
    });

    let harvester = Harvester::new(config, "hash", false)
        .unwrap()
        .with_clock(fixed_clock());
    let report = harvester.run(&CancellationToken::new()).await.unwrap();

    let topics = report.phase("topics:g1").unwrap();
    assert_eq!(topics.succeeded, 1);
    assert_eq!(topics.items, 2);

    let replies = report.phase("replies:g1").unwrap();
    assert_eq!(replies.parents, 2);
    assert_eq!(replies.succeeded, 1);
    assert_eq!(replies.failed, 1);
    assert_eq!(replies.failures[0].0.as_str(), "1002");

    let storage = SqliteStorage::new(&db_path).unwrap();

    let fresh = storage.get_record(RecordKind::Topic, "1001").unwrap().unwrap();
    assert_eq!(fresh.status, ParentStatus::Done);
    assert_eq!(fresh.attributes["title"], "Fresh topic");
    assert_eq!(fresh.attributes["user_id"], "alice");

    let broken = storage.get_record(RecordKind::Topic, "1002").unwrap().unwrap();
    assert_eq!(broken.status, ParentStatus::Unused);

    assert!(storage
        .get_record(RecordKind::Topic, "0999")
        .unwrap()
        .is_none());

    let first = storage.get_record(RecordKind::Reply, "c-1").unwrap().unwrap();
    assert_eq!(first.timestamp, "2025-05-30 11:02:03");
    assert_eq!(first.attributes["ip"], "Shanghai");
    assert_eq!(first.attributes["like_count"], 3);
    assert_eq!(first.attributes[DETAIL_BODY], "Opening post");

    let second = storage.get_record(RecordKind::Reply, "c-2").unwrap().unwrap();
    assert!(second.attributes.get(DETAIL_BODY).is_none());

    let run = storage.get_run(report.run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn test_album_harvest_end_to_end() {
    let mock_server = MockServer::start().await;
    let api_url = format!("{}/albums", mock_server.uri());

    Mock::given(method("POST"))
        .and(path("/albums"))
        .and(header("token", "secret"))
        .and(body_partial_json(json!({ "starId": "417", "page": "0", "size": "20" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "content": {
                "userNftListInfo": [
                    { "url": "https://cdn.example.com/a/new.jpg", "createTime": 1747699200000i64,
                      "sold": 5, "money": 200, "total": 10, "sourceType": 1, "state": 2 },
                    { "url": "https://cdn.example.com/a/old.jpg", "createTime": 1704067200000i64 }
                ]
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/albums"))
        .and(body_partial_json(json!({ "starId": "418" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 200,
            "content": { "userNftListInfo": null }
        })))
        .mount(&mock_server)
        .await;

    let owner = |owner_id: i64, name: &str| AlbumEntry {
        owner_id,
        owner_name: name.to_string(),
        api_url: api_url.clone(),
        page_size: 20,
        token: Some("secret".to_string()),
    };

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let mut config = create_test_config(db_path.to_str().unwrap());
    config.album = vec![owner(417, "Owner"), owner(418, "Quiet"), owner(417, "Dup")];

    let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
    let harvester = Harvester::with_storage(config, Arc::clone(&storage), "hash", false)
        .unwrap()
        .with_clock(fixed_clock());
    let report = harvester.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.phases.len(), 1);
    let albums = &report.phases[0];
    assert_eq!(albums.parents, 2);
    assert_eq!(albums.failed, 0);
    assert_eq!(albums.items, 1);

    let album = storage
        .get_record(RecordKind::Album, "https://cdn.example.com/a/new.jpg")
        .unwrap()
        .unwrap();
    assert_eq!(album.parent.as_str(), "417");
    assert_eq!(album.timestamp, "1747699200000");
    assert_eq!(album.attributes["owner_name"], "Owner");
    assert_eq!(album.attributes["money"], 200);
    assert_eq!(album.attributes["file_type"], "图片");
    assert_eq!(album.attributes["state"], "占位");

    assert!(storage
        .get_record(RecordKind::Album, "https://cdn.example.com/a/old.jpg")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_fresh_run_rewalks_done_topics() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());

    storage
        .upsert_batch(&[pagewalk::Record::new(
            RecordKind::Topic,
            "1001",
            pagewalk::ParentId::from("g1"),
            "2025-05-30 10:15",
        )])
        .unwrap();
    storage
        .mark_parent_done(RecordKind::Topic, &pagewalk::ParentId::from("1001"))
        .unwrap();

    let config = create_test_config(db_path.to_str().unwrap());
    Harvester::with_storage(config, Arc::clone(&storage), "hash", true).unwrap();

    let topic = storage.get_record(RecordKind::Topic, "1001").unwrap().unwrap();
    assert_eq!(topic.status, ParentStatus::Unused);
}

const TOPIC_2001: &str = r#"<html><body>
<div class="topic-doc">
  <span class="create-time">2024-01-02 20:00:00</span>
  <div id="link-report"><div class="rich-content"><div>Long running thread</div></div></div>
</div>
<ul>
  <li class="comment-item" data-cid="old-1">
    <div class="user-face"><a href="https://forum.example.com/people/frank/"><img alt="frank"></a></div>
    <p class="reply-content">Back in January</p>
    <span class="pubtime">2024-01-03 09:30:00 Hangzhou</span>
  </li>
  <li class="comment-item" data-cid="new-1">
    <div class="user-face"><a href="https://forum.example.com/people/gina/"><img alt="gina"></a></div>
    <p class="reply-content">Still going</p>
    <span class="pubtime">2025-05-31 18:45:00 Chengdu</span>
  </li>
</ul>
</body></html>"#;

#[tokio::test]
async fn test_old_replies_do_not_end_topic_walk() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let listing = format!(
        r#"<html><body><table class="olt">
  <tr class="th"><td>Topic</td><td>Author</td><td>Replies</td><td>Last</td></tr>
  <tr>
    <td class="title"><a href="{base}/group/topic/2001/">Long thread</a></td>
    <td><a href="{base}/people/frank/">frank</a></td>
    <td class="r-count">2</td>
    <td class="time">2025-05-31 18:45</td>
  </tr>
</table></body></html>"#,
        base = base_url
    );

    Mock::given(method("GET"))
        .and(path("/group/g2/discussion"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/group/topic/2001/"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TOPIC_2001))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let mut config = create_test_config(db_path.to_str().unwrap());
    config.forum.push(ForumEntry {
        group_id: "g2".to_string(),
        base_url: base_url.clone(),
    });

    let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
    let harvester = Harvester::with_storage(config, Arc::clone(&storage), "hash", false)
        .unwrap()
        .with_clock(fixed_clock());
    let report = harvester.run(&CancellationToken::new()).await.unwrap();

    let replies = report.phase("replies:g2").unwrap();
    assert_eq!(replies.succeeded, 1);
    assert_eq!(replies.items, 1);

    let recent = storage.get_record(RecordKind::Reply, "new-1").unwrap().unwrap();
    assert_eq!(recent.timestamp, "2025-05-31 18:45:00");
    assert_eq!(recent.attributes["ip"], "Chengdu");
    assert!(storage
        .get_record(RecordKind::Reply, "old-1")
        .unwrap()
        .is_none());

    let topic = storage.get_record(RecordKind::Topic, "2001").unwrap().unwrap();
    assert_eq!(topic.status, ParentStatus::Done);
}

fn fanclub(api_base: &str, channels: bool, lives: bool) -> FanclubConfig {
    FanclubConfig {
        api_base: api_base.to_string(),
        token: Some("secret".to_string()),
        channels,
        lives,
    }
}

fn content(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": 200, "content": body }))
}

#[tokio::test]
async fn test_channel_harvest_end_to_end() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/user/api/v1/friendships/friends/id"))
        .and(header("token", "secret"))
        .respond_with(content(json!({ "data": [417, 418] })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/im/api/v1/im/server/jump"))
        .and(body_partial_json(json!({ "starId": "417", "targetType": "1" })))
        .respond_with(content(json!({ "serverId": 9001 })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/im/api/v1/im/server/jump"))
        .and(body_partial_json(json!({ "starId": "418" })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/im/api/v1/team/last/message/get"))
        .and(body_partial_json(json!({ "serverId": "9001" })))
        .respond_with(content(json!({
            "lastMsgList": [{ "channelId": 111 }, { "channelId": 112 }, { "channelId": 113 }]
        })))
        .mount(&mock_server)
        .await;

    let room = |id: i64, name: &str, function: &str| {
        content(json!({
            "channelInfo": {
                "channelId": id,
                "channelName": name,
                "ownerId": 417,
                "ownerName": "Owner",
                "functionType": function
            }
        }))
    };

    Mock::given(method("POST"))
        .and(path("/im/api/v1/im/team/room/info"))
        .and(body_partial_json(json!({ "channelId": "111" })))
        .respond_with(room(111, "Fan room", "CHAT_CHANNEL"))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/im/api/v1/im/team/room/info"))
        .and(body_partial_json(json!({ "channelId": "112" })))
        .respond_with(room(112, "Stage", "LIVE_CHANNEL"))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/im/api/v1/im/team/room/info"))
        .and(body_partial_json(json!({ "channelId": "113" })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let mut config = create_test_config(db_path.to_str().unwrap());
    config.fanclub = Some(fanclub(&mock_server.uri(), true, false));

    let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
    let harvester = Harvester::with_storage(config, Arc::clone(&storage), "hash", false)
        .unwrap()
        .with_clock(fixed_clock());
    let report = harvester.run(&CancellationToken::new()).await.unwrap();

    let channels = report.phase("channels").unwrap();
    assert_eq!(channels.parents, 2);
    assert_eq!(channels.succeeded, 1);
    assert_eq!(channels.failed, 1);
    assert_eq!(channels.failures[0].0.as_str(), "418");
    assert_eq!(channels.items, 1);

    let room = storage.get_record(RecordKind::Channel, "111").unwrap().unwrap();
    assert_eq!(room.parent.as_str(), "417");
    assert_eq!(room.timestamp, "2025-06-01 12:00:00");
    assert_eq!(room.attributes["channel_name"], "Fan room");
    assert_eq!(room.attributes["server_id"], "9001");
    assert_eq!(room.attributes["owner_name"], "Owner");

    assert!(storage.get_record(RecordKind::Channel, "112").unwrap().is_none());
    assert!(storage.get_record(RecordKind::Channel, "113").unwrap().is_none());
}

#[tokio::test]
async fn test_live_feed_follows_next_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/live/api/v1/live/getLiveList"))
        .and(body_partial_json(json!({ "next": "0", "record": "true" })))
        .respond_with(content(json!({
            "next": "1748600000000",
            "liveList": [{ "liveId": "880001", "ctime": "1748700000000" }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/live/api/v1/live/getLiveList"))
        .and(body_partial_json(json!({ "next": "1748600000000" })))
        .respond_with(content(json!({
            "next": "1704000000000",
            "liveList": [
                { "liveId": "880002", "ctime": 1748600000000i64 },
                { "liveId": "770001", "ctime": 1704067200000i64 }
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/live/api/v1/live/getLiveOne"))
        .and(body_partial_json(json!({ "liveId": "880001" })))
        .respond_with(content(json!({
            "liveId": "880001",
            "liveType": 1,
            "onlineNum": 1200,
            "msgFilePath": "https://cdn.example.com/lrc/880001.lrc",
            "user": { "userName": "Owner" },
            "title": "Saturday stream",
            "playStreamPath": "https://cdn.example.com/live/880001.m3u8",
            "ctime": "1748700000000"
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/live/api/v1/live/getLiveOne"))
        .and(body_partial_json(json!({ "liveId": "880002" })))
        .respond_with(ResponseTemplate::new(502))
        .mount(&mock_server)
        .await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("harvest.db");
    let mut config = create_test_config(db_path.to_str().unwrap());
    config.fanclub = Some(fanclub(&mock_server.uri(), false, true));

    let storage = Arc::new(SqliteStorage::new(&db_path).unwrap());
    let harvester = Harvester::with_storage(config, Arc::clone(&storage), "hash", false)
        .unwrap()
        .with_clock(fixed_clock());
    let report = harvester.run(&CancellationToken::new()).await.unwrap();

    let feed = report.phase("lives").unwrap();
    assert_eq!(feed.items, 2);
    assert_eq!(feed.pages, 2);
    assert_eq!(feed.stops.get(&WalkStop::StaleItem), Some(&1));

    let details = report.phase("live-details").unwrap();
    assert_eq!(details.parents, 2);
    assert_eq!(details.succeeded, 1);
    assert_eq!(details.failures[0].0.as_str(), "880002");

    let enriched = storage.get_record(RecordKind::Live, "880001").unwrap().unwrap();
    assert_eq!(enriched.status, ParentStatus::Done);
    assert_eq!(enriched.parent.as_str(), "lives");
    assert_eq!(enriched.timestamp, "1748700000000");
    assert_eq!(enriched.attributes["title"], "Saturday stream");
    assert_eq!(enriched.attributes["live_type"], "直播");
    assert_eq!(enriched.attributes["ctime"], 1748700000000i64);

    let bare = storage.get_record(RecordKind::Live, "880002").unwrap().unwrap();
    assert_eq!(bare.status, ParentStatus::Unused);
    assert!(bare.attributes.get("title").is_none());

    assert!(storage.get_record(RecordKind::Live, "770001").unwrap().is_none());
}
