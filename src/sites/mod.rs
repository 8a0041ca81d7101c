//! Site adapters
//!
//! Each site supplies `PageSource` and `Extractor` implementations; the
//! walker and dispatcher never see site-specific types.
//!
//! - `forum`: discussion groups (topics, then replies per topic)
//! - `fanclub`: fan-app albums per owner, chat channels per followed star,
//!   and the live broadcast feed

pub mod fanclub;
pub mod forum;

pub use fanclub::{
    unique_owners, AlbumExtractor, AlbumSource, ChannelExtractor, ChannelSource, FanclubApi,
    LiveDetailExtractor, LiveDetailSource, LiveListExtractor, LiveListSource, LIVE_FEED,
};
pub use forum::{ForumReplies, ForumTopics, ReplyExtractor, TopicExtractor};
