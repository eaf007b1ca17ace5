#![forbid(unsafe_code)]

//! Bindings for the YouTube Data API v3 endpoints the harvester reads.
//!
//! Only the fields that end up in a snapshot are decoded. Everything else in
//! the payloads is ignored, except reply threads which are passed through raw.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::collector::{Page, PageRequest, PageSource};
use crate::error::FetchError;
use crate::model::{CaptionTrack, Comment, VideoMetadata};
use crate::transport::{Transport, fetch_typed};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// `commentThreads.list` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadList {
    items: Vec<RawCommentThread>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    #[serde(default)]
    total_results: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommentThread {
    id: String,
    snippet: ThreadSnippet,
    #[serde(default)]
    replies: Option<RawReplies>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: TopLevelComment,
    #[serde(default)]
    total_reply_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    author_display_name: String,
    #[serde(default)]
    text_display: Option<String>,
    #[serde(default)]
    text_original: Option<String>,
    #[serde(default)]
    published_at: String,
    #[serde(default)]
    like_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct RawReplies {
    #[serde(default)]
    comments: Vec<Value>,
}

/// Maps one decoded page to comments, preserving page order.
pub fn map_comment_page(page: &CommentThreadList) -> Vec<Comment> {
    page.items
        .iter()
        .map(|thread| {
            let snippet = &thread.snippet.top_level_comment.snippet;
            Comment {
                id: thread.id.clone(),
                author: snippet.author_display_name.clone(),
                text: snippet
                    .text_display
                    .clone()
                    .or_else(|| snippet.text_original.clone())
                    .unwrap_or_default(),
                published_at: snippet.published_at.clone(),
                like_count: snippet.like_count,
                reply_count: thread.snippet.total_reply_count,
                replies: thread
                    .replies
                    .as_ref()
                    .map(|replies| replies.comments.clone())
                    .unwrap_or_default(),
            }
        })
        .collect()
}

impl CommentThreadList {
    pub fn into_page(self) -> Page<Comment> {
        let items = map_comment_page(&self);
        Page {
            items,
            next_cursor: self.next_page_token.filter(|token| !token.is_empty()),
            total_results: self.page_info.and_then(|info| info.total_results),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoList {
    items: Vec<RawVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideo {
    id: String,
    #[serde(default)]
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
    #[serde(default)]
    content_details: ContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    channel_id: Option<String>,
    channel_title: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Counts arrive as decimal strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    #[serde(default, deserialize_with = "count")]
    view_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    like_count: Option<u64>,
    #[serde(default, deserialize_with = "count")]
    comment_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

fn count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Count>::deserialize(deserializer)? {
        Some(Count::Number(value)) => Some(value),
        Some(Count::Text(text)) => text.trim().parse().ok(),
        None => None,
    })
}

impl From<RawVideo> for VideoMetadata {
    fn from(raw: RawVideo) -> Self {
        VideoMetadata {
            id: raw.id,
            title: raw.snippet.title,
            description: raw.snippet.description,
            channel_id: raw.snippet.channel_id,
            channel_title: raw.snippet.channel_title,
            published_at: raw.snippet.published_at,
            duration: raw.content_details.duration,
            view_count: raw.statistics.view_count,
            like_count: raw.statistics.like_count,
            comment_count: raw.statistics.comment_count,
            tags: raw.snippet.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CaptionList {
    #[serde(default)]
    items: Vec<RawCaption>,
}

#[derive(Debug, Deserialize)]
struct RawCaption {
    id: String,
    snippet: CaptionSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionSnippet {
    language: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    track_kind: String,
    last_updated: Option<String>,
}

impl From<RawCaption> for CaptionTrack {
    fn from(raw: RawCaption) -> Self {
        CaptionTrack {
            id: raw.id,
            language: raw.snippet.language,
            name: raw.snippet.name,
            track_kind: raw.snippet.track_kind,
            last_updated: raw.snippet.last_updated,
        }
    }
}

/// Client for the Data API. The credential is sent as `key` on every call.
pub struct DataApi<T> {
    transport: T,
    base_url: String,
    api_key: String,
}

impl<T: Transport> DataApi<T> {
    pub fn new(transport: T, api_key: impl Into<String>) -> Self {
        Self::with_base_url(transport, api_key, DEFAULT_API_BASE)
    }

    pub fn with_base_url(
        transport: T,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    pub async fn video_metadata(&self, video_id: &str) -> Result<VideoMetadata, FetchError> {
        let query = vec![
            ("part", "snippet,statistics,contentDetails".to_string()),
            ("id", video_id.to_string()),
            ("key", self.api_key.clone()),
        ];
        let list: VideoList = fetch_typed(&self.transport, &self.endpoint("videos"), &query).await?;
        list.items
            .into_iter()
            .next()
            .map(VideoMetadata::from)
            .ok_or_else(|| FetchError::Schema(format!("video {video_id} not found")))
    }

    pub async fn caption_tracks(&self, video_id: &str) -> Result<Vec<CaptionTrack>, FetchError> {
        let query = vec![
            ("part", "snippet".to_string()),
            ("videoId", video_id.to_string()),
            ("key", self.api_key.clone()),
        ];
        let list: CaptionList =
            fetch_typed(&self.transport, &self.endpoint("captions"), &query).await?;
        Ok(list.items.into_iter().map(CaptionTrack::from).collect())
    }

    pub fn comment_threads<'a>(
        &'a self,
        video_id: &'a str,
        page_size: u32,
        include_replies: bool,
    ) -> CommentThreads<'a, T> {
        CommentThreads {
            api: self,
            video_id,
            page_size,
            include_replies,
        }
    }
}

/// Paged `commentThreads.list` listing for one video.
pub struct CommentThreads<'a, T> {
    api: &'a DataApi<T>,
    video_id: &'a str,
    page_size: u32,
    include_replies: bool,
}

impl<T> CommentThreads<'_, T> {
    pub fn query(&self, request: &PageRequest) -> Vec<(&'static str, String)> {
        let part = if self.include_replies {
            "snippet,replies"
        } else {
            "snippet"
        };
        let mut query = vec![
            ("part", part.to_string()),
            ("videoId", self.video_id.to_string()),
            ("key", self.api.api_key.clone()),
            ("maxResults", self.page_size.to_string()),
            ("order", request.order.as_str().to_string()),
        ];
        if let Some(cursor) = &request.cursor {
            query.push(("pageToken", cursor.clone()));
        }
        query
    }
}

#[async_trait]
impl<'a, T: Transport> PageSource for CommentThreads<'a, T> {
    type Item = Comment;

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page<Comment>, FetchError> {
        let query = self.query(request);
        let list: CommentThreadList =
            fetch_typed(&self.api.transport, &self.api.endpoint("commentThreads"), &query).await?;
        Ok(list.into_page())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SortOrder;
    use crate::test_support::FakeTransport;
    use serde_json::json;

    fn thread(id: &str, likes: u64) -> Value {
        json!({
            "id": id,
            "snippet": {
                "topLevelComment": {
                    "id": id,
                    "snippet": {
                        "authorDisplayName": "<i>Bob</i>",
                        "textDisplay": "nice <a href=\"x\">link</a>",
                        "textOriginal": "nice link",
                        "publishedAt": "2024-05-01T10:00:00Z",
                        "likeCount": likes
                    }
                },
                "totalReplyCount": 2
            },
            "replies": {"comments": [{"id": format!("{id}.r1")}]}
        })
    }

    #[test]
    fn maps_thread_fields_and_keeps_markup() {
        let list: CommentThreadList = serde_json::from_value(json!({
            "items": [thread("t1", 4), thread("t2", 0)],
            "nextPageToken": "next",
            "pageInfo": {"totalResults": 2}
        }))
        .unwrap();
        let comments = map_comment_page(&list);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, "t1");
        assert_eq!(comments[0].author, "<i>Bob</i>");
        assert_eq!(comments[0].text, "nice <a href=\"x\">link</a>");
        assert_eq!(comments[0].like_count, 4);
        assert_eq!(comments[0].reply_count, Some(2));
        assert_eq!(comments[0].replies, vec![json!({"id": "t1.r1"})]);
        assert_eq!(comments[1].id, "t2");
    }

    #[test]
    fn mapping_is_repeatable() {
        let list: CommentThreadList =
            serde_json::from_value(json!({"items": [thread("a", 1), thread("b", 2)]})).unwrap();
        assert_eq!(map_comment_page(&list), map_comment_page(&list));
    }

    #[test]
    fn into_page_treats_blank_token_as_absent() {
        let list: CommentThreadList =
            serde_json::from_value(json!({"items": [], "nextPageToken": ""})).unwrap();
        let page = list.into_page();
        assert!(page.items.is_empty());
        assert_eq!(page.next_cursor, None);
        assert_eq!(page.total_results, None);
    }

    #[test]
    fn missing_items_is_a_schema_error() {
        let result = serde_json::from_value::<CommentThreadList>(json!({"kind": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn query_includes_cursor_only_when_present() {
        let api = DataApi::new(FakeTransport::default(), "secret");
        let threads = api.comment_threads("vid", 500, false);
        let first = threads.query(&PageRequest {
            order: SortOrder::Relevance,
            cursor: None,
        });
        assert_eq!(
            first,
            vec![
                ("part", "snippet".to_string()),
                ("videoId", "vid".to_string()),
                ("key", "secret".to_string()),
                ("maxResults", "500".to_string()),
                ("order", "relevance".to_string()),
            ]
        );

        let with_replies = api.comment_threads("vid", 100, true);
        let later = with_replies.query(&PageRequest {
            order: SortOrder::Time,
            cursor: Some("tok".into()),
        });
        assert!(later.contains(&("part", "snippet,replies".to_string())));
        assert!(later.contains(&("order", "time".to_string())));
        assert_eq!(later.last(), Some(&("pageToken", "tok".to_string())));
    }

    #[tokio::test]
    async fn fetch_page_decodes_through_transport() {
        let transport = FakeTransport::default();
        transport.respond(
            "commentThreads",
            Ok(json!({
                "items": [thread("t1", 1)],
                "nextPageToken": "c1",
                "pageInfo": {"totalResults": 900}
            })),
        );
        let api = DataApi::with_base_url(transport, "k", "http://api.test/v3/");
        let page = api
            .comment_threads("vid", 500, false)
            .fetch_page(&PageRequest {
                order: SortOrder::Relevance,
                cursor: None,
            })
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("c1"));
        assert_eq!(page.total_results, Some(900));
        let calls = api.transport().calls();
        assert_eq!(calls[0].0, "http://api.test/v3/commentThreads");
    }

    #[tokio::test]
    async fn video_metadata_parses_string_counts() {
        let transport = FakeTransport::default();
        transport.respond(
            "videos",
            Ok(json!({
                "items": [{
                    "id": "vid",
                    "snippet": {
                        "title": "Title",
                        "description": "Desc",
                        "channelId": "UC1",
                        "channelTitle": "Chan",
                        "publishedAt": "2023-03-03T00:00:00Z",
                        "tags": ["a", "b"]
                    },
                    "statistics": {"viewCount": "1200", "likeCount": "7", "commentCount": "31"},
                    "contentDetails": {"duration": "PT4M13S"}
                }]
            })),
        );
        let api = DataApi::new(transport, "k");
        let metadata = api.video_metadata("vid").await.unwrap();
        assert_eq!(metadata.title, "Title");
        assert_eq!(metadata.channel_title.as_deref(), Some("Chan"));
        assert_eq!(metadata.view_count, Some(1200));
        assert_eq!(metadata.comment_count, Some(31));
        assert_eq!(metadata.duration.as_deref(), Some("PT4M13S"));
        assert_eq!(metadata.tags, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn unknown_video_is_a_schema_error() {
        let transport = FakeTransport::default();
        transport.respond("videos", Ok(json!({"items": []})));
        let api = DataApi::new(transport, "k");
        let err = api.video_metadata("gone").await.unwrap_err();
        assert!(matches!(err, FetchError::Schema(message) if message.contains("gone")));
    }

    #[tokio::test]
    async fn caption_tracks_are_listed() {
        let transport = FakeTransport::default();
        transport.respond(
            "captions",
            Ok(json!({
                "items": [
                    {"id": "cap1", "snippet": {"language": "en", "name": "", "trackKind": "asr"}},
                    {"id": "cap2", "snippet": {"language": "de", "name": "Deutsch", "trackKind": "standard",
                        "lastUpdated": "2024-01-01T00:00:00Z"}}
                ]
            })),
        );
        let api = DataApi::new(transport, "k");
        let tracks = api.caption_tracks("vid").await.unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].track_kind, "asr");
        assert_eq!(tracks[1].language, "de");
        assert_eq!(tracks[1].last_updated.as_deref(), Some("2024-01-01T00:00:00Z"));
    }
}
