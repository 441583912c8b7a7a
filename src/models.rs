use serde::Serialize;

/// One post as rendered in the search feed.
///
/// Everything except `post_id` is best-effort: the markup is unreliable, so a
/// missing field never drops the record. `post_id` is always set on records
/// that leave the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub source_url: Option<String>,
    pub page_id: Option<String>,
    pub post_id: String,
    pub page_name: Option<String>,
    pub post_url: Option<String>,
    pub canonical_url: Option<String>,
    pub published_at_text: Option<String>,
    /// Unix seconds. Falls back to extraction time when the page shows none.
    pub published_at_epoch: i64,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub share_count: Option<u64>,
    pub body_text: Option<String>,
    pub external_link: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl PostRecord {
    pub const COLUMNS: [&'static str; 14] = [
        "sourceUrl",
        "pageId",
        "postId",
        "pageName",
        "postUrl",
        "canonicalUrl",
        "publishedAtText",
        "publishedAtEpoch",
        "likeCount",
        "commentCount",
        "shareCount",
        "bodyText",
        "externalLink",
        "thumbnailUrl",
    ];

    /// Flat text cells in `COLUMNS` order; absent values are empty.
    pub fn cells(&self) -> Vec<String> {
        fn opt(v: &Option<String>) -> String {
            v.clone().unwrap_or_default()
        }
        fn num(v: Option<u64>) -> String {
            v.map(|n| n.to_string()).unwrap_or_default()
        }
        vec![
            opt(&self.source_url),
            opt(&self.page_id),
            self.post_id.clone(),
            opt(&self.page_name),
            opt(&self.post_url),
            opt(&self.canonical_url),
            opt(&self.published_at_text),
            self.published_at_epoch.to_string(),
            num(self.like_count),
            num(self.comment_count),
            num(self.share_count),
            opt(&self.body_text),
            opt(&self.external_link),
            opt(&self.thumbnail_url),
        ]
    }
}

/// Fields pulled from the block's embedded `data-ft` JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockMeta {
    pub page_id: Option<String>,
    pub post_id: Option<String>,
}
