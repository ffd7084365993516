pub const SCHEMA: &str = r#"
-- history_items table: fetched articles and generated digest topics
CREATE TABLE IF NOT EXISTS history_items (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT 'article',
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    content TEXT NOT NULL DEFAULT '',
    link TEXT NOT NULL DEFAULT '',
    published TEXT NOT NULL DEFAULT '',
    date TEXT NOT NULL DEFAULT '',
    feed_title TEXT NOT NULL DEFAULT '',
    feed_url TEXT NOT NULL DEFAULT '',
    is_read INTEGER NOT NULL DEFAULT 0,
    saved_at TEXT NOT NULL DEFAULT '',
    is_bookmarked INTEGER NOT NULL DEFAULT 0,
    ai_summary TEXT NOT NULL DEFAULT '',
    ai_tags TEXT NOT NULL DEFAULT '[]',
    ai_updated_at TEXT NOT NULL DEFAULT '',
    digest_date TEXT NOT NULL DEFAULT '',
    related_guids TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_history_feed_kind_date ON history_items(feed_url, kind, date DESC);
CREATE INDEX IF NOT EXISTS idx_history_bookmarked_kind_date ON history_items(is_bookmarked, kind, date DESC);
CREATE INDEX IF NOT EXISTS idx_history_kind_digest_date ON history_items(kind, digest_date);
"#;

/// Column order shared by every full-row SELECT and the upsert.
pub const COLUMNS: &str = "id, kind, title, description, content, link, published, date, \
    feed_title, feed_url, is_read, saved_at, is_bookmarked, ai_summary, ai_tags, \
    ai_updated_at, digest_date, related_guids";

/// Same as [`COLUMNS`] but article bodies are not read.
pub const METADATA_COLUMNS: &str = "id, kind, title, description, \
    CASE WHEN kind = 'digest' THEN content ELSE '' END AS content, link, published, date, \
    feed_title, feed_url, is_read, saved_at, is_bookmarked, ai_summary, ai_tags, \
    ai_updated_at, digest_date, related_guids";
