use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;

use crate::clock::date_key;
use crate::error::Result;
use crate::models::{normalize_tags, HistoryItem, ItemKind};

use super::legacy;
use super::schema::{COLUMNS, METADATA_COLUMNS, SCHEMA};

/// What happens to a date's existing digest rows when it is regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestReplacePolicy {
    /// Insert-or-replace the supplied rows; rows not re-supplied stay.
    Upsert,
    /// Delete the date's digest rows, then insert. Other dates are untouched.
    #[default]
    Prune,
}

/// SQLite-backed history with a cheap metadata read path and a full hydrate path.
///
/// All access goes through one `tokio_rusqlite` connection thread, so writes
/// are serialized and every call sees a consistent snapshot. Batch writes run
/// in a single transaction.
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (or create) the store. Legacy JSON-lines paths are redirected to
    /// the sibling `.db` file and imported once.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let configured = path.as_ref();
        let db_path = legacy::resolve_history_path(configured);
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path).await?;
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        let store = Self { conn };
        for legacy_path in legacy::legacy_sources(configured, &db_path) {
            store.import_legacy(&legacy_path).await?;
        }
        Ok(store)
    }

    async fn import_legacy(&self, legacy_path: &Path) -> Result<()> {
        if self.count_items().await? > 0 {
            tracing::info!(
                "Store already populated, leaving legacy history {:?} in place",
                legacy_path
            );
            return Ok(());
        }

        let items = legacy::read_legacy_items(legacy_path)?;
        let imported = self.upsert(items).await?;
        let moved_to = legacy::mark_migrated(legacy_path)?;
        tracing::info!(
            "Imported {} legacy history items, original kept at {:?}",
            imported,
            moved_to
        );
        Ok(())
    }

    // Read paths

    /// Every item, with article bodies left out.
    pub async fn load_metadata(&self) -> Result<HashMap<String, HistoryItem>> {
        let items = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {METADATA_COLUMNS} FROM history_items"))?;
                let items = stmt
                    .query_map([], item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;

        Ok(items
            .into_iter()
            .map(|item| (item.id.clone(), item.into_metadata()))
            .collect())
    }

    /// One item with its full body.
    pub async fn load_by_id(&self, id: &str) -> Result<Option<HistoryItem>> {
        let id = id.to_string();
        let item = self
            .conn
            .call(move |conn| {
                let item = conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM history_items WHERE id = ?1"),
                        params![id],
                        item_from_row,
                    )
                    .optional()?;
                Ok(item)
            })
            .await?;

        Ok(item.map(hydrated))
    }

    /// Digest rows stored for one calendar date, in slot order.
    pub async fn load_digest_items_by_date(&self, digest_date: &str) -> Result<Vec<HistoryItem>> {
        let digest_date = digest_date.to_string();
        let items = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS} FROM history_items WHERE kind = 'digest' AND digest_date = ?1 ORDER BY id"
                ))?;
                let items = stmt
                    .query_map(params![digest_date], item_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;

        Ok(items.into_iter().map(hydrated).collect())
    }

    /// Articles whose effective date (published, else saved-at) falls on
    /// `date_key` in `tz`, newest first, at most `limit`, fully hydrated.
    /// An empty `feed_filter` means every feed.
    pub async fn load_today_articles(
        &self,
        date_key_wanted: &str,
        feed_filter: &[String],
        limit: usize,
        tz: Tz,
    ) -> Result<Vec<HistoryItem>> {
        let wanted = date_key_wanted.to_string();
        let feed_filter = feed_filter.to_vec();

        let items = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let mut sql =
                    String::from("SELECT id, date, saved_at FROM history_items WHERE kind = 'article'");
                if !feed_filter.is_empty() {
                    let placeholders = vec!["?"; feed_filter.len()].join(", ");
                    sql.push_str(&format!(" AND feed_url IN ({placeholders})"));
                }

                let mut candidates: Vec<(usize, String, DateTime<Utc>)> = {
                    let mut stmt = tx.prepare(&sql)?;
                    let rows = stmt
                        .query_map(params_from_iter(feed_filter.iter()), |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        })?
                        .collect::<std::result::Result<Vec<_>, _>>()?;

                    rows.into_iter()
                        .enumerate()
                        .filter_map(|(order, (id, published, saved_at))| {
                            let effective =
                                parse_datetime(&published).or_else(|| parse_datetime(&saved_at))?;
                            (date_key(effective, tz) == wanted).then_some((order, id, effective))
                        })
                        .collect()
                };

                candidates.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
                candidates.truncate(limit);

                let mut items = Vec::with_capacity(candidates.len());
                {
                    let mut stmt =
                        tx.prepare(&format!("SELECT {COLUMNS} FROM history_items WHERE id = ?1"))?;
                    for (_, id, _) in &candidates {
                        if let Some(item) = stmt.query_row(params![id], item_from_row).optional()? {
                            items.push(item);
                        }
                    }
                }
                tx.commit()?;
                Ok(items)
            })
            .await?;

        Ok(items.into_iter().map(hydrated).collect())
    }

    pub async fn count_items(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM history_items", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await?;
        Ok(count)
    }

    // Write paths

    /// Insert or replace by id, all-or-nothing for the batch.
    ///
    /// An article written with an empty body keeps the body already stored,
    /// so rows that were only ever loaded as metadata never lose content.
    pub async fn upsert(&self, items: Vec<HistoryItem>) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let count = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let count = upsert_in(&tx, &items)?;
                tx.commit()?;
                Ok(count)
            })
            .await?;
        tracing::debug!("Upserted {} history items", count);
        Ok(count)
    }

    pub async fn set_read(&self, id: &str, is_read: bool) -> Result<()> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE history_items SET is_read = ?1 WHERE id = ?2",
                    params![is_read, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_bookmark(&self, id: &str, is_bookmarked: bool) -> Result<()> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE history_items SET is_bookmarked = ?1 WHERE id = ?2",
                    params![is_bookmarked, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn set_insight(
        &self,
        id: &str,
        summary: &str,
        tags: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = id.to_string();
        let summary = summary.to_string();
        let tags_json = serde_json::to_string(&normalize_tags(tags))?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE history_items SET ai_summary = ?1, ai_tags = ?2, ai_updated_at = ?3 WHERE id = ?4",
                    params![summary, tags_json, updated_at.to_rfc3339(), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Store `items` as the digest for `digest_date`, upserting by id.
    /// Digest rows of that date that are not re-supplied are kept.
    pub async fn replace_digest_items_by_date(
        &self,
        digest_date: &str,
        items: Vec<HistoryItem>,
    ) -> Result<Vec<HistoryItem>> {
        self.replace_digest_items_by_date_with(digest_date, items, DigestReplacePolicy::Upsert)
            .await
    }

    /// Like [`replace_digest_items_by_date`](Self::replace_digest_items_by_date)
    /// with an explicit policy for rows that are not re-supplied. Only rows of
    /// `digest_date` are ever removed.
    pub async fn replace_digest_items_by_date_with(
        &self,
        digest_date: &str,
        items: Vec<HistoryItem>,
        policy: DigestReplacePolicy,
    ) -> Result<Vec<HistoryItem>> {
        let items: Vec<HistoryItem> = items
            .into_iter()
            .map(|mut item| {
                item.kind = ItemKind::Digest;
                item.digest_date = digest_date.to_string();
                item.body_hydrated = true;
                item
            })
            .collect();

        let digest_date = digest_date.to_string();
        let rows = items.clone();
        let (pruned, written) = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let pruned = match policy {
                    DigestReplacePolicy::Prune => tx.execute(
                        "DELETE FROM history_items WHERE kind = 'digest' AND digest_date = ?1",
                        params![digest_date],
                    )?,
                    DigestReplacePolicy::Upsert => 0,
                };
                let written = upsert_in(&tx, &rows)?;
                tx.commit()?;
                Ok((pruned, written))
            })
            .await?;

        tracing::debug!("Digest replace: {} pruned, {} written", pruned, written);
        Ok(items)
    }
}

fn upsert_in(tx: &Transaction<'_>, items: &[HistoryItem]) -> tokio_rusqlite::Result<usize> {
    let mut stmt = tx.prepare(&format!(
        r#"INSERT INTO history_items ({COLUMNS})
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
           ON CONFLICT(id) DO UPDATE SET
               kind = excluded.kind,
               title = excluded.title,
               description = excluded.description,
               content = CASE
                   WHEN excluded.kind = 'article' AND excluded.content = '' THEN history_items.content
                   ELSE excluded.content
               END,
               link = excluded.link,
               published = excluded.published,
               date = excluded.date,
               feed_title = excluded.feed_title,
               feed_url = excluded.feed_url,
               is_read = excluded.is_read,
               saved_at = excluded.saved_at,
               is_bookmarked = excluded.is_bookmarked,
               ai_summary = excluded.ai_summary,
               ai_tags = excluded.ai_tags,
               ai_updated_at = excluded.ai_updated_at,
               digest_date = excluded.digest_date,
               related_guids = excluded.related_guids"#
    ))?;

    let mut count = 0;
    for item in items {
        stmt.execute(params![
            item.id,
            item.kind.as_str(),
            item.title,
            item.description,
            item.body,
            item.link,
            item.published_text,
            format_datetime(item.published_date),
            item.origin_feed_title,
            item.origin_feed_url,
            item.is_read,
            format_datetime(item.saved_at),
            item.is_bookmarked,
            item.ai_summary,
            to_json(&item.ai_tags)?,
            format_datetime(item.ai_updated_at),
            item.digest_date,
            to_json(&item.related_ids)?,
        ])?;
        count += 1;
    }
    Ok(count)
}

fn to_json(values: &[String]) -> tokio_rusqlite::Result<String> {
    serde_json::to_string(values).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

fn hydrated(mut item: HistoryItem) -> HistoryItem {
    item.body_hydrated = true;
    item
}

fn format_datetime(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|dt| dt.to_rfc3339()).unwrap_or_default()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn parse_json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn item_from_row(row: &Row) -> rusqlite::Result<HistoryItem> {
    Ok(HistoryItem {
        id: row.get(0)?,
        kind: ItemKind::from_db(&row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        body: row.get(4)?,
        link: row.get(5)?,
        published_text: row.get(6)?,
        published_date: parse_datetime(&row.get::<_, String>(7)?),
        origin_feed_title: row.get(8)?,
        origin_feed_url: row.get(9)?,
        is_read: row.get::<_, i64>(10)? != 0,
        saved_at: parse_datetime(&row.get::<_, String>(11)?),
        is_bookmarked: row.get::<_, i64>(12)? != 0,
        ai_summary: row.get(13)?,
        ai_tags: parse_json_list(&row.get::<_, String>(14)?),
        ai_updated_at: parse_datetime(&row.get::<_, String>(15)?),
        digest_date: row.get(16)?,
        related_ids: parse_json_list(&row.get::<_, String>(17)?),
        body_hydrated: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::{tempdir, TempDir};

    async fn open_store() -> (TempDir, HistoryStore) {
        let dir = tempdir().expect("Failed to create temp dir");
        let store = HistoryStore::open(dir.path().join("history.db"))
            .await
            .expect("Failed to open store");
        (dir, store)
    }

    fn article(id: &str, feed_url: &str, published: Option<DateTime<Utc>>) -> HistoryItem {
        HistoryItem {
            id: id.to_string(),
            title: format!("Title {id}"),
            body: format!("Body of {id}"),
            origin_feed_url: feed_url.to_string(),
            published_date: published,
            saved_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            body_hydrated: true,
            ..Default::default()
        }
    }

    fn digest(id: &str, title: &str) -> HistoryItem {
        HistoryItem {
            id: id.to_string(),
            title: title.to_string(),
            body: format!("{title} summary"),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn metadata_omits_article_body_and_hydrate_restores_it() {
        let (_dir, store) = open_store().await;
        store
            .upsert(vec![article("a1", "https://feed/a", None)])
            .await
            .unwrap();

        let metadata = store.load_metadata().await.unwrap();
        let listed = &metadata["a1"];
        assert!(listed.body.is_empty());
        assert!(!listed.body_hydrated);
        assert_eq!(listed.title, "Title a1");

        let full = store.load_by_id("a1").await.unwrap().expect("item exists");
        assert_eq!(full.body, "Body of a1");
        assert!(full.body_hydrated);

        assert!(store.load_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn digest_rows_are_hydrated_in_metadata() {
        let (_dir, store) = open_store().await;
        store
            .replace_digest_items_by_date(
                "2026-03-01",
                vec![digest("digest:2026-03-01:000", "Chips")],
            )
            .await
            .unwrap();

        let metadata = store.load_metadata().await.unwrap();
        let item = &metadata["digest:2026-03-01:000"];
        assert_eq!(item.kind, ItemKind::Digest);
        assert_eq!(item.body, "Chips summary");
        assert!(item.body_hydrated);
    }

    #[tokio::test]
    async fn upsert_with_empty_body_keeps_stored_content() {
        let (_dir, store) = open_store().await;
        store
            .upsert(vec![article("a1", "https://feed/a", None)])
            .await
            .unwrap();

        let mut listed = store.load_metadata().await.unwrap().remove("a1").unwrap();
        listed.title = "Renamed".to_string();
        store.upsert(vec![listed]).await.unwrap();

        let full = store.load_by_id("a1").await.unwrap().unwrap();
        assert_eq!(full.title, "Renamed");
        assert_eq!(full.body, "Body of a1");
    }

    #[tokio::test]
    async fn narrow_setters_update_fields_and_ignore_missing_ids() {
        let (_dir, store) = open_store().await;
        store
            .upsert(vec![article("a1", "https://feed/a", None)])
            .await
            .unwrap();

        let when = Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap();
        store.set_read("a1", true).await.unwrap();
        store.set_bookmark("a1", true).await.unwrap();
        store
            .set_insight(
                "a1",
                "Short take",
                &["Rust".to_string(), "rust".to_string(), "DB".to_string()],
                when,
            )
            .await
            .unwrap();

        tokio_test::assert_ok!(store.set_read("ghost", true).await);
        tokio_test::assert_ok!(store.set_bookmark("ghost", true).await);
        tokio_test::assert_ok!(store.set_insight("ghost", "x", &[], when).await);

        let item = store.load_by_id("a1").await.unwrap().unwrap();
        assert!(item.is_read);
        assert!(item.is_bookmarked);
        assert_eq!(item.ai_summary, "Short take");
        assert_eq!(item.ai_tags, vec!["Rust", "DB"]);
        assert_eq!(item.ai_updated_at, Some(when));
        assert_eq!(store.count_items().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replace_digest_upsert_keeps_other_dates_and_unsupplied_rows() {
        let (_dir, store) = open_store().await;
        store
            .replace_digest_items_by_date(
                "2026-03-01",
                vec![
                    digest("digest:2026-03-01:000", "Old A"),
                    digest("digest:2026-03-01:001", "Old B"),
                ],
            )
            .await
            .unwrap();
        store
            .replace_digest_items_by_date(
                "2026-03-02",
                vec![digest("digest:2026-03-02:000", "Other day")],
            )
            .await
            .unwrap();

        let written = store
            .replace_digest_items_by_date(
                "2026-03-01",
                vec![digest("digest:2026-03-01:000", "New A")],
            )
            .await
            .unwrap();
        assert_eq!(written[0].kind, ItemKind::Digest);
        assert_eq!(written[0].digest_date, "2026-03-01");

        let day = store.load_digest_items_by_date("2026-03-01").await.unwrap();
        let titles: Vec<_> = day.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["New A", "Old B"]);
        assert_eq!(store.load_digest_items_by_date("2026-03-02").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replace_digest_prune_only_touches_its_date() {
        let (_dir, store) = open_store().await;
        store
            .replace_digest_items_by_date(
                "2026-03-01",
                vec![
                    digest("digest:2026-03-01:000", "Old A"),
                    digest("digest:2026-03-01:001", "Old B"),
                ],
            )
            .await
            .unwrap();
        store
            .replace_digest_items_by_date(
                "2026-03-02",
                vec![digest("digest:2026-03-02:000", "Other day")],
            )
            .await
            .unwrap();
        store
            .upsert(vec![article("a1", "https://feed/a", None)])
            .await
            .unwrap();

        store
            .replace_digest_items_by_date_with(
                "2026-03-01",
                vec![digest("digest:2026-03-01:000", "New A")],
                DigestReplacePolicy::Prune,
            )
            .await
            .unwrap();

        let day = store.load_digest_items_by_date("2026-03-01").await.unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].title, "New A");
        assert_eq!(store.load_digest_items_by_date("2026-03-02").await.unwrap().len(), 1);
        assert!(store.load_by_id("a1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn today_articles_use_effective_date_in_timezone() {
        let (_dir, store) = open_store().await;
        let tz: Tz = "America/New_York".parse().unwrap();
        // 2026-03-10 in New York is 05:00Z (EDT starts 03-08) through 04:00Z next day
        let noon_today = Utc.with_ymd_and_hms(2026, 3, 10, 16, 0, 0).unwrap();
        let late_today = Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap();
        let yesterday = noon_today - Duration::days(1);
        let tomorrow = noon_today + Duration::days(1);

        let mut saved_today = article("saved-today", "https://feed/a", None);
        saved_today.saved_at = Some(Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap());

        store
            .upsert(vec![
                article("noon", "https://feed/a", Some(noon_today)),
                article("late", "https://feed/b", Some(late_today)),
                article("yesterday", "https://feed/a", Some(yesterday)),
                article("tomorrow", "https://feed/a", Some(tomorrow)),
                saved_today,
            ])
            .await
            .unwrap();
        store
            .replace_digest_items_by_date(
                "2026-03-10",
                vec![digest("digest:2026-03-10:000", "Topic")],
            )
            .await
            .unwrap();

        let items = store
            .load_today_articles("2026-03-10", &[], 10, tz)
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["late", "noon", "saved-today"]);
        assert!(items.iter().all(|i| i.body_hydrated && !i.body.is_empty()));

        let limited = store
            .load_today_articles("2026-03-10", &[], 1, tz)
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, "late");

        let only_a = store
            .load_today_articles("2026-03-10", &["https://feed/a".to_string()], 10, tz)
            .await
            .unwrap();
        let ids: Vec<_> = only_a.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["noon", "saved-today"]);
    }

    #[tokio::test]
    async fn upsert_batch_last_write_wins() {
        let (_dir, store) = open_store().await;
        let mut second = article("a1", "https://feed/a", None);
        second.title = "Second".to_string();
        let written = store
            .upsert(vec![article("a1", "https://feed/a", None), second])
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.count_items().await.unwrap(), 1);
        assert_eq!(store.load_by_id("a1").await.unwrap().unwrap().title, "Second");
    }
}
