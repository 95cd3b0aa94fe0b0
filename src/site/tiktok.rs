//! Curated TikTok showcase.

use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::db::Db;
use crate::error::{CatteryError, Result};
use crate::store::parse_timestamp;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TikTokVideo {
    pub id: String,
    pub url: String,
    pub tiktok_id: String,
    pub title: String,
    pub description: Option<String>,
    pub display_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVideo {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the end of the list
    #[serde(default)]
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub display_order: Option<i64>,
}

/// Extract the numeric video id from an https TikTok URL.
pub fn parse_tiktok_url(raw: &str) -> Result<String> {
    let invalid = || CatteryError::InvalidInput(format!("not a TikTok video URL: {}", raw));

    let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if url.scheme() != "https" {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;
    if host != "tiktok.com" && !host.ends_with(".tiktok.com") {
        return Err(invalid());
    }

    let video_regex = Regex::new(r"/video/(\d+)").expect("Invalid regex pattern");
    video_regex
        .captures(url.path())
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(invalid)
}

const VIDEO_COLUMNS: &str =
    "video_id, url, tiktok_id, title, description, display_order, is_active, created_at";

struct VideoRow {
    id: String,
    url: String,
    tiktok_id: String,
    title: String,
    description: Option<String>,
    display_order: i64,
    is_active: bool,
    created_at: String,
}

impl VideoRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            url: row.get(1)?,
            tiktok_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            display_order: row.get(5)?,
            is_active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_video(self) -> Result<TikTokVideo> {
        Ok(TikTokVideo {
            created_at: parse_timestamp(&self.created_at)?,
            id: self.id,
            url: self.url,
            tiktok_id: self.tiktok_id,
            title: self.title,
            description: self.description,
            display_order: self.display_order,
            is_active: self.is_active,
        })
    }
}

fn load_video(conn: &Connection, id: &str) -> Result<Option<TikTokVideo>> {
    conn.query_row(
        &format!("SELECT {} FROM tiktok_videos WHERE video_id = ?1", VIDEO_COLUMNS),
        params![id],
        VideoRow::from_row,
    )
    .optional()?
    .map(VideoRow::into_video)
    .transpose()
}

pub async fn add_video(db: &Db, input: NewVideo) -> Result<TikTokVideo> {
    let tiktok_id = parse_tiktok_url(&input.url)?;
    let url = input.url.trim().to_string();

    db.with_connection(move |conn| {
        let duplicate: bool = conn
            .prepare("SELECT 1 FROM tiktok_videos WHERE url = ?1")?
            .exists(params![url])?;
        if duplicate {
            return Err(CatteryError::InvalidInput(format!("video already added: {}", url)));
        }

        let display_order = match input.display_order {
            Some(order) => order,
            None => conn.query_row(
                "SELECT COALESCE(MAX(display_order) + 1, 0) FROM tiktok_videos",
                [],
                |row| row.get(0),
            )?,
        };

        let video = TikTokVideo {
            id: Uuid::new_v4().to_string(),
            url,
            tiktok_id,
            title: input.title.trim().to_string(),
            description: input.description,
            display_order,
            is_active: true,
            created_at: Utc::now(),
        };
        conn.execute(
            &format!("INSERT INTO tiktok_videos ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)", VIDEO_COLUMNS),
            params![
                video.id,
                video.url,
                video.tiktok_id,
                video.title,
                video.description,
                video.display_order,
                video.is_active,
                video.created_at.to_rfc3339()
            ],
        )?;
        log::info!("Added TikTok video {} ({})", video.tiktok_id, video.id);
        Ok(video)
    })
    .await
}

/// Videos by display order. The public site only sees active ones.
pub async fn list_videos(db: &Db, active_only: bool) -> Result<Vec<TikTokVideo>> {
    db.with_connection(move |conn| {
        let filter = if active_only { "WHERE is_active = 1" } else { "" };
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tiktok_videos {} ORDER BY display_order, created_at",
            VIDEO_COLUMNS, filter
        ))?;
        let rows = stmt
            .query_map([], VideoRow::from_row)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        rows.into_iter().map(VideoRow::into_video).collect()
    })
    .await
}

pub async fn update_video(db: &Db, id: &str, patch: VideoPatch) -> Result<TikTokVideo> {
    let id = id.to_string();
    db.with_connection(move |conn| {
        let mut video = load_video(conn, &id)?
            .ok_or_else(|| CatteryError::NotFound(format!("video {}", id)))?;

        if let Some(title) = patch.title {
            video.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            video.description = Some(description).filter(|d| !d.trim().is_empty());
        }
        if let Some(active) = patch.is_active {
            video.is_active = active;
        }
        if let Some(order) = patch.display_order {
            video.display_order = order;
        }

        conn.execute(
            "UPDATE tiktok_videos SET title = ?2, description = ?3, is_active = ?4, display_order = ?5 WHERE video_id = ?1",
            params![video.id, video.title, video.description, video.is_active, video.display_order],
        )?;
        Ok(video)
    })
    .await
}

/// Set display order to each id's position in `ordered_ids`. All or nothing.
pub async fn reorder_videos(db: &Db, ordered_ids: Vec<String>) -> Result<()> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        for (position, id) in ordered_ids.iter().enumerate() {
            let updated = tx.execute(
                "UPDATE tiktok_videos SET display_order = ?2 WHERE video_id = ?1",
                params![id, position as i64],
            )?;
            if updated == 0 {
                return Err(CatteryError::NotFound(format!("video {}", id)));
            }
        }
        tx.commit()?;
        log::debug!("Reordered {} videos", ordered_ids.len());
        Ok(())
    })
    .await
}

pub async fn delete_video(db: &Db, id: &str) -> Result<bool> {
    let id = id.to_string();
    db.with_connection(move |conn| {
        let removed = conn.execute("DELETE FROM tiktok_videos WHERE video_id = ?1", params![id])?;
        Ok(removed > 0)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::testing::migrated_db;

    fn new_video(url: &str) -> NewVideo {
        NewVideo {
            url: url.to_string(),
            title: "Playtime".to_string(),
            description: None,
            display_order: None,
        }
    }

    #[test]
    fn test_parse_tiktok_url() {
        assert_eq!(
            parse_tiktok_url("https://www.tiktok.com/@cattery/video/7234567890123456789").unwrap(),
            "7234567890123456789"
        );
        assert_eq!(
            parse_tiktok_url("https://tiktok.com/@a/video/42?is_from_webapp=1").unwrap(),
            "42"
        );
        assert!(parse_tiktok_url("http://www.tiktok.com/@a/video/42").is_err());
        assert!(parse_tiktok_url("https://example.com/video/42").is_err());
        assert!(parse_tiktok_url("https://nottiktok.com/video/42").is_err());
        assert!(parse_tiktok_url("https://www.tiktok.com/@cattery").is_err());
        assert!(parse_tiktok_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_add_list_and_reorder() {
        let (db, _temp) = migrated_db().await;
        let first = add_video(&db, new_video("https://www.tiktok.com/@c/video/1")).await.unwrap();
        let second = add_video(&db, new_video("https://www.tiktok.com/@c/video/2")).await.unwrap();
        assert_eq!(first.display_order, 0);
        assert_eq!(second.display_order, 1);

        assert!(add_video(&db, new_video("https://www.tiktok.com/@c/video/1")).await.is_err());

        reorder_videos(&db, vec![second.id.clone(), first.id.clone()]).await.unwrap();
        let ids: Vec<String> = list_videos(&db, false).await.unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        assert!(matches!(
            reorder_videos(&db, vec![first.id.clone(), "missing".to_string()]).await,
            Err(CatteryError::NotFound(_))
        ));
        // Failed reorder rolled back
        let ids: Vec<String> = list_videos(&db, false).await.unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_public_list_hides_inactive() {
        let (db, _temp) = migrated_db().await;
        let video = add_video(&db, new_video("https://www.tiktok.com/@c/video/9")).await.unwrap();

        let patch = VideoPatch {
            is_active: Some(false),
            title: Some(" Nap ".to_string()),
            ..VideoPatch::default()
        };
        let updated = update_video(&db, &video.id, patch).await.unwrap();
        assert_eq!(updated.title, "Nap");
        assert!(list_videos(&db, true).await.unwrap().is_empty());
        assert_eq!(list_videos(&db, false).await.unwrap().len(), 1);

        assert!(delete_video(&db, &video.id).await.unwrap());
        assert!(matches!(
            update_video(&db, &video.id, VideoPatch::default()).await,
            Err(CatteryError::NotFound(_))
        ));
    }
}
