//! SQLite episode store access

use crate::data::episode::{Episode, EpisodeExport};
use crate::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;

/// Read access to the `fishing_episodes` table
pub struct EpisodeStore {
    conn: Connection,
}

impl EpisodeStore {
    /// Open an existing store without write access
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(EpisodeStore { conn })
    }

    /// Create an in-memory store with the episode schema (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = EpisodeStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS fishing_episodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                location_lat REAL NOT NULL,
                location_lon REAL NOT NULL,
                location_name TEXT,
                weather_json TEXT NOT NULL,
                pesca_score_final REAL,
                pesca_score_predicted REAL,
                user_action TEXT,
                user_feedback INTEGER,
                outcome TEXT,
                embedding_id TEXT,
                model_version TEXT DEFAULT '1.0'
            );

            CREATE INDEX IF NOT EXISTS idx_created_at ON fishing_episodes(created_at);
            CREATE INDEX IF NOT EXISTS idx_feedback ON fishing_episodes(user_feedback);
            "#,
        )?;
        Ok(())
    }

    /// Episodes carrying user feedback, newest first
    pub fn episodes_with_feedback(&self) -> Result<Vec<Episode>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, weather_json, location_lat, location_lon, created_at, \
             pesca_score_final, user_feedback \
             FROM fishing_episodes \
             WHERE user_feedback IS NOT NULL \
             ORDER BY created_at DESC",
        )?;

        let episodes = stmt
            .query_map([], episode_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(episodes)
    }

    /// Build the training document from every episode with feedback
    pub fn export_with_feedback(&self) -> Result<EpisodeExport> {
        let episodes = self.episodes_with_feedback()?;
        log::info!("Exported {} episodes for training", episodes.len());
        Ok(EpisodeExport {
            count: Some(episodes.len()),
            episodes,
            exported_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        })
    }

    /// Total number of rows, with and without feedback
    pub fn count_episodes(&self) -> Result<(usize, usize)> {
        let (total, with_feedback): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COUNT(user_feedback) FROM fishing_episodes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok((total as usize, with_feedback as usize))
    }
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    Ok(Episode {
        id: row.get(0)?,
        weather_json: row.get(1)?,
        location_lat: row.get(2)?,
        location_lon: row.get(3)?,
        created_at: row.get(4)?,
        pesca_score_final: row.get(5)?,
        user_feedback: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn insert(store: &EpisodeStore, created_at: i64, feedback: Option<i64>) {
        store
            .conn
            .execute(
                "INSERT INTO fishing_episodes \
                 (session_id, created_at, location_lat, location_lon, weather_json, \
                  pesca_score_final, user_feedback) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    "session",
                    created_at,
                    44.4,
                    8.9,
                    r#"{"temp": 18}"#,
                    6.5,
                    feedback
                ],
            )
            .unwrap();
    }

    #[test]
    fn test_empty_store() {
        let store = EpisodeStore::in_memory().unwrap();
        let export = store.export_with_feedback().unwrap();
        assert!(export.is_empty());
        assert_eq!(export.count, Some(0));
        assert!(export.exported_at.is_some());
    }

    #[test]
    fn test_export_only_feedback_newest_first() {
        let store = EpisodeStore::in_memory().unwrap();
        insert(&store, 1_000, Some(3));
        insert(&store, 3_000, None);
        insert(&store, 2_000, Some(5));

        let export = store.export_with_feedback().unwrap();
        assert_eq!(export.count, Some(2));
        let times: Vec<i64> = export.episodes.iter().map(|e| e.created_at.unwrap()).collect();
        assert_eq!(times, vec![2_000, 1_000]);
        assert_eq!(export.episodes[0].user_feedback, Some(5.0));
        assert_eq!(export.episodes[0].weather_json.as_deref(), Some(r#"{"temp": 18}"#));

        assert_eq!(store.count_episodes().unwrap(), (3, 2));
    }

    #[test]
    fn test_exported_document_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("training_data.json");

        let store = EpisodeStore::in_memory().unwrap();
        insert(&store, 1_718_429_400_000, Some(4));
        store.export_with_feedback().unwrap().save(&path).unwrap();

        let reloaded = EpisodeExport::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.episodes[0].pesca_score_final, Some(6.5));
    }
}
