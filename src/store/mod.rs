// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod entity;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::error::StoreError;

pub use entity::EpisodeEntity;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS episode (
    eid INTEGER PRIMARY KEY AUTOINCREMENT,
    episode_guid TEXT NOT NULL UNIQUE,
    episode_title TEXT NOT NULL,
    episode_description TEXT NOT NULL DEFAULT '',
    episode_publication_date TEXT,
    episode_publication_timestamp INTEGER,
    episode_remote_audio_location TEXT,
    episode_audio_mime_type TEXT,
    episode_local_audio_location TEXT,
    episode_content_hash TEXT,
    podcast_name TEXT NOT NULL,
    podcast_cover TEXT,
    podcast_feed_location TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episode_feed ON episode(podcast_feed_location);
"#;

/// Columns added after the first release, with their types
const ADDED_COLUMNS: &[(&str, &str)] = &[
    ("episode_publication_timestamp", "INTEGER"),
    ("episode_content_hash", "TEXT"),
];

/// Dates keep their original offset as text; sorting uses the UTC timestamp
const BACKFILL_TIMESTAMPS: &str = "UPDATE episode \
     SET episode_publication_timestamp = CAST(strftime('%s', episode_publication_date) AS INTEGER) \
     WHERE episode_publication_timestamp IS NULL AND episode_publication_date IS NOT NULL";

const CREATE_PUBLISHED_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_episode_published_at \
     ON episode(episode_publication_timestamp DESC)";

const SELECT_EPISODE: &str = "SELECT eid, episode_guid, episode_title, episode_description, \
     episode_publication_date, episode_remote_audio_location, episode_audio_mime_type, \
     episode_local_audio_location, episode_content_hash, podcast_name, podcast_cover, \
     podcast_feed_location \
     FROM episode";

const NEWEST_FIRST: &str = "ORDER BY episode_publication_timestamp DESC, eid";

const INSERT_EPISODE: &str = "INSERT OR REPLACE INTO episode (eid, episode_guid, episode_title, \
     episode_description, episode_publication_date, episode_publication_timestamp, \
     episode_remote_audio_location, episode_audio_mime_type, episode_local_audio_location, \
     episode_content_hash, podcast_name, podcast_cover, podcast_feed_location) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

/// Query surface over the local `episode` table
pub struct EpisodeStore {
    conn: Mutex<Connection>,
}

impl EpisodeStore {
    /// Open (or create) the episode database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let open_failed = |e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source: e,
        };

        let conn = Connection::open(path).map_err(open_failed)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
        ",
        )
        .map_err(open_failed)?;

        Self::with_connection(conn)
    }

    /// An in-memory database, gone when the store is dropped
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;

        // Databases created before a column existed get it added; the
        // statement fails harmlessly when it is already there
        for (column, column_type) in ADDED_COLUMNS {
            let _ = conn.execute(
                &format!("ALTER TABLE episode ADD COLUMN {column} {column_type}"),
                [],
            );
        }
        conn.execute(BACKFILL_TIMESTAMPS, [])?;
        conn.execute(CREATE_PUBLISHED_INDEX, [])?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// All episodes, newest first
    pub fn get_all(&self) -> Result<Vec<EpisodeEntity>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_EPISODE} {NEWEST_FIRST}"
        ))?;
        let rows = stmt.query_map([], EpisodeEntity::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn load_all_by_ids(&self, eids: &[i64]) -> Result<Vec<EpisodeEntity>, StoreError> {
        if eids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; eids.len()].join(", ");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_EPISODE} WHERE eid IN ({placeholders}) ORDER BY eid"
        ))?;
        let rows = stmt.query_map(params_from_iter(eids.iter()), EpisodeEntity::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// First episode whose title matches a SQL `LIKE` pattern
    pub fn find_by_title(&self, title: &str) -> Result<Option<EpisodeEntity>, StoreError> {
        let conn = self.conn()?;
        let entity = conn
            .query_row(
                &format!("{SELECT_EPISODE} WHERE episode_title LIKE ?1 LIMIT 1"),
                params![title],
                EpisodeEntity::from_row,
            )
            .optional()?;
        Ok(entity)
    }

    pub fn find_by_guid(&self, guid: &str) -> Result<Option<EpisodeEntity>, StoreError> {
        let conn = self.conn()?;
        let entity = conn
            .query_row(
                &format!("{SELECT_EPISODE} WHERE episode_guid IS ?1 LIMIT 1"),
                params![guid],
                EpisodeEntity::from_row,
            )
            .optional()?;
        Ok(entity)
    }

    /// Episodes of one podcast, newest first
    pub fn find_by_podcast(&self, feed_location: &str) -> Result<Vec<EpisodeEntity>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_EPISODE} WHERE podcast_feed_location = ?1 {NEWEST_FIRST}"
        ))?;
        let rows = stmt.query_map(params![feed_location], EpisodeEntity::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Insert an episode, replacing any row with the same id or GUID.
    /// Returns the row id.
    pub fn insert(&self, episode: &EpisodeEntity) -> Result<i64, StoreError> {
        let conn = self.conn()?;
        insert_row(&conn, episode)
    }

    /// Insert several episodes in one transaction
    pub fn insert_all(&self, episodes: &[EpisodeEntity]) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut eids = Vec::with_capacity(episodes.len());
        for episode in episodes {
            eids.push(insert_row(&tx, episode)?);
        }
        tx.commit()?;

        debug!(count = eids.len(), "stored episodes");
        Ok(eids)
    }

    /// Update the row with the episode's id. Returns the number of rows changed.
    pub fn update(&self, episode: &EpisodeEntity) -> Result<usize, StoreError> {
        let Some(eid) = episode.eid else {
            return Ok(0);
        };

        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE episode SET episode_guid = ?2, episode_title = ?3, episode_description = ?4, \
             episode_publication_date = ?5, episode_publication_timestamp = ?6, \
             episode_remote_audio_location = ?7, episode_audio_mime_type = ?8, \
             episode_local_audio_location = ?9, episode_content_hash = ?10, \
             podcast_name = ?11, podcast_cover = ?12, podcast_feed_location = ?13 \
             WHERE eid = ?1",
            params![
                eid,
                episode.guid,
                episode.title,
                episode.description,
                episode.publication_date.map(|d| d.to_rfc3339()),
                episode.publication_date.map(|d| d.timestamp()),
                episode.remote_audio_file_location,
                episode.audio_mime_type,
                episode.local_audio_file_location,
                episode.content_hash,
                episode.podcast_name,
                episode.cover,
                episode.podcast_feed_location,
            ],
        )?;
        Ok(changed)
    }

    /// Delete the row with the episode's id. Returns the number of rows removed.
    pub fn delete(&self, episode: &EpisodeEntity) -> Result<usize, StoreError> {
        let Some(eid) = episode.eid else {
            return Ok(0);
        };

        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM episode WHERE eid = ?1", params![eid])?)
    }

    /// Delete every episode of a podcast
    pub fn delete_by_podcast(&self, feed_location: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM episode WHERE podcast_feed_location = ?1",
            params![feed_location],
        )?)
    }

    /// Swap a podcast's rows for a new set in one transaction
    pub fn replace_podcast_episodes(
        &self,
        feed_location: &str,
        episodes: &[EpisodeEntity],
    ) -> Result<Vec<i64>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM episode WHERE podcast_feed_location = ?1",
            params![feed_location],
        )?;
        let mut eids = Vec::with_capacity(episodes.len());
        for episode in episodes {
            eids.push(insert_row(&tx, episode)?);
        }
        tx.commit()?;
        Ok(eids)
    }

    /// Record where an episode's audio was saved. Without a content hash
    /// the stored one is kept.
    pub fn set_local_audio_location(
        &self,
        guid: &str,
        location: &str,
        content_hash: Option<&str>,
    ) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "UPDATE episode SET episode_local_audio_location = ?2, \
             episode_content_hash = COALESCE(?3, episode_content_hash) \
             WHERE episode_guid = ?1",
            params![guid, location, content_hash],
        )?)
    }
}

fn insert_row(conn: &Connection, episode: &EpisodeEntity) -> Result<i64, StoreError> {
    conn.execute(
        INSERT_EPISODE,
        params![
            episode.eid,
            episode.guid,
            episode.title,
            episode.description,
            episode.publication_date.map(|d| d.to_rfc3339()),
            episode.publication_date.map(|d| d.timestamp()),
            episode.remote_audio_file_location,
            episode.audio_mime_type,
            episode.local_audio_file_location,
            episode.content_hash,
            episode.podcast_name,
            episode.cover,
            episode.podcast_feed_location,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
