//! SQLite track store.
//!
//! Durable index of scanned tracks. Every mutation is a single-statement
//! transaction, so a crash between writes never corrupts previously
//! committed rows, and a selector query running concurrently with a scan
//! sees whole records only. The connection sits behind a mutex; the
//! scanner takes it per record, never for a whole scan.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, params_from_iter, types::Value, Connection, OptionalExtension, Row};

use crate::track::{Filter, NewTrack, Order, Track, TrackId};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tracks (
    id       INTEGER PRIMARY KEY,
    path     TEXT    NOT NULL UNIQUE,
    title    TEXT    NOT NULL,
    artist   TEXT,
    album    TEXT,
    genre    TEXT,
    year     INTEGER,
    track_no INTEGER,
    duration INTEGER,
    format   TEXT,
    mtime    INTEGER,
    valid    INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_tracks_artist ON tracks(artist);
CREATE INDEX IF NOT EXISTS idx_tracks_title  ON tracks(title);
CREATE INDEX IF NOT EXISTS idx_tracks_genre  ON tracks(genre);
CREATE INDEX IF NOT EXISTS idx_tracks_year   ON tracks(year);
";

const TRACK_COLUMNS: &str =
    "id, path, title, artist, album, genre, year, track_no, duration, format, mtime, valid";

/// Durable track index over a SQLite database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at `path`, installing the schema if the
    /// database is new.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open track database {}", path.display()))?;
        conn.execute_batch(SCHEMA)
            .context("failed to initialize track store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and benchmarks.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(SCHEMA)
            .context("failed to initialize track store schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new track or refresh the row sharing its path. The row id
    /// is preserved on conflict, so track identity is stable across
    /// rescans. Upserted rows are always valid again.
    pub fn upsert(&self, track: &NewTrack) -> Result<Track> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO tracks (path, title, artist, album, genre, year, track_no, duration, format, mtime, valid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1)
             ON CONFLICT(path) DO UPDATE SET
                 title = excluded.title,
                 artist = excluded.artist,
                 album = excluded.album,
                 genre = excluded.genre,
                 year = excluded.year,
                 track_no = excluded.track_no,
                 duration = excluded.duration,
                 format = excluded.format,
                 mtime = excluded.mtime,
                 valid = 1",
            params![
                path_text(&track.path),
                track.title,
                track.artist,
                track.album,
                track.genre,
                track.year,
                track.track_no,
                track.duration_secs,
                track.format,
                track.mtime_secs,
            ],
        )
        .with_context(|| format!("failed to upsert track {}", track.path.display()))?;

        let stored = conn
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE path = ?1"),
                params![path_text(&track.path)],
                row_to_track,
            )
            .with_context(|| format!("failed to read back track {}", track.path.display()))?;
        debug!("upserted track #{} {}", stored.id, stored.path.display());
        Ok(stored)
    }

    /// Delete a row outright. Returns whether anything was removed.
    /// Prefer [`Store::mark_invalid`] for files that merely went missing.
    pub fn remove(&self, id: TrackId) -> Result<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM tracks WHERE id = ?1", params![id])
            .with_context(|| format!("failed to remove track #{id}"))?;
        Ok(changed > 0)
    }

    /// Soft-delete: the row survives (play history may still reference
    /// it) but stops matching queries and random selection.
    pub fn mark_invalid(&self, id: TrackId) -> Result<()> {
        self.lock()
            .execute("UPDATE tracks SET valid = 0 WHERE id = ?1", params![id])
            .with_context(|| format!("failed to mark track #{id} invalid"))?;
        Ok(())
    }

    /// Point lookup by id. Invalid rows are returned too; callers that
    /// care check `valid` themselves.
    pub fn get(&self, id: TrackId) -> Result<Option<Track>> {
        self.lock()
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE id = ?1"),
                params![id],
                row_to_track,
            )
            .optional()
            .with_context(|| format!("failed to look up track #{id}"))
    }

    pub fn get_by_path(&self, path: &Path) -> Result<Option<Track>> {
        self.lock()
            .query_row(
                &format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE path = ?1"),
                params![path_text(path)],
                row_to_track,
            )
            .optional()
            .with_context(|| format!("failed to look up track {}", path.display()))
    }

    /// Conjunctive filtered scan. An empty result is an empty vector,
    /// never an error.
    pub fn find(&self, filter: &Filter) -> Result<Vec<Track>> {
        let mut sql = format!("SELECT {TRACK_COLUMNS} FROM tracks WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();

        if !filter.include_invalid {
            sql.push_str(" AND valid = 1");
        }
        if let Some(artist) = &filter.artist_like {
            sql.push_str(" AND artist LIKE ?");
            args.push(Value::from(format!("%{artist}%")));
        }
        if let Some(artist) = &filter.artist_exact {
            sql.push_str(" AND artist = ? COLLATE NOCASE");
            args.push(Value::from(artist.clone()));
        }
        if let Some(title) = &filter.title_like {
            sql.push_str(" AND title LIKE ?");
            args.push(Value::from(format!("%{title}%")));
        }
        if let Some(title) = &filter.title_exact {
            sql.push_str(" AND title = ? COLLATE NOCASE");
            args.push(Value::from(title.clone()));
        }
        if let Some(album) = &filter.album_like {
            sql.push_str(" AND album LIKE ?");
            args.push(Value::from(format!("%{album}%")));
        }
        if let Some(genre) = &filter.genre {
            sql.push_str(" AND genre = ? COLLATE NOCASE");
            args.push(Value::from(genre.clone()));
        }
        if let Some((from, to)) = filter.years {
            sql.push_str(" AND year BETWEEN ? AND ?");
            args.push(Value::from(i64::from(from)));
            args.push(Value::from(i64::from(to)));
        }

        sql.push_str(match filter.order {
            Order::Album => {
                " ORDER BY album IS NULL, album, track_no IS NULL, track_no, title COLLATE NOCASE"
            }
            Order::Title => " ORDER BY title COLLATE NOCASE, id",
        });

        let conn = self.lock();
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("invalid track query: {sql}"))?;
        let rows = stmt
            .query_map(params_from_iter(args), row_to_track)
            .context("failed to query tracks")?;

        let mut tracks = Vec::new();
        for row in rows {
            tracks.push(row.context("failed to decode track row")?);
        }
        Ok(tracks)
    }

    /// Distinct artists among valid tracks, sorted case-insensitively.
    pub fn artists(&self) -> Result<Vec<String>> {
        self.distinct_column("artist")
    }

    /// Distinct genres among valid tracks, sorted case-insensitively.
    pub fn genres(&self) -> Result<Vec<String>> {
        self.distinct_column("genre")
    }

    fn distinct_column(&self, column: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM tracks
             WHERE valid = 1 AND {column} IS NOT NULL AND {column} != ''
             ORDER BY {column} COLLATE NOCASE"
        );
        let conn = self.lock();
        let mut stmt = conn.prepare(&sql).context("invalid listing query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .with_context(|| format!("failed to list distinct {column} values"))?;

        let mut values = Vec::new();
        for row in rows {
            values.push(row.context("failed to decode listing row")?);
        }
        Ok(values)
    }

    /// Number of valid tracks in the catalog.
    pub fn valid_count(&self) -> Result<u64> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM tracks WHERE valid = 1", [], |row| {
                row.get(0)
            })
            .context("failed to count tracks")?;
        Ok(count as u64)
    }

    /// Everything the scanner needs for reconciliation: each indexed path
    /// with its id, recorded mtime and validity.
    pub fn index_snapshot(&self) -> Result<Vec<(TrackId, PathBuf, Option<i64>, bool)>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, path, mtime, valid FROM tracks")
            .context("invalid index snapshot query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, TrackId>(0)?,
                    PathBuf::from(row.get::<_, String>(1)?),
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, i64>(3)? != 0,
                ))
            })
            .context("failed to snapshot the track index")?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.context("failed to decode index row")?);
        }
        Ok(entries)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned store mutex means another thread panicked mid-query;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn row_to_track(row: &Row<'_>) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        title: row.get(2)?,
        artist: row.get(3)?,
        album: row.get(4)?,
        genre: row.get(5)?,
        year: row.get(6)?,
        track_no: row.get(7)?,
        duration_secs: row.get(8)?,
        format: row.get(9)?,
        mtime_secs: row.get(10)?,
        valid: row.get::<_, i64>(11)? != 0,
    })
}
