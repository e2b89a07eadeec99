//! Persistent storage using SQLite (rusqlite)
//!
//! This module provides:
//! - OS-standard data directory location (via `directories` crate)
//! - SQLite database with schema versioning
//! - Player, stats and match tables
//! - Transactions for the settlement engine
//!
//! Row-level reads and writes live in `queries` and take a plain `&Connection`,
//! so the same code runs on the storage connection or inside a transaction.

pub mod queries;

use crate::error::{Result, SettlementError, StorageError};
use crate::game::record::Match;
use crate::game::Participant;
use crate::stats::{Stats, MAX_INITIAL_RATING, MIN_INITIAL_RATING};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current schema version. Bump this and add a migration when the schema changes.
const SCHEMA_VERSION: u32 = 1;

/// Database file name inside the data directory.
pub const DATABASE_FILE: &str = "raceledger.db";

/// A registered player with current stats.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub stats: Stats,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub rating: f64,
    pub games_played: i64,
    pub wins: i64,
}

/// The storage handle.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database in the OS-standard data directory.
    ///
    /// - Linux: `$XDG_DATA_HOME/raceledger/` or `~/.local/share/raceledger/`
    /// - macOS: `~/Library/Application Support/raceledger/`
    pub fn open_default() -> Result<Self, StorageError> {
        let data_dir = Self::data_dir()?;
        Self::open(&data_dir.join(DATABASE_FILE))
    }

    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StorageError::CreateDirFailed)?;
            }
        }

        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened database");
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let storage = Storage { conn };
        storage.initialize_schema()?;
        Ok(storage)
    }

    /// Get the OS-standard data directory.
    pub fn data_dir() -> Result<PathBuf, StorageError> {
        ProjectDirs::from("", "", "raceledger")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StorageError::NoDataDirectory)
    }

    /// Begin a transaction. Dropping it without `commit` rolls back.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Onboard a player with a starting rating.
    ///
    /// The rating must lie in the onboarding range and the id must be new.
    /// Bot ids cannot be registered.
    pub fn register_player(&mut self, id: &str, name: &str, initial_rating: f64) -> Result<Player> {
        if id.trim().is_empty() {
            return Err(SettlementError::validation("player id must not be empty"));
        }
        if Participant::from_id(id).is_bot() {
            return Err(SettlementError::validation(format!(
                "{} is a bot id and cannot be registered",
                id
            )));
        }
        if !(MIN_INITIAL_RATING..=MAX_INITIAL_RATING).contains(&initial_rating) {
            return Err(SettlementError::Forbidden(format!(
                "initial rating {} outside {}..={}",
                initial_rating, MIN_INITIAL_RATING, MAX_INITIAL_RATING
            )));
        }

        let tx = self.conn.transaction()?;
        if queries::find_player(&tx, id)?.is_some() {
            return Err(SettlementError::Forbidden(format!(
                "player {} already exists",
                id
            )));
        }
        let created_at = now();
        let stats = Stats::new(initial_rating);
        queries::insert_player(&tx, id, name, created_at, &stats)?;
        tx.commit()?;

        debug!(player = id, rating = initial_rating, "registered player");
        Ok(Player {
            id: id.to_string(),
            name: name.to_string(),
            created_at,
            stats,
        })
    }

    pub fn player(&self, id: &str) -> Result<Player> {
        queries::find_player(&self.conn, id)?.ok_or_else(|| SettlementError::player_not_found(id))
    }

    pub fn stats(&self, id: &str) -> Result<Stats> {
        queries::load_stats(&self.conn, id)?.ok_or_else(|| SettlementError::player_not_found(id))
    }

    /// Administrative rating override. Watermarks widen to include the new rating.
    pub fn set_rating(&mut self, id: &str, rating: f64) -> Result<Stats> {
        let tx = self.conn.transaction()?;
        let mut stats =
            queries::load_stats(&tx, id)?.ok_or_else(|| SettlementError::player_not_found(id))?;
        stats.rating = rating;
        stats.max_rating = stats.max_rating.max(rating);
        stats.min_rating = stats.min_rating.min(rating);
        queries::save_stats(&tx, id, &stats)?;
        tx.commit()?;
        info!(player = id, rating, "rating set by administrator");
        Ok(stats)
    }

    /// Players ordered by rating, highest first.
    pub fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>> {
        queries::leaderboard(&self.conn, limit)
    }

    pub fn find_match(&self, id: &str) -> Result<Option<Match>> {
        queries::load_match(&self.conn, id)
    }

    /// Most recent matches first.
    pub fn list_matches(&self, limit: u32) -> Result<Vec<Match>> {
        let ids = queries::recent_match_ids(&self.conn, limit)?;
        self.load_all(&ids)
    }

    /// Matches a player took part in, most recent first.
    pub fn player_history(&self, player_id: &str, limit: u32) -> Result<Vec<Match>> {
        let ids = queries::player_match_ids(&self.conn, player_id, limit)?;
        self.load_all(&ids)
    }

    pub fn match_count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count)
    }

    fn load_all(&self, ids: &[String]) -> Result<Vec<Match>> {
        let mut matches = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(m) = queries::load_match(&self.conn, id)? {
                matches.push(m);
            }
        }
        Ok(matches)
    }

    // Private helper methods

    fn initialize_schema(&self) -> Result<(), StorageError> {
        let current_version = self.get_schema_version()?;

        if current_version == 0 {
            // Fresh database, create schema
            self.create_schema()?;
        } else if current_version > SCHEMA_VERSION {
            return Err(StorageError::FutureSchemaVersion {
                found: current_version,
                supported: SCHEMA_VERSION,
            });
        }

        Ok(())
    }

    fn get_schema_version(&self) -> Result<u32, StorageError> {
        let table_exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='meta'",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        let version: u32 = self
            .conn
            .query_row("SELECT schema_version FROM meta LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        Ok(version)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            r#"
            -- Meta table: stores schema version
            CREATE TABLE meta (
                schema_version INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE players (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- One row per real player; bots never get one
            CREATE TABLE player_stats (
                player_id TEXT PRIMARY KEY REFERENCES players (id),
                rating REAL NOT NULL,
                max_rating REAL NOT NULL,
                min_rating REAL NOT NULL,
                games_played INTEGER NOT NULL DEFAULT 0,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                draws INTEGER NOT NULL DEFAULT 0,
                total_score INTEGER NOT NULL DEFAULT 0,
                total_divisions INTEGER NOT NULL DEFAULT 0,
                wins_divisions INTEGER NOT NULL DEFAULT 0,
                losses_divisions INTEGER NOT NULL DEFAULT 0,
                draws_divisions INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_player_stats_rating ON player_stats (rating);

            CREATE TABLE matches (
                id TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                creator_id TEXT NOT NULL,
                is_rated INTEGER NOT NULL,
                total_score TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- Index for chronological ordering
            CREATE INDEX idx_matches_created ON matches (created_at);

            -- Damage and division maps are JSON text
            CREATE TABLE match_players (
                match_id TEXT NOT NULL REFERENCES matches (id),
                user_id TEXT NOT NULL,
                team INTEGER NOT NULL,
                position INTEGER NOT NULL,
                has_left INTEGER NOT NULL,
                score INTEGER NOT NULL,
                result TEXT NOT NULL,
                rating_change REAL NOT NULL,
                damage_dealt TEXT NOT NULL,
                damage_received TEXT NOT NULL,
                total_damage_dealt INTEGER NOT NULL,
                total_damage_received INTEGER NOT NULL,
                money_taken INTEGER NOT NULL,
                armor_taken INTEGER NOT NULL,
                mines_damage INTEGER NOT NULL,
                wipeouts INTEGER NOT NULL,
                divisions TEXT NOT NULL,
                max_rating_before REAL,
                min_rating_before REAL,
                PRIMARY KEY (match_id, position)
            );

            CREATE INDEX idx_match_players_user ON match_players (user_id);
            "#,
        )?;

        self.conn.execute(
            "INSERT INTO meta (schema_version, created_at) VALUES (?1, ?2)",
            params![SCHEMA_VERSION, now().timestamp_millis()],
        )?;

        Ok(())
    }
}

/// Current time truncated to the millisecond precision stored in the database.
pub fn now() -> DateTime<Utc> {
    let millis = Utc::now().timestamp_millis();
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default()
}
