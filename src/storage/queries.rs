//! Row-level reads and writes.
//!
//! Every function takes a `&Connection`; pass a `&Transaction` to run it as
//! part of a settlement.

use super::{LeaderboardEntry, Player};
use crate::error::{Result, SettlementError};
use crate::game::record::{Match, MatchPlayer, Watermarks};
use crate::game::{GameMode, Outcome, Participant};
use crate::stats::Stats;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

const STATS_COLUMNS: &str = "rating, max_rating, min_rating, games_played, wins, losses, draws, \
     total_score, total_divisions, wins_divisions, losses_divisions, draws_divisions";

pub fn insert_player(
    conn: &Connection,
    id: &str,
    name: &str,
    created_at: DateTime<Utc>,
    stats: &Stats,
) -> Result<()> {
    conn.execute(
        "INSERT INTO players (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![id, name, created_at.timestamp_millis()],
    )?;
    conn.execute(
        &format!(
            "INSERT INTO player_stats (player_id, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            STATS_COLUMNS
        ),
        params![
            id,
            stats.rating,
            stats.max_rating,
            stats.min_rating,
            stats.games_played,
            stats.wins,
            stats.losses,
            stats.draws,
            stats.total_score,
            stats.total_divisions,
            stats.wins_divisions,
            stats.losses_divisions,
            stats.draws_divisions
        ],
    )?;
    Ok(())
}

pub fn find_player(conn: &Connection, id: &str) -> Result<Option<Player>> {
    let row = conn
        .query_row(
            "SELECT id, name, created_at FROM players WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((id, name, created_at)) = row else {
        return Ok(None);
    };
    let stats = load_stats(conn, &id)?.ok_or_else(|| {
        SettlementError::Integrity(format!("player {} has no stats row", id))
    })?;

    Ok(Some(Player {
        id,
        name,
        created_at: timestamp(created_at)?,
        stats,
    }))
}

pub fn load_stats(conn: &Connection, id: &str) -> Result<Option<Stats>> {
    let stats = conn
        .query_row(
            &format!("SELECT {} FROM player_stats WHERE player_id = ?1", STATS_COLUMNS),
            params![id],
            stats_from_row,
        )
        .optional()?;
    Ok(stats)
}

/// Overwrite a stats row. A missing row is an integrity error.
pub fn save_stats(conn: &Connection, id: &str, stats: &Stats) -> Result<()> {
    let updated = conn.execute(
        "UPDATE player_stats SET rating = ?2, max_rating = ?3, min_rating = ?4, games_played = ?5,
             wins = ?6, losses = ?7, draws = ?8, total_score = ?9, total_divisions = ?10,
             wins_divisions = ?11, losses_divisions = ?12, draws_divisions = ?13
         WHERE player_id = ?1",
        params![
            id,
            stats.rating,
            stats.max_rating,
            stats.min_rating,
            stats.games_played,
            stats.wins,
            stats.losses,
            stats.draws,
            stats.total_score,
            stats.total_divisions,
            stats.wins_divisions,
            stats.losses_divisions,
            stats.draws_divisions
        ],
    )?;
    if updated == 0 {
        return Err(SettlementError::Integrity(format!(
            "player {} has no stats row",
            id
        )));
    }
    Ok(())
}

pub fn leaderboard(conn: &Connection, limit: u32) -> Result<Vec<LeaderboardEntry>> {
    let mut stmt = conn.prepare(
        "SELECT p.id, p.name, s.rating, s.games_played, s.wins
         FROM players p JOIN player_stats s ON s.player_id = p.id
         ORDER BY s.rating DESC, p.id
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(LeaderboardEntry {
            id: row.get(0)?,
            name: row.get(1)?,
            rating: row.get(2)?,
            games_played: row.get(3)?,
            wins: row.get(4)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// Insert a match and all its participation rows.
pub fn insert_match(conn: &Connection, m: &Match) -> Result<()> {
    conn.execute(
        "INSERT INTO matches (id, mode, creator_id, is_rated, total_score, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            m.id,
            m.mode.as_str(),
            m.creator_id,
            m.is_rated,
            m.total_score,
            m.created_at.timestamp_millis()
        ],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO match_players (
             match_id, user_id, team, position, has_left, score, result, rating_change,
             damage_dealt, damage_received, total_damage_dealt, total_damage_received,
             money_taken, armor_taken, mines_damage, wipeouts, divisions,
             max_rating_before, min_rating_before
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
    )?;
    for p in &m.players {
        stmt.execute(params![
            m.id,
            p.user_id.id(),
            p.team,
            p.position,
            p.has_left,
            p.score,
            p.result.as_str(),
            p.rating_change,
            to_json(&p.damage_dealt)?,
            to_json(&p.damage_received)?,
            p.total_damage_dealt,
            p.total_damage_received,
            p.money_taken,
            p.armor_taken,
            p.mines_damage,
            p.wipeouts,
            to_json(&p.divisions)?,
            p.watermarks_before.map(|w| w.max_rating),
            p.watermarks_before.map(|w| w.min_rating)
        ])?;
    }
    Ok(())
}

/// Delete a match and its participation rows. Returns false if it did not exist.
pub fn delete_match(conn: &Connection, id: &str) -> Result<bool> {
    conn.execute("DELETE FROM match_players WHERE match_id = ?1", params![id])?;
    let deleted = conn.execute("DELETE FROM matches WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn load_match(conn: &Connection, id: &str) -> Result<Option<Match>> {
    let header = conn
        .query_row(
            "SELECT id, mode, creator_id, is_rated, total_score, created_at FROM matches WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, mode, creator_id, is_rated, total_score, created_at)) = header else {
        return Ok(None);
    };
    let mode: GameMode = mode
        .parse()
        .map_err(|_| SettlementError::Integrity(format!("match {} has unknown mode {}", id, mode)))?;

    Ok(Some(Match {
        players: load_match_players(conn, &id)?,
        id,
        mode,
        creator_id,
        is_rated,
        total_score,
        created_at: timestamp(created_at)?,
    }))
}

pub fn recent_match_ids(conn: &Connection, limit: u32) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT id FROM matches ORDER BY created_at DESC, id LIMIT ?1")?;
    let rows = stmt.query_map(params![limit], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

pub fn player_match_ids(conn: &Connection, player_id: &str, limit: u32) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT m.id FROM matches m JOIN match_players mp ON mp.match_id = m.id
         WHERE mp.user_id = ?1
         ORDER BY m.created_at DESC, m.id
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![player_id, limit], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

/// Raw participation row before JSON columns are decoded.
struct RawMatchPlayer {
    user_id: String,
    team: u32,
    position: u32,
    has_left: bool,
    score: i64,
    result: String,
    rating_change: f64,
    damage_dealt: String,
    damage_received: String,
    total_damage_dealt: i64,
    total_damage_received: i64,
    money_taken: i64,
    armor_taken: i64,
    mines_damage: i64,
    wipeouts: i64,
    divisions: String,
    max_rating_before: Option<f64>,
    min_rating_before: Option<f64>,
}

fn load_match_players(conn: &Connection, match_id: &str) -> Result<Vec<MatchPlayer>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, team, position, has_left, score, result, rating_change,
                damage_dealt, damage_received, total_damage_dealt, total_damage_received,
                money_taken, armor_taken, mines_damage, wipeouts, divisions,
                max_rating_before, min_rating_before
         FROM match_players WHERE match_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![match_id], |row| {
        Ok(RawMatchPlayer {
            user_id: row.get(0)?,
            team: row.get(1)?,
            position: row.get(2)?,
            has_left: row.get(3)?,
            score: row.get(4)?,
            result: row.get(5)?,
            rating_change: row.get(6)?,
            damage_dealt: row.get(7)?,
            damage_received: row.get(8)?,
            total_damage_dealt: row.get(9)?,
            total_damage_received: row.get(10)?,
            money_taken: row.get(11)?,
            armor_taken: row.get(12)?,
            mines_damage: row.get(13)?,
            wipeouts: row.get(14)?,
            divisions: row.get(15)?,
            max_rating_before: row.get(16)?,
            min_rating_before: row.get(17)?,
        })
    })?;

    let mut players = Vec::new();
    for row in rows {
        let raw = row?;
        let watermarks_before = match (raw.max_rating_before, raw.min_rating_before) {
            (Some(max_rating), Some(min_rating)) => Some(Watermarks {
                max_rating,
                min_rating,
            }),
            _ => None,
        };
        players.push(MatchPlayer {
            user_id: Participant::from_id(&raw.user_id),
            team: raw.team,
            position: raw.position,
            has_left: raw.has_left,
            score: raw.score,
            result: raw.result.parse::<Outcome>()?,
            rating_change: raw.rating_change,
            damage_dealt: from_json(&raw.damage_dealt)?,
            damage_received: from_json(&raw.damage_received)?,
            total_damage_dealt: raw.total_damage_dealt,
            total_damage_received: raw.total_damage_received,
            money_taken: raw.money_taken,
            armor_taken: raw.armor_taken,
            mines_damage: raw.mines_damage,
            wipeouts: raw.wipeouts,
            divisions: from_json(&raw.divisions)?,
            watermarks_before,
        });
    }
    Ok(players)
}

fn stats_from_row(row: &Row<'_>) -> rusqlite::Result<Stats> {
    Ok(Stats {
        rating: row.get(0)?,
        max_rating: row.get(1)?,
        min_rating: row.get(2)?,
        games_played: row.get(3)?,
        wins: row.get(4)?,
        losses: row.get(5)?,
        draws: row.get(6)?,
        total_score: row.get(7)?,
        total_divisions: row.get(8)?,
        wins_divisions: row.get(9)?,
        losses_divisions: row.get(10)?,
        draws_divisions: row.get(11)?,
    })
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| SettlementError::Integrity(format!("invalid timestamp {}", millis)))
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| SettlementError::Integrity(format!("failed to encode column: {}", e)))
}

fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json)
        .map_err(|e| SettlementError::Integrity(format!("failed to decode column: {}", e)))
}
