//! Settled match records

use super::divisions::DivisionRecord;
use super::telemetry::DamageEntry;
use super::{GameMode, Outcome, Participant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rating watermarks of a player right before a match was applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermarks {
    pub max_rating: f64,
    pub min_rating: f64,
}

/// One participation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPlayer {
    pub user_id: Participant,
    pub team: u32,
    pub position: u32,
    pub has_left: bool,
    pub score: i64,
    pub result: Outcome,
    pub rating_change: f64,
    pub damage_dealt: BTreeMap<String, DamageEntry>,
    pub damage_received: BTreeMap<String, DamageEntry>,
    pub total_damage_dealt: i64,
    pub total_damage_received: i64,
    pub money_taken: i64,
    pub armor_taken: i64,
    pub mines_damage: i64,
    pub wipeouts: i64,
    pub divisions: BTreeMap<String, DivisionRecord>,
    /// Snapshot taken when the match was applied, `None` for bots
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub watermarks_before: Option<Watermarks>,
}

impl MatchPlayer {
    /// Divisions this player took part in, by result.
    pub fn division_results(&self) -> impl Iterator<Item = Outcome> + '_ {
        self.divisions.values().map(|d| d.result)
    }
}

/// A settled match with its participation rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    pub mode: GameMode,
    pub creator_id: String,
    pub is_rated: bool,
    pub total_score: String,
    pub created_at: DateTime<Utc>,
    pub players: Vec<MatchPlayer>,
}

impl Match {
    /// Real players in position order.
    pub fn humans(&self) -> impl Iterator<Item = &MatchPlayer> {
        self.players.iter().filter(|p| !p.user_id.is_bot())
    }

    pub fn player(&self, id: &str) -> Option<&MatchPlayer> {
        self.players.iter().find(|p| p.user_id.id() == id)
    }
}
