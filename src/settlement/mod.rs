//! Match settlement
//!
//! Create, edit and delete settled matches. Each operation:
//! 1. Validates roster and telemetry (no transaction yet)
//! 2. Opens one SQLite transaction
//! 3. Reverses the previous stats impact (edit/delete)
//! 4. Resolves ratings, writes match rows and applies stats (create/edit)
//! 5. Commits
//!
//! Any error before the commit drops the transaction, which rolls everything back.

use crate::error::{Result, SettlementError};
use crate::game::divisions::{self, MatchResolution};
use crate::game::record::{Match, MatchPlayer};
use crate::game::telemetry::{self, checked_sum, NormalizedTelemetry, Telemetry};
use crate::game::{GameMode, Roster, RosterEntry};
use crate::stats::rating::{RatingModel, TeamContext};
use crate::stats::{apply_delta, apply_inverse_delta, compute_stats_delta, Stats};
use crate::storage::{self, queries, Storage};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Validated, normalized input of a settlement.
///
/// Every sum over telemetry values is taken here, so overflow is rejected
/// before a transaction opens.
struct Prepared {
    roster: Roster,
    telemetry: NormalizedTelemetry,
    resolution: MatchResolution,
    /// team → sum of the members' match scores
    team_scores: BTreeMap<u32, i64>,
    /// id → (total dealt, total received)
    damage_totals: BTreeMap<String, (i64, i64)>,
}

impl Prepared {
    fn new(mode: GameMode, players: &[RosterEntry], raw: &Telemetry) -> Result<Self> {
        let roster = Roster::new(mode, players)?;
        let telemetry = telemetry::normalize(raw, &roster)?;
        let resolution = divisions::resolve(&telemetry.divisions, &roster)?;

        let mut team_scores = BTreeMap::new();
        for team in roster.teams() {
            let sum = checked_sum(roster.members(team).map(|slot| {
                NormalizedTelemetry::value(&telemetry.scores, slot.participant.id())
            }))?;
            team_scores.insert(team, sum);
        }

        let mut damage_totals = BTreeMap::new();
        for slot in roster.slots() {
            let id = slot.participant.id();
            let dealt = telemetry.damage_dealt(&roster, id);
            let received = telemetry.damage_received(&roster, id);
            let totals = (
                checked_sum(dealt.values().map(|d| d.damage))?,
                checked_sum(received.values().map(|d| d.damage))?,
            );
            damage_totals.insert(id.to_string(), totals);
        }

        Ok(Prepared {
            roster,
            telemetry,
            resolution,
            team_scores,
            damage_totals,
        })
    }

    fn team_score(&self, team: u32) -> i64 {
        self.team_scores.get(&team).copied().unwrap_or(0)
    }
}

/// Settles matches against an injected storage.
pub struct SettlementService {
    storage: Storage,
    rating: RatingModel,
}

impl SettlementService {
    pub fn new(storage: Storage, rating: RatingModel) -> Self {
        SettlementService { storage, rating }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    /// Settle a new match. Not idempotent: every call creates a new match.
    pub fn settle_create(
        &mut self,
        mode: GameMode,
        players: &[RosterEntry],
        telemetry: &Telemetry,
        creator_id: &str,
    ) -> Result<Match> {
        let prepared = Prepared::new(mode, players, telemetry)?;
        let rating = self.rating;

        let tx = self.storage.transaction()?;
        let id = Uuid::new_v4().to_string();
        let settled = create_in(&tx, rating, &prepared, id, storage::now(), creator_id)?;
        tx.commit()?;

        info!(
            match_id = %settled.id,
            mode = %settled.mode,
            rated = settled.is_rated,
            total_score = %settled.total_score,
            "settled match"
        );
        Ok(settled)
    }

    /// Replace a settled match, keeping its id and creation time.
    pub fn settle_edit(
        &mut self,
        match_id: &str,
        mode: GameMode,
        players: &[RosterEntry],
        telemetry: &Telemetry,
        creator_id: &str,
    ) -> Result<Match> {
        let prepared = Prepared::new(mode, players, telemetry)?;
        let rating = self.rating;

        let tx = self.storage.transaction()?;
        let original = queries::load_match(&tx, match_id)?
            .ok_or_else(|| SettlementError::match_not_found(match_id))?;
        reverse_in(&tx, &original)?;
        queries::delete_match(&tx, match_id)?;
        let settled = create_in(
            &tx,
            rating,
            &prepared,
            original.id.clone(),
            original.created_at,
            creator_id,
        )?;
        tx.commit()?;

        info!(
            match_id = %settled.id,
            previous_score = %original.total_score,
            total_score = %settled.total_score,
            "edited match"
        );
        Ok(settled)
    }

    /// Remove a settled match and undo its stats. Returns the removed match.
    pub fn settle_delete(&mut self, match_id: &str) -> Result<Match> {
        let tx = self.storage.transaction()?;
        let original = queries::load_match(&tx, match_id)?
            .ok_or_else(|| SettlementError::match_not_found(match_id))?;
        reverse_in(&tx, &original)?;
        queries::delete_match(&tx, match_id)?;
        tx.commit()?;

        info!(match_id = %original.id, "deleted match");
        Ok(original)
    }
}

fn require_stats(conn: &Connection, id: &str) -> Result<Stats> {
    queries::load_stats(conn, id)?.ok_or_else(|| {
        SettlementError::Integrity(format!("player {} has no stats row", id))
    })
}

fn create_in(
    conn: &Connection,
    rating: RatingModel,
    prepared: &Prepared,
    id: String,
    created_at: DateTime<Utc>,
    creator_id: &str,
) -> Result<Match> {
    let roster = &prepared.roster;
    let resolution = &prepared.resolution;
    let telemetry = &prepared.telemetry;

    let mut current: BTreeMap<String, Stats> = BTreeMap::new();
    for slot in roster.slots() {
        if let Some(player_id) = slot.participant.human_id() {
            current.insert(player_id.to_string(), require_stats(conn, player_id)?);
        }
    }

    let teams: Vec<TeamContext> = roster
        .teams()
        .map(|team| TeamContext {
            team,
            outcome: resolution.team_result(team),
            ratings: roster
                .members(team)
                .filter_map(|slot| slot.participant.human_id())
                .map(|player_id| (player_id.to_string(), current[player_id].rating))
                .collect(),
            points: resolution.points(team),
            match_score: prepared.team_score(team),
        })
        .collect();

    let is_rated = roster.is_rated();
    let changes = rating.rating_changes(is_rated, &teams);

    let players = roster
        .slots()
        .iter()
        .map(|slot| {
            let pid = slot.participant.id();
            let damage_dealt = telemetry.damage_dealt(roster, pid);
            let damage_received = telemetry.damage_received(roster, pid);
            let (total_damage_dealt, total_damage_received) =
                prepared.damage_totals.get(pid).copied().unwrap_or((0, 0));
            MatchPlayer {
                user_id: slot.participant.clone(),
                team: slot.team,
                position: slot.position,
                has_left: slot.has_left,
                score: NormalizedTelemetry::value(&telemetry.scores, pid),
                result: resolution.team_result(slot.team),
                rating_change: slot
                    .participant
                    .human_id()
                    .and_then(|h| changes.get(h).copied())
                    .unwrap_or(0.0),
                total_damage_dealt,
                total_damage_received,
                damage_dealt,
                damage_received,
                money_taken: NormalizedTelemetry::value(&telemetry.money_taken, pid),
                armor_taken: NormalizedTelemetry::value(&telemetry.armor_taken, pid),
                mines_damage: NormalizedTelemetry::value(&telemetry.mines_damage, pid),
                wipeouts: NormalizedTelemetry::value(&telemetry.wipeouts, pid),
                divisions: resolution
                    .player_divisions
                    .get(pid)
                    .cloned()
                    .unwrap_or_default(),
                watermarks_before: slot
                    .participant
                    .human_id()
                    .map(|h| current[h].watermarks()),
            }
        })
        .collect();

    let settled = Match {
        id,
        mode: roster.mode(),
        creator_id: creator_id.to_string(),
        is_rated,
        total_score: resolution.total_score(),
        created_at,
        players,
    };
    queries::insert_match(conn, &settled)?;

    for (player_id, delta) in compute_stats_delta(&settled) {
        let next = apply_delta(&current[&player_id], &delta)?;
        queries::save_stats(conn, &player_id, &next)?;
        debug!(
            player = %player_id,
            rating_change = delta.rating_change,
            rating = next.rating,
            "applied match to stats"
        );
    }

    Ok(settled)
}

fn reverse_in(conn: &Connection, original: &Match) -> Result<()> {
    for (player_id, delta) in compute_stats_delta(original) {
        let stats = require_stats(conn, &player_id)?;
        let before = original
            .player(&player_id)
            .and_then(|p| p.watermarks_before);
        let prev = apply_inverse_delta(&stats, &delta, before)?;
        queries::save_stats(conn, &player_id, &prev)?;
        debug!(
            player = %player_id,
            rating_change = -delta.rating_change,
            rating = prev.rating,
            "reversed match from stats"
        );
    }
    Ok(())
}
