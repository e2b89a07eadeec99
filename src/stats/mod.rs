//! Player statistics and rating
//!
//! This module provides:
//! - The per-player `Stats` aggregate
//! - `compute_stats_delta`: what a settled match adds to each real player
//! - `apply_delta` / `apply_inverse_delta`: the only place stats arithmetic happens
//!
//! Creating a match applies its deltas; editing or deleting it applies the
//! inverse first. Applying the inverse right after the delta restores the
//! original stats exactly.

pub mod rating;

use crate::error::{Result, SettlementError};
use crate::game::record::{Match, Watermarks};
use crate::game::Outcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default starting rating
pub const DEFAULT_RATING: f64 = 1000.0;

/// Lowest starting rating an onboarding path may assign
pub const MIN_INITIAL_RATING: f64 = 1000.0;

/// Highest starting rating an onboarding path may assign
pub const MAX_INITIAL_RATING: f64 = 1800.0;

/// Player lifetime statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub rating: f64,
    /// Highest rating ever reached
    pub max_rating: f64,
    /// Lowest rating ever reached
    pub min_rating: f64,
    pub games_played: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    /// Sum of match scores
    pub total_score: i64,
    pub total_divisions: i64,
    pub wins_divisions: i64,
    pub losses_divisions: i64,
    pub draws_divisions: i64,
}

impl Stats {
    /// Create stats for a new player
    pub fn new(initial_rating: f64) -> Self {
        Stats {
            rating: initial_rating,
            max_rating: initial_rating,
            min_rating: initial_rating,
            games_played: 0,
            wins: 0,
            losses: 0,
            draws: 0,
            total_score: 0,
            total_divisions: 0,
            wins_divisions: 0,
            losses_divisions: 0,
            draws_divisions: 0,
        }
    }

    /// Average score per game
    pub fn average_score(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            self.total_score as f64 / self.games_played as f64
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            self.wins as f64 / self.games_played as f64
        }
    }

    pub fn watermarks(&self) -> Watermarks {
        Watermarks {
            max_rating: self.max_rating,
            min_rating: self.min_rating,
        }
    }

    /// `wins + losses + draws == games_played` and `min <= rating <= max`.
    pub fn is_consistent(&self) -> bool {
        self.wins + self.losses + self.draws == self.games_played
            && self.min_rating <= self.rating
            && self.rating <= self.max_rating
    }
}

impl Default for Stats {
    fn default() -> Self {
        Stats::new(DEFAULT_RATING)
    }
}

/// What one settled match contributes to one player's stats.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsDelta {
    pub rating_change: f64,
    pub games_played: i64,
    pub wins: i64,
    pub losses: i64,
    pub draws: i64,
    pub total_score: i64,
    pub total_divisions: i64,
    pub wins_divisions: i64,
    pub losses_divisions: i64,
    pub draws_divisions: i64,
}

impl StatsDelta {
    /// Delta for one game with the given outcome.
    pub fn for_game(result: Outcome, rating_change: f64, score: i64) -> Self {
        let mut delta = StatsDelta {
            rating_change,
            games_played: 1,
            total_score: score,
            ..Default::default()
        };
        match result {
            Outcome::Win => delta.wins = 1,
            Outcome::Loss => delta.losses = 1,
            Outcome::Draw => delta.draws = 1,
        }
        delta
    }

    pub fn add_division(&mut self, result: Outcome) {
        self.total_divisions += 1;
        match result {
            Outcome::Win => self.wins_divisions += 1,
            Outcome::Loss => self.losses_divisions += 1,
            Outcome::Draw => self.draws_divisions += 1,
        }
    }
}

/// Per-player deltas of a match. Bots are never included.
pub fn compute_stats_delta(m: &Match) -> BTreeMap<String, StatsDelta> {
    m.humans()
        .map(|player| {
            let mut delta = StatsDelta::for_game(player.result, player.rating_change, player.score);
            for result in player.division_results() {
                delta.add_division(result);
            }
            (player.user_id.id().to_string(), delta)
        })
        .collect()
}

/// Apply a match's contribution.
///
/// The high watermark only moves on a gain and the low watermark only on a loss.
pub fn apply_delta(stats: &Stats, delta: &StatsDelta) -> Result<Stats> {
    let rating = stats.rating + delta.rating_change;
    let total_score = stats
        .total_score
        .checked_add(delta.total_score)
        .ok_or_else(|| score_overflow(stats))?;
    let mut next = Stats {
        rating,
        max_rating: stats.max_rating,
        min_rating: stats.min_rating,
        games_played: stats.games_played + delta.games_played,
        wins: stats.wins + delta.wins,
        losses: stats.losses + delta.losses,
        draws: stats.draws + delta.draws,
        total_score,
        total_divisions: stats.total_divisions + delta.total_divisions,
        wins_divisions: stats.wins_divisions + delta.wins_divisions,
        losses_divisions: stats.losses_divisions + delta.losses_divisions,
        draws_divisions: stats.draws_divisions + delta.draws_divisions,
    };
    if delta.rating_change > 0.0 {
        next.max_rating = rating.max(stats.max_rating);
    }
    if delta.rating_change < 0.0 {
        next.min_rating = rating.min(stats.min_rating);
    }
    Ok(next)
}

/// Undo a match's contribution.
///
/// A watermark is rolled back only when it still equals the rating being
/// reversed, i.e. this match set it. It goes back to the snapshot taken when
/// the match was applied (or the reversed rating for rows without one).
/// Both watermarks are then widened to cover the reversed rating.
pub fn apply_inverse_delta(
    stats: &Stats,
    delta: &StatsDelta,
    before: Option<Watermarks>,
) -> Result<Stats> {
    let reversed = stats.rating - delta.rating_change;
    let total_score = stats
        .total_score
        .checked_sub(delta.total_score)
        .ok_or_else(|| score_overflow(stats))?;
    let mut prev = Stats {
        rating: reversed,
        max_rating: stats.max_rating,
        min_rating: stats.min_rating,
        games_played: stats.games_played - delta.games_played,
        wins: stats.wins - delta.wins,
        losses: stats.losses - delta.losses,
        draws: stats.draws - delta.draws,
        total_score,
        total_divisions: stats.total_divisions - delta.total_divisions,
        wins_divisions: stats.wins_divisions - delta.wins_divisions,
        losses_divisions: stats.losses_divisions - delta.losses_divisions,
        draws_divisions: stats.draws_divisions - delta.draws_divisions,
    };
    if delta.rating_change > 0.0 && stats.max_rating == stats.rating {
        prev.max_rating = before.map(|w| w.max_rating).unwrap_or(reversed);
    }
    if delta.rating_change < 0.0 && stats.min_rating == stats.rating {
        prev.min_rating = before.map(|w| w.min_rating).unwrap_or(reversed);
    }
    prev.max_rating = prev.max_rating.max(reversed);
    prev.min_rating = prev.min_rating.min(reversed);
    Ok(prev)
}

fn score_overflow(stats: &Stats) -> SettlementError {
    SettlementError::validation(format!(
        "score overflow on a lifetime total of {}",
        stats.total_score
    ))
}
