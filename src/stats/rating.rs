//! Rating adjustment
//!
//! Two models are available:
//! - `Flat`: +step for a win, -step for a loss, 0 for a draw. This is the live model.
//! - `Weighted`: a blended Elo team coefficient spread over teammates by rating.
//!
//! Both return zero for every player when the match is unrated.
//!
//! Blended team coefficient for a two-team match:
//! - Elo: `E = 1 / (1 + 10^((R_opp - R_self)/400))`, `elo = K * (actual - E)`
//! - Division margin: `P = |p_self - p_opp|`, `OKO = (p_self + p_opp) / 2`,
//!   `div = 3P` if `P <= OKO`, else `3 * OKO + 1.5 * (P - OKO)`; signed towards the winner
//! - Score margin: `(own - opp) / 1000`
//! - `base = elo + pct(elo, div) + pct(elo, score)` with `pct(a, b) = a * b / 100`

use crate::game::Outcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default K factor for the Elo component
pub const DEFAULT_K: f64 = 100.0;

/// Default per-match step of the flat model
pub const DEFAULT_FLAT_STEP: f64 = 10.0;

/// Which rating model settlement uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingModelKind {
    #[default]
    Flat,
    Weighted,
}

/// A configured rating model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RatingModel {
    Flat { step: f64 },
    Weighted { k_factor: f64 },
}

impl Default for RatingModel {
    fn default() -> Self {
        RatingModel::Flat {
            step: DEFAULT_FLAT_STEP,
        }
    }
}

/// What the rating model needs to know about one team.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamContext {
    pub team: u32,
    pub outcome: Outcome,
    /// Current ratings of the team's real players
    pub ratings: Vec<(String, f64)>,
    /// Total division points
    pub points: i64,
    /// Sum of the members' match scores
    pub match_score: i64,
}

impl TeamContext {
    /// Mean rating of the team's real players.
    pub fn rating(&self) -> f64 {
        if self.ratings.is_empty() {
            return 0.0;
        }
        self.ratings.iter().map(|(_, r)| r).sum::<f64>() / self.ratings.len() as f64
    }
}

impl RatingModel {
    /// Rating change for every real player, keyed by player id.
    pub fn rating_changes(&self, is_rated: bool, teams: &[TeamContext]) -> BTreeMap<String, f64> {
        let mut changes = BTreeMap::new();
        for team in teams {
            for (id, _) in &team.ratings {
                changes.insert(id.clone(), 0.0);
            }
        }
        if !is_rated {
            return changes;
        }

        match *self {
            RatingModel::Flat { step } => {
                for team in teams {
                    let change = match team.outcome {
                        Outcome::Win => step,
                        Outcome::Loss => -step,
                        Outcome::Draw => 0.0,
                    };
                    for (id, _) in &team.ratings {
                        changes.insert(id.clone(), change);
                    }
                }
            }
            RatingModel::Weighted { k_factor } => {
                // The blended coefficient is only defined head to head
                if let [a, b] = teams {
                    for (own, opp) in [(a, b), (b, a)] {
                        let base = team_coefficient(k_factor, own, opp);
                        changes.extend(distribute(base, &own.ratings));
                    }
                }
            }
        }

        changes
    }
}

/// Calculate expected score for rating A vs rating B
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((rating_b - rating_a) / 400.0))
}

/// `a * b / 100`: applies `b` as a percentage modifier of `a`.
pub fn percent_of(a: f64, b: f64) -> f64 {
    a * b / 100.0
}

pub fn elo_coefficient(k_factor: f64, own_rating: f64, opp_rating: f64, outcome: Outcome) -> f64 {
    k_factor * (outcome.actual_score() - expected_score(own_rating, opp_rating))
}

/// Division-margin modifier, positive for the winner and negative for the loser.
pub fn division_coefficient(own_points: i64, opp_points: i64, outcome: Outcome) -> f64 {
    let p = (own_points - opp_points).abs() as f64;
    let oko = (own_points + opp_points) as f64 / 2.0;
    let magnitude = if p <= oko {
        p * 3.0
    } else {
        oko * 3.0 + (p - oko) * 1.5
    };
    match outcome {
        Outcome::Win => magnitude,
        Outcome::Loss => -magnitude,
        Outcome::Draw => 0.0,
    }
}

pub fn score_coefficient(own_score: i64, opp_score: i64) -> f64 {
    (own_score as f64 - opp_score as f64) / 1000.0
}

/// Team-level rating coefficient of `own` against `opp`.
pub fn team_coefficient(k_factor: f64, own: &TeamContext, opp: &TeamContext) -> f64 {
    let elo = elo_coefficient(k_factor, own.rating(), opp.rating(), own.outcome);
    let div = division_coefficient(own.points, opp.points, own.outcome);
    let score = score_coefficient(own.match_score, opp.match_score);
    elo + percent_of(elo, div) + percent_of(elo, score)
}

/// Spread a team coefficient over its players.
///
/// Gains are weighted by `1/rating` so lower-rated winners gain more; losses
/// are weighted by `rating` so higher-rated losers lose more. Shares are
/// normalized and scaled by team size, so equal ratings all receive `base`.
pub fn distribute(base: f64, ratings: &[(String, f64)]) -> BTreeMap<String, f64> {
    if ratings.is_empty() {
        return BTreeMap::new();
    }
    let n = ratings.len() as f64;
    let weights: Vec<f64> = ratings
        .iter()
        .map(|(_, r)| {
            let r = r.max(1.0);
            if base >= 0.0 {
                1.0 / r
            } else {
                r
            }
        })
        .collect();
    let total: f64 = weights.iter().sum();

    ratings
        .iter()
        .zip(weights)
        .map(|((id, _), w)| (id.clone(), base * n * w / total))
        .collect()
}
