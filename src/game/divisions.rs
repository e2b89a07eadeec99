//! Division and match results
//!
//! A match is played over one or more divisions. In each division the team with
//! the highest summed score wins; a tie at the top makes every team draw.
//! Division outcomes are worth points (WIN=2, DRAW=1, LOSS=0) and the same
//! top-tie rule decides the match from the point totals.

use super::telemetry::{checked_sum, ValueMap};
use super::{Outcome, Roster};
use crate::error::{Result, SettlementError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One player's line in one division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionRecord {
    pub scores: i64,
    pub result: Outcome,
}

/// Team scores and results for a single division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionOutcome {
    pub name: String,
    pub team_scores: BTreeMap<u32, i64>,
    pub team_results: BTreeMap<u32, Outcome>,
}

/// Everything the settlement needs to know about who won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResolution {
    pub divisions: Vec<DivisionOutcome>,
    /// Team → total points across divisions
    pub team_points: BTreeMap<u32, i64>,
    /// Team → match result
    pub team_results: BTreeMap<u32, Outcome>,
    /// Participant id → division name → record
    pub player_divisions: BTreeMap<String, BTreeMap<String, DivisionRecord>>,
}

impl MatchResolution {
    pub fn team_result(&self, team: u32) -> Outcome {
        self.team_results.get(&team).copied().unwrap_or(Outcome::Draw)
    }

    pub fn points(&self, team: u32) -> i64 {
        self.team_points.get(&team).copied().unwrap_or(0)
    }

    /// Team points in team order, e.g. `"2 - 0"` or `"2 - 1 - 3"`.
    pub fn total_score(&self) -> String {
        format_total_score(self.team_points.values().copied())
    }
}

/// Join team points with `" - "`.
pub fn format_total_score(points: impl IntoIterator<Item = i64>) -> String {
    points
        .into_iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" - ")
}

/// Decide outcomes from team totals.
///
/// The single team at the maximum wins and everyone else loses. If more than
/// one team shares the maximum, every team draws.
pub fn decide(totals: &BTreeMap<u32, i64>) -> BTreeMap<u32, Outcome> {
    let max = totals.values().copied().max().unwrap_or(0);
    let leaders = totals.values().filter(|&&v| v == max).count();

    totals
        .iter()
        .map(|(&team, &total)| {
            let outcome = if leaders > 1 {
                Outcome::Draw
            } else if total == max {
                Outcome::Win
            } else {
                Outcome::Loss
            };
            (team, outcome)
        })
        .collect()
}

/// Resolve every division and the match result from normalized division scores.
pub fn resolve(divisions: &BTreeMap<String, ValueMap>, roster: &Roster) -> Result<MatchResolution> {
    if divisions.is_empty() {
        return Err(SettlementError::validation(
            "telemetry contains no divisions",
        ));
    }

    let mut outcomes = Vec::with_capacity(divisions.len());
    let mut team_points: BTreeMap<u32, i64> = roster.teams().map(|t| (t, 0)).collect();
    let mut player_divisions: BTreeMap<String, BTreeMap<String, DivisionRecord>> = BTreeMap::new();

    for (name, scores) in divisions {
        let team_scores = roster
            .teams()
            .map(|team| {
                let sum = checked_sum(
                    roster
                        .members(team)
                        .map(|slot| scores.get(slot.participant.id()).copied().unwrap_or(0)),
                )?;
                Ok((team, sum))
            })
            .collect::<Result<BTreeMap<u32, i64>>>()?;
        let team_results = decide(&team_scores);

        for (team, outcome) in &team_results {
            *team_points.entry(*team).or_insert(0) += outcome.points();
        }

        for slot in roster.slots() {
            let id = slot.participant.id();
            let record = DivisionRecord {
                scores: scores.get(id).copied().unwrap_or(0),
                result: team_results[&slot.team],
            };
            player_divisions
                .entry(id.to_string())
                .or_default()
                .insert(name.clone(), record);
        }

        outcomes.push(DivisionOutcome {
            name: name.clone(),
            team_scores,
            team_results,
        });
    }

    let team_results = decide(&team_points);

    Ok(MatchResolution {
        divisions: outcomes,
        team_points,
        team_results,
        player_divisions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameMode, RosterEntry};
    use rand::Rng;

    fn roster(mode: GameMode) -> Roster {
        let entries: Vec<RosterEntry> = (1..=mode.roster_size())
            .map(|pos| {
                let team = (pos - 1) / mode.team_size() + 1;
                RosterEntry::new(&format!("p{}", pos), team, pos)
            })
            .collect();
        Roster::new(mode, &entries).unwrap()
    }

    fn division(scores: &[(&str, i64)]) -> ValueMap {
        scores.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_single_division_win() {
        let mut divisions = BTreeMap::new();
        divisions.insert(
            "D1".to_string(),
            division(&[("p1", 6), ("p2", 4), ("p3", 3), ("p4", 2)]),
        );

        let res = resolve(&divisions, &roster(GameMode::TwoVsTwo)).unwrap();
        assert_eq!(res.team_result(1), Outcome::Win);
        assert_eq!(res.team_result(2), Outcome::Loss);
        assert_eq!(res.total_score(), "2 - 0");
        assert_eq!(
            res.player_divisions["p3"]["D1"],
            DivisionRecord { scores: 3, result: Outcome::Loss }
        );
    }

    #[test]
    fn test_split_divisions_draw() {
        let mut divisions = BTreeMap::new();
        divisions.insert("D1".to_string(), division(&[("p1", 10), ("p3", 5)]));
        divisions.insert("D2".to_string(), division(&[("p2", 1), ("p4", 8)]));

        let res = resolve(&divisions, &roster(GameMode::TwoVsTwo)).unwrap();
        assert_eq!(res.total_score(), "2 - 2");
        assert_eq!(res.team_result(1), Outcome::Draw);
        assert_eq!(res.team_result(2), Outcome::Draw);
    }

    #[test]
    fn test_top_tie_makes_every_team_draw() {
        let totals: BTreeMap<u32, i64> = [(1, 5), (2, 5), (3, 1)].into_iter().collect();
        let outcomes = decide(&totals);
        assert!(outcomes.values().all(|o| *o == Outcome::Draw));
    }

    #[test]
    fn test_three_teams_single_winner() {
        let mut divisions = BTreeMap::new();
        divisions.insert(
            "D1".to_string(),
            division(&[("p1", 1), ("p3", 9), ("p5", 4)]),
        );

        let res = resolve(&divisions, &roster(GameMode::TwoVsTwoVsTwo)).unwrap();
        assert_eq!(res.team_result(2), Outcome::Win);
        assert_eq!(res.team_result(1), Outcome::Loss);
        assert_eq!(res.team_result(3), Outcome::Loss);
        assert_eq!(res.total_score(), "0 - 2 - 0");
    }

    #[test]
    fn test_missing_team_entries_count_as_zero() {
        let mut divisions = BTreeMap::new();
        divisions.insert("D1".to_string(), division(&[("p1", 1)]));

        let res = resolve(&divisions, &roster(GameMode::TwoVsTwo)).unwrap();
        assert_eq!(res.divisions[0].team_scores[&2], 0);
        assert_eq!(res.team_result(1), Outcome::Win);
        assert_eq!(res.player_divisions["p4"]["D1"].scores, 0);
    }

    #[test]
    fn test_zero_divisions_rejected() {
        let divisions = BTreeMap::new();
        assert!(matches!(
            resolve(&divisions, &roster(GameMode::TwoVsTwo)),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_team_sum_overflow_rejected() {
        let mut divisions = BTreeMap::new();
        divisions.insert("D1".to_string(), division(&[("p1", i64::MAX), ("p2", 1)]));
        assert!(matches!(
            resolve(&divisions, &roster(GameMode::TwoVsTwo)),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_random_grids_respect_symmetry_and_bounds() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let mode = if rng.random_bool(0.5) {
                GameMode::ThreeVsThree
            } else {
                GameMode::TwoVsTwoVsTwo
            };
            let roster = roster(mode);
            let count = rng.random_range(1..=5);
            let mut divisions = BTreeMap::new();
            for d in 0..count {
                let scores: ValueMap = roster
                    .slots()
                    .iter()
                    .map(|s| (s.participant.id().to_string(), rng.random_range(0..4)))
                    .collect();
                divisions.insert(format!("D{}", d), scores);
            }

            let res = resolve(&divisions, &roster).unwrap();

            for outcome in &res.divisions {
                let max = outcome.team_scores.values().max().unwrap();
                let leaders = outcome.team_scores.values().filter(|v| *v == max).count();
                if leaders > 1 {
                    assert!(outcome.team_results.values().all(|o| *o == Outcome::Draw));
                } else {
                    let wins = outcome
                        .team_results
                        .values()
                        .filter(|o| **o == Outcome::Win)
                        .count();
                    assert_eq!(wins, 1);
                }
            }

            for points in res.team_points.values() {
                assert!(*points >= 0);
                assert!(*points <= 2 * count as i64);
            }
        }
    }
}
