//! Telemetry parsing and normalization
//!
//! The game client emits one JSON document per match. Every leaf is keyed by a
//! positional label (`player1` .. `playerN`). Normalization swaps those labels
//! for participant ids using the roster. Values are never changed.
//!
//! Top-level keys outside the fixed field list are divisions. Existing telemetry
//! files rely on this, so the catch-all is part of the schema.

use super::{Participant, Roster};
use crate::error::{Result, SettlementError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Label (or id) → integer value.
pub type ValueMap = BTreeMap<String, i64>;

/// Raw telemetry as produced by the game client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// attacker label → victim label → damage
    pub damage: BTreeMap<String, ValueMap>,
    pub scores: ValueMap,
    pub mines_damage: ValueMap,
    pub money_taken: ValueMap,
    pub armor_taken: ValueMap,
    pub wipeouts: ValueMap,
    /// Client-side summary, not authoritative
    pub total_score: String,
    /// division name → label → score
    #[serde(flatten)]
    pub divisions: BTreeMap<String, ValueMap>,
}

impl Telemetry {
    /// Parse and validate a telemetry document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SettlementError::validation(format!("malformed telemetry: {}", e)))
    }

    /// Validate an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| SettlementError::validation(format!("malformed telemetry: {}", e)))
    }
}

/// Damage between two players, as seen from one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageEntry {
    pub damage: i64,
    pub is_ally: bool,
}

/// Telemetry with labels replaced by participant ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTelemetry {
    /// attacker id → victim id → damage
    pub damage: BTreeMap<String, ValueMap>,
    pub scores: ValueMap,
    pub mines_damage: ValueMap,
    pub money_taken: ValueMap,
    pub armor_taken: ValueMap,
    pub wipeouts: ValueMap,
    pub total_score: String,
    /// division name → id → score
    pub divisions: BTreeMap<String, ValueMap>,
}

impl NormalizedTelemetry {
    /// Damage `id` dealt, keyed by victim.
    pub fn damage_dealt(&self, roster: &Roster, id: &str) -> BTreeMap<String, DamageEntry> {
        let own_team = roster.team_of(id);
        self.damage
            .get(id)
            .map(|victims| {
                victims
                    .iter()
                    .map(|(victim, &damage)| {
                        let is_ally = roster.team_of(victim) == own_team;
                        (victim.clone(), DamageEntry { damage, is_ally })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Damage `id` received, keyed by attacker.
    pub fn damage_received(&self, roster: &Roster, id: &str) -> BTreeMap<String, DamageEntry> {
        let own_team = roster.team_of(id);
        self.damage
            .iter()
            .filter_map(|(attacker, victims)| {
                victims.get(id).map(|&damage| {
                    let is_ally = roster.team_of(attacker) == own_team;
                    (attacker.clone(), DamageEntry { damage, is_ally })
                })
            })
            .collect()
    }

    /// Value of a single-level field for `id`, 0 when absent.
    pub fn value(map: &ValueMap, id: &str) -> i64 {
        map.get(id).copied().unwrap_or(0)
    }
}

/// Sum telemetry values. Overflow is a validation error.
pub fn checked_sum(values: impl IntoIterator<Item = i64>) -> Result<i64> {
    values
        .into_iter()
        .try_fold(0i64, |acc, v| acc.checked_add(v))
        .ok_or_else(|| SettlementError::validation("score overflow"))
}

/// Replace positional labels with participant ids.
///
/// Unresolved labels in single-level fields are dropped. Unresolved labels in
/// `damage`, on either side, fail validation: silently losing a damage row
/// would corrupt both the dealt and the received totals.
pub fn normalize(telemetry: &Telemetry, roster: &Roster) -> Result<NormalizedTelemetry> {
    let mut damage = BTreeMap::new();
    for (attacker_label, victims) in &telemetry.damage {
        let attacker = resolve_strict(roster, attacker_label, "damage attacker")?;
        let mut row = ValueMap::new();
        for (victim_label, &value) in victims {
            let victim = resolve_strict(roster, victim_label, "damage victim")?;
            row.insert(victim.id().to_string(), value);
        }
        damage.insert(attacker.id().to_string(), row);
    }

    let divisions = telemetry
        .divisions
        .iter()
        .map(|(name, values)| (name.clone(), relabel(roster, values, name)))
        .collect();

    Ok(NormalizedTelemetry {
        damage,
        scores: relabel(roster, &telemetry.scores, "scores"),
        mines_damage: relabel(roster, &telemetry.mines_damage, "mines_damage"),
        money_taken: relabel(roster, &telemetry.money_taken, "money_taken"),
        armor_taken: relabel(roster, &telemetry.armor_taken, "armor_taken"),
        wipeouts: relabel(roster, &telemetry.wipeouts, "wipeouts"),
        total_score: telemetry.total_score.clone(),
        divisions,
    })
}

fn resolve_strict<'a>(roster: &'a Roster, label: &str, field: &str) -> Result<&'a Participant> {
    roster
        .resolve(label)
        .map(|slot| &slot.participant)
        .ok_or_else(|| {
            SettlementError::validation(format!("{} label {} is not in the roster", field, label))
        })
}

fn relabel(roster: &Roster, values: &ValueMap, field: &str) -> ValueMap {
    let mut out = ValueMap::new();
    for (label, &value) in values {
        match roster.resolve(label) {
            Some(slot) => {
                out.insert(slot.participant.id().to_string(), value);
            }
            None => warn!(field = %field, label = %label, "dropping telemetry value for unknown label"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameMode, RosterEntry};

    fn roster() -> Roster {
        Roster::new(
            GameMode::TwoVsTwo,
            &[
                RosterEntry::new("alice", 1, 1),
                RosterEntry::new("bob", 1, 2),
                RosterEntry::new("carol", 2, 3),
                RosterEntry::new("bot_1", 2, 4),
            ],
        )
        .unwrap()
    }

    fn sample_json() -> &'static str {
        r#"{
            "damage": {
                "player1": {"player3": 40, "player2": 5},
                "player3": {"player1": 25}
            },
            "scores": {"player1": 10, "player2": 4, "player3": 7, "player4": 1},
            "mines_damage": {"player1": 3},
            "money_taken": {"player2": 100},
            "armor_taken": {"player3": 2},
            "wipeouts": {"player4": 1},
            "total_score": "2 - 0",
            "Division 1": {"player1": 10, "player2": 4, "player3": 7, "player4": 1},
            "Division 2": {"player1": 2, "player3": 9}
        }"#
    }

    #[test]
    fn test_unknown_keys_become_divisions() {
        let telemetry = Telemetry::from_json(sample_json()).unwrap();
        assert_eq!(telemetry.divisions.len(), 2);
        assert!(telemetry.divisions.contains_key("Division 1"));
        assert!(!telemetry.divisions.contains_key("scores"));
        assert_eq!(telemetry.total_score, "2 - 0");
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let json = r#"{"damage": {}, "scores": {}, "total_score": "0 - 0"}"#;
        assert!(matches!(
            Telemetry::from_json(json),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_non_map_division_is_validation_error() {
        let mut value: serde_json::Value = serde_json::from_str(sample_json()).unwrap();
        value["Division 3"] = serde_json::json!("oops");
        assert!(matches!(
            Telemetry::from_value(value),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_labels_are_replaced_by_ids() {
        let telemetry = Telemetry::from_json(sample_json()).unwrap();
        let normalized = normalize(&telemetry, &roster()).unwrap();

        assert_eq!(normalized.scores.get("alice"), Some(&10));
        assert_eq!(normalized.scores.get("bot_1"), Some(&1));
        assert_eq!(normalized.money_taken.get("bob"), Some(&100));
        assert_eq!(normalized.divisions["Division 2"].get("carol"), Some(&9));
        assert_eq!(normalized.damage["alice"]["carol"], 40);
    }

    #[test]
    fn test_unknown_single_level_label_is_dropped() {
        let mut telemetry = Telemetry::from_json(sample_json()).unwrap();
        telemetry.scores.insert("player9".to_string(), 99);
        let normalized = normalize(&telemetry, &roster()).unwrap();
        assert_eq!(normalized.scores.len(), 4);
    }

    #[test]
    fn test_unknown_division_label_is_dropped() {
        let mut telemetry = Telemetry::from_json(sample_json()).unwrap();
        telemetry
            .divisions
            .get_mut("Division 2")
            .unwrap()
            .insert("player7".to_string(), 50);
        let normalized = normalize(&telemetry, &roster()).unwrap();

        let division = &normalized.divisions["Division 2"];
        assert_eq!(division.len(), 2);
        assert_eq!(division.get("alice"), Some(&2));
        assert!(!division.contains_key("player7"));
    }

    #[test]
    fn test_checked_sum() {
        assert_eq!(checked_sum([1, 2, 3]).unwrap(), 6);
        assert_eq!(checked_sum(Vec::new()).unwrap(), 0);
        assert!(matches!(
            checked_sum([i64::MAX, 1]),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_damage_label_is_rejected() {
        let mut telemetry = Telemetry::from_json(sample_json()).unwrap();
        telemetry
            .damage
            .get_mut("player1")
            .unwrap()
            .insert("player9".to_string(), 1);
        assert!(matches!(
            normalize(&telemetry, &roster()),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_damage_views() {
        let roster = roster();
        let telemetry = Telemetry::from_json(sample_json()).unwrap();
        let normalized = normalize(&telemetry, &roster).unwrap();

        let dealt = normalized.damage_dealt(&roster, "alice");
        assert_eq!(dealt["carol"], DamageEntry { damage: 40, is_ally: false });
        assert_eq!(dealt["bob"], DamageEntry { damage: 5, is_ally: true });

        let received = normalized.damage_received(&roster, "alice");
        assert_eq!(received.len(), 1);
        assert_eq!(received["carol"].damage, 25);

        assert!(normalized.damage_dealt(&roster, "bot_1").is_empty());
    }
}
