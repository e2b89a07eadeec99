//! Match domain: modes, outcomes, participants and rosters

pub mod divisions;
pub mod record;
pub mod telemetry;

use crate::error::{Result, SettlementError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Id prefix the game client uses for slot-filling bots.
pub const BOT_PREFIX: &str = "bot_";

/// Prefix of the positional labels used in raw telemetry (`player1`, `player2`, ...).
pub const LABEL_PREFIX: &str = "player";

/// Team topology of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    TwoVsTwo,
    ThreeVsThree,
    TwoVsTwoVsTwo,
}

impl GameMode {
    /// Number of teams taking part.
    pub fn team_count(self) -> u32 {
        match self {
            GameMode::TwoVsTwo | GameMode::ThreeVsThree => 2,
            GameMode::TwoVsTwoVsTwo => 3,
        }
    }

    /// Players per team.
    pub fn team_size(self) -> u32 {
        match self {
            GameMode::TwoVsTwo | GameMode::TwoVsTwoVsTwo => 2,
            GameMode::ThreeVsThree => 3,
        }
    }

    /// Total number of roster slots.
    pub fn roster_size(self) -> u32 {
        self.team_count() * self.team_size()
    }

    /// Three-team matches never adjust rating.
    pub fn supports_rating(self) -> bool {
        self.team_count() == 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::TwoVsTwo => "TWO_VS_TWO",
            GameMode::ThreeVsThree => "THREE_VS_THREE",
            GameMode::TwoVsTwoVsTwo => "TWO_VS_TWO_VS_TWO",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TWO_VS_TWO" | "2V2" => Ok(GameMode::TwoVsTwo),
            "THREE_VS_THREE" | "3V3" => Ok(GameMode::ThreeVsThree),
            "TWO_VS_TWO_VS_TWO" | "2V2V2" => Ok(GameMode::TwoVsTwoVsTwo),
            other => Err(SettlementError::validation(format!(
                "unknown game mode: {}",
                other
            ))),
        }
    }
}

/// Result of a team (or player) in a division or a whole match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl Outcome {
    /// Match points a division outcome is worth.
    pub fn points(self) -> i64 {
        match self {
            Outcome::Win => 2,
            Outcome::Draw => 1,
            Outcome::Loss => 0,
        }
    }

    /// Actual score used by the Elo expectation.
    pub fn actual_score(self) -> f64 {
        match self {
            Outcome::Win => 1.0,
            Outcome::Draw => 0.5,
            Outcome::Loss => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Draw => "DRAW",
        }
    }
}

impl FromStr for Outcome {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WIN" => Ok(Outcome::Win),
            "LOSS" => Ok(Outcome::Loss),
            "DRAW" => Ok(Outcome::Draw),
            other => Err(SettlementError::Integrity(format!(
                "unknown outcome: {}",
                other
            ))),
        }
    }
}

/// A player slot in a match, either a real player or a slot-filling bot.
///
/// Serialized as the plain id string the game client uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Participant {
    Human(String),
    Bot(String),
}

impl Participant {
    /// Classify an external id. Bots are recognised by the `bot_` prefix here and nowhere else.
    pub fn from_id(id: &str) -> Self {
        if id.starts_with(BOT_PREFIX) {
            Participant::Bot(id.to_string())
        } else {
            Participant::Human(id.to_string())
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Participant::Human(id) | Participant::Bot(id) => id,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Participant::Bot(_))
    }

    /// The id of a real player, `None` for bots.
    pub fn human_id(&self) -> Option<&str> {
        match self {
            Participant::Human(id) => Some(id),
            Participant::Bot(_) => None,
        }
    }
}

impl From<String> for Participant {
    fn from(id: String) -> Self {
        Participant::from_id(&id)
    }
}

impl From<Participant> for String {
    fn from(p: Participant) -> Self {
        match p {
            Participant::Human(id) | Participant::Bot(id) => id,
        }
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One roster slot as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: String,
    /// 1-based team index
    pub team: u32,
    /// 1-based slot, maps to telemetry label `player{position}`
    pub position: u32,
    #[serde(default)]
    pub has_left: bool,
}

impl RosterEntry {
    pub fn new(user_id: &str, team: u32, position: u32) -> Self {
        RosterEntry {
            user_id: user_id.to_string(),
            team,
            position,
            has_left: false,
        }
    }

    /// Classify the id as a real player or a bot.
    pub fn participant(&self) -> Participant {
        Participant::from_id(&self.user_id)
    }

    /// Telemetry label for this slot.
    pub fn label(&self) -> String {
        format!("{}{}", LABEL_PREFIX, self.position)
    }
}

/// A resolved roster slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub participant: Participant,
    pub team: u32,
    pub position: u32,
    pub has_left: bool,
}

/// A roster validated against a game mode, ordered by position.
#[derive(Debug, Clone)]
pub struct Roster {
    mode: GameMode,
    slots: Vec<Slot>,
    by_label: BTreeMap<String, usize>,
}

impl Roster {
    /// Validate roster entries for a mode.
    ///
    /// Checks:
    /// 1. Roster size matches the mode
    /// 2. Team numbers are in range and every team is full
    /// 3. Positions are exactly `1..=N`
    /// 4. Ids are non-empty and unique
    pub fn new(mode: GameMode, entries: &[RosterEntry]) -> Result<Self> {
        let expected = mode.roster_size() as usize;
        if entries.len() != expected {
            return Err(SettlementError::validation(format!(
                "{} requires {} players, got {}",
                mode,
                expected,
                entries.len()
            )));
        }

        let mut team_sizes: BTreeMap<u32, u32> = BTreeMap::new();
        let mut seen_ids = HashSet::new();
        let mut slots = Vec::with_capacity(entries.len());

        for entry in entries {
            if entry.user_id.trim().is_empty() {
                return Err(SettlementError::validation("empty player id in roster"));
            }
            if !seen_ids.insert(entry.user_id.as_str()) {
                return Err(SettlementError::validation(format!(
                    "player {} appears twice in roster",
                    entry.user_id
                )));
            }
            if entry.team == 0 || entry.team > mode.team_count() {
                return Err(SettlementError::validation(format!(
                    "team {} out of range for {}",
                    entry.team, mode
                )));
            }
            if entry.position == 0 || entry.position as usize > expected {
                return Err(SettlementError::validation(format!(
                    "position {} out of range for {}",
                    entry.position, mode
                )));
            }
            *team_sizes.entry(entry.team).or_insert(0) += 1;
            slots.push(Slot {
                participant: entry.participant(),
                team: entry.team,
                position: entry.position,
                has_left: entry.has_left,
            });
        }

        for team in 1..=mode.team_count() {
            let size = team_sizes.get(&team).copied().unwrap_or(0);
            if size != mode.team_size() {
                return Err(SettlementError::validation(format!(
                    "team {} has {} players, {} requires {}",
                    team,
                    size,
                    mode,
                    mode.team_size()
                )));
            }
        }

        slots.sort_by_key(|s| s.position);
        let mut by_label = BTreeMap::new();
        for (i, slot) in slots.iter().enumerate() {
            let label = format!("{}{}", LABEL_PREFIX, slot.position);
            if by_label.insert(label, i).is_some() {
                return Err(SettlementError::validation(format!(
                    "position {} used twice",
                    slot.position
                )));
            }
        }

        Ok(Roster {
            mode,
            slots,
            by_label,
        })
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    /// Slots in position order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Resolve a telemetry label to its slot.
    pub fn resolve(&self, label: &str) -> Option<&Slot> {
        self.by_label.get(label).map(|&i| &self.slots[i])
    }

    /// Team of a participant id.
    pub fn team_of(&self, id: &str) -> Option<u32> {
        self.slots
            .iter()
            .find(|s| s.participant.id() == id)
            .map(|s| s.team)
    }

    /// Team numbers in order (`1..=team_count`).
    pub fn teams(&self) -> impl Iterator<Item = u32> {
        1..=self.mode.team_count()
    }

    /// Members of one team, in position order.
    pub fn members(&self, team: u32) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(move |s| s.team == team)
    }

    /// Whether the match counts for rating: every slot is a real player
    /// and the mode has two teams.
    pub fn is_rated(&self) -> bool {
        self.mode.supports_rating() && self.slots.iter().all(|s| !s.participant.is_bot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_vs_two() -> Vec<RosterEntry> {
        vec![
            RosterEntry::new("p1", 1, 1),
            RosterEntry::new("p2", 1, 2),
            RosterEntry::new("p3", 2, 3),
            RosterEntry::new("p4", 2, 4),
        ]
    }

    #[test]
    fn test_mode_sizes() {
        assert_eq!(GameMode::TwoVsTwo.roster_size(), 4);
        assert_eq!(GameMode::ThreeVsThree.roster_size(), 6);
        assert_eq!(GameMode::TwoVsTwoVsTwo.roster_size(), 6);
        assert!(!GameMode::TwoVsTwoVsTwo.supports_rating());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("2v2".parse::<GameMode>().unwrap(), GameMode::TwoVsTwo);
        assert_eq!(
            "TWO_VS_TWO_VS_TWO".parse::<GameMode>().unwrap(),
            GameMode::TwoVsTwoVsTwo
        );
        assert!("4v4".parse::<GameMode>().is_err());
    }

    #[test]
    fn test_participant_classification() {
        assert!(Participant::from_id("bot_7").is_bot());
        assert!(!Participant::from_id("robot_7").is_bot());
        assert_eq!(Participant::from_id("bot_7").human_id(), None);
        assert_eq!(Participant::from_id("alice").human_id(), Some("alice"));
    }

    #[test]
    fn test_participant_serializes_as_id() {
        let json = serde_json::to_string(&Participant::from_id("bot_1")).unwrap();
        assert_eq!(json, r#""bot_1""#);
        let back: Participant = serde_json::from_str(&json).unwrap();
        assert!(back.is_bot());
    }

    #[test]
    fn test_roster_entry_json_is_camel_case() {
        let entry: RosterEntry =
            serde_json::from_str(r#"{"userId":"a","team":1,"position":2}"#).unwrap();
        assert_eq!(entry.user_id, "a");
        assert!(!entry.has_left);
        assert_eq!(entry.label(), "player2");
    }

    #[test]
    fn test_valid_roster() {
        let roster = Roster::new(GameMode::TwoVsTwo, &two_vs_two()).unwrap();
        assert_eq!(roster.resolve("player3").unwrap().participant.id(), "p3");
        assert_eq!(roster.team_of("p2"), Some(1));
        assert_eq!(roster.members(2).count(), 2);
        assert!(roster.is_rated());
    }

    #[test]
    fn test_roster_wrong_size() {
        let mut entries = two_vs_two();
        entries.pop();
        assert!(matches!(
            Roster::new(GameMode::TwoVsTwo, &entries),
            Err(SettlementError::Validation(_))
        ));
    }

    #[test]
    fn test_roster_unbalanced_teams() {
        let mut entries = two_vs_two();
        entries[1].team = 2;
        assert!(Roster::new(GameMode::TwoVsTwo, &entries).is_err());
    }

    #[test]
    fn test_roster_duplicate_position() {
        let mut entries = two_vs_two();
        entries[1].position = 1;
        assert!(Roster::new(GameMode::TwoVsTwo, &entries).is_err());
    }

    #[test]
    fn test_roster_duplicate_player() {
        let mut entries = two_vs_two();
        entries[1].user_id = "p1".to_string();
        assert!(Roster::new(GameMode::TwoVsTwo, &entries).is_err());
    }

    #[test]
    fn test_bots_and_three_teams_are_unrated() {
        let mut entries = two_vs_two();
        entries[3].user_id = "bot_1".to_string();
        let roster = Roster::new(GameMode::TwoVsTwo, &entries).unwrap();
        assert!(!roster.is_rated());

        let three = vec![
            RosterEntry::new("a", 1, 1),
            RosterEntry::new("b", 1, 2),
            RosterEntry::new("c", 2, 3),
            RosterEntry::new("d", 2, 4),
            RosterEntry::new("e", 3, 5),
            RosterEntry::new("f", 3, 6),
        ];
        let roster = Roster::new(GameMode::TwoVsTwoVsTwo, &three).unwrap();
        assert!(!roster.is_rated());
    }
}
