//! raceledger - match settlement for a team racing game
//!
//! Turns a finished match (roster + client telemetry) into a stored match
//! record and player rating and stats updates, and reverses that on edit or
//! delete.

pub mod config;
pub mod error;
pub mod game;
pub mod logger;
pub mod settlement;
pub mod stats;
pub mod storage;

pub use error::{Result, SettlementError, StorageError};
pub use game::record::{Match, MatchPlayer};
pub use game::telemetry::Telemetry;
pub use game::{GameMode, Outcome, Participant, RosterEntry};
pub use settlement::SettlementService;
pub use stats::rating::RatingModel;
pub use stats::Stats;
pub use storage::Storage;
