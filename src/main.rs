//! raceledger - settle racing matches into player ratings and stats
//!
//! Every command prints its result as JSON on stdout.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use raceledger::config::Settings;
use raceledger::stats::DEFAULT_RATING;
use raceledger::storage::Player;
use raceledger::{logger, GameMode, RosterEntry, SettlementService, Storage, Telemetry};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "raceledger", version, about = "Racing match settlement")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register and inspect players
    #[command(subcommand)]
    Player(PlayerCommand),
    /// Create, edit or delete settled matches
    #[command(subcommand)]
    Settle(SettleCommand),
    /// Read settled matches
    #[command(subcommand)]
    Match(MatchCommand),
    /// Players by rating
    Leaderboard {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum PlayerCommand {
    Add {
        id: String,
        name: String,
        #[arg(long, default_value_t = DEFAULT_RATING)]
        rating: f64,
    },
    Show {
        id: String,
    },
}

#[derive(Subcommand)]
enum SettleCommand {
    Create(SettleArgs),
    Edit {
        match_id: String,
        #[command(flatten)]
        args: SettleArgs,
    },
    Delete {
        match_id: String,
    },
}

#[derive(Args)]
struct SettleArgs {
    /// 2v2, 3v3 or 2v2v2
    #[arg(long, value_parser = parse_mode)]
    mode: GameMode,
    #[arg(long)]
    creator: String,
    /// JSON array of roster entries
    #[arg(long)]
    roster: PathBuf,
    /// Telemetry JSON emitted by the game client
    #[arg(long)]
    telemetry: PathBuf,
}

#[derive(Subcommand)]
enum MatchCommand {
    Show {
        id: String,
    },
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    History {
        player_id: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn parse_mode(value: &str) -> std::result::Result<GameMode, String> {
    value.parse().map_err(|e: raceledger::SettlementError| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    logger::init(&settings.logging.level).context("failed to initialize logging")?;

    let path = settings.database_path()?;
    let storage = Storage::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    let mut service = SettlementService::new(storage, settings.rating_model());

    run(cli.command, &mut service)
}

fn run(command: Command, service: &mut SettlementService) -> Result<()> {
    match command {
        Command::Player(PlayerCommand::Add { id, name, rating }) => {
            print_json(&service.storage_mut().register_player(&id, &name, rating)?)
        }
        Command::Player(PlayerCommand::Show { id }) => {
            print_json(&PlayerSummary::new(service.storage().player(&id)?))
        }
        Command::Settle(SettleCommand::Create(args)) => {
            let roster = read_roster(&args.roster)?;
            let telemetry = read_telemetry(&args.telemetry)?;
            print_json(&service.settle_create(args.mode, &roster, &telemetry, &args.creator)?)
        }
        Command::Settle(SettleCommand::Edit { match_id, args }) => {
            let roster = read_roster(&args.roster)?;
            let telemetry = read_telemetry(&args.telemetry)?;
            print_json(&service.settle_edit(
                &match_id,
                args.mode,
                &roster,
                &telemetry,
                &args.creator,
            )?)
        }
        Command::Settle(SettleCommand::Delete { match_id }) => {
            print_json(&service.settle_delete(&match_id)?)
        }
        Command::Match(MatchCommand::Show { id }) => {
            let found = service
                .storage()
                .find_match(&id)?
                .ok_or_else(|| raceledger::SettlementError::match_not_found(&id))?;
            print_json(&found)
        }
        Command::Match(MatchCommand::List { limit }) => {
            print_json(&service.storage().list_matches(limit)?)
        }
        Command::Match(MatchCommand::History { player_id, limit }) => {
            print_json(&service.storage().player_history(&player_id, limit)?)
        }
        Command::Leaderboard { limit } => print_json(&service.storage().leaderboard(limit)?),
    }
}

/// `player show` output: the stored player plus derived rates.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerSummary {
    #[serde(flatten)]
    player: Player,
    win_rate: f64,
    average_score: f64,
}

impl PlayerSummary {
    fn new(player: Player) -> Self {
        PlayerSummary {
            win_rate: player.stats.win_rate(),
            average_score: player.stats.average_score(),
            player,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_roster(path: &Path) -> Result<Vec<RosterEntry>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read roster {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid roster {}", path.display()))
}

fn read_telemetry(path: &Path) -> Result<Telemetry> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read telemetry {}", path.display()))?;
    Telemetry::from_json(&text).with_context(|| format!("invalid telemetry {}", path.display()))
}
