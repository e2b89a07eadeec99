//! Runtime settings
//!
//! Sources, later ones win:
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config PATH` or `RACELEDGER_CONFIG`)
//! 3. Environment, e.g. `RACELEDGER_RATING__MODEL=weighted`

use crate::error::StorageError;
use crate::stats::rating::{RatingModel, RatingModelKind, DEFAULT_FLAT_STEP, DEFAULT_K};
use crate::storage::{Storage, DATABASE_FILE};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "RACELEDGER_CONFIG";

const ENV_PREFIX: &str = "RACELEDGER";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,
    pub rating: RatingSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file; the OS data directory when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingSettings {
    pub model: RatingModelKind,
    pub k_factor: f64,
    pub flat_step: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
}

impl Settings {
    /// Load settings from defaults, the config file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut builder = defaults()?;
        if let Some(path) = &path {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rating.k_factor.is_nan() || self.rating.k_factor <= 0.0 {
            return Err(ConfigError::Message(format!(
                "rating.k_factor must be positive, got {}",
                self.rating.k_factor
            )));
        }
        if self.rating.flat_step.is_nan() || self.rating.flat_step < 0.0 {
            return Err(ConfigError::Message(format!(
                "rating.flat_step must not be negative, got {}",
                self.rating.flat_step
            )));
        }
        Ok(())
    }

    pub fn rating_model(&self) -> RatingModel {
        match self.rating.model {
            RatingModelKind::Flat => RatingModel::Flat {
                step: self.rating.flat_step,
            },
            RatingModelKind::Weighted => RatingModel::Weighted {
                k_factor: self.rating.k_factor,
            },
        }
    }

    /// Configured database file, or `raceledger.db` in the data directory.
    pub fn database_path(&self) -> Result<PathBuf, StorageError> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Storage::data_dir()?.join(DATABASE_FILE)),
        }
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("rating.model", "flat")?
        .set_default("rating.k_factor", DEFAULT_K)?
        .set_default("rating.flat_step", DEFAULT_FLAT_STEP)?
        .set_default("logging.level", "info")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(text: &str) -> Result<Settings, ConfigError> {
        let settings: Settings = defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    #[test]
    fn test_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.rating.model, RatingModelKind::Flat);
        assert_eq!(settings.rating_model(), RatingModel::default());
        assert_eq!(settings.logging.level, "info");
        assert!(settings.database.path.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let settings = from_toml(
            r#"
            [database]
            path = "/tmp/league.db"

            [rating]
            model = "weighted"
            k_factor = 64.0
            "#,
        )
        .unwrap();

        assert_eq!(settings.rating_model(), RatingModel::Weighted { k_factor: 64.0 });
        assert_eq!(settings.rating.flat_step, DEFAULT_FLAT_STEP);
        assert_eq!(
            settings.database_path().unwrap(),
            PathBuf::from("/tmp/league.db")
        );
    }

    #[test]
    fn test_unknown_model_rejected() {
        assert!(from_toml("[rating]\nmodel = \"glicko\"").is_err());
    }

    #[test]
    fn test_negative_step_rejected() {
        assert!(from_toml("[rating]\nflat_step = -5.0").is_err());
    }
}
