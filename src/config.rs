use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Amount, StageSchedule};

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub monthly_interest_rate: Amount,
    pub rate_cutover: Option<NaiveDate>,
    pub deposit_stages: StageSchedule,
}

/// The facts the engine consumes, independent of process concerns.
#[derive(Debug, Clone)]
pub struct Policy {
    pub schedule: StageSchedule,
    pub monthly_rate: Amount,
    pub rate_cutover: Option<NaiveDate>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let monthly_interest_rate = env_map
            .get("MONTHLY_INTEREST_RATE")
            .map(|s| s.as_str())
            .unwrap_or("0.01")
            .parse::<Amount>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "MONTHLY_INTEREST_RATE".to_string(),
                    "must be a decimal fraction such as 0.01".to_string(),
                )
            })?;

        let rate_cutover = match env_map.get("RATE_CUTOVER_DATE") {
            Some(raw) => Some(raw.parse::<NaiveDate>().map_err(|_| {
                ConfigError::InvalidValue(
                    "RATE_CUTOVER_DATE".to_string(),
                    "must be YYYY-MM-DD".to_string(),
                )
            })?),
            None => None,
        };

        let deposit_stages = parse_deposit_stages_from_map(&env_map)?;

        Ok(Config {
            database_path,
            monthly_interest_rate,
            rate_cutover,
            deposit_stages,
        })
    }

    pub fn policy(&self) -> Policy {
        Policy {
            schedule: self.deposit_stages.clone(),
            monthly_rate: self.monthly_interest_rate,
            rate_cutover: self.rate_cutover,
        }
    }
}

fn parse_deposit_stages_from_map(
    env_map: &HashMap<String, String>,
) -> Result<StageSchedule, ConfigError> {
    let raw = if let Some(inline) = env_map.get("DEPOSIT_STAGES") {
        inline.clone()
    } else if let Some(file_path) = env_map.get("DEPOSIT_STAGES_FILE") {
        std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "DEPOSIT_STAGES_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?
    } else {
        return Err(ConfigError::MissingEnv("DEPOSIT_STAGES".to_string()));
    };

    serde_json::from_str(&raw).map_err(|e| {
        ConfigError::InvalidValue("DEPOSIT_STAGES".to_string(), e.to_string())
    })
}
