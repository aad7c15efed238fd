//! Application configuration

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::domain::value_objects::GrantPolicy;

/// One year
const MAX_GRANT_INTERVAL_MINUTES: i64 = 60 * 24 * 365;
/// One day
const MAX_GRANT_RETRY_SECS: i64 = 60 * 60 * 24;

/// Inventory store backend selection
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    pub backend: String,
    /// Database file, used by the sqlite backend
    pub sqlite_path: String,
}

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,

    /// Minutes between a claim and the next offer batch
    pub grant_interval_minutes: i64,
    /// Candidates per offer batch
    pub offers_per_grant: usize,
    /// Highest species id in the catalog
    pub max_species_id: u32,
    pub encounter_rate_per_minute: f64,
    pub base_shiny_rate: f64,

    /// Seconds before a failed grant is attempted again
    pub grant_retry_secs: i64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let backend = env::var("POKEROLL_STORE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());
        if backend != "sqlite" && backend != "memory" {
            anyhow::bail!(
                "POKEROLL_STORE_BACKEND must be 'sqlite' or 'memory', got '{}'",
                backend
            );
        }

        let config = Self {
            store: StoreConfig {
                backend,
                sqlite_path: env::var("POKEROLL_SQLITE_PATH")
                    .unwrap_or_else(|_| "./data/pokeroll.db".to_string()),
            },
            grant_interval_minutes: parse_var("POKEROLL_GRANT_INTERVAL_MINUTES", 25)?,
            offers_per_grant: parse_var("POKEROLL_OFFERS_PER_GRANT", 3)?,
            max_species_id: parse_var("POKEROLL_MAX_SPECIES_ID", 898)?,
            encounter_rate_per_minute: parse_var("POKEROLL_ENCOUNTER_RATE_PER_MINUTE", 1.0)?,
            base_shiny_rate: parse_var("POKEROLL_BASE_SHINY_RATE", 1.0 / 4096.0)?,
            grant_retry_secs: parse_var("POKEROLL_GRANT_RETRY_SECS", 30)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall the schedule or overflow timestamps
    pub fn validate(&self) -> Result<()> {
        if self.max_species_id == 0 {
            anyhow::bail!("POKEROLL_MAX_SPECIES_ID must be at least 1");
        }
        if self.offers_per_grant == 0 {
            anyhow::bail!("POKEROLL_OFFERS_PER_GRANT must be at least 1");
        }
        if !(0..=MAX_GRANT_INTERVAL_MINUTES).contains(&self.grant_interval_minutes) {
            anyhow::bail!(
                "POKEROLL_GRANT_INTERVAL_MINUTES must be between 0 and {}",
                MAX_GRANT_INTERVAL_MINUTES
            );
        }
        if !(1..=MAX_GRANT_RETRY_SECS).contains(&self.grant_retry_secs) {
            anyhow::bail!(
                "POKEROLL_GRANT_RETRY_SECS must be between 1 and {}",
                MAX_GRANT_RETRY_SECS
            );
        }
        Ok(())
    }

    pub fn grant_policy(&self) -> GrantPolicy {
        GrantPolicy {
            interval: chrono::Duration::minutes(self.grant_interval_minutes),
            offers_per_grant: self.offers_per_grant,
            max_species_id: self.max_species_id,
            encounter_rate_per_minute: self.encounter_rate_per_minute,
            base_shiny_rate: self.base_shiny_rate,
        }
    }

    pub fn grant_retry_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grant_retry_secs)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid {}", name, std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            store: StoreConfig {
                backend: "memory".to_string(),
                sqlite_path: String::new(),
            },
            grant_interval_minutes: 10,
            offers_per_grant: 5,
            max_species_id: 151,
            encounter_rate_per_minute: 2.0,
            base_shiny_rate: 0.001,
            grant_retry_secs: 5,
        }
    }

    #[test]
    fn test_grant_policy_from_config() {
        let config = sample();
        assert!(config.validate().is_ok());

        let policy = config.grant_policy();
        assert_eq!(policy.interval, chrono::Duration::minutes(10));
        assert_eq!(policy.offers_per_grant, 5);
        assert_eq!(policy.max_species_id, 151);
        assert_eq!(config.grant_retry_delay(), chrono::Duration::seconds(5));
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("POKEROLL_TEST_PARSE_GARBAGE", "twenty");
        assert!(parse_var::<i64>("POKEROLL_TEST_PARSE_GARBAGE", 1).is_err());
        assert_eq!(parse_var::<i64>("POKEROLL_TEST_PARSE_UNSET", 7).unwrap(), 7);
    }

    #[test]
    fn test_validate_rejects_stalling_or_overflowing_settings() {
        let empty_batches = AppConfig {
            offers_per_grant: 0,
            ..sample()
        };
        assert!(empty_batches.validate().is_err());

        let huge_interval = AppConfig {
            grant_interval_minutes: i64::MAX,
            ..sample()
        };
        assert!(huge_interval.validate().is_err());

        let negative_interval = AppConfig {
            grant_interval_minutes: -1,
            ..sample()
        };
        assert!(negative_interval.validate().is_err());

        let huge_retry = AppConfig {
            grant_retry_secs: i64::MAX,
            ..sample()
        };
        assert!(huge_retry.validate().is_err());

        let no_retry_delay = AppConfig {
            grant_retry_secs: 0,
            ..sample()
        };
        assert!(no_retry_delay.validate().is_err());

        let no_catalog = AppConfig {
            max_species_id: 0,
            ..sample()
        };
        assert!(no_catalog.validate().is_err());
    }
}
