//! Grant policy - How often offer batches arrive and what they contain

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use super::{Rarity, SpeciesId};

/// Parameters that shape every offer batch.
///
/// The shiny probability is derived from these values rather than stored per
/// asset: a player who checks in once per interval should see, on average, as
/// many shiny candidates as they would have met encountering wild creatures at
/// `encounter_rate_per_minute` for the whole interval, spread over the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantPolicy {
    /// Time between a claim and the next batch becoming available
    pub interval: Duration,
    /// Number of candidates in one batch
    pub offers_per_grant: usize,
    /// Highest species id in the catalog (ids start at 1)
    pub max_species_id: u32,
    pub encounter_rate_per_minute: f64,
    /// Chance for a single wild encounter to be shiny
    pub base_shiny_rate: f64,
}

impl Default for GrantPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::minutes(25),
            offers_per_grant: 3,
            max_species_id: 898,
            encounter_rate_per_minute: 1.0,
            base_shiny_rate: 1.0 / 4096.0,
        }
    }
}

impl GrantPolicy {
    /// Probability for one candidate of a batch to be shiny, clamped to `[0, 1]`.
    pub fn shiny_probability(&self) -> f64 {
        if self.offers_per_grant == 0 {
            return 0.0;
        }
        let minutes = self.interval.num_milliseconds() as f64 / 60_000.0;
        let p = minutes * self.encounter_rate_per_minute * self.base_shiny_rate
            / self.offers_per_grant as f64;
        if p.is_nan() {
            0.0
        } else {
            p.clamp(0.0, 1.0)
        }
    }

    /// Timestamp at which a user who claims at `now` gets their next batch.
    pub fn next_grant_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.interval
    }

    pub fn roll_species<R: Rng + ?Sized>(&self, rng: &mut R) -> SpeciesId {
        SpeciesId::new(rng.gen_range(1..=self.max_species_id.max(1)))
    }

    /// Uniform over the species' forms; a species without forms yields 0.
    pub fn roll_form<R: Rng + ?Sized>(&self, rng: &mut R, form_count: usize) -> u32 {
        if form_count == 0 {
            0
        } else {
            rng.gen_range(0..form_count) as u32
        }
    }

    pub fn roll_rarity<R: Rng + ?Sized>(&self, rng: &mut R) -> Rarity {
        if rng.gen_bool(self.shiny_probability()) {
            Rarity::Shiny
        } else {
            Rarity::Standard
        }
    }
}
