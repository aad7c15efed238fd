//! Rarity flag rolled for every granted asset

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    #[default]
    Standard,
    Shiny,
}

impl Rarity {
    pub fn is_shiny(&self) -> bool {
        matches!(self, Rarity::Shiny)
    }

    pub fn from_shiny(shiny: bool) -> Self {
        if shiny {
            Rarity::Shiny
        } else {
            Rarity::Standard
        }
    }
}
