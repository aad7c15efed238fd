//! Species catalog entries
//!
//! The catalog is filled by the ingestion pipeline; this core only reads it
//! to roll forms and to hydrate assets for display.

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Rarity, SpeciesId};

/// Sprite URLs for one form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Sprites {
    pub front_default: String,
    pub front_female: Option<String>,
    pub front_shiny: String,
    pub front_shiny_female: Option<String>,
}

impl Sprites {
    /// Front sprite matching the asset's rarity
    pub fn front(&self, rarity: Rarity) -> &str {
        match rarity {
            Rarity::Standard => &self.front_default,
            Rarity::Shiny => &self.front_shiny,
        }
    }
}

/// A visual/elemental variant of a species
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub name: String,
    pub types: Vec<String>,
    pub sprites: Sprites,
}

impl Form {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            sprites: Sprites::default(),
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.types.push(type_name.into());
        self
    }

    pub fn with_sprites(mut self, sprites: Sprites) -> Self {
        self.sprites = sprites;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Species {
    pub id: SpeciesId,
    pub name: String,
    pub has_gender_differences: bool,
    pub is_legendary: bool,
    pub is_mythical: bool,
    /// Ordered forms; an asset's `form_index` points into this list
    pub forms: Vec<Form>,
}

impl Species {
    pub fn new(id: SpeciesId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            has_gender_differences: false,
            is_legendary: false,
            is_mythical: false,
            forms: Vec::new(),
        }
    }

    pub fn with_form(mut self, form: Form) -> Self {
        self.forms.push(form);
        self
    }

    pub fn legendary(mut self) -> Self {
        self.is_legendary = true;
        self
    }

    pub fn mythical(mut self) -> Self {
        self.is_mythical = true;
        self
    }

    pub fn form(&self, index: u32) -> Option<&Form> {
        self.forms.get(index as usize)
    }
}
