//! Abilities, saving throws, and spellcasting numbers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The six abilities a saving throw can key off.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub const ALL: [Ability; 6] = [
        Ability::Strength,
        Ability::Dexterity,
        Ability::Constitution,
        Ability::Intelligence,
        Ability::Wisdom,
        Ability::Charisma,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "strength",
            Ability::Dexterity => "dexterity",
            Ability::Constitution => "constitution",
            Ability::Intelligence => "intelligence",
            Ability::Wisdom => "wisdom",
            Ability::Charisma => "charisma",
        }
    }

    pub fn abbr(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    /// Resolves a save keyword by case-insensitive substring match against
    /// the six ability names: "wis" and "WISDOM" both match wisdom.
    pub fn match_save(keyword: &str) -> Option<Ability> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return None;
        }
        Ability::ALL.iter().copied().find(|a| a.name().contains(&keyword))
    }
}

impl std::fmt::Display for Ability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Saving-throw modifiers per ability; unlisted abilities are +0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Saves(BTreeMap<Ability, i64>);

impl Saves {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, ability: Ability, modifier: i64) {
        self.0.insert(ability, modifier);
    }

    pub fn with(mut self, ability: Ability, modifier: i64) -> Self {
        self.set(ability, modifier);
        self
    }

    pub fn bonus(&self, ability: Ability) -> i64 {
        self.0.get(&ability).copied().unwrap_or(0)
    }
}

/// A caster's spellcasting numbers: spell attack bonus, save DC, and the
/// caster level cantrip damage scales from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Spellbook {
    pub sab: Option<i64>,
    pub dc: Option<i64>,
    pub caster_level: u32,
}

/// Net advantage state for a d20 roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvantageType {
    #[default]
    None,
    Adv,
    Dis,
    /// Elven Accuracy: advantage rolls three d20s instead of two.
    Elven,
}

impl AdvantageType {
    /// The d20 notation for this advantage state; reroll inserts before keep.
    pub fn d20(&self, reroll: Option<u32>) -> String {
        let ro = reroll.map(|r| format!("ro{}", r)).unwrap_or_default();
        match self {
            AdvantageType::None => format!("1d20{}", ro),
            AdvantageType::Adv => format!("2d20{}kh1", ro),
            AdvantageType::Elven => format!("3d20{}kh1", ro),
            AdvantageType::Dis => format!("2d20{}kl1", ro),
        }
    }

    /// Combines two advantage sources; opposed sources cancel to straight.
    pub fn combine(self, other: AdvantageType) -> AdvantageType {
        match (self, other) {
            (x, AdvantageType::None) => x,
            (AdvantageType::None, y) => y,
            (AdvantageType::Dis, AdvantageType::Dis) => AdvantageType::Dis,
            (AdvantageType::Dis, _) | (_, AdvantageType::Dis) => AdvantageType::None,
            (AdvantageType::Elven, _) | (_, AdvantageType::Elven) => AdvantageType::Elven,
            (AdvantageType::Adv, AdvantageType::Adv) => AdvantageType::Adv,
        }
    }
}
