//! Shared helpers for integration tests
#![allow(dead_code)] // each test binary uses a subset of these

use grimoire::automation::Automation;
use grimoire::initiative::{Combat, Combatant};
use grimoire::sheet::{Ability, Saves, Spellbook};

pub fn automation(json: serde_json::Value) -> Automation {
    serde_json::from_value(json).expect("Failed to parse automation")
}

pub fn fighter() -> Combatant {
    Combatant::new("Fighter")
        .with_ac(17)
        .with_hp(28)
        .with_saves(Saves::new().with(Ability::Strength, 5))
}

pub fn wizard() -> Combatant {
    Combatant::new("Wizard")
        .with_ac(12)
        .with_hp(18)
        .with_spellbook(Spellbook {
            sab: Some(7),
            dc: Some(15),
            caster_level: 5,
        })
}

pub fn goblin() -> Combatant {
    Combatant::new("Goblin")
        .with_ac(15)
        .with_hp(20)
        .with_saves(Saves::new().with(Ability::Wisdom, 1))
}

/// A combat containing a wizard caster and a goblin target, turn not yet
/// started. Returns (combat, wizard id, goblin id).
pub fn combat_with_pair() -> (Combat, String, String) {
    let mut combat = Combat::new("channel");
    let wizard_id = combat.add_combatant(wizard());
    let goblin_id = combat.add_combatant(goblin());
    (combat, wizard_id, goblin_id)
}
