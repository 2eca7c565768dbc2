//! Combatants
//!
//! A combatant is any creature automation can act on: a monster or player
//! in a tracked combat (where `index` is its turn position), or a loose
//! character outside one. Every dynamic attribute that effects can modify
//! is derived on demand through the `active_effects` map-reduce.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sheet::{Ability, AdvantageType, Resistances, Saves, Spellbook};

use super::effects::{AppliedEffect, GrantedAttack, GrantedButton};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    base_ac: Option<i64>,
    #[serde(default)]
    base_max_hp: Option<i64>,
    #[serde(default)]
    pub hp: Option<i64>,
    #[serde(default)]
    pub temp_hp: i64,
    #[serde(default)]
    pub saves: Saves,
    #[serde(default)]
    base_resistances: Resistances,
    #[serde(default)]
    pub spellbook: Spellbook,
    /// Turn position when in a tracked combat.
    #[serde(default)]
    pub index: Option<usize>,
    /// Hidden monster: HP changes go to the controller privately.
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub controller_id: Option<String>,
    #[serde(default)]
    effects: Vec<AppliedEffect>,
}

impl Combatant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            base_ac: None,
            base_max_hp: None,
            hp: None,
            temp_hp: 0,
            saves: Saves::new(),
            base_resistances: Resistances::new(),
            spellbook: Spellbook::default(),
            index: None,
            is_private: false,
            controller_id: None,
            effects: Vec::new(),
        }
    }

    pub fn with_ac(mut self, ac: i64) -> Self {
        self.base_ac = Some(ac);
        self
    }

    pub fn with_hp(mut self, max_hp: i64) -> Self {
        self.base_max_hp = Some(max_hp);
        self.hp = Some(max_hp);
        self
    }

    pub fn with_saves(mut self, saves: Saves) -> Self {
        self.saves = saves;
        self
    }

    pub fn with_resistances(mut self, resistances: Resistances) -> Self {
        self.base_resistances = resistances;
        self
    }

    pub fn with_spellbook(mut self, spellbook: Spellbook) -> Self {
        self.spellbook = spellbook;
        self
    }

    pub fn with_controller(mut self, controller_id: impl Into<String>, private: bool) -> Self {
        self.controller_id = Some(controller_id.into());
        self.is_private = private;
        self
    }

    // ==== aggregation ====

    /// Map/reduce over every active effect. Mapped `None`s are dropped; the
    /// reducer runs only when something remains, else `default` is
    /// returned. Every dynamic attribute below derives through this.
    pub fn active_effects<T, O>(
        &self,
        mapper: impl Fn(&AppliedEffect) -> Option<T>,
        reducer: impl FnOnce(Vec<T>) -> O,
        default: O,
    ) -> O {
        let values: Vec<T> = self.effects.iter().filter_map(mapper).collect();
        if values.is_empty() {
            default
        } else {
            reducer(values)
        }
    }

    /// Effective AC: an override takes the max, bonuses sum on top of
    /// whichever base applies.
    pub fn ac(&self) -> Option<i64> {
        let override_ac =
            self.active_effects(|e| e.effects.ac_value, |v| v.into_iter().max(), None);
        let bonus: i64 = self.active_effects(|e| e.effects.ac_bonus, |v| v.into_iter().sum(), 0);
        match override_ac.or(self.base_ac) {
            Some(base) => Some(base + bonus),
            None => None,
        }
    }

    pub fn base_ac(&self) -> Option<i64> {
        self.base_ac
    }

    /// Effective max HP, same override-or-base-plus-bonus shape as AC.
    pub fn max_hp(&self) -> Option<i64> {
        let override_hp =
            self.active_effects(|e| e.effects.max_hp_value, |v| v.into_iter().max(), None);
        let bonus: i64 =
            self.active_effects(|e| e.effects.max_hp_bonus, |v| v.into_iter().sum(), 0);
        match override_hp.or(self.base_max_hp) {
            Some(base) => Some(base + bonus),
            None => None,
        }
    }

    /// Base rules plus every rule granted by active effects.
    pub fn resistances(&self) -> Resistances {
        let mut out = self.base_resistances.clone();
        out.resist.extend(self.active_effects(
            |e| Some(e.effects.resistances.clone()).filter(|v| !v.is_empty()),
            |v| v.concat(),
            Vec::new(),
        ));
        out.immune.extend(self.active_effects(
            |e| Some(e.effects.immunities.clone()).filter(|v| !v.is_empty()),
            |v| v.concat(),
            Vec::new(),
        ));
        out.vuln.extend(self.active_effects(
            |e| Some(e.effects.vulnerabilities.clone()).filter(|v| !v.is_empty()),
            |v| v.concat(),
            Vec::new(),
        ));
        out.neutral.extend(self.active_effects(
            |e| Some(e.effects.ignored_resistances.clone()).filter(|v| !v.is_empty()),
            |v| v.concat(),
            Vec::new(),
        ));
        out
    }

    pub fn base_resistances(&self) -> &Resistances {
        &self.base_resistances
    }

    /// Attacks granted by active effects.
    pub fn granted_attacks(&self) -> Vec<&GrantedAttack> {
        self.effects.iter().flat_map(|e| e.attacks.iter()).collect()
    }

    /// Buttons granted by active effects.
    pub fn granted_buttons(&self) -> Vec<&GrantedButton> {
        self.effects.iter().flat_map(|e| e.buttons.iter()).collect()
    }

    /// Net attack advantage across active effects.
    pub fn attack_advantage(&self) -> AdvantageType {
        self.active_effects(
            |e| e.effects.attack_advantage,
            |v| {
                v.into_iter()
                    .fold(AdvantageType::None, AdvantageType::combine)
            },
            AdvantageType::None,
        )
    }

    pub fn attack_bonuses(&self) -> Vec<String> {
        self.active_effects(
            |e| e.effects.to_hit_bonus.clone(),
            |v| v,
            Vec::new(),
        )
    }

    pub fn damage_bonuses(&self) -> Vec<String> {
        self.active_effects(
            |e| e.effects.damage_bonus.clone(),
            |v| v,
            Vec::new(),
        )
    }

    pub fn save_bonuses(&self) -> Vec<String> {
        self.active_effects(|e| e.effects.save_bonus.clone(), |v| v, Vec::new())
    }

    /// Net advantage on one ability's saving throws: the union of granted
    /// advantage and disadvantage sets, opposed grants cancelling.
    pub fn save_advantage(&self, ability: Ability) -> AdvantageType {
        let adv = self.active_effects(
            |e| e.effects.save_adv.contains(&ability).then_some(()),
            |_| true,
            false,
        );
        let dis = self.active_effects(
            |e| e.effects.save_dis.contains(&ability).then_some(()),
            |_| true,
            false,
        );
        match (adv, dis) {
            (true, false) => AdvantageType::Adv,
            (false, true) => AdvantageType::Dis,
            _ => AdvantageType::None,
        }
    }

    pub fn has_magical_damage(&self) -> bool {
        self.active_effects(|e| e.effects.magical_damage.then_some(()), |_| true, false)
    }

    pub fn has_silvered_damage(&self) -> bool {
        self.active_effects(|e| e.effects.silvered_damage.then_some(()), |_| true, false)
    }

    // ==== hit points ====

    /// Applies an HP delta. Damage is absorbed by temp HP first; healing
    /// is clamped to max HP unless `overflow` is allowed. Returns the new
    /// HP display string.
    pub fn modify_hp(&mut self, delta: i64, overflow: bool) -> String {
        let mut remaining = delta;
        if delta < 0 && self.temp_hp > 0 {
            let absorbed = self.temp_hp.min(-delta);
            self.temp_hp -= absorbed;
            remaining += absorbed;
        }
        if let Some(hp) = self.hp {
            let mut new_hp = hp + remaining;
            if !overflow && remaining > 0 {
                if let Some(max) = self.max_hp() {
                    new_hp = new_hp.min(max.max(hp));
                }
            }
            self.hp = Some(new_hp);
        }
        self.hp_str()
    }

    /// Sets temp HP outright (temp HP never stacks), floored at zero.
    pub fn set_temp_hp(&mut self, amount: i64) {
        self.temp_hp = amount.max(0);
    }

    pub fn hp_str(&self) -> String {
        let mut out = match (self.hp, self.max_hp()) {
            (Some(hp), Some(max)) => format!("<{}/{} HP>", hp, max),
            (Some(hp), None) => format!("<{} HP>", hp),
            _ => "<Unknown HP>".to_string(),
        };
        if self.temp_hp > 0 {
            out.push_str(&format!(" (+{} temp)", self.temp_hp));
        }
        out
    }

    // ==== effects ====

    pub fn get_effects(&self) -> &[AppliedEffect] {
        &self.effects
    }

    pub fn effect_by_id(&self, effect_id: &str) -> Option<&AppliedEffect> {
        self.effects.iter().find(|e| e.id == effect_id)
    }

    pub(crate) fn effect_by_id_mut(&mut self, effect_id: &str) -> Option<&mut AppliedEffect> {
        self.effects.iter_mut().find(|e| e.id == effect_id)
    }

    /// Finds an effect by name; strict requires an exact match, otherwise a
    /// case-insensitive substring suffices.
    pub fn get_effect(&self, name: &str, strict: bool) -> Option<&AppliedEffect> {
        if strict {
            self.effects.iter().find(|e| e.name == name)
        } else {
            let lower = name.to_lowercase();
            self.effects
                .iter()
                .find(|e| e.name.to_lowercase().contains(&lower))
        }
    }

    pub fn is_concentrating(&self) -> bool {
        self.effects.iter().any(|e| e.concentration)
    }

    pub(crate) fn push_effect(&mut self, mut effect: AppliedEffect) {
        effect.owner = Some(self.id.clone());
        self.effects.push(effect);
    }

    pub(crate) fn take_effect(&mut self, effect_id: &str) -> Option<AppliedEffect> {
        let pos = self.effects.iter().position(|e| e.id == effect_id)?;
        Some(self.effects.remove(pos))
    }

    pub(crate) fn restore_effect_owners(&mut self) {
        let id = self.id.clone();
        for effect in &mut self.effects {
            effect.owner = Some(id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initiative::effects::PassiveEffects;
    use crate::sheet::Resistance;

    fn effect_with(passive: PassiveEffects) -> AppliedEffect {
        AppliedEffect::new("test").with_effects(passive)
    }

    #[test]
    fn test_ac_override_takes_max_bonus_takes_sum() {
        let mut c = Combatant::new("Rogue").with_ac(14);
        assert_eq!(c.ac(), Some(14));

        c.push_effect(effect_with(PassiveEffects {
            ac_value: Some(16),
            ..Default::default()
        }));
        c.push_effect(effect_with(PassiveEffects {
            ac_value: Some(13),
            ..Default::default()
        }));
        assert_eq!(c.ac(), Some(16));

        c.push_effect(effect_with(PassiveEffects {
            ac_bonus: Some(2),
            ..Default::default()
        }));
        assert_eq!(c.ac(), Some(18));
    }

    #[test]
    fn test_max_hp_aggregation() {
        let mut c = Combatant::new("Fighter").with_hp(30);
        assert_eq!(c.max_hp(), Some(30));
        c.push_effect(effect_with(PassiveEffects {
            max_hp_bonus: Some(10),
            ..Default::default()
        }));
        assert_eq!(c.max_hp(), Some(40));
    }

    #[test]
    fn test_resistances_concatenate() {
        let mut c = Combatant::new("Barbarian").with_resistances(Resistances {
            resist: vec![Resistance::new("slashing")],
            ..Default::default()
        });
        c.push_effect(effect_with(PassiveEffects {
            resistances: vec![Resistance::new("fire")],
            ..Default::default()
        }));
        let resistances = c.resistances();
        assert_eq!(resistances.resist.len(), 2);
        assert!(resistances.is_resistant("fire"));
        assert!(resistances.is_resistant("slashing"));
    }

    #[test]
    fn test_save_advantage_cancels() {
        let mut c = Combatant::new("Paladin");
        c.push_effect(effect_with(PassiveEffects {
            save_adv: [Ability::Wisdom].into(),
            ..Default::default()
        }));
        assert_eq!(c.save_advantage(Ability::Wisdom), AdvantageType::Adv);
        assert_eq!(c.save_advantage(Ability::Strength), AdvantageType::None);

        c.push_effect(effect_with(PassiveEffects {
            save_dis: [Ability::Wisdom].into(),
            ..Default::default()
        }));
        assert_eq!(c.save_advantage(Ability::Wisdom), AdvantageType::None);
    }

    #[test]
    fn test_damage_hits_temp_hp_first() {
        let mut c = Combatant::new("Cleric").with_hp(20);
        c.set_temp_hp(5);
        c.modify_hp(-8, true);
        assert_eq!(c.temp_hp, 0);
        assert_eq!(c.hp, Some(17));
    }

    #[test]
    fn test_healing_clamped_without_overflow() {
        let mut c = Combatant::new("Cleric").with_hp(20);
        c.hp = Some(15);
        c.modify_hp(20, false);
        assert_eq!(c.hp, Some(20));

        c.hp = Some(15);
        c.modify_hp(20, true);
        assert_eq!(c.hp, Some(35));
    }

    #[test]
    fn test_hp_str() {
        let mut c = Combatant::new("Cleric").with_hp(20);
        c.set_temp_hp(3);
        assert_eq!(c.hp_str(), "<20/20 HP> (+3 temp)");
    }

    #[test]
    fn test_get_effect_matching() {
        let mut c = Combatant::new("Wizard");
        c.push_effect(AppliedEffect::new("Mage Armor"));
        assert!(c.get_effect("Mage Armor", true).is_some());
        assert!(c.get_effect("mage", true).is_none());
        assert!(c.get_effect("mage", false).is_some());
    }
}
