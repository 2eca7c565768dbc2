//! Applied effects
//!
//! An applied effect is a bundle of time-limited modifiers attached to a
//! combatant. Expiry is measured in rounds of the owner's turn, never
//! wall-clock time: `end_round` is fixed when the effect is created and the
//! remaining duration is always derived from it, never counted down.
//!
//! Parent/child links between effects are stored as (combatant id,
//! effect id) pairs and resolved through the combat on demand, so the graph
//! survives serialization and never forms ownership cycles.

mod interaction;
mod passive;

pub use interaction::{GrantedAttack, GrantedButton};
pub use passive::PassiveEffects;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Combat;

/// Weak reference to an effect on some combatant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectRef {
    pub combatant_id: String,
    pub effect_id: String,
}

/// Which turn boundary an expiry check is running at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnBoundary {
    TurnStart,
    TurnEnd,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn schema_version() -> u8 {
    2
}

/// One bundle of time-limited modifiers on a combatant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEffect {
    pub id: String,
    /// Owning combatant id; implied by storage location, so not serialized.
    #[serde(skip)]
    pub owner: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "PassiveEffects::is_empty")]
    pub effects: PassiveEffects,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attacks: Vec<GrantedAttack>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<GrantedButton>,
    /// Duration in rounds; `None` is indefinite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Absolute round at which expiry is scheduled. Fixed at creation;
    /// unset when indefinite or untethered from a live combat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_round: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub end_on_turn_end: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub concentration: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EffectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EffectRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(rename = "_v", default = "schema_version")]
    pub version: u8,
}

impl AppliedEffect {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner: None,
            name: name.into(),
            effects: PassiveEffects::default(),
            attacks: Vec::new(),
            buttons: Vec::new(),
            duration: None,
            end_round: None,
            end_on_turn_end: false,
            concentration: false,
            children: Vec::new(),
            parent: None,
            desc: None,
            version: schema_version(),
        }
    }

    pub fn with_effects(mut self, effects: PassiveEffects) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_attacks(mut self, attacks: Vec<GrantedAttack>) -> Self {
        self.attacks = attacks;
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<GrantedButton>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_duration(mut self, duration: Option<u32>) -> Self {
        self.duration = duration;
        self
    }

    pub fn end_on_turn_end(mut self, end: bool) -> Self {
        self.end_on_turn_end = end;
        self
    }

    pub fn concentration(mut self, conc: bool) -> Self {
        self.concentration = conc;
        self
    }

    pub fn with_desc(mut self, desc: Option<String>) -> Self {
        self.desc = desc;
        self
    }

    pub fn reference(&self) -> Option<EffectRef> {
        self.owner.as_ref().map(|owner| EffectRef {
            combatant_id: owner.clone(),
            effect_id: self.id.clone(),
        })
    }

    /// Fixes `end_round` against a live combat. The effect lasts exactly
    /// `duration` ticks of the owner's turn regardless of creation timing:
    /// if the owner's tick for the current round is still pending, that
    /// pending tick counts as the first.
    pub(crate) fn tether(
        &mut self,
        round: u32,
        owner_index: Option<usize>,
        turn_index: Option<usize>,
    ) {
        let Some(duration) = self.duration else {
            self.end_round = None;
            return;
        };
        let ticked = owner_has_ticked(turn_index, owner_index, self.end_on_turn_end);
        let end = i64::from(round) + i64::from(duration) - if ticked { 0 } else { 1 };
        self.end_round = Some(end.max(0) as u32);
    }

    /// Rounds of the owner's turn left before expiry; `None` when
    /// indefinite or untethered. Derived, never stored.
    pub fn remaining(&self, combat: &Combat) -> Option<i64> {
        let end_round = i64::from(self.end_round?);
        let round = i64::from(combat.round);
        let owner_index = self.owner_index(combat);
        match (combat.turn_index(), owner_index) {
            (Some(turn), Some(owner)) => {
                let ticked = owner_has_ticked(Some(turn), Some(owner), self.end_on_turn_end);
                Some(end_round - (round - if ticked { 0 } else { 1 }))
            }
            _ => Some(end_round - round),
        }
    }

    /// Whether a boundary hook at the current round should remove this
    /// effect: derived remaining has hit zero and the boundary flavor
    /// matches.
    pub fn expired_at(&self, boundary: TurnBoundary, round: u32) -> bool {
        let Some(end_round) = self.end_round else {
            return false;
        };
        let flavor_matches = match boundary {
            TurnBoundary::TurnStart => !self.end_on_turn_end,
            TurnBoundary::TurnEnd => self.end_on_turn_end,
        };
        flavor_matches && round >= end_round
    }

    fn owner_index(&self, combat: &Combat) -> Option<usize> {
        let owner = self.owner.as_ref()?;
        combat.combatant_by_id(owner).and_then(|c| c.index)
    }

    /// Sort key for finding the effect in a parent chain that ends first.
    fn duration_cmp(&self, combat: &Combat) -> (i64, i64, u8) {
        let end_round = self.end_round.map(i64::from).unwrap_or(i64::MAX);
        let index = self.owner_index(combat).map(|i| i as i64).unwrap_or(0);
        (end_round, index, u8::from(self.end_on_turn_end))
    }

    /// Renders this effect's remaining duration, honoring the parent chain:
    /// whichever linked effect ends first bounds this one too.
    pub fn duration_str(&self, combat: Option<&Combat>) -> String {
        let Some(combat) = combat else {
            return match self.duration {
                Some(d) => format!("[{} rounds]", d),
                None => String::new(),
            };
        };

        // minimum duration across the (cycle-guarded) parent chain
        let mut min = self.duration_cmp(combat);
        let mut seen: HashSet<String> = HashSet::from([self.id.clone()]);
        let mut parent = self.parent.as_ref().and_then(|p| combat.effect(p));
        while let Some(p) = parent {
            if !seen.insert(p.id.clone()) {
                break;
            }
            min = min.min(p.duration_cmp(combat));
            parent = p.parent.as_ref().and_then(|r| combat.effect(r));
        }

        let (end_round, tick_index, ticks_on_end) = min;
        if end_round == i64::MAX {
            return String::new();
        }

        let round = i64::from(combat.round);
        let ticks_remaining = match (combat.turn_index(), self.owner_index(combat)) {
            (Some(turn), Some(_)) => {
                let ticked = if ticks_on_end == 1 {
                    (turn as i64) > tick_index
                } else {
                    (turn as i64) >= tick_index
                };
                end_round - (round - if ticked { 0 } else { 1 })
            }
            _ => end_round - round,
        };

        if ticks_remaining <= 1 {
            let on_other_turn = self
                .owner_index(combat)
                .map(|i| i as i64 != tick_index)
                .unwrap_or(false);
            if on_other_turn {
                let name = combat
                    .combatant_at(tick_index as usize)
                    .map(|c| c.name.as_str())
                    .unwrap_or("another combatant");
                if ticks_on_end == 1 {
                    return format!("[until end of {}'s turn]", name);
                }
                return format!("[until start of {}'s next turn]", name);
            }
            if ticks_on_end == 1 {
                return "[until end of turn]".to_string();
            }
            return "[until start of next turn]".to_string();
        }

        let (divisor, unit) = if ticks_remaining > 5_256_000 {
            (5_256_000, "year")
        } else if ticks_remaining > 438_000 {
            (438_000, "month")
        } else if ticks_remaining > 100_800 {
            (100_800, "week")
        } else if ticks_remaining > 14_400 {
            (14_400, "day")
        } else if ticks_remaining > 600 {
            (600, "hour")
        } else if ticks_remaining > 10 {
            (10, "minute")
        } else {
            (1, "round")
        };

        if divisor > 1 {
            let scaled = (ticks_remaining as f64 / divisor as f64 * 10.0).round() / 10.0;
            format!("[{} {}s]", scaled, unit)
        } else {
            format!("[{} {}s]", ticks_remaining, unit)
        }
    }

    /// Full display string: name, duration, parenthetical modifier summary,
    /// concentration marker, and optionally the description.
    pub fn describe(&self, combat: Option<&Combat>, description: bool) -> String {
        let mut out = vec![self.name.clone()];
        let duration = self.duration_str(combat);
        if !duration.is_empty() {
            out.push(duration);
        }
        let parenthetical = self.parenthetical_str(combat);
        if !parenthetical.is_empty() {
            out.push(parenthetical);
        }
        if self.concentration {
            out.push("<C>".to_string());
        }
        if description {
            if let Some(desc) = &self.desc {
                out.push(format!("\n - {}", desc));
            }
        }
        out.join(" ").trim().to_string()
    }

    fn parenthetical_str(&self, combat: Option<&Combat>) -> String {
        let mut text = Vec::new();
        if !self.effects.is_empty() {
            text.push(self.effects.to_string());
        }
        for attack in &self.attacks {
            text.push(attack.to_string());
        }
        for button in &self.buttons {
            text.push(button.to_string());
        }
        if let Some(parent) = combat
            .and_then(|c| self.parent.as_ref().and_then(|p| c.effect(p)))
        {
            text.push(format!("Parent: {}", parent.name));
        }
        if text.is_empty() {
            String::new()
        } else {
            format!("({})", text.join("; "))
        }
    }
}

fn owner_has_ticked(
    turn_index: Option<usize>,
    owner_index: Option<usize>,
    end_on_turn_end: bool,
) -> bool {
    match (turn_index, owner_index) {
        (Some(turn), Some(owner)) => {
            if end_on_turn_end {
                turn > owner
            } else {
                turn >= owner
            }
        }
        _ => false,
    }
}
