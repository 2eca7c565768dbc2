//! Initiative tracking
//!
//! The combat arena: combatants in turn order, the round counter, and the
//! lifecycle of applied effects. Effects are owned by their combatant and
//! referenced everywhere else by (combatant id, effect id) pairs; removal
//! cascades depth-first through child references with a cycle guard.

mod combatant;
pub mod effects;

pub use combatant::Combatant;
pub use effects::{AppliedEffect, EffectRef, TurnBoundary};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombatError {
    #[error("no combatant with id {0:?} in this combat")]
    UnknownCombatant(String),
}

/// Result of granting an effect to a combatant.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantOutcome {
    pub effect: EffectRef,
    /// Names of concentration effects evicted by this grant.
    pub conc_dropped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combat {
    pub channel_id: String,
    /// Current round; 0 before the first turn.
    #[serde(default)]
    pub round: u32,
    /// Turn pointer into the combatant list; `None` before combat starts.
    #[serde(default)]
    turn_index: Option<usize>,
    #[serde(default)]
    combatants: Vec<Combatant>,
}

impl Combat {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            round: 0,
            turn_index: None,
            combatants: Vec::new(),
        }
    }

    // ==== combatants ====

    /// Adds a combatant at the end of the turn order, returning its id.
    pub fn add_combatant(&mut self, mut combatant: Combatant) -> String {
        combatant.index = Some(self.combatants.len());
        let id = combatant.id.clone();
        self.combatants.push(combatant);
        id
    }

    pub fn combatants(&self) -> &[Combatant] {
        &self.combatants
    }

    pub fn combatant_by_id(&self, id: &str) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn combatant_by_id_mut(&mut self, id: &str) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.id == id)
    }

    pub fn combatant_at(&self, index: usize) -> Option<&Combatant> {
        self.combatants.get(index)
    }

    pub fn turn_index(&self) -> Option<usize> {
        self.turn_index
    }

    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.combatants.get(self.turn_index?)
    }

    /// Moves the turn pointer without firing boundary hooks (setup, undo).
    pub fn set_turn_index(&mut self, index: Option<usize>) {
        self.turn_index = index;
    }

    /// Removes a combatant, cascading away its effects (and their children
    /// on other combatants) first, then reindexes the turn order.
    pub fn remove_combatant(&mut self, id: &str) -> Option<Combatant> {
        let refs: Vec<EffectRef> = self
            .combatant_by_id(id)?
            .get_effects()
            .iter()
            .filter_map(|e| e.reference())
            .collect();
        for eref in refs {
            self.remove_effect(&eref);
        }

        let pos = self.combatants.iter().position(|c| c.id == id)?;
        let removed = self.combatants.remove(pos);
        for (i, combatant) in self.combatants.iter_mut().enumerate() {
            combatant.index = Some(i);
        }
        match self.turn_index {
            Some(t) if t > pos => self.turn_index = Some(t - 1),
            Some(t) if t >= self.combatants.len() => {
                self.turn_index = if self.combatants.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            _ => {}
        }
        Some(removed)
    }

    // ==== turn machinery ====

    /// Advances to the next turn, firing end-of-turn hooks for the current
    /// combatant and start-of-turn hooks for the next. The round counter
    /// increments when the order wraps (or combat starts).
    pub fn advance_turn(&mut self) {
        if self.combatants.is_empty() {
            return;
        }
        if let Some(current) = self.turn_index {
            self.expire_effects(current, TurnBoundary::TurnEnd);
        }
        let next = match self.turn_index {
            None => {
                self.round += 1;
                0
            }
            Some(i) if i + 1 >= self.combatants.len() => {
                self.round += 1;
                0
            }
            Some(i) => i + 1,
        };
        self.turn_index = Some(next);
        self.expire_effects(next, TurnBoundary::TurnStart);
    }

    /// Removes every effect on the combatant at `index` whose derived
    /// remaining duration has run out at this boundary.
    fn expire_effects(&mut self, index: usize, boundary: TurnBoundary) {
        let Some(combatant) = self.combatants.get(index) else {
            return;
        };
        let expired: Vec<EffectRef> = combatant
            .get_effects()
            .iter()
            .filter(|e| e.expired_at(boundary, self.round))
            .filter_map(|e| e.reference())
            .collect();
        for eref in expired {
            debug!(effect = %eref.effect_id, "effect expired at turn boundary");
            self.remove_effect(&eref);
        }
    }

    // ==== effects ====

    pub fn effect(&self, eref: &EffectRef) -> Option<&AppliedEffect> {
        self.combatant_by_id(&eref.combatant_id)?
            .effect_by_id(&eref.effect_id)
    }

    /// Grants an effect to a combatant: a same-named effect is replaced, a
    /// concentration grant evicts every other concentration effect first,
    /// `end_round` is fixed against the current round/turn, and the effect
    /// is parented if requested.
    pub fn add_effect(
        &mut self,
        combatant_id: &str,
        mut effect: AppliedEffect,
        parent: Option<&EffectRef>,
    ) -> Result<GrantOutcome, CombatError> {
        let owner_index = self
            .combatant_by_id(combatant_id)
            .ok_or_else(|| CombatError::UnknownCombatant(combatant_id.to_string()))?
            .index;

        // a combatant holds at most one effect per exact name
        if let Some(existing) = self
            .combatant_by_id(combatant_id)
            .and_then(|c| c.get_effect(&effect.name, true))
            .and_then(|e| e.reference())
        {
            self.remove_effect(&existing);
        }

        // concentration is exclusive per combatant
        let mut conc_dropped = Vec::new();
        if effect.concentration {
            let concentrating: Vec<EffectRef> = self
                .combatant_by_id(combatant_id)
                .map(|c| {
                    c.get_effects()
                        .iter()
                        .filter(|e| e.concentration)
                        .filter_map(|e| e.reference())
                        .collect()
                })
                .unwrap_or_default();
            for eref in concentrating {
                if let Some(e) = self.effect(&eref) {
                    conc_dropped.push(e.name.clone());
                }
                self.remove_effect(&eref);
            }
        }

        effect.tether(self.round, owner_index, self.turn_index);
        effect.owner = Some(combatant_id.to_string());
        let eref = EffectRef {
            combatant_id: combatant_id.to_string(),
            effect_id: effect.id.clone(),
        };

        if let Some(parent_ref) = parent {
            effect.parent = Some(parent_ref.clone());
            if let Some(parent_effect) = self
                .combatant_by_id_mut(&parent_ref.combatant_id)
                .and_then(|c| c.effect_by_id_mut(&parent_ref.effect_id))
            {
                parent_effect.children.push(eref.clone());
            }
        }

        debug!(combatant = combatant_id, effect = %effect.name, "applying effect");
        if let Some(combatant) = self.combatant_by_id_mut(combatant_id) {
            combatant.push_effect(effect);
        }
        Ok(GrantOutcome {
            effect: eref,
            conc_dropped,
        })
    }

    /// Removes an effect, cascading depth-first through its children
    /// before detaching it from its owner. Already-removed children are
    /// skipped; the walk is cycle-guarded.
    pub fn remove_effect(&mut self, eref: &EffectRef) {
        let mut seen = HashSet::new();
        self.remove_effect_inner(eref, &mut seen);
    }

    fn remove_effect_inner(&mut self, eref: &EffectRef, seen: &mut HashSet<EffectRef>) {
        if !seen.insert(eref.clone()) {
            return;
        }
        let children = match self.effect(eref) {
            Some(effect) => effect.children.clone(),
            None => return, // already removed elsewhere
        };
        for child in children {
            self.remove_effect_inner(&child, seen);
        }
        if let Some(combatant) = self.combatant_by_id_mut(&eref.combatant_id) {
            combatant.take_effect(&eref.effect_id);
            debug!(effect = %eref.effect_id, "removed effect");
        }
    }

    /// Re-establishes the owner backreferences after deserialization.
    pub fn restore_owners(&mut self) {
        for combatant in &mut self.combatants {
            combatant.restore_effect_owners();
        }
    }
}
