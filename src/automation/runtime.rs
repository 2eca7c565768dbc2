//! Automation runtime
//!
//! The execution context for one run: who is casting, who is targeted,
//! the argument bag, named intermediate values, crit state, and the output
//! queues the report is built from. The context is created per run and
//! exclusively owned by it.

use std::collections::{BTreeMap, HashMap};

use crate::args::Args;
use crate::config::Limits;
use crate::dice::{self, DieRoller, Expr, RollContext, RollResult};
use crate::initiative::{Combat, Combatant, EffectRef};
use crate::sheet::{Ability, AdvantageType, Resistances};

use super::errors::AutomationError;

/// The spell a run is cast from, when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpellRef {
    pub name: String,
    pub level: u32,
}

/// Optional knobs for a run.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub spell: Option<SpellRef>,
    /// Cast level override; defaults to the spell's own level.
    pub cast_level: Option<u32>,
    pub ab_override: Option<i64>,
    pub dc_override: Option<i64>,
    /// Concentration effect new effect grants are parented to.
    pub conc_effect: Option<EffectRef>,
    /// Recipient of hidden rolls; defaults to the caster's name.
    pub invoker_id: Option<String>,
    pub limits: Limits,
}

/// The entity initiating a run.
pub enum Caster<'a> {
    /// A character outside any tracked combat.
    Loose(&'a mut Combatant),
    /// A combatant in the supplied combat, by id.
    InCombat(String),
}

/// One entry in the target list supplied by the caller.
pub enum TargetInput<'a> {
    /// A bare name; mechanical resolution is skipped for it.
    Simple(String),
    Loose(&'a mut Combatant),
    InCombat(String),
}

enum Slot<'a> {
    Simple(String),
    Loose(&'a mut Combatant),
    InCombat(String),
}

/// The target a node currently resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationTarget {
    /// Placeholder when the run has no targets at all.
    None,
    /// The caster itself (a `self` target specifier).
    Caster,
    /// An entry of the target list.
    Slot(usize),
}

/// One output field of a report, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub title: String,
    pub body: String,
    pub inline: bool,
}

/// The presentation-ready outcome of a run; consumed by a chat layer that
/// is not implemented here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub fields: Vec<Field>,
    pub footer: String,
    /// Private lines, per recipient.
    pub private: BTreeMap<String, Vec<String>>,
}

pub struct AutomationContext<'a> {
    pub(crate) combat: Option<&'a mut Combat>,
    caster: Caster<'a>,
    slots: Vec<Slot<'a>>,
    pub args: Args,
    pub limits: Limits,
    spell: Option<SpellRef>,
    cast_level: Option<u32>,
    pub(crate) ab_override: Option<i64>,
    pub(crate) dc_override: Option<i64>,
    pub(crate) conc_effect: Option<EffectRef>,
    invoker_id: Option<String>,
    /// Set while resolving an attack's hit branch during a critical hit.
    pub in_crit: bool,
    /// Named intermediate values; visible to all later nodes in the run.
    pub metavars: HashMap<String, String>,
    pub caster_needs_commit: bool,
    target: Option<AutomationTarget>,
    roller: &'a mut dyn DieRoller,
    roll_cx: RollContext,
    meta_queue: Vec<String>,
    embed_queue: Vec<String>,
    effect_queue: Vec<(String, String)>,
    footer_queue: Vec<String>,
    field_queue: Vec<Field>,
    pm_queue: BTreeMap<String, Vec<String>>,
}

impl<'a> AutomationContext<'a> {
    pub fn new(
        caster: Caster<'a>,
        targets: Vec<TargetInput<'a>>,
        args: Args,
        combat: Option<&'a mut Combat>,
        roller: &'a mut dyn DieRoller,
        opts: RunOptions,
    ) -> Result<Self, AutomationError> {
        if let Caster::InCombat(id) = &caster {
            resolve_in_combat(combat.as_deref(), id)?;
        }
        let slots: Vec<Slot<'a>> = targets
            .into_iter()
            .map(|t| match t {
                TargetInput::Simple(name) => Ok(Slot::Simple(name)),
                TargetInput::Loose(c) => Ok(Slot::Loose(c)),
                TargetInput::InCombat(id) => {
                    resolve_in_combat(combat.as_deref(), &id)?;
                    Ok(Slot::InCombat(id))
                }
            })
            .collect::<Result<_, AutomationError>>()?;

        let roll_cx = RollContext::new(opts.limits.max_rolls);
        Ok(Self {
            combat,
            caster,
            slots,
            args,
            limits: opts.limits,
            spell: opts.spell,
            cast_level: opts.cast_level,
            ab_override: opts.ab_override,
            dc_override: opts.dc_override,
            conc_effect: opts.conc_effect,
            invoker_id: opts.invoker_id,
            in_crit: false,
            metavars: HashMap::new(),
            caster_needs_commit: false,
            target: None,
            roller,
            roll_cx,
            meta_queue: Vec::new(),
            embed_queue: Vec::new(),
            effect_queue: Vec::new(),
            footer_queue: Vec::new(),
            field_queue: Vec::new(),
            pm_queue: BTreeMap::new(),
        })
    }

    // ==== caster ====

    pub fn caster(&self) -> Result<&Combatant, AutomationError> {
        match &self.caster {
            Caster::Loose(c) => Ok(&**c),
            Caster::InCombat(id) => resolve_in_combat(self.combat.as_deref(), id),
        }
    }

    pub fn caster_mut(&mut self) -> Result<&mut Combatant, AutomationError> {
        match &mut self.caster {
            Caster::Loose(c) => Ok(&mut **c),
            Caster::InCombat(id) => self
                .combat
                .as_deref_mut()
                .and_then(|combat| combat.combatant_by_id_mut(id))
                .ok_or_else(|| AutomationError::UnknownCombatant(id.clone())),
        }
    }

    fn caster_combat_id(&self) -> Option<String> {
        match &self.caster {
            Caster::InCombat(id) => Some(id.clone()),
            Caster::Loose(_) => None,
        }
    }

    // ==== spell context ====

    pub fn is_spell(&self) -> bool {
        self.spell.is_some()
    }

    pub fn spell(&self) -> Option<&SpellRef> {
        self.spell.as_ref()
    }

    /// The level the origin spell was cast at: `l` argument, then the
    /// caller's override, then the spell's own level.
    pub fn get_cast_level(&self) -> u32 {
        self.args
            .last_u32("l")
            .or(self.cast_level)
            .or(self.spell.as_ref().map(|s| s.level))
            .unwrap_or(0)
    }

    /// Recipient for hidden rolls.
    pub fn invoker(&self) -> String {
        if let Some(id) = &self.invoker_id {
            return id.clone();
        }
        self.caster()
            .map(|c| c.name.clone())
            .unwrap_or_else(|_| "invoker".to_string())
    }

    // ==== current target ====

    /// Swaps the current resolution target, returning the previous one and
    /// updating the `target` metavar.
    pub fn set_target(&mut self, target: Option<AutomationTarget>) -> Option<AutomationTarget> {
        let previous = std::mem::replace(&mut self.target, target);
        match self.target_name() {
            Some(name) => {
                self.metavars.insert("target".to_string(), name);
            }
            None => {
                self.metavars.remove("target");
            }
        }
        previous
    }

    pub fn target(&self) -> Option<AutomationTarget> {
        self.target
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// A target is "simple" when it has no stat block to resolve against:
    /// the no-target placeholder or a bare name.
    pub fn target_is_simple(&self) -> bool {
        self.target_combatant().is_none()
    }

    pub fn target_name(&self) -> Option<String> {
        match self.target? {
            AutomationTarget::None => None,
            AutomationTarget::Caster => self.caster().ok().map(|c| c.name.clone()),
            AutomationTarget::Slot(i) => match self.slots.get(i)? {
                Slot::Simple(name) => Some(name.clone()),
                Slot::Loose(c) => Some(c.name.clone()),
                Slot::InCombat(id) => self
                    .combat
                    .as_deref()
                    .and_then(|combat| combat.combatant_by_id(id))
                    .map(|c| c.name.clone()),
            },
        }
    }

    pub fn target_combatant(&self) -> Option<&Combatant> {
        match self.target? {
            AutomationTarget::None => None,
            AutomationTarget::Caster => self.caster().ok(),
            AutomationTarget::Slot(i) => match self.slots.get(i)? {
                Slot::Simple(_) => None,
                Slot::Loose(c) => Some(&**c),
                Slot::InCombat(id) => self
                    .combat
                    .as_deref()
                    .and_then(|combat| combat.combatant_by_id(id)),
            },
        }
    }

    pub fn target_combatant_mut(&mut self) -> Option<&mut Combatant> {
        let target = self.target?;
        match target {
            AutomationTarget::None => None,
            AutomationTarget::Caster => self.caster_mut().ok(),
            AutomationTarget::Slot(i) => match self.slots.get_mut(i)? {
                Slot::Simple(_) => None,
                Slot::Loose(c) => Some(&mut **c),
                Slot::InCombat(id) => {
                    let id = id.clone();
                    self.combat
                        .as_deref_mut()
                        .and_then(|combat| combat.combatant_by_id_mut(&id))
                }
            },
        }
    }

    /// Combat-tracked id of the current target, when it has one.
    pub fn target_combat_id(&self) -> Option<String> {
        match self.target? {
            AutomationTarget::None => None,
            AutomationTarget::Caster => self.caster_combat_id(),
            AutomationTarget::Slot(i) => match self.slots.get(i)? {
                Slot::InCombat(id) => Some(id.clone()),
                _ => None,
            },
        }
    }

    pub fn target_ac(&self) -> Option<i64> {
        self.target_combatant().and_then(|c| c.ac())
    }

    pub fn target_resistances(&self) -> Resistances {
        self.target_combatant()
            .map(|c| c.resistances())
            .unwrap_or_default()
    }

    /// Builds the current target's save-roll dice string: the advantage
    /// d20, its save modifier, and any effect-granted save bonuses.
    pub fn target_save_dice(
        &self,
        ability: Ability,
        adv: AdvantageType,
    ) -> Result<String, AutomationError> {
        let target = self
            .target_combatant()
            .ok_or(AutomationError::TargetIsSimple)?;
        let mut out = format!("{}{:+}", adv.d20(None), target.saves.bonus(ability));
        for bonus in target.save_bonuses() {
            out.push('+');
            out.push_str(&bonus);
        }
        Ok(out)
    }

    /// Applies damage (negative heals) to the current target and reports
    /// the HP change: in the footer, or privately for hidden combatants.
    pub fn deal_damage(&mut self, amount: i64, overheal: bool) {
        struct HpChange {
            name: String,
            initial_hp: Option<i64>,
            initial_temp: i64,
            hp_str: String,
            new_hp: Option<i64>,
            new_temp: i64,
            is_private: bool,
            controller: Option<String>,
            concentrating: bool,
        }

        let change = match self.target_combatant_mut() {
            Some(target) => {
                let initial_hp = target.hp;
                let initial_temp = target.temp_hp;
                let hp_str = target.modify_hp(-amount, overheal);
                Some(HpChange {
                    name: target.name.clone(),
                    initial_hp,
                    initial_temp,
                    hp_str,
                    new_hp: target.hp,
                    new_temp: target.temp_hp,
                    is_private: target.is_private,
                    controller: target.controller_id.clone(),
                    concentrating: target.is_concentrating(),
                })
            }
            None => None,
        };

        let Some(change) = change else {
            let name = self
                .target_name()
                .unwrap_or_else(|| "<No Target>".to_string());
            self.footer_queue(format!("{}: Dealt {} damage!", name, amount));
            return;
        };
        let Some(new_hp) = change.new_hp else {
            self.footer_queue(format!("{}: Dealt {} damage!", change.name, amount));
            return;
        };
        let initial_hp = change.initial_hp.unwrap_or(0);

        let mut deltas = Vec::new();
        if change.new_temp != change.initial_temp {
            deltas.push(format!("{:+} temp", change.new_temp - change.initial_temp));
        }
        if new_hp != initial_hp {
            deltas.push(format!("{:+} HP", new_hp - initial_hp));
        }
        let total_delta = (change.new_temp + new_hp) - (change.initial_temp + initial_hp);
        if -amount != total_delta {
            deltas.push(format!("{} overflow", (amount + total_delta).abs()));
        }
        let mut delta_str = if deltas.is_empty() {
            String::new()
        } else {
            format!(" ({})", deltas.join(", "))
        };

        if change.is_private {
            if let Some(controller) = &change.controller {
                self.add_pm(
                    controller,
                    format!("{}'s HP: {}{}", change.name, change.hp_str, delta_str),
                );
            }
            // the footer only shows the net change for hidden combatants
            delta_str = if deltas.is_empty() {
                String::new()
            } else {
                format!(" ({:+})", total_delta)
            };
        }

        if change.concentrating && amount > 0 {
            self.queue(format!("**Concentration**: DC {}", (amount / 2).max(10)));
        }

        self.footer_queue(format!("{}: {}{}", change.name, change.hp_str, delta_str));
    }

    /// Sets the current target's temp HP and reports the new HP string.
    pub fn set_target_temp_hp(&mut self, amount: i64) {
        if let Some(target) = self.target_combatant_mut() {
            target.set_temp_hp(amount);
            let name = target.name.clone();
            let hp_str = target.hp_str();
            self.footer_queue(format!("{}: {}", name, hp_str));
        }
    }

    // ==== strings and rolls ====

    /// Interpolates `{name}` references to named intermediate values.
    pub fn parse_annostr(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, value) in &self.metavars {
            out = out.replace(&format!("{{{}}}", name), value);
        }
        out
    }

    /// Parses an optionally-interpolated integer expression.
    pub fn parse_intexpr(&self, text: &str) -> Result<i64, AutomationError> {
        let interpolated = self.parse_annostr(text);
        interpolated
            .trim()
            .parse()
            .map_err(|_| AutomationError::InvalidIntExpression(text.to_string()))
    }

    /// Rolls an expression against the run's shared roll-count budget.
    pub fn roll(&mut self, ast: &Expr) -> Result<RollResult, AutomationError> {
        Ok(dice::roll(ast, &mut *self.roller, &mut self.roll_cx)?)
    }

    pub fn set_metavar(&mut self, name: &str, value: impl ToString) {
        self.metavars.insert(name.to_string(), value.to_string());
    }

    // ==== output queues ====

    /// Adds a line to the current target field.
    pub fn queue(&mut self, text: impl Into<String>) {
        self.embed_queue.push(text.into());
    }

    /// Adds a line to the run-wide meta field; lines are unique.
    pub fn meta_queue(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.meta_queue.contains(&text) {
            self.meta_queue.push(text);
        }
    }

    /// Adds a line to the footer.
    pub fn footer_queue(&mut self, text: impl Into<String>) {
        self.footer_queue.push(text.into());
    }

    /// Adds a line to an effect field; (title, line) pairs are unique.
    pub fn effect_queue(&mut self, title: impl Into<String>, text: impl Into<String>) {
        let pair = (title.into(), text.into());
        if !self.effect_queue.contains(&pair) {
            self.effect_queue.push(pair);
        }
    }

    /// Adds a private line for a recipient.
    pub fn add_pm(&mut self, recipient: &str, text: impl Into<String>) {
        self.pm_queue
            .entry(recipient.to_string())
            .or_default()
            .push(text.into());
    }

    /// Closes the current target field, pushing queued lines under a title.
    pub fn push_embed_field(&mut self, title: impl Into<String>, inline: bool) {
        if self.embed_queue.is_empty() {
            return;
        }
        let body = std::mem::take(&mut self.embed_queue).join("\n");
        self.field_queue.push(Field {
            title: title.into(),
            body,
            inline,
        });
    }

    /// Moves queued lines to the meta field instead of a titled field.
    pub fn push_embed_field_to_meta(&mut self) {
        for line in std::mem::take(&mut self.embed_queue) {
            if !self.meta_queue.contains(&line) {
                self.meta_queue.push(line);
            }
        }
    }

    /// Consumes every queue and produces the final report.
    pub fn into_report(mut self) -> Report {
        self.push_embed_field_to_meta();
        let mut fields = Vec::new();
        if !self.meta_queue.is_empty() {
            fields.push(Field {
                title: "Meta".to_string(),
                body: self.meta_queue.join("\n"),
                inline: false,
            });
        }
        fields.extend(self.field_queue);
        for (title, body) in self.effect_queue {
            fields.push(Field {
                title,
                body,
                inline: false,
            });
        }
        Report {
            fields,
            footer: self.footer_queue.join("\n"),
            private: self.pm_queue,
        }
    }
}

/// Truncates to at most `max` bytes on a char boundary, appending an
/// ellipsis when anything was cut.
pub(crate) fn truncate_with_ellipsis(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

fn resolve_in_combat<'c>(
    combat: Option<&'c Combat>,
    id: &str,
) -> Result<&'c Combatant, AutomationError> {
    combat
        .and_then(|c| c.combatant_by_id(id))
        .ok_or_else(|| AutomationError::UnknownCombatant(id.to_string()))
}
