//! Structured results of an automation run
//!
//! Mirrors the node tree: each node type reports what it resolved, and
//! damage totals roll up through the children.

use crate::dice::RollResult;
use crate::initiative::AppliedEffect;
use crate::sheet::{Ability, AdvantageType};

use super::runtime::Report;

/// The overall result of one automation run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub children: Vec<NodeResult>,
    pub is_spell: bool,
    /// Whether the run mutated the caster (the surrounding layer commits).
    pub caster_needs_commit: bool,
    pub report: Report,
}

impl RunResult {
    pub fn damage(&self) -> i64 {
        self.children.iter().map(NodeResult::damage).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    Target(TargetResult),
    Attack(AttackResult),
    Save(SaveResult),
    Damage(DamageResult),
    TempHp(TempHpResult),
    EffectGrant(EffectGrantResult),
    NamedRoll(NamedRollResult),
    Text(TextResult),
}

impl NodeResult {
    /// Total damage dealt under this node.
    pub fn damage(&self) -> i64 {
        match self {
            NodeResult::Damage(d) => d.damage,
            NodeResult::Target(t) => t
                .results
                .iter()
                .flatten()
                .map(NodeResult::damage)
                .sum(),
            NodeResult::Attack(a) => a.children.iter().map(NodeResult::damage).sum(),
            NodeResult::Save(s) => s.children.iter().map(NodeResult::damage).sum(),
            _ => 0,
        }
    }
}

/// Per-iteration results against each resolved target; the same target
/// appears once per repeat iteration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetResult {
    pub targets: Vec<Option<String>>,
    pub results: Vec<Vec<NodeResult>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttackResult {
    /// Resolved attack bonus, not including ephemeral `b` bonuses.
    pub attack_bonus: Option<i64>,
    pub ac: Option<i64>,
    /// `None` iff the outcome was forced.
    pub to_hit: Option<RollResult>,
    pub adv: AdvantageType,
    pub did_hit: bool,
    pub did_crit: bool,
    pub children: Vec<NodeResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    pub dc: i64,
    pub ability: Ability,
    /// `None` when the target is simple or the outcome was forced.
    pub save_roll: Option<RollResult>,
    pub adv: AdvantageType,
    pub did_save: bool,
    pub children: Vec<NodeResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DamageResult {
    pub damage: i64,
    pub roll: RollResult,
    pub in_crit: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TempHpResult {
    pub amount: i64,
    pub roll: RollResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectGrantResult {
    pub effect: AppliedEffect,
    /// Names of concentration effects the grant evicted.
    pub conc_dropped: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedRollResult {
    pub result: i64,
    pub roll: RollResult,
    /// Rerollable simplified form stored in the metavar map.
    pub simplified: String,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextResult {
    pub text: String,
}
