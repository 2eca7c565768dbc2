//! Automation
//!
//! The effect-description language and its interpreter. An automation is an
//! ordered list of typed nodes (attack, save, damage, effect grant, ...)
//! owned by an attack or spell definition; running one resolves targets,
//! rolls dice, mutates combatant state, and builds a structured report.
//!
//! Node dispatch is a closed tagged union: adding a node type is a
//! compile-time-checked change everywhere it matters.

mod attack;
mod damage;
mod errors;
mod grant;
mod results;
mod roll;
mod runtime;
mod save;
mod target;
mod text;

pub use errors::AutomationError;
pub use results::{
    AttackResult, DamageResult, EffectGrantResult, NamedRollResult, NodeResult, RunResult,
    SaveResult, TargetResult, TempHpResult, TextResult,
};
pub use runtime::{
    AutomationContext, AutomationTarget, Caster, Field, Report, RunOptions, SpellRef, TargetInput,
};

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::args::Args;
use crate::dice::DieRoller;
use crate::initiative::effects::{GrantedAttack, GrantedButton, PassiveEffects};
use crate::initiative::{Combat, Combatant};

/// An ordered, immutable list of automation nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Automation(pub Vec<AutomationNode>);

impl Automation {
    /// Runs the tree. With zero targets the tree still runs once against a
    /// "no target" placeholder, so flavor-only trees produce output.
    ///
    /// Errors abort the run; mutations already applied (damage dealt to
    /// earlier targets, effects granted) are deliberately not rolled back.
    pub fn run(
        &self,
        caster: Caster<'_>,
        targets: Vec<TargetInput<'_>>,
        args: Args,
        combat: Option<&mut Combat>,
        roller: &mut dyn DieRoller,
        opts: RunOptions,
    ) -> Result<RunResult, AutomationError> {
        let mut ctx = AutomationContext::new(caster, targets, args, combat, roller, opts)?;
        let mut children = Vec::with_capacity(self.0.len());
        for node in &self.0 {
            children.push(node.run(&mut ctx)?);
        }
        let is_spell = ctx.is_spell();
        let caster_needs_commit = ctx.caster_needs_commit;
        Ok(RunResult {
            children,
            is_spell,
            caster_needs_commit,
            report: ctx.into_report(),
        })
    }

    /// Builds a short human-readable description of the tree, e.g.
    /// "Attack: +5 to hit. Hit: 2d6 damage."
    pub fn build_str(&self, caster: &Combatant) -> String {
        if self.0.is_empty() {
            return "No effects.".to_string();
        }
        let mut names = HashMap::new();
        let mut inner = build_child_str(&self.0, caster, &mut names);
        if inner.is_empty() {
            inner = self
                .0
                .iter()
                .map(|n| n.kind())
                .collect::<Vec<_>>()
                .join(", ");
        }
        let mut chars = inner.chars();
        match chars.next() {
            Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
            None => inner,
        }
    }
}

/// Duration of an effect grant: a literal round count or an interpolated
/// integer expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntExpr {
    Int(i64),
    Expr(String),
}

/// Which targets a Target node resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TargetSpecRepr", into = "TargetSpecRepr")]
pub enum TargetSpecifier {
    /// The caster.
    Caster,
    /// Every target, one at a time.
    Each,
    /// Every target (alias of `each` for this engine's semantics).
    All,
    /// One target by 1-based position.
    Index(usize),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TargetSpecRepr {
    Num(u64),
    Word(String),
}

impl TryFrom<TargetSpecRepr> for TargetSpecifier {
    type Error = String;

    fn try_from(repr: TargetSpecRepr) -> Result<Self, Self::Error> {
        match repr {
            TargetSpecRepr::Word(w) => match w.as_str() {
                "self" => Ok(TargetSpecifier::Caster),
                "each" => Ok(TargetSpecifier::Each),
                "all" => Ok(TargetSpecifier::All),
                other => Err(format!("{:?} is not a valid target specifier", other)),
            },
            TargetSpecRepr::Num(0) => Err("target index must be 1-based".to_string()),
            TargetSpecRepr::Num(n) => Ok(TargetSpecifier::Index(n as usize)),
        }
    }
}

impl From<TargetSpecifier> for TargetSpecRepr {
    fn from(spec: TargetSpecifier) -> Self {
        match spec {
            TargetSpecifier::Caster => TargetSpecRepr::Word("self".to_string()),
            TargetSpecifier::Each => TargetSpecRepr::Word("each".to_string()),
            TargetSpecifier::All => TargetSpecRepr::Word("all".to_string()),
            TargetSpecifier::Index(n) => TargetSpecRepr::Num(n as u64),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetNode {
    pub target: TargetSpecifier,
    pub effects: Vec<AutomationNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hit: Vec<AutomationNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub miss: Vec<AutomationNode>,
    #[serde(
        rename = "attackBonus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub attack_bonus: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveNode {
    /// Save ability keyword; matched case-insensitively by substring
    /// against the six ability names.
    pub stat: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fail: Vec<AutomationNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub success: Vec<AutomationNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageNode {
    /// Annotated damage template; supports named-value interpolation.
    pub damage: String,
    /// Whether healing may exceed max HP.
    #[serde(default, skip_serializing_if = "is_false")]
    pub overheal: bool,
    /// Extra dice per higher cast level, keyed by level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub higher: Option<BTreeMap<String, String>>,
    #[serde(
        rename = "cantripScale",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cantrip_scale: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempHpNode {
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub higher: Option<BTreeMap<String, String>>,
    #[serde(
        rename = "cantripScale",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cantrip_scale: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectGrantNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<IntExpr>,
    #[serde(default, skip_serializing_if = "PassiveEffects::is_empty")]
    pub effects: PassiveEffects,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attacks: Vec<GrantedAttack>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<GrantedButton>,
    /// End-of-turn expiry flavor instead of start-of-turn.
    #[serde(rename = "end", default, skip_serializing_if = "is_false")]
    pub end_on_turn_end: bool,
    #[serde(rename = "conc", default, skip_serializing_if = "is_false")]
    pub concentration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRollNode {
    pub dice: String,
    /// Name later nodes reference the simplified result by.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub higher: Option<BTreeMap<String, String>>,
    #[serde(
        rename = "cantripScale",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cantrip_scale: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<AutomationNode>,
}

/// One typed node of an automation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AutomationNode {
    Target(TargetNode),
    Attack(AttackNode),
    Save(SaveNode),
    Damage(DamageNode),
    #[serde(rename = "temphp")]
    TempHp(TempHpNode),
    #[serde(rename = "ieffect")]
    EffectGrant(EffectGrantNode),
    #[serde(rename = "roll")]
    NamedRoll(NamedRollNode),
    Text(TextNode),
}

impl AutomationNode {
    pub fn kind(&self) -> &'static str {
        match self {
            AutomationNode::Target(_) => "target",
            AutomationNode::Attack(_) => "attack",
            AutomationNode::Save(_) => "save",
            AutomationNode::Damage(_) => "damage",
            AutomationNode::TempHp(_) => "temphp",
            AutomationNode::EffectGrant(_) => "ieffect",
            AutomationNode::NamedRoll(_) => "roll",
            AutomationNode::Text(_) => "text",
        }
    }

    pub(crate) fn kind_title(&self) -> &'static str {
        match self {
            AutomationNode::Target(_) => "Target",
            AutomationNode::Attack(_) => "Attack",
            AutomationNode::Save(_) => "Save",
            AutomationNode::Damage(_) => "Damage",
            AutomationNode::TempHp(_) => "TempHP",
            AutomationNode::EffectGrant(_) => "Effect",
            AutomationNode::NamedRoll(_) => "Roll",
            AutomationNode::Text(_) => "Text",
        }
    }

    /// Meta children run before the node body and never contribute to the
    /// built description string.
    pub fn meta(&self) -> &[AutomationNode] {
        match self {
            AutomationNode::Target(n) => &n.meta,
            AutomationNode::Attack(n) => &n.meta,
            AutomationNode::Save(n) => &n.meta,
            AutomationNode::Damage(n) => &n.meta,
            AutomationNode::TempHp(n) => &n.meta,
            AutomationNode::EffectGrant(n) => &n.meta,
            AutomationNode::NamedRoll(n) => &n.meta,
            AutomationNode::Text(n) => &n.meta,
        }
    }

    /// Every child node, meta children first.
    pub fn children(&self) -> Vec<&AutomationNode> {
        let mut out: Vec<&AutomationNode> = self.meta().iter().collect();
        match self {
            AutomationNode::Target(n) => out.extend(n.effects.iter()),
            AutomationNode::Attack(n) => {
                out.extend(n.hit.iter());
                out.extend(n.miss.iter());
            }
            AutomationNode::Save(n) => {
                out.extend(n.fail.iter());
                out.extend(n.success.iter());
            }
            _ => {}
        }
        out
    }

    pub(crate) fn run(
        &self,
        ctx: &mut AutomationContext<'_>,
    ) -> Result<NodeResult, AutomationError> {
        debug!(node = self.kind(), "running automation node");
        for meta in self.meta() {
            meta.run(ctx)?;
        }
        match self {
            AutomationNode::Target(node) => target::run(node, ctx),
            AutomationNode::Attack(node) => attack::run(node, ctx),
            AutomationNode::Save(node) => save::run(node, ctx),
            AutomationNode::Damage(node) => damage::run(node, ctx),
            AutomationNode::TempHp(node) => damage::run_temp_hp(node, ctx),
            AutomationNode::EffectGrant(node) => grant::run(node, ctx),
            AutomationNode::NamedRoll(node) => roll::run(node, ctx),
            AutomationNode::Text(node) => text::run(node, ctx),
        }
    }

    fn build_str(&self, caster: &Combatant, names: &mut HashMap<String, String>) -> String {
        for meta in self.meta() {
            // meta nodes only bind names
            meta.build_str(caster, names);
        }
        match self {
            AutomationNode::Target(node) => build_child_str(&node.effects, caster, names),
            AutomationNode::Attack(node) => {
                let bonus = node
                    .attack_bonus
                    .as_ref()
                    .map(|b| {
                        interpolate(b, names)
                            .trim()
                            .parse::<i64>()
                            .map(|n| format!("{:+}", n))
                            .unwrap_or_else(|_| b.clone())
                    })
                    .or_else(|| caster.spellbook.sab.map(|n| format!("{:+}", n)));
                let mut out = match bonus {
                    Some(bonus) => format!("Attack: {} to hit", bonus),
                    None => "Attack".to_string(),
                };
                let hit = build_child_str(&node.hit, caster, names);
                if !hit.is_empty() {
                    out.push_str(&format!(". Hit: {}", hit));
                }
                let miss = build_child_str(&node.miss, caster, names);
                if !miss.is_empty() {
                    out.push_str(&format!(". Miss: {}", miss));
                }
                out
            }
            AutomationNode::Save(node) => {
                let dc = node
                    .dc
                    .as_ref()
                    .and_then(|dc| interpolate(dc, names).trim().parse::<i64>().ok())
                    .or(caster.spellbook.dc);
                let abbr = crate::sheet::Ability::match_save(&node.stat)
                    .map(|a| a.abbr().to_string())
                    .unwrap_or_else(|| node.stat.to_uppercase());
                let mut out = match dc {
                    Some(dc) => format!("DC {} {} Save", dc, abbr),
                    None => format!("{} Save", abbr),
                };
                let fail = build_child_str(&node.fail, caster, names);
                if !fail.is_empty() {
                    out.push_str(&format!(". Fail: {}", fail));
                }
                let success = build_child_str(&node.success, caster, names);
                if !success.is_empty() {
                    out.push_str(&format!(". Success: {}", success));
                }
                out
            }
            AutomationNode::Damage(node) => {
                let damage = interpolate(&node.damage, names);
                names.insert("lastDamage".to_string(), damage.clone());
                format!("{} damage", damage)
            }
            AutomationNode::TempHp(node) => {
                let amount = interpolate(&node.amount, names);
                names.insert("lastTempHp".to_string(), amount.clone());
                format!("{} temp HP", amount)
            }
            AutomationNode::EffectGrant(node) => node.name.clone(),
            AutomationNode::NamedRoll(node) => {
                names.insert(node.name.clone(), node.dice.clone());
                String::new()
            }
            AutomationNode::Text(_) => String::new(),
        }
    }
}

pub(crate) fn run_children(
    nodes: &[AutomationNode],
    ctx: &mut AutomationContext<'_>,
) -> Result<Vec<NodeResult>, AutomationError> {
    let mut results = Vec::with_capacity(nodes.len());
    for node in nodes {
        results.push(node.run(ctx)?);
    }
    Ok(results)
}

fn build_child_str(
    nodes: &[AutomationNode],
    caster: &Combatant,
    names: &mut HashMap<String, String>,
) -> String {
    let parts: Vec<String> = nodes
        .iter()
        .map(|n| n.build_str(caster, names))
        .filter(|s| !s.is_empty())
        .collect();
    parts.join(", ")
}

fn interpolate(text: &str, names: &HashMap<String, String>) -> String {
    let mut out = text.to_string();
    for (name, value) in names {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}
