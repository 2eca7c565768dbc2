//! Damage and TempHP nodes
//!
//! Damage builds an annotated dice tree from its template, applies level
//! scaling, crit doubling, and forced maximums, rolls it, rewrites the
//! rolled tree through the target's resistances, and applies the total to
//! the target's HP. TempHP *sets* temp HP (it never stacks), floored at 0.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::dice::{parse, Expr};
use crate::sheet::{apply_resistances, Resistances};

use super::results::{DamageResult, NodeResult, TempHpResult};
use super::runtime::AutomationContext;
use super::{AutomationError, DamageNode, TempHpNode};

pub(super) fn run(
    node: &DamageNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let crit_arg = ctx.args.last_bool("crit");
    let nocrit = ctx.args.last_bool("nocrit");
    let max_arg = ctx.args.last_bool("max");
    let magic_arg = ctx.args.last_bool("magical");
    let mi_arg = ctx.args.last_u32("mi");
    let critdice = ctx.args.last_u32("critdice").unwrap_or(0);
    let hide = ctx.args.last_bool("h");
    let c_args: Vec<String> = ctx.args.get("c").to_vec();

    // the target's rules plus any ephemeral rules from the args
    let mut resistances = ctx.target_resistances();
    resistances.update(Resistances::from_args(&ctx.args));

    // caster effects contribute flat damage bonuses
    let mut d_args: Vec<String> = ctx.args.get("d").to_vec();
    d_args.extend(ctx.caster()?.damage_bonuses());

    let mut ast = parse(&ctx.parse_annostr(&node.damage))?;
    scale_dice(ctx, &mut ast, node.higher.as_ref(), node.cantrip_scale)?;

    if let Some(mi) = mi_arg {
        ast.set_minimum(mi);
    }
    for d_arg in &d_args {
        append_parsed(&mut ast, d_arg);
    }

    let in_crit = (ctx.in_crit || crit_arg) && !nocrit;
    if in_crit {
        // dice double on a crit; extra weapon dice apply, spell dice do not
        ast.double_dice();
        if critdice > 0 && !ctx.is_spell() {
            ast.add_leftmost_dice(critdice);
        }
        for c_arg in &c_args {
            append_parsed(&mut ast, c_arg);
        }
    }
    if max_arg {
        ast.maximize();
    }

    let mut roll = ctx.roll(&ast)?;

    let mut always = BTreeSet::new();
    if magic_arg || ctx.is_spell() || ctx.caster()?.has_magical_damage() {
        always.insert("magical".to_string());
    }
    if ctx.caster()?.has_silvered_damage() {
        always.insert("silvered".to_string());
    }
    apply_resistances(&mut roll.expr, &resistances, &always);
    roll.retotal();

    let roll_for = if in_crit { "Damage (CRIT!)" } else { "Damage" };
    if !hide {
        ctx.queue(format!("**{}**: {}", roll_for, roll));
    } else {
        ctx.queue(format!("**{}**: `{}`", roll_for, roll.total));
        let invoker = ctx.invoker();
        ctx.add_pm(&invoker, format!("**{}**: {}", roll_for, roll));
    }

    ctx.deal_damage(roll.total, node.overheal);
    ctx.set_metavar("lastDamage", roll.total);

    Ok(NodeResult::Damage(DamageResult {
        damage: roll.total,
        roll,
        in_crit,
    }))
}

pub(super) fn run_temp_hp(
    node: &TempHpNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let max_arg = ctx.args.last_bool("max");

    let mut ast = parse(&ctx.parse_annostr(&node.amount))?;
    scale_dice(ctx, &mut ast, node.higher.as_ref(), node.cantrip_scale)?;
    if max_arg {
        ast.maximize();
    }

    let roll = ctx.roll(&ast)?;
    let amount = roll.total.max(0);
    ctx.queue(format!("**THP**: {}", roll));
    ctx.set_metavar("lastTempHp", amount);
    ctx.set_target_temp_hp(amount);

    Ok(NodeResult::TempHp(TempHpResult { amount, roll }))
}

/// Applies cantrip level scaling and higher-cast-level bonus dice. Cantrip
/// dice counts scale with the caster's level band (1 below 5th, 2 below
/// 11th, 3 below 17th, 4 from 17th).
pub(super) fn scale_dice(
    ctx: &AutomationContext<'_>,
    ast: &mut Expr,
    higher: Option<&BTreeMap<String, String>>,
    cantrip_scale: Option<bool>,
) -> Result<(), AutomationError> {
    if ctx.is_spell() && cantrip_scale == Some(true) {
        let level = ctx.caster()?.spellbook.caster_level;
        let dice = if level < 5 {
            1
        } else if level < 11 {
            2
        } else if level < 17 {
            3
        } else {
            4
        };
        ast.set_dice_count(dice);
    }
    if let Some(higher) = higher {
        let cast_level = ctx.get_cast_level();
        if let Some(extra) = higher.get(&cast_level.to_string()) {
            append_parsed(ast, extra);
        }
    }
    Ok(())
}

/// Adds a parsed expression onto `ast`; malformed optional input is
/// ignored rather than aborting the run.
fn append_parsed(ast: &mut Expr, extra: &str) {
    match parse(extra) {
        Ok(parsed) => {
            let base = std::mem::replace(ast, Expr::Literal(0));
            *ast = base.plus(parsed);
        }
        Err(err) => warn!(value = extra, %err, "ignoring malformed bonus dice"),
    }
}
