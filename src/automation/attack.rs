//! Attack node
//!
//! Rolls to hit against the current target's AC and runs the hit or miss
//! branch. Attack-bonus precedence: explicit node expression, then the
//! caller's override, then the caster's spell attack bonus; none at all is
//! a hard failure. Forced hit/miss/crit flags bypass rolling entirely.

use crate::dice::{parse, CritKind};

use super::results::{AttackResult, NodeResult};
use super::runtime::AutomationContext;
use super::{run_children, AttackNode, AutomationError};

pub(super) fn run(
    node: &AttackNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let force_crit = ctx.args.last_bool("crit");
    let nocrit = ctx.args.last_bool("nocrit");
    let force_hit = ctx.args.last_bool("hit") || force_crit;
    let force_miss = ctx.args.last_bool("miss") && !force_hit;
    let hide = ctx.args.last_bool("h");
    let reroll = ctx.args.last_u32("reroll");
    let criton = ctx.args.last_i64("criton").unwrap_or(20);
    let ac_arg = ctx.args.last_i64("ac");

    // advantage and to-hit bonuses granted by the caster's active effects
    let adv = ctx
        .args
        .adv(true)
        .combine(ctx.caster()?.attack_advantage());
    let mut bonuses: Vec<String> = ctx.args.get("b").to_vec();
    bonuses.extend(ctx.caster()?.attack_bonuses());

    let mut attack_bonus = ctx.ab_override.or(ctx.caster()?.spellbook.sab);
    if let Some(expr) = &node.attack_bonus {
        attack_bonus = Some(ctx.parse_intexpr(expr)?);
    }
    if attack_bonus.is_none() && bonuses.is_empty() {
        return Err(AutomationError::NoAttackBonus);
    }

    ctx.set_metavar("lastAttackDidHit", false);
    ctx.set_metavar("lastAttackDidCrit", false);
    ctx.set_metavar("lastAttackRollTotal", 0);

    let mut did_hit = true;
    let mut did_crit = false;
    let mut to_hit = None;
    let mut ac = ac_arg;

    if force_hit {
        ctx.queue("**To Hit**: Automatic hit!");
        did_crit = force_crit && !nocrit;
    } else if force_miss {
        did_hit = false;
        ctx.queue("**To Hit**: Automatic miss!");
    } else {
        let d20 = adv.d20(reroll);
        let mut parts = vec![d20.clone()];
        if let Some(bonus) = attack_bonus {
            parts.push(bonus.to_string());
        }
        parts.extend(bonuses.iter().cloned());
        let ast = parse(&parts.join("+"))?;
        let roll = ctx.roll(&ast)?;

        let d20_value = roll.expr.leftmost_die_value().unwrap_or(0);
        let target_has_ac = ctx.target_ac().is_some();
        if target_has_ac {
            ac = ac.or(ctx.target_ac());
        }

        if d20_value >= criton || roll.crit == CritKind::Crit {
            did_crit = !nocrit;
        } else if roll.crit == CritKind::Fail {
            did_hit = false;
        } else if let Some(ac) = ac {
            if roll.total < ac {
                did_hit = false;
            }
        }

        ctx.set_metavar("lastAttackRollTotal", roll.total);

        let to_hit_message = match ac_arg {
            Some(ac) => format!("To Hit (AC {})", ac),
            None => "To Hit".to_string(),
        };
        if !hide {
            ctx.queue(format!("**{}**: {}", to_hit_message, roll));
        } else if target_has_ac {
            // AC is known: only the classification is public
            let classification = if !did_hit {
                "MISS"
            } else if did_crit {
                "CRIT"
            } else {
                "HIT"
            };
            ctx.queue(format!("**To Hit**: {}... = `{}`", d20, classification));
            let invoker = ctx.invoker();
            ctx.add_pm(&invoker, format!("**{}**: {}", to_hit_message, roll));
        } else {
            // AC unknown: only the numeric total is hidden
            ctx.queue(format!("**To Hit**: {}... = `{}`", d20, roll.total));
            let invoker = ctx.invoker();
            ctx.add_pm(&invoker, format!("**{}**: {}", to_hit_message, roll));
        }

        to_hit = Some(roll);
    }

    let children = if !did_hit {
        on_miss(node, ctx)?
    } else if did_crit {
        on_crit(node, ctx)?
    } else {
        on_hit(node, ctx)?
    };

    Ok(NodeResult::Attack(AttackResult {
        attack_bonus,
        ac,
        to_hit,
        adv,
        did_hit,
        did_crit,
        children,
    }))
}

fn on_hit(
    node: &AttackNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<Vec<NodeResult>, AutomationError> {
    ctx.set_metavar("lastAttackDidHit", true);
    run_children(&node.hit, ctx)
}

fn on_crit(
    node: &AttackNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<Vec<NodeResult>, AutomationError> {
    let original = ctx.in_crit;
    ctx.in_crit = true;
    ctx.set_metavar("lastAttackDidCrit", true);
    let result = on_hit(node, ctx);
    ctx.in_crit = original;
    result
}

fn on_miss(
    node: &AttackNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<Vec<NodeResult>, AutomationError> {
    ctx.queue("**Miss!**");
    run_children(&node.miss, ctx)
}
