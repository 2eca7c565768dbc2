//! EffectGrant node
//!
//! Constructs an applied effect on the current target. In a tracked combat
//! the effect is tethered to the round counter and, when the run carries a
//! concentration effect, parented to it so losing concentration cascades
//! removal. Outside combat the effect is built untethered and only
//! reported.

use super::results::{EffectGrantResult, NodeResult};
use super::runtime::{truncate_with_ellipsis, AutomationContext};
use super::{AutomationError, EffectGrantNode, IntExpr};
use crate::initiative::AppliedEffect;

pub(super) fn run(
    node: &EffectGrantNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let mut duration = match &node.duration {
        None => None,
        Some(IntExpr::Int(n)) => int_duration(*n),
        Some(IntExpr::Expr(expr)) => {
            let n = ctx
                .parse_intexpr(expr)
                .map_err(|_| AutomationError::InvalidDuration(expr.clone()))?;
            int_duration(n)
        }
    };
    if let Some(dur_arg) = ctx.args.last_i64("dur") {
        duration = int_duration(dur_arg);
    }

    let desc = node
        .desc
        .as_ref()
        .map(|d| truncate_with_ellipsis(ctx.parse_annostr(d), ctx.limits.effect_desc_len));

    let effect = AppliedEffect::new(&node.name)
        .with_effects(node.effects.clone())
        .with_attacks(node.attacks.clone())
        .with_buttons(node.buttons.clone())
        .with_duration(duration)
        .end_on_turn_end(node.end_on_turn_end)
        .concentration(node.concentration)
        .with_desc(desc);

    if let (Some(target_id), true) = (ctx.target_combat_id(), ctx.combat.is_some()) {
        let parent = match &ctx.conc_effect {
            Some(conc) => {
                if node.concentration && conc.combatant_id == target_id {
                    return Err(AutomationError::SelfConcentration);
                }
                Some(conc.clone())
            }
            None => None,
        };

        let combat = ctx
            .combat
            .as_deref_mut()
            .ok_or_else(|| AutomationError::UnknownCombatant(target_id.clone()))?;
        let outcome = combat.add_effect(&target_id, effect, parent.as_ref())?;

        let (granted, description) = match ctx.combat.as_deref().and_then(|c| {
            c.effect(&outcome.effect)
                .map(|e| (e.clone(), e.describe(Some(c), false)))
        }) {
            Some(pair) => pair,
            None => return Err(AutomationError::UnknownCombatant(target_id)),
        };

        ctx.queue(format!("**Effect**: {}", description));
        if !outcome.conc_dropped.is_empty() {
            ctx.queue(format!(
                "**Concentration**: dropped {}",
                outcome.conc_dropped.join(", ")
            ));
        }

        Ok(NodeResult::EffectGrant(EffectGrantResult {
            effect: granted,
            conc_dropped: outcome.conc_dropped,
        }))
    } else {
        // no live combat to tether to: report the effect only
        ctx.queue(format!("**Effect**: {}", effect.describe(None, false)));
        Ok(NodeResult::EffectGrant(EffectGrantResult {
            effect,
            conc_dropped: Vec::new(),
        }))
    }
}

/// Negative durations mean indefinite.
fn int_duration(n: i64) -> Option<u32> {
    u32::try_from(n).ok()
}
