//! Target node
//!
//! Resolves a target specifier against the run's target list and runs its
//! child list against each resolved target, optionally repeating.

use super::results::{NodeResult, TargetResult};
use super::runtime::{AutomationContext, AutomationTarget};
use super::{run_children, AutomationError, TargetNode, TargetSpecifier};

pub(super) fn run(
    node: &TargetNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let previous = ctx.target();
    let mut result = TargetResult::default();

    let outcome = (|| -> Result<(), AutomationError> {
        match node.target {
            TargetSpecifier::Each | TargetSpecifier::All => {
                if ctx.slot_count() == 0 {
                    // no targets: run once against the placeholder
                    ctx.set_target(Some(AutomationTarget::None));
                    collect(node, ctx, &mut result)?;
                } else {
                    for i in 0..ctx.slot_count() {
                        ctx.set_target(Some(AutomationTarget::Slot(i)));
                        collect(node, ctx, &mut result)?;
                    }
                }
            }
            TargetSpecifier::Caster => {
                ctx.set_target(Some(AutomationTarget::Caster));
                collect(node, ctx, &mut result)?;
            }
            TargetSpecifier::Index(i) => {
                // out-of-range index is a silent no-op
                if i >= 1 && i <= ctx.slot_count() {
                    ctx.set_target(Some(AutomationTarget::Slot(i - 1)));
                    collect(node, ctx, &mut result)?;
                }
            }
        }
        Ok(())
    })();

    ctx.set_target(previous);
    outcome?;
    Ok(NodeResult::Target(result))
}

/// Runs the child list against the current target, repeating per the `rr`
/// argument, and closes out the target's report field.
fn collect(
    node: &TargetNode,
    ctx: &mut AutomationContext<'_>,
    result: &mut TargetResult,
) -> Result<(), AutomationError> {
    let rr = ctx
        .args
        .last_i64("rr")
        .unwrap_or(1)
        .clamp(1, i64::from(ctx.limits.max_iterations));
    let name = ctx.target_name();
    let in_target = ctx.target() != Some(AutomationTarget::None);

    ctx.set_metavar("targetIteration", 1);

    if rr > 1 {
        let mut total_damage = 0;
        for iteration in 1..=rr {
            let iter_title = if node.effects.len() == 1 {
                format!("{} {}", node.effects[0].kind_title(), iteration)
            } else {
                format!("Iteration {}", iteration)
            };
            ctx.set_metavar("targetIteration", iteration);

            if in_target {
                ctx.queue(format!("\n**__{}__**", iter_title));
            }

            let children = run_children(&node.effects, ctx)?;
            total_damage += children.iter().map(NodeResult::damage).sum::<i64>();
            result.targets.push(name.clone());
            result.results.push(children);

            if !in_target {
                ctx.push_embed_field(iter_title, false);
            }
        }

        if in_target {
            if total_damage != 0 {
                ctx.queue(format!("\n**__Total Damage__**: {}", total_damage));
            }
            ctx.push_embed_field(name.unwrap_or_default(), false);
        } else if total_damage != 0 {
            ctx.queue(total_damage.to_string());
            ctx.push_embed_field("Total Damage", true);
        }
    } else {
        let children = run_children(&node.effects, ctx)?;
        result.targets.push(name.clone());
        result.results.push(children);
        if in_target {
            ctx.push_embed_field(name.unwrap_or_default(), false);
        } else {
            ctx.push_embed_field_to_meta();
        }
    }

    Ok(())
}
