//! NamedRoll node
//!
//! Evaluates its dice once and stores the simplified, rerollable result
//! string under a name visible to all later nodes in the run.

use crate::dice::parse;

use super::damage::scale_dice;
use super::results::{NamedRollResult, NodeResult};
use super::runtime::AutomationContext;
use super::{AutomationError, NamedRollNode};

pub(super) fn run(
    node: &NamedRollNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let max_arg = ctx.args.last_bool("max");
    let mi_arg = ctx.args.last_u32("mi");

    let mut d_args: Vec<String> = ctx.args.get("d").to_vec();
    d_args.extend(ctx.caster()?.damage_bonuses());

    let mut ast = parse(&ctx.parse_annostr(&node.dice))?;
    scale_dice(ctx, &mut ast, node.higher.as_ref(), node.cantrip_scale)?;

    // a hidden roll records its bare value: arguments stay out of it
    if !node.hidden {
        if let Some(mi) = mi_arg {
            ast.set_minimum(mi);
        }
        for d_arg in &d_args {
            if let Ok(parsed) = parse(d_arg) {
                let base = std::mem::replace(&mut ast, crate::dice::Expr::Literal(0));
                ast = base.plus(parsed);
            }
        }
        if max_arg {
            ast.maximize();
        }
    }

    let roll = ctx.roll(&ast)?;
    if !node.hidden {
        ctx.meta_queue(format!("**{}**: {}", title_case(&node.name), roll));
    }

    let simplified = roll.expr.rerollable();
    ctx.metavars.insert(node.name.clone(), simplified.clone());
    ctx.set_metavar("lastRoll", roll.total);

    Ok(NodeResult::NamedRoll(NamedRollResult {
        result: roll.total,
        roll,
        simplified,
        hidden: node.hidden,
    }))
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
