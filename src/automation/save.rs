//! Save node
//!
//! Resolves the saving throw ability, rolls against the DC, and runs the
//! success or fail branch. DC precedence: explicit node expression, then
//! the caller's override, then the caster's spell DC; none is a hard
//! failure, as is an unrecognized save keyword.

use crate::args::maybe_mod;
use crate::dice::parse;
use crate::sheet::Ability;

use super::results::{NodeResult, SaveResult};
use super::runtime::AutomationContext;
use super::{run_children, AutomationError, SaveNode};

pub(super) fn run(
    node: &SaveNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let stat = ctx
        .args
        .last("save")
        .map(str::to_string)
        .unwrap_or_else(|| node.stat.clone());
    let auto_pass = ctx.args.last_bool("pass");
    let auto_fail = ctx.args.last_bool("fail") && !auto_pass;
    let hide = ctx.args.last_bool("h");
    let arg_adv = ctx.args.save_adv();

    let mut dc = match &node.dc {
        Some(expr) => Some(ctx.parse_intexpr(expr)?),
        None => None,
    };
    dc = dc.or(ctx.dc_override).or(ctx.caster()?.spellbook.dc);
    if let Some(dc_arg) = ctx.args.last("dc") {
        dc = maybe_mod(dc_arg, dc);
    }
    let dc = dc.ok_or(AutomationError::NoSaveDc)?;

    let ability =
        Ability::match_save(&stat).ok_or_else(|| AutomationError::InvalidSaveType(stat))?;

    ctx.meta_queue(format!("**DC**: {}", dc));
    ctx.set_metavar("lastSaveRollTotal", 0);

    let mut save_roll = None;
    let mut adv = arg_adv;
    let (did_save, children) = if !ctx.target_is_simple() {
        let blurb = format!("{} Save", ability.abbr());
        let did_save = if auto_pass {
            ctx.queue(format!("**{}:** Automatic success!", blurb));
            true
        } else if auto_fail {
            ctx.queue(format!("**{}:** Automatic failure!", blurb));
            false
        } else {
            if let Some(target) = ctx.target_combatant() {
                adv = arg_adv.combine(target.save_advantage(ability));
            }
            let dice = ctx.target_save_dice(ability, adv)?;
            let roll = ctx.roll(&parse(&dice)?)?;
            let is_success = roll.total >= dc;
            ctx.set_metavar("lastSaveRollTotal", roll.total);
            let suffix = if is_success {
                "; Success!"
            } else {
                "; Failure!"
            };
            if !hide {
                ctx.queue(format!("**{}**: {}{}", blurb, roll, suffix));
            } else {
                let invoker = ctx.invoker();
                ctx.add_pm(&invoker, format!("**{}**: {}{}", blurb, roll, suffix));
                ctx.queue(format!("**{}**: 1d20...{}", blurb, suffix));
            }
            save_roll = Some(roll);
            is_success
        };
        let children = if did_save {
            ctx.set_metavar("lastSaveDidPass", true);
            run_children(&node.success, ctx)?
        } else {
            ctx.set_metavar("lastSaveDidPass", false);
            run_children(&node.fail, ctx)?
        };
        (did_save, children)
    } else {
        // simple targets never roll; the outcome is indeterminate and
        // neither branch runs
        ctx.meta_queue(format!("{} Save", ability.abbr()));
        (false, Vec::new())
    };

    Ok(NodeResult::Save(SaveResult {
        dc,
        ability,
        save_roll,
        adv,
        did_save,
        children,
    }))
}
