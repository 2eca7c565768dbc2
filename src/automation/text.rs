//! Text node
//!
//! Appends truncated flavor text to the report's effect field, or sends it
//! privately when hidden.

use super::results::{NodeResult, TextResult};
use super::runtime::{truncate_with_ellipsis, AutomationContext};
use super::{AutomationError, TextNode};

pub(super) fn run(
    node: &TextNode,
    ctx: &mut AutomationContext<'_>,
) -> Result<NodeResult, AutomationError> {
    let hide = ctx.args.last_bool("h");

    let text = truncate_with_ellipsis(ctx.parse_annostr(&node.text), ctx.limits.text_len);

    if !hide {
        ctx.effect_queue("Effect", text.clone());
    } else {
        let invoker = ctx.invoker();
        ctx.add_pm(&invoker, text.clone());
    }

    Ok(NodeResult::Text(TextResult { text }))
}
