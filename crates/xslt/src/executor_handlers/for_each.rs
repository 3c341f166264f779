use crate::ast::InstructionId;
use crate::error::ExecutionError;
use crate::executor::{Focus, RuleContext, TemplateExecutor};
use crate::output::ResultWriter;
use crate::sort::SortKey;
use weft_xpath1::{DataSourceNode, Expression};

/// Sort keys are evaluated before the loop frame is linked: they belong to the
/// enclosing scope. One frame serves every iteration.
#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_for_each<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    select: &Expression,
    sort_keys: &[SortKey],
    frame_size: usize,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let nodes = executor.evaluate_nodes(select, focus, "xsl:for-each")?;
    let nodes = executor.sort_nodes(nodes, sort_keys)?;
    if nodes.is_empty() {
        return Ok(());
    }
    let size = nodes.len();
    let rule = RuleContext {
        template: None,
        ..executor.current_rule()
    };
    executor.with_rule(rule, || {
        let _frame = executor.link_frame(frame_size);
        for (i, node) in nodes.into_iter().enumerate() {
            executor.execute_children(id, Focus::at(node, i + 1, size), out)?;
        }
        Ok(())
    })
}
