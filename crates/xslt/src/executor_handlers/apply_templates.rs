use crate::ast::InstructionId;
use crate::error::ExecutionError;
use crate::executor::{Focus, RuleContext, TemplateExecutor};
use crate::output::ResultWriter;
use crate::sort::SortKey;
use weft_xpath1::{DataSourceNode, Expression, QualifiedName};

/// Selection, sort keys and parameters are all evaluated once, in the caller's
/// context, before any template runs. Without a `mode` attribute the default
/// mode is used.
#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_apply_templates<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    select: Option<&Expression>,
    mode: Option<&QualifiedName>,
    sort_keys: &[SortKey],
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let nodes = match select {
        Some(expr) => executor.evaluate_nodes(expr, focus, "xsl:apply-templates")?,
        None => focus.node.children().collect(),
    };
    let nodes = executor.sort_nodes(nodes, sort_keys)?;
    let params = executor.evaluate_with_params(id, focus)?;
    executor.apply_to_nodes(&nodes, mode, &params, out)
}

/// Runs the best rule for the current node among those imported into the
/// module of the current template rule, or the built-in rule.
pub(crate) fn handle_apply_imports<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let current = executor.current_rule();
    let Some(template) = current.template else {
        return Err(ExecutionError::Structure(
            "xsl:apply-imports requires a current template rule".into(),
        ));
    };
    let decl = executor.template_decl(template)?;
    let (floor, ceiling) = (decl.import_floor, decl.precedence);
    let mode = current.mode.as_ref();
    let selected = executor.select_rule(mode, focus.node, |rule| {
        rule.precedence >= floor && rule.precedence < ceiling
    })?;
    match selected {
        Some(imported) => {
            let rule = RuleContext {
                template: Some(imported),
                mode: current.mode.clone(),
            };
            executor.invoke_template(imported, rule, focus, &[], out)
        }
        None => executor.apply_built_in(mode, focus, out),
    }
}
