use crate::ast::InstructionId;
use crate::error::ExecutionError;
use crate::executor::{Focus, TemplateExecutor};
use crate::output::ResultWriter;
use weft_xpath1::{DataSourceNode, QualifiedName};

/// The callee runs with the caller's focus, current template rule and mode.
pub(crate) fn handle_call_template<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    name: &QualifiedName,
    target: Option<InstructionId>,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let Some(template) = target.or_else(|| executor.stylesheet.named_template(name)) else {
        return Err(ExecutionError::Structure(format!("Unknown template '{}'", name)));
    };
    let params = executor.evaluate_with_params(id, focus)?;
    executor.invoke_template(template, executor.current_rule(), focus, &params, out)
}
