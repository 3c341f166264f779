use crate::ast::{InstructionId, VariableDecl};
use crate::error::ExecutionError;
use crate::executor::{Focus, TemplateExecutor};
use weft_xpath1::DataSourceNode;

pub(crate) fn handle_variable<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    decl: &VariableDecl,
    focus: Focus<N>,
) -> Result<(), ExecutionError> {
    let value = executor.variable_value(id, decl, focus)?;
    executor.set_local(decl.slot, value)
}

/// A parameter keeps the value bound by the caller; its default is only
/// evaluated when nothing was passed.
pub(crate) fn handle_param<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    decl: &VariableDecl,
    focus: Focus<N>,
) -> Result<(), ExecutionError> {
    if executor.is_local_set(decl.slot) {
        return Ok(());
    }
    handle_variable(executor, id, decl, focus)
}
