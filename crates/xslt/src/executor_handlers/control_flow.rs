use crate::ast::{Instruction, InstructionId};
use crate::error::ExecutionError;
use crate::executor::{Focus, TemplateExecutor};
use crate::output::ResultWriter;
use weft_xpath1::{DataSourceNode, Expression};

pub(crate) fn handle_if<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    test: &Expression,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    if executor.evaluate_bool(test, focus)? {
        executor.execute_children(id, focus, out)?;
    }
    Ok(())
}

pub(crate) fn handle_choose<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let branches = executor.stylesheet.children(id);
    if branches.is_empty() {
        return Err(ExecutionError::Structure("xsl:choose has no branches".into()));
    }
    for &branch in branches {
        let taken = match executor.stylesheet.instruction(branch) {
            Instruction::When { test } => executor.evaluate_bool(test, focus)?,
            Instruction::Otherwise => true,
            other => {
                return Err(ExecutionError::Structure(format!(
                    "{} is not a branch of xsl:choose",
                    other.display_name()
                )));
            }
        };
        if taken {
            return executor.execute_children(branch, focus, out);
        }
    }
    Ok(())
}
