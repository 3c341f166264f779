//! `xsl:message` and extension elements: the instructions that hand control
//! to something outside the result tree.

use crate::ast::{Instruction, InstructionId};
use crate::diagnostics::Diagnostic;
use crate::error::ExecutionError;
use crate::executor::{Focus, TemplateExecutor};
use crate::output::ResultWriter;
use weft_xpath1::{DataSourceNode, QualifiedName};

pub(crate) fn handle_message<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    terminate: bool,
    focus: Focus<N>,
) -> Result<(), ExecutionError> {
    let text = executor.render_text(id, focus)?;
    let location = executor.stylesheet.node(id).location;
    executor.report(Diagnostic::message(text.clone(), Some(location)));
    if terminate {
        return Err(ExecutionError::Terminated(text));
    }
    Ok(())
}

/// Runs the registered handler for the element's namespace. When there is no
/// handler, or it fails, the `xsl:fallback` children run instead; without any
/// the run fails.
pub(crate) fn handle_extension_call<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    name: &QualifiedName,
    attributes: &[(QualifiedName, String)],
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let uri = name.namespace_uri.as_deref().unwrap_or_default();
    let outcome = match executor.extensions.handler(uri) {
        Some(handler) if handler.has_element(&name.local_part) => handler.element(name, attributes, &mut *out),
        Some(_) => Err(format!("Element '{}' is not provided by its handler", name.local_part)),
        None => Err(format!("No handler is registered for namespace '{}'", uri)),
    };
    let Err(message) = outcome else {
        return Ok(());
    };
    let fallbacks: Vec<InstructionId> = executor
        .stylesheet
        .children(id)
        .iter()
        .copied()
        .filter(|&child| matches!(executor.stylesheet.instruction(child), Instruction::Fallback))
        .collect();
    if fallbacks.is_empty() {
        return Err(ExecutionError::Extension {
            name: name.to_string(),
            message,
        });
    }
    log::debug!("extension element '{}' unavailable ({}); running fallback", name, message);
    for fallback in fallbacks {
        executor.execute_children(fallback, focus, out)?;
    }
    Ok(())
}
