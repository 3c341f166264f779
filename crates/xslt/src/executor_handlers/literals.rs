//! Handlers for result construction: literal result elements, computed
//! elements and attributes, `value-of`, comments and processing instructions.

use crate::ast::{InstructionId, NamespaceBindings};
use crate::avt::Avt;
use crate::error::ExecutionError;
use crate::executor::{Focus, TemplateExecutor};
use crate::output::ResultWriter;
use weft_xpath1::name::{is_ncname, is_qname};
use weft_xpath1::{DataSourceNode, Expression, QualifiedName, XML_NAMESPACE};

/// Turns a computed lexical name into an expanded name. An explicit namespace
/// wins over the prefix; otherwise the prefix is resolved against the bindings
/// in scope at the instruction. Unprefixed element names take the default
/// namespace, unprefixed attribute names never do.
fn computed_name<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    what: &str,
    lexical: &str,
    namespace: Option<&str>,
    bindings: &NamespaceBindings,
    use_default_namespace: bool,
) -> Option<QualifiedName> {
    if !is_qname(lexical) {
        executor.warn(format!("'{}' is not a valid {} name; it is skipped", lexical, what), None);
        return None;
    }
    let (prefix, local) = match lexical.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, lexical),
    };
    if let Some(uri) = namespace {
        let uri = (!uri.is_empty()).then_some(uri);
        return Some(QualifiedName::new(prefix, local, uri));
    }
    match prefix {
        Some("xml") => Some(QualifiedName::new(prefix, local, Some(XML_NAMESPACE))),
        Some(p) => match bindings.lookup(Some(p)) {
            Some(uri) => Some(QualifiedName::new(prefix, local, Some(uri))),
            None => {
                executor.warn(
                    format!("Undeclared namespace prefix '{}' in {} name '{}'; it is skipped", p, what, lexical),
                    None,
                );
                None
            }
        },
        None => {
            let uri = if use_default_namespace {
                bindings.lookup(None).filter(|uri| !uri.is_empty())
            } else {
                None
            };
            Some(QualifiedName::new(None, local, uri))
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_literal_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    name: &QualifiedName,
    attributes: &[(QualifiedName, Avt)],
    namespace_decls: &[(Option<String>, String)],
    use_attribute_sets: &[QualifiedName],
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    for (prefix, uri) in namespace_decls {
        out.start_prefix_mapping(prefix.as_deref(), uri);
    }
    out.start_element(name);
    executor.apply_attribute_sets(use_attribute_sets, focus, out)?;
    for (attr_name, value) in attributes {
        let value = executor.evaluate_avt(value, focus)?;
        out.attribute(attr_name, &value);
    }
    executor.execute_children(id, focus, out)?;
    out.end_element();
    for (prefix, _) in namespace_decls.iter().rev() {
        out.end_prefix_mapping(prefix.as_deref());
    }
    Ok(())
}

/// `xsl:element`. An invalid name skips the element, but its content still runs.
#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_element<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    name: &Avt,
    namespace: Option<&Avt>,
    bindings: &NamespaceBindings,
    use_attribute_sets: &[QualifiedName],
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let lexical = executor.evaluate_avt(name, focus)?;
    let namespace = namespace.map(|avt| executor.evaluate_avt(avt, focus)).transpose()?;
    let Some(qname) = computed_name(executor, "element", lexical.trim(), namespace.as_deref(), bindings, true)
    else {
        return executor.execute_children(id, focus, out);
    };
    out.start_element(&qname);
    executor.apply_attribute_sets(use_attribute_sets, focus, out)?;
    executor.execute_children(id, focus, out)?;
    out.end_element();
    Ok(())
}

/// `xsl:attribute`. The value is the text produced by the body.
pub(crate) fn handle_attribute<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    name: &Avt,
    namespace: Option<&Avt>,
    bindings: &NamespaceBindings,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let lexical = executor.evaluate_avt(name, focus)?;
    let lexical = lexical.trim();
    if lexical == "xmlns" {
        executor.warn("An attribute cannot be named 'xmlns'; it is skipped", None);
        return Ok(());
    }
    let namespace = namespace.map(|avt| executor.evaluate_avt(avt, focus)).transpose()?;
    let Some(mut qname) = computed_name(executor, "attribute", lexical, namespace.as_deref(), bindings, false) else {
        return Ok(());
    };
    if qname.prefix.is_none() {
        if let Some(uri) = qname.namespace_uri.as_deref() {
            // A namespaced attribute needs a prefix.
            let prefix = bindings.prefix_for(uri, None).flatten().unwrap_or("ns0").to_string();
            qname.prefix = Some(prefix);
        }
    }
    let value = executor.render_text(id, focus)?;
    if !out.attribute(&qname, &value) {
        executor.warn(
            format!(
                "Attribute '{}' was created after the element's content or outside any element; it is ignored",
                lexical
            ),
            None,
        );
    }
    Ok(())
}

pub(crate) fn handle_value_of<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    select: &Expression,
    disable_escaping: bool,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let text = executor.evaluate(select, focus)?.to_string();
    out.text(&text, disable_escaping);
    Ok(())
}

pub(crate) fn handle_comment<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let mut text = executor.render_text(id, focus)?;
    if text.contains("--") || text.ends_with('-') {
        executor.warn("Comment text contains '--' or ends with '-'; spaces were inserted", None);
        text = text.replace("--", "- -");
        if text.ends_with('-') {
            text.push(' ');
        }
    }
    out.comment(&text);
    Ok(())
}

pub(crate) fn handle_processing_instruction<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    name: &Avt,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let target = executor.evaluate_avt(name, focus)?;
    let target = target.trim();
    if !is_ncname(target) || target.eq_ignore_ascii_case("xml") {
        executor.warn(
            format!("'{}' is not a valid processing-instruction name; it is skipped", target),
            None,
        );
        return Ok(());
    }
    let data = executor.render_text(id, focus)?.replace("?>", "? >");
    out.processing_instruction(target, data.trim_start());
    Ok(())
}
