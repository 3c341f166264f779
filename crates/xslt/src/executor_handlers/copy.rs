use crate::ast::InstructionId;
use crate::error::ExecutionError;
use crate::executor::{Focus, TemplateExecutor};
use crate::output::ResultWriter;
use weft_xpath1::{DataSourceNode, Expression, NodeType, QualifiedName, XPathValue};

/// `xsl:copy`: a shallow copy of the context node. The body only runs for
/// roots and elements.
pub(crate) fn handle_copy<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    id: InstructionId,
    use_attribute_sets: &[QualifiedName],
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    let node = focus.node;
    match node.node_type() {
        NodeType::Root => executor.execute_children(id, focus, out),
        NodeType::Element => {
            let Some(name) = node.expanded_name() else {
                return executor.execute_children(id, focus, out);
            };
            start_element(&name, out);
            executor.apply_attribute_sets(use_attribute_sets, focus, out)?;
            executor.execute_children(id, focus, out)?;
            end_element(&name, out);
            Ok(())
        }
        _ => {
            copy_leaf(executor, node, out);
            Ok(())
        }
    }
}

/// `xsl:copy-of`: node-sets are copied deeply in order, a fragment replays its
/// events and anything else becomes text.
pub(crate) fn handle_copy_of<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    select: &Expression,
    focus: Focus<N>,
    out: &mut ResultWriter<'_>,
) -> Result<(), ExecutionError> {
    match executor.evaluate(select, focus)? {
        XPathValue::NodeSet(nodes) => {
            for node in nodes {
                copy_node(executor, node, out);
            }
        }
        XPathValue::Fragment(fragment) => {
            let refused = out.fragment(&fragment);
            if refused > 0 {
                executor.warn(
                    format!("{} attribute(s) of a copied fragment came after content and were ignored", refused),
                    None,
                );
            }
        }
        other => out.text(&other.to_string(), false),
    }
    Ok(())
}

/// A document root contributes its children only.
fn copy_node<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    node: N,
    out: &mut ResultWriter<'_>,
) {
    match node.node_type() {
        NodeType::Root => {
            for child in node.children() {
                copy_node(executor, child, out);
            }
        }
        NodeType::Element => {
            let Some(name) = node.expanded_name() else {
                return;
            };
            start_element(&name, out);
            for attr in node.attributes() {
                copy_leaf(executor, attr, out);
            }
            for child in node.children() {
                copy_node(executor, child, out);
            }
            end_element(&name, out);
        }
        _ => copy_leaf(executor, node, out),
    }
}

fn copy_leaf<'s, 'a, N: DataSourceNode<'a> + 'a>(
    executor: &TemplateExecutor<'s, 'a, N>,
    node: N,
    out: &mut ResultWriter<'_>,
) {
    match node.node_type() {
        NodeType::Attribute => {
            if let Some(name) = node.expanded_name() {
                if !out.attribute(&name, &node.string_value()) {
                    executor.warn(
                        format!("Copied attribute '{}' came after element content and was ignored", name),
                        None,
                    );
                }
            }
        }
        NodeType::Text => out.text(&node.string_value(), false),
        NodeType::Comment => out.comment(&node.string_value()),
        NodeType::ProcessingInstruction => {
            let target = node.name().map(|q| q.local_part).unwrap_or_default();
            out.processing_instruction(target, &node.string_value());
        }
        NodeType::Root | NodeType::Element => {}
    }
}

fn start_element(name: &QualifiedName, out: &mut ResultWriter<'_>) {
    if let Some(uri) = name.namespace_uri.as_deref() {
        out.start_prefix_mapping(name.prefix.as_deref(), uri);
    }
    out.start_element(name);
}

fn end_element(name: &QualifiedName, out: &mut ResultWriter<'_>) {
    out.end_element();
    if name.namespace_uri.is_some() {
        out.end_prefix_mapping(name.prefix.as_deref());
    }
}
