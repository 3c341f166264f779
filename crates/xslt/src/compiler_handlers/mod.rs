pub(super) mod control_flow;
pub(super) mod stylesheet;
pub(super) mod template;
pub(super) mod variables;

use crate::ast::{Instruction, InstructionId};
use crate::compiler::{
    CompilerBuilder, ModuleContext, XSLT_NAMESPACE, in_scope_bindings, location, qname_list, required_attr, written_name,
    yes_no,
};
use crate::error::XsltError;
use roxmltree::Node;

// Handlers for result-building instructions: literal result elements, computed
// elements and attributes, copies, text, and the other output instructions.
// They are implemented as methods on CompilerBuilder.

impl CompilerBuilder<'_> {
    pub(crate) fn compile_literal_element(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let tag = node.tag_name();
        let name = written_name(node, tag.name(), tag.namespace());
        let mut attributes = Vec::new();
        let mut use_attribute_sets = Vec::new();
        for attr in node.attributes() {
            if attr.namespace() == Some(XSLT_NAMESPACE) {
                if attr.name() == "use-attribute-sets" {
                    use_attribute_sets = qname_list(node, Some(attr.value()))?;
                }
                continue;
            }
            let attr_name = written_name(node, attr.name(), attr.namespace());
            attributes.push((attr_name, self.avt(node, attr.value())?));
        }
        let namespace_decls = self.result_namespaces(node, parent, module);
        let id = self.output.arena.append(
            parent,
            Instruction::LiteralElement {
                name,
                attributes,
                namespace_decls,
                use_attribute_sets,
            },
            location(node),
        )?;
        self.compile_children(node, id, module)
    }

    /// The namespace nodes a literal result element puts in the result. The
    /// outermost literal element of a template carries every binding in scope;
    /// nested ones only what they declare themselves.
    fn result_namespaces(
        &self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Vec<(Option<String>, String)> {
        let inherited: Vec<(Option<&str>, &str)> = if self.inside_literal_element(parent) {
            node.parent_element()
                .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        node.namespaces()
            .filter(|ns| !module.is_excluded(ns.uri()))
            .filter(|ns| !inherited.contains(&(ns.name(), ns.uri())))
            .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
            .collect()
    }

    fn inside_literal_element(&self, mut id: InstructionId) -> bool {
        loop {
            let node = self.output.arena.node(id);
            match (&node.kind, node.parent) {
                (Instruction::LiteralElement { .. }, _) => return true,
                (_, Some(parent)) => id = parent,
                (_, None) => return false,
            }
        }
    }

    pub(crate) fn compile_extension_element(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let tag = node.tag_name();
        let attributes = node
            .attributes()
            .map(|attr| {
                (
                    written_name(node, attr.name(), attr.namespace()),
                    attr.value().to_string(),
                )
            })
            .collect();
        let id = self.output.arena.append(
            parent,
            Instruction::ExtensionCall {
                name: written_name(node, tag.name(), tag.namespace()),
                attributes,
            },
            location(node),
        )?;
        self.compile_children(node, id, module)
    }

    pub(crate) fn compile_element(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let name = self.avt(node, required_attr(node, "name")?)?;
        let namespace = match node.attribute("namespace") {
            Some(text) => Some(self.avt(node, text)?),
            None => None,
        };
        let id = self.output.arena.append(
            parent,
            Instruction::Element {
                name,
                namespace,
                namespaces: in_scope_bindings(node),
                use_attribute_sets: qname_list(node, node.attribute("use-attribute-sets"))?,
            },
            location(node),
        )?;
        self.compile_children(node, id, module)
    }

    pub(crate) fn compile_attribute(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let name = self.avt(node, required_attr(node, "name")?)?;
        let namespace = match node.attribute("namespace") {
            Some(text) => Some(self.avt(node, text)?),
            None => None,
        };
        let id = self.output.arena.append(
            parent,
            Instruction::Attribute {
                name,
                namespace,
                namespaces: in_scope_bindings(node),
            },
            location(node),
        )?;
        self.compile_children(node, id, module)
    }

    pub(crate) fn compile_copy(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let use_attribute_sets = qname_list(node, node.attribute("use-attribute-sets"))?;
        let id = self
            .output
            .arena
            .append(parent, Instruction::Copy { use_attribute_sets }, location(node))?;
        self.compile_children(node, id, module)
    }

    pub(crate) fn compile_copy_of(&mut self, node: Node, parent: InstructionId) -> Result<(), XsltError> {
        let select = self.expression(node, required_attr(node, "select")?)?;
        self.output
            .arena
            .append(parent, Instruction::CopyOf { select }, location(node))?;
        Ok(())
    }

    pub(crate) fn compile_text(&mut self, node: Node, parent: InstructionId) -> Result<(), XsltError> {
        if node.children().any(|c| c.is_element()) {
            return Err(XsltError::compose("xsl:text may only contain text", location(node)));
        }
        let text: String = node.children().filter(|c| c.is_text()).filter_map(|c| c.text()).collect();
        let disable_escaping = yes_no(node, "disable-output-escaping")?;
        self.output.arena.append(
            parent,
            Instruction::Text {
                text,
                disable_escaping,
            },
            location(node),
        )?;
        Ok(())
    }

    pub(crate) fn compile_value_of(&mut self, node: Node, parent: InstructionId) -> Result<(), XsltError> {
        let select = self.expression(node, required_attr(node, "select")?)?;
        let disable_escaping = yes_no(node, "disable-output-escaping")?;
        self.output.arena.append(
            parent,
            Instruction::ValueOf {
                select,
                disable_escaping,
            },
            location(node),
        )?;
        Ok(())
    }

    /// `xsl:comment`, `xsl:processing-instruction`, `xsl:message` and `xsl:fallback`.
    pub(crate) fn compile_output_instruction(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let kind = match node.tag_name().name() {
            "comment" => Instruction::Comment,
            "processing-instruction" => Instruction::ProcessingInstruction {
                name: self.avt(node, required_attr(node, "name")?)?,
            },
            "message" => Instruction::Message {
                terminate: yes_no(node, "terminate")?,
            },
            _ => Instruction::Fallback,
        };
        let id = self.output.arena.append(parent, kind, location(node))?;
        self.compile_children(node, id, module)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::Instruction;
    use crate::avt::Avt;
    use crate::compiler::{CompiledModules, NoModules, compile_modules};
    use crate::config::TransformConfig;

    fn compile(root_attrs: &str, body: &str) -> CompiledModules {
        let text = format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" {}>
                <xsl:template match="/">{}</xsl:template>
            </xsl:stylesheet>"#,
            root_attrs, body
        );
        compile_modules(&text, &NoModules, &TransformConfig::default()).unwrap()
    }

    fn find(modules: &CompiledModules, pred: impl Fn(&Instruction) -> bool) -> Vec<&Instruction> {
        (0..modules.arena.len())
            .map(|i| modules.arena.kind(crate::ast::InstructionId(i)))
            .filter(|k| pred(k))
            .collect()
    }

    #[test]
    fn test_literal_element_attributes_and_namespaces() {
        let modules = compile(
            r#"xmlns:a="urn:a" xmlns:x="urn:x" exclude-result-prefixes="x""#,
            r#"<a:out class="c-{1}" xsl:use-attribute-sets="s"><inner xmlns:b="urn:b"/></a:out>"#,
        );
        let literals = find(&modules, |k| matches!(k, Instruction::LiteralElement { .. }));
        let Instruction::LiteralElement {
            name,
            attributes,
            namespace_decls,
            use_attribute_sets,
        } = literals[0]
        else {
            unreachable!()
        };
        assert_eq!(name.prefix.as_deref(), Some("a"));
        assert_eq!(name.namespace_uri.as_deref(), Some("urn:a"));
        assert_eq!(attributes.len(), 1);
        assert!(!attributes[0].1.is_constant());
        assert_eq!(use_attribute_sets[0].local_part, "s");
        assert_eq!(namespace_decls, &vec![(Some("a".to_string()), "urn:a".to_string())]);

        let Instruction::LiteralElement { namespace_decls, .. } = literals[1] else {
            unreachable!()
        };
        assert_eq!(namespace_decls, &vec![(Some("b".to_string()), "urn:b".to_string())]);
    }

    #[test]
    fn test_extension_elements_are_recognized() {
        let modules = compile(
            r#"xmlns:e="urn:ext" extension-element-prefixes="e""#,
            r#"<e:shout text="hi"><xsl:fallback>no</xsl:fallback></e:shout>"#,
        );
        let calls = find(&modules, |k| matches!(k, Instruction::ExtensionCall { .. }));
        let Instruction::ExtensionCall { name, attributes } = calls[0] else {
            unreachable!()
        };
        assert_eq!(name.namespace_uri.as_deref(), Some("urn:ext"));
        assert_eq!(attributes[0].1, "hi");
        assert_eq!(find(&modules, |k| matches!(k, Instruction::Fallback)).len(), 1);
    }

    #[test]
    fn test_text_value_of_and_computed_names() {
        let modules = compile(
            "",
            r#"<xsl:text disable-output-escaping="yes">&lt;b&gt;</xsl:text>
               <xsl:element name="{'e'}"><xsl:attribute name="a">v</xsl:attribute></xsl:element>
               <xsl:processing-instruction name="pi">d</xsl:processing-instruction>"#,
        );
        assert!(!find(&modules, |k| matches!(
            k,
            Instruction::Text { text, disable_escaping: true } if text == "<b>"
        ))
        .is_empty());
        assert!(!find(&modules, |k| matches!(k, Instruction::Element { name, .. } if !name.is_constant())).is_empty());
        assert!(!find(&modules, |k| matches!(
            k,
            Instruction::ProcessingInstruction { name } if *name == Avt::constant("pi")
        ))
        .is_empty());
    }
}
