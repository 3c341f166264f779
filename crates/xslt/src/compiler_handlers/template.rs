//! Handlers for `<xsl:apply-templates>`, `<xsl:apply-imports>` and `<xsl:call-template>`.

use crate::ast::{Instruction, InstructionId};
use crate::compiler::{CompilerBuilder, ModuleContext, is_xsl_named, location, qname, required_attr};
use crate::error::XsltError;
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn compile_apply_templates(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let select = match node.attribute("select") {
            Some(text) => Some(self.expression(node, text)?),
            None => None,
        };
        let mode = node.attribute("mode").map(|t| qname(node, t)).transpose()?;
        let mut sort_keys = Vec::new();
        for child in node.children().filter(|c| is_xsl_named(*c, "sort")) {
            sort_keys.push(self.sort_key(child)?);
        }
        let id = self.output.arena.append(
            parent,
            Instruction::ApplyTemplates {
                select,
                mode,
                sort_keys,
            },
            location(node),
        )?;
        self.compile_children(node, id, module)
    }

    pub(crate) fn compile_apply_imports(&mut self, node: Node, parent: InstructionId) -> Result<(), XsltError> {
        if node.children().any(|c| c.is_element()) {
            return Err(XsltError::compose("xsl:apply-imports must be empty", location(node)));
        }
        self.output
            .arena
            .append(parent, Instruction::ApplyImports, location(node))?;
        Ok(())
    }

    pub(crate) fn compile_call_template(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let name = qname(node, required_attr(node, "name")?)?;
        let id = self.output.arena.append(
            parent,
            Instruction::CallTemplate { name, target: None },
            location(node),
        )?;
        self.compile_children(node, id, module)
    }
}
