//! Handlers for local `<xsl:variable>`, `<xsl:param>`, and `<xsl:with-param>`.

use crate::ast::{Instruction, InstructionId};
use crate::compiler::{CompilerBuilder, ModuleContext, location};
use crate::error::XsltError;
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn compile_local_variable(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let decl = self.variable_decl(node)?;
        let kind = match node.tag_name().name() {
            "param" => Instruction::Param(decl),
            "with-param" => Instruction::WithParam(decl),
            _ => Instruction::Variable(decl),
        };
        // The validity table keeps xsl:param inside templates and xsl:with-param
        // inside the two invocation instructions.
        let id = self.output.arena.append(parent, kind, location(node))?;
        self.compile_children(node, id, module)
    }
}
