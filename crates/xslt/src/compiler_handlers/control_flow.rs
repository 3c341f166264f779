//! Handlers for `<xsl:if>`, `<xsl:choose>` and its branches, `<xsl:for-each>` and `<xsl:sort>`.

use crate::ast::{Instruction, InstructionId};
use crate::compiler::{CompilerBuilder, ModuleContext, is_whitespace, is_xsl_named, location, required_attr};
use crate::error::XsltError;
use crate::sort::{SortDataType, SortKey, SortOrder};
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn compile_conditional(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let kind = match node.tag_name().name() {
            "if" => Instruction::If {
                test: self.expression(node, required_attr(node, "test")?)?,
            },
            "when" => Instruction::When {
                test: self.expression(node, required_attr(node, "test")?)?,
            },
            "otherwise" => Instruction::Otherwise,
            _ => Instruction::Choose,
        };
        let id = self.output.arena.append(parent, kind, location(node))?;
        self.compile_children(node, id, module)
    }

    pub(crate) fn compile_for_each(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        let select = self.expression(node, required_attr(node, "select")?)?;
        let sort_keys = self.leading_sort_keys(node)?;
        let id = self.output.arena.append(
            parent,
            Instruction::ForEach {
                select,
                sort_keys,
                frame_size: 0,
            },
            location(node),
        )?;
        self.compile_children(node, id, module)
    }

    /// Sort keys of `xsl:for-each`, which must precede the loop body.
    fn leading_sort_keys(&mut self, node: Node) -> Result<Vec<SortKey>, XsltError> {
        let mut keys = Vec::new();
        let mut body_started = false;
        for child in node.children() {
            if is_xsl_named(child, "sort") {
                if body_started {
                    return Err(XsltError::compose(
                        "xsl:sort must come before the body of xsl:for-each",
                        location(child),
                    ));
                }
                keys.push(self.sort_key(child)?);
            } else if child.is_element() || (child.is_text() && !is_whitespace(child)) {
                body_started = true;
            }
        }
        Ok(keys)
    }

    pub(crate) fn sort_key(&mut self, node: Node) -> Result<SortKey, XsltError> {
        let select = self.expression(node, node.attribute("select").unwrap_or("."))?;
        let order = match node.attribute("order") {
            None | Some("ascending") => SortOrder::Ascending,
            Some("descending") => SortOrder::Descending,
            Some(other) => {
                return Err(XsltError::compose(
                    format!("Unsupported sort order '{}'", other),
                    location(node),
                ));
            }
        };
        let data_type = match node.attribute("data-type") {
            None | Some("text") => SortDataType::Text,
            Some("number") => SortDataType::Number,
            Some(other) => {
                return Err(XsltError::compose(
                    format!("Unsupported sort data-type '{}'", other),
                    location(node),
                ));
            }
        };
        Ok(SortKey {
            select,
            order,
            data_type,
        })
    }
}
