//! Handlers for the top-level declarations of a stylesheet module.

use crate::ast::{AttributeSetDecl, Instruction, TemplateDecl, VariableDecl};
use crate::compiler::{
    CompilerBuilder, Declared, ModuleContext, NamespaceAlias, XSLT_NAMESPACE, display_name, is_whitespace, is_xsl,
    location, qname, qname_list, required_attr,
};
use crate::error::XsltError;
use crate::keys::KeyDecl;
use crate::number_format::DecimalFormat;
use crate::pattern;
use roxmltree::Node;

impl CompilerBuilder<'_> {
    pub(crate) fn compile_declarations(&mut self, root: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let mut imports_allowed = true;
        for child in root.children() {
            if child.is_text() {
                if !is_whitespace(child) {
                    return Err(XsltError::compose(
                        "Text is not allowed at the top level of a stylesheet",
                        location(child),
                    ));
                }
                continue;
            }
            if !child.is_element() {
                continue;
            }
            if !is_xsl(child) {
                // Top-level elements in other namespaces are data for other tools.
                imports_allowed = false;
                continue;
            }
            let local = child.tag_name().name();
            if local == "import" {
                if !imports_allowed {
                    return Err(XsltError::compose(
                        "xsl:import must come before every other top-level element",
                        location(child),
                    ));
                }
                continue;
            }
            imports_allowed = false;
            match local {
                "include" => self.include_module(child, module)?,
                "template" => self.compile_template_decl(child, module)?,
                "variable" | "param" => self.compile_global(child, module)?,
                "key" => self.compile_key(child, module)?,
                "attribute-set" => self.compile_attribute_set(child, module)?,
                "decimal-format" => self.compile_decimal_format(child, module)?,
                "namespace-alias" => self.compile_namespace_alias(child, module)?,
                "output" | "preserve-space" => {}
                "strip-space" => self.warn("xsl:strip-space is not supported; source whitespace is kept", child),
                _ => {
                    return Err(XsltError::compose(
                        format!("{} is not allowed at the top level", display_name(child)),
                        location(child),
                    ));
                }
            }
        }
        Ok(())
    }

    /// A literal result element carrying `xsl:version` is the body of a
    /// template matching `/`.
    pub(crate) fn compile_simplified(&mut self, root: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let decl = TemplateDecl {
            pattern: Some(pattern::parse("/")?),
            name: None,
            mode: None,
            priority: None,
            precedence: module.precedence,
            import_floor: module.import_floor,
            position: self.next_position(),
            frame_size: 0,
            params: Vec::new(),
        };
        let template = self.output.arena.add_root(Instruction::Template(decl), location(root));
        self.output.templates.push(template);
        self.compile_literal_element(root, template, module)
    }

    fn compile_template_decl(&mut self, node: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let pattern = match node.attribute("match") {
            Some(text) => Some(self.pattern(node, text)?),
            None => None,
        };
        let name = node.attribute("name").map(|t| qname(node, t)).transpose()?;
        if pattern.is_none() && name.is_none() {
            return Err(XsltError::compose(
                "xsl:template requires a 'match' or 'name' attribute",
                location(node),
            ));
        }
        let mode = node.attribute("mode").map(|t| qname(node, t)).transpose()?;
        let priority = match node.attribute("priority") {
            Some(text) => Some(text.trim().parse::<f64>().map_err(|_| {
                XsltError::compose(format!("Priority '{}' is not a number", text), location(node))
            })?),
            None => None,
        };
        let decl = TemplateDecl {
            pattern,
            name,
            mode,
            priority,
            precedence: module.precedence,
            import_floor: module.import_floor,
            position: self.next_position(),
            frame_size: 0,
            params: Vec::new(),
        };
        let template = self.output.arena.add_root(Instruction::Template(decl), location(node));
        self.output.templates.push(template);
        self.compile_children(node, template, module)
    }

    fn compile_global(&mut self, node: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let decl = self.variable_decl(node)?;
        let kind = if node.tag_name().name() == "param" {
            Instruction::Param(decl)
        } else {
            Instruction::Variable(decl)
        };
        let id = self.output.arena.add_root(kind, location(node));
        let position = self.next_position();
        self.output.globals.push(Declared {
            value: id,
            precedence: module.precedence,
            position,
        });
        self.compile_children(node, id, module)
    }

    fn compile_key(&mut self, node: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let (Some(name), Some(match_text), Some(use_text)) =
            (node.attribute("name"), node.attribute("match"), node.attribute("use"))
        else {
            return Err(XsltError::compose(
                "Malformed xsl:key: 'name', 'match' and 'use' are all required",
                location(node),
            ));
        };
        let decl = KeyDecl {
            name: qname(node, name)?,
            pattern: self.pattern(node, match_text)?,
            use_expr: self.expression(node, use_text)?,
        };
        let position = self.next_position();
        self.output.keys.push(Declared {
            value: decl,
            precedence: module.precedence,
            position,
        });
        Ok(())
    }

    fn compile_attribute_set(&mut self, node: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let decl = AttributeSetDecl {
            name: qname(node, required_attr(node, "name")?)?,
            use_attribute_sets: qname_list(node, node.attribute("use-attribute-sets"))?,
            precedence: module.precedence,
            position: self.next_position(),
            frame_size: 0,
        };
        let id = self
            .output
            .arena
            .add_root(Instruction::AttributeSet(decl), location(node));
        self.output.attribute_sets.push(id);
        self.compile_children(node, id, module)
    }

    fn compile_decimal_format(&mut self, node: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let name = node.attribute("name").map(|t| qname(node, t)).transpose()?;
        let mut format = DecimalFormat::default();
        for attr in node.attributes() {
            if attr.namespace().is_some() {
                continue;
            }
            let value = attr.value();
            let single = || {
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(XsltError::compose(
                        format!("'{}' must be a single character, found '{}'", attr.name(), value),
                        location(node),
                    )),
                }
            };
            match attr.name() {
                "name" => {}
                "decimal-separator" => format.decimal_separator = single()?,
                "grouping-separator" => format.grouping_separator = single()?,
                "infinity" => format.infinity = value.to_string(),
                "minus-sign" => format.minus_sign = single()?,
                "NaN" => format.nan = value.to_string(),
                "percent" => format.percent = single()?,
                "per-mille" => format.per_mille = single()?,
                "zero-digit" => format.zero_digit = single()?,
                "digit" => format.digit = single()?,
                "pattern-separator" => format.pattern_separator = single()?,
                other => {
                    return Err(XsltError::compose(
                        format!("Unknown xsl:decimal-format attribute '{}'", other),
                        location(node),
                    ));
                }
            }
        }
        let position = self.next_position();
        self.output.decimal_formats.push(Declared {
            value: (name, format),
            precedence: module.precedence,
            position,
        });
        Ok(())
    }

    fn compile_namespace_alias(&mut self, node: Node, module: &ModuleContext) -> Result<(), XsltError> {
        let uri_of = |attr: &str| -> Result<(Option<String>, String), XsltError> {
            let prefix = required_attr(node, attr)?;
            let lookup = (prefix != "#default").then_some(prefix);
            // An unbound #default stands for no namespace, kept as "".
            let uri = match node.lookup_namespace_uri(lookup) {
                Some(uri) => uri.to_string(),
                None if lookup.is_none() => String::new(),
                None => {
                    return Err(XsltError::compose(
                        format!("Prefix '{}' is not bound to a namespace", prefix),
                        location(node),
                    ));
                }
            };
            Ok((lookup.map(str::to_string), uri))
        };
        let (_, stylesheet_uri) = uri_of("stylesheet-prefix")?;
        let (result_prefix, result_uri) = uri_of("result-prefix")?;
        if stylesheet_uri == XSLT_NAMESPACE && result_uri == XSLT_NAMESPACE {
            return Ok(());
        }
        let position = self.next_position();
        self.output.namespace_aliases.push(Declared {
            value: NamespaceAlias {
                stylesheet_uri,
                result_prefix,
                result_uri,
            },
            precedence: module.precedence,
            position,
        });
        Ok(())
    }

    pub(crate) fn variable_decl(&mut self, node: Node) -> Result<VariableDecl, XsltError> {
        let name = qname(node, required_attr(node, "name")?)?;
        let select = match node.attribute("select") {
            Some(text) => Some(self.expression(node, text)?),
            None => None,
        };
        if select.is_some() && node.children().any(|c| c.is_element() || (c.is_text() && !is_whitespace(c))) {
            return Err(XsltError::compose(
                format!("{} '{}' has both a 'select' attribute and content", display_name(node), name),
                location(node),
            ));
        }
        Ok(VariableDecl::new(name, select))
    }
}
