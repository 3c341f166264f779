//! Builds the instruction arena from XSLT 1.0 stylesheet markup.
//!
//! The builder walks each module's roxmltree document once. Element handlers
//! live in `compiler_handlers` as methods on [`CompilerBuilder`]; this file holds
//! the module loading, the dispatch and the attribute helpers they share.
//! Nothing here resolves variables or ranks templates; that is `compose`.
use crate::ast::{Instruction, InstructionArena, InstructionId, NamespaceBindings};
use crate::avt::Avt;
use crate::config::TransformConfig;
use crate::diagnostics::Diagnostic;
use crate::error::{Location, XsltError};
use crate::keys::KeyDecl;
use crate::number_format::DecimalFormat;
use crate::pattern::{self, Pattern};
use roxmltree::{Document, Node};
use std::collections::HashMap;
use weft_xpath1::{Expression, QualifiedName, XML_NAMESPACE, parse_expression};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// The name under which the principal module is tracked while loading.
const PRINCIPAL_MODULE: &str = "#principal";

/// Supplies the text of modules named by `xsl:import` and `xsl:include`.
pub trait ModuleResolver {
    fn load(&self, href: &str) -> Option<String>;
}

/// Resolves nothing; any import or include is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModules;

impl ModuleResolver for NoModules {
    fn load(&self, _href: &str) -> Option<String> {
        None
    }
}

/// Modules kept in memory, keyed by the exact `href` text.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolver {
    modules: HashMap<String, String>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, href: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(href, text);
        self
    }

    pub fn insert(&mut self, href: impl Into<String>, text: impl Into<String>) {
        self.modules.insert(href.into(), text.into());
    }
}

impl ModuleResolver for InMemoryResolver {
    fn load(&self, href: &str) -> Option<String> {
        self.modules.get(href).cloned()
    }
}

/// A top-level declaration with its import precedence and declaration position.
#[derive(Debug, Clone)]
pub(crate) struct Declared<T> {
    pub value: T,
    pub precedence: usize,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct NamespaceAlias {
    pub stylesheet_uri: String,
    pub result_prefix: Option<String>,
    pub result_uri: String,
}

/// Everything read from the module tree, before composition.
#[derive(Debug, Default)]
pub(crate) struct CompiledModules {
    pub arena: InstructionArena,
    pub templates: Vec<InstructionId>,
    pub globals: Vec<Declared<InstructionId>>,
    pub attribute_sets: Vec<InstructionId>,
    pub keys: Vec<Declared<KeyDecl>>,
    pub decimal_formats: Vec<Declared<(Option<QualifiedName>, DecimalFormat)>>,
    pub namespace_aliases: Vec<Declared<NamespaceAlias>>,
    pub namespaces: NamespaceBindings,
    pub warnings: Vec<Diagnostic>,
}

/// Settings of the module being read.
#[derive(Debug, Clone)]
pub(crate) struct ModuleContext {
    pub precedence: usize,
    pub import_floor: usize,
    pub extension_uris: Vec<String>,
    pub excluded_uris: Vec<String>,
}

impl ModuleContext {
    fn read(root: Node, precedence: usize, import_floor: usize) -> Result<Self, XsltError> {
        // On a simplified stylesheet these are xsl:-prefixed attributes of the literal root.
        let (ext_attr, excl_attr) = if is_xsl(root) {
            (
                root.attribute("extension-element-prefixes"),
                root.attribute("exclude-result-prefixes"),
            )
        } else {
            (
                root.attribute((XSLT_NAMESPACE, "extension-element-prefixes")),
                root.attribute((XSLT_NAMESPACE, "exclude-result-prefixes")),
            )
        };
        let extension_uris = prefix_uris(root, ext_attr)?;
        let mut excluded_uris = prefix_uris(root, excl_attr)?;
        excluded_uris.extend(extension_uris.iter().cloned());
        Ok(Self {
            precedence,
            import_floor,
            extension_uris,
            excluded_uris,
        })
    }

    pub fn is_extension(&self, uri: &str) -> bool {
        self.extension_uris.iter().any(|u| u == uri)
    }

    pub fn is_excluded(&self, uri: &str) -> bool {
        uri == XSLT_NAMESPACE || uri == XML_NAMESPACE || self.excluded_uris.iter().any(|u| u == uri)
    }
}

fn prefix_uris(root: Node, list: Option<&str>) -> Result<Vec<String>, XsltError> {
    let mut uris = Vec::new();
    for prefix in list.unwrap_or_default().split_whitespace() {
        let lookup = if prefix == "#default" { None } else { Some(prefix) };
        match root.lookup_namespace_uri(lookup) {
            Some(uri) => uris.push(uri.to_string()),
            None => {
                return Err(XsltError::compose(
                    format!("Prefix '{}' is not bound to a namespace", prefix),
                    location(root),
                ));
            }
        }
    }
    Ok(uris)
}

pub(crate) fn location(node: Node) -> Location {
    let pos = node.document().text_pos_at(node.range().start);
    Location::from((pos.row as usize, pos.col as usize))
}

pub(crate) fn is_xsl(node: Node) -> bool {
    node.is_element() && node.tag_name().namespace() == Some(XSLT_NAMESPACE)
}

pub(crate) fn is_xsl_named(node: Node, local: &str) -> bool {
    is_xsl(node) && node.tag_name().name() == local
}

pub(crate) fn display_name(node: Node) -> String {
    if is_xsl(node) {
        format!("xsl:{}", node.tag_name().name())
    } else {
        node.tag_name().name().to_string()
    }
}

pub(crate) fn is_whitespace(node: Node) -> bool {
    node.is_text() && node.text().is_none_or(|t| t.trim().is_empty())
}

fn preserves_space(node: Node) -> bool {
    node.ancestors()
        .find_map(|n| n.attribute((XML_NAMESPACE, "space")))
        .is_some_and(|v| v == "preserve")
}

pub(crate) fn required_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, XsltError> {
    node.attribute(name).ok_or_else(|| {
        XsltError::compose(
            format!("{} requires the '{}' attribute", display_name(node), name),
            location(node),
        )
    })
}

pub(crate) fn yes_no(node: Node, name: &str) -> Result<bool, XsltError> {
    match node.attribute(name) {
        None | Some("no") => Ok(false),
        Some("yes") => Ok(true),
        Some(other) => Err(XsltError::compose(
            format!("'{}' must be 'yes' or 'no', found '{}'", name, other),
            location(node),
        )),
    }
}

/// Every namespace binding in scope on `node`.
pub(crate) fn in_scope_bindings(node: Node) -> NamespaceBindings {
    NamespaceBindings(
        node.namespaces()
            .map(|ns| (ns.name().map(str::to_string), ns.uri().to_string()))
            .collect(),
    )
}

/// Resolves a lexical QName written on `node`. Unprefixed names are in no namespace.
pub(crate) fn qname(node: Node, text: &str) -> Result<QualifiedName, XsltError> {
    let mut name = QualifiedName::parse_lexical(text.trim()).ok_or_else(|| {
        XsltError::compose(format!("'{}' is not a valid QName", text), location(node))
    })?;
    name.resolve(|p| node.lookup_namespace_uri(Some(p)).map(str::to_string))
        .map_err(|prefix| {
            XsltError::compose(
                format!("Prefix '{}' is not bound to a namespace", prefix),
                location(node),
            )
        })?;
    Ok(name)
}

pub(crate) fn qname_list(node: Node, text: Option<&str>) -> Result<Vec<QualifiedName>, XsltError> {
    text.unwrap_or_default()
        .split_whitespace()
        .map(|t| qname(node, t))
        .collect()
}

/// The name of a literal element or attribute as written, with its namespace.
pub(crate) fn written_name(scope: Node, local: &str, namespace: Option<&str>) -> QualifiedName {
    let prefix = match namespace {
        Some(XML_NAMESPACE) => Some("xml"),
        Some(uri) => scope.lookup_prefix(uri),
        None => None,
    };
    QualifiedName::new(prefix, local, namespace)
}

pub(crate) struct CompilerBuilder<'r> {
    resolver: &'r dyn ModuleResolver,
    strip_whitespace: bool,
    pub(crate) output: CompiledModules,
    precedence: usize,
    position: usize,
    loading: Vec<String>,
}

/// Reads the principal module and every module it imports or includes.
pub(crate) fn compile_modules(
    text: &str,
    resolver: &dyn ModuleResolver,
    config: &TransformConfig,
) -> Result<CompiledModules, XsltError> {
    let mut builder = CompilerBuilder {
        resolver,
        strip_whitespace: config.strip_stylesheet_whitespace,
        output: CompiledModules::default(),
        precedence: 0,
        position: 0,
        loading: Vec::new(),
    };
    builder.load_module(text, PRINCIPAL_MODULE, true)?;
    log::debug!(
        "read {} templates and {} globals from {} module(s)",
        builder.output.templates.len(),
        builder.output.globals.len(),
        builder.precedence
    );
    Ok(builder.output)
}

impl<'r> CompilerBuilder<'r> {
    pub(crate) fn next_position(&mut self) -> usize {
        self.position += 1;
        self.position
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>, node: Node) {
        self.output
            .warnings
            .push(Diagnostic::warning(message, Some(location(node))));
    }

    fn enter(&mut self, href: &str, node: Option<Node>) -> Result<(), XsltError> {
        if self.loading.iter().any(|h| h == href) {
            return Err(XsltError::compose(
                format!("Module '{}' imports or includes itself", href),
                node.map(location).unwrap_or_default(),
            ));
        }
        self.loading.push(href.to_string());
        Ok(())
    }

    pub(crate) fn fetch(&self, node: Node) -> Result<(String, String), XsltError> {
        let href = required_attr(node, "href")?;
        let text = self.resolver.load(href).ok_or_else(|| {
            XsltError::compose(format!("Cannot load module '{}'", href), location(node))
        })?;
        Ok((href.to_string(), text))
    }

    /// Imports get lower precedence than the module importing them, and are
    /// numbered first, so a module's imports occupy `[import_floor, precedence)`.
    fn load_module(&mut self, text: &str, href: &str, principal: bool) -> Result<(), XsltError> {
        self.enter(href, None)?;
        let import_floor = self.precedence + 1;
        self.read_imports(text)?;
        self.precedence += 1;

        let doc = Document::parse(text)?;
        let root = doc.root_element();
        if principal {
            self.output.namespaces = in_scope_bindings(root);
        }
        let module = ModuleContext::read(root, self.precedence, import_floor)?;
        self.compile_module_root(root, &module)?;
        self.loading.pop();
        Ok(())
    }

    /// Loads the imports of a module, including those of the modules it includes.
    fn read_imports(&mut self, text: &str) -> Result<(), XsltError> {
        let doc = Document::parse(text)?;
        let root = doc.root_element();
        if !is_xsl(root) {
            return Ok(());
        }
        for child in root.children().filter(|c| c.is_element()) {
            if is_xsl_named(child, "import") {
                let (href, imported) = self.fetch(child)?;
                self.load_module(&imported, &href, false)?;
            } else if is_xsl_named(child, "include") {
                let (href, included) = self.fetch(child)?;
                self.enter(&href, Some(child))?;
                self.read_imports(&included)?;
                self.loading.pop();
            }
        }
        Ok(())
    }

    /// Reads an included module at the including module's precedence.
    pub(crate) fn include_module(&mut self, node: Node, outer: &ModuleContext) -> Result<(), XsltError> {
        let (href, text) = self.fetch(node)?;
        self.enter(&href, Some(node))?;
        let doc = Document::parse(&text)?;
        let root = doc.root_element();
        let module = ModuleContext::read(root, outer.precedence, outer.import_floor)?;
        self.compile_module_root(root, &module)?;
        self.loading.pop();
        Ok(())
    }

    fn compile_module_root(&mut self, root: Node, module: &ModuleContext) -> Result<(), XsltError> {
        if is_xsl_named(root, "stylesheet") || is_xsl_named(root, "transform") {
            return self.compile_declarations(root, module);
        }
        if root.attribute((XSLT_NAMESPACE, "version")).is_some() {
            return self.compile_simplified(root, module);
        }
        Err(XsltError::compose(
            format!("'{}' is not a stylesheet element", display_name(root)),
            location(root),
        ))
    }

    /// Adds the children of an instruction element below `parent`.
    pub(crate) fn compile_children(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        for child in node.children() {
            if child.is_element() {
                self.compile_instruction(child, parent, module)?;
            } else if child.is_text() {
                let text = child.text().unwrap_or_default();
                let kind = Instruction::Text {
                    text: text.to_string(),
                    disable_escaping: false,
                };
                if is_whitespace(child)
                    && (!self.output.arena.kind(parent).allows_child(&kind)
                        || (self.strip_whitespace && !preserves_space(child)))
                {
                    continue;
                }
                self.output.arena.append(parent, kind, location(child))?;
            }
        }
        Ok(())
    }

    pub(crate) fn compile_instruction(
        &mut self,
        node: Node,
        parent: InstructionId,
        module: &ModuleContext,
    ) -> Result<(), XsltError> {
        match node.tag_name().namespace() {
            Some(XSLT_NAMESPACE) => self.compile_xsl(node, parent, module),
            Some(uri) if module.is_extension(uri) => self.compile_extension_element(node, parent, module),
            _ => self.compile_literal_element(node, parent, module),
        }
    }

    fn compile_xsl(&mut self, node: Node, parent: InstructionId, module: &ModuleContext) -> Result<(), XsltError> {
        match node.tag_name().name() {
            "if" | "choose" | "when" | "otherwise" => self.compile_conditional(node, parent, module),
            "for-each" => self.compile_for_each(node, parent, module),
            "sort" => match self.output.arena.kind(parent) {
                // Already folded into the owner's sort keys.
                Instruction::ForEach { .. } | Instruction::ApplyTemplates { .. } => Ok(()),
                _ => Err(XsltError::compose(
                    "xsl:sort is only allowed in xsl:for-each and xsl:apply-templates",
                    location(node),
                )),
            },
            "apply-templates" => self.compile_apply_templates(node, parent, module),
            "apply-imports" => self.compile_apply_imports(node, parent),
            "call-template" => self.compile_call_template(node, parent, module),
            "variable" | "param" | "with-param" => self.compile_local_variable(node, parent, module),
            "element" => self.compile_element(node, parent, module),
            "attribute" => self.compile_attribute(node, parent, module),
            "text" => self.compile_text(node, parent),
            "value-of" => self.compile_value_of(node, parent),
            "copy" => self.compile_copy(node, parent, module),
            "copy-of" => self.compile_copy_of(node, parent),
            "comment" | "processing-instruction" | "message" | "fallback" => {
                self.compile_output_instruction(node, parent, module)
            }
            "template" | "stylesheet" | "transform" | "import" | "include" | "key" | "attribute-set"
            | "decimal-format" | "namespace-alias" | "output" | "strip-space" | "preserve-space" => {
                Err(XsltError::compose(
                    format!("{} is only allowed at the top level", display_name(node)),
                    location(node),
                ))
            }
            _ => Err(XsltError::compose(
                format!("{} is not supported", display_name(node)),
                location(node),
            )),
        }
    }

    pub(crate) fn expression(&mut self, node: Node, text: &str) -> Result<Expression, XsltError> {
        let mut expr = parse_expression(text).map_err(|e| XsltError::from_xpath(text, e))?;
        expr.resolve_prefixes(|p| node.lookup_namespace_uri(Some(p)).map(str::to_string))
            .map_err(|e| XsltError::compose(e.to_string(), location(node)))?;
        Ok(expr)
    }

    pub(crate) fn avt(&mut self, node: Node, text: &str) -> Result<Avt, XsltError> {
        let parsed = Avt::parse(text)?;
        for warning in parsed.warnings {
            self.warn(warning, node);
        }
        let mut avt = parsed.avt;
        avt.resolve_prefixes(|p| node.lookup_namespace_uri(Some(p)).map(str::to_string))
            .map_err(|e| XsltError::compose(e.to_string(), location(node)))?;
        Ok(avt)
    }

    pub(crate) fn pattern(&mut self, node: Node, text: &str) -> Result<Pattern, XsltError> {
        let mut pattern = pattern::parse(text)?;
        pattern
            .resolve_prefixes(|p| node.lookup_namespace_uri(Some(p)).map(str::to_string))
            .map_err(|e| XsltError::compose(e.to_string(), location(node)))?;
        Ok(pattern)
    }
}
