//! The instruction tree: an arena of nodes built by the compiler, rewritten in
//! place by compose, then frozen and shared by every run.
use crate::avt::Avt;
use crate::error::{Location, XsltError};
use crate::pattern::Pattern;
use crate::sort::SortKey;
use weft_xpath1::{Expression, QualifiedName};

/// A handle to a node in an [`InstructionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstructionId(pub(crate) usize);

/// Namespace declarations in scope at an instruction. A `None` prefix is the default namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespaceBindings(pub Vec<(Option<String>, String)>);

impl NamespaceBindings {
    pub fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// Finds a prefix bound to `uri`, preferring `hint` when it is bound to it.
    pub fn prefix_for<'s>(&'s self, uri: &str, hint: Option<&'s str>) -> Option<Option<&'s str>> {
        if self.lookup(hint) == Some(uri) {
            return Some(hint);
        }
        self.0
            .iter()
            .rev()
            .find(|(_, u)| u == uri)
            .map(|(p, _)| p.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDecl {
    pub pattern: Option<Pattern>,
    pub name: Option<QualifiedName>,
    pub mode: Option<QualifiedName>,
    /// The declared priority. Rules without one use the default of each pattern alternative.
    pub priority: Option<f64>,
    pub precedence: usize,
    /// Lowest precedence among the modules imported by this template's module.
    pub import_floor: usize,
    pub position: usize,
    pub frame_size: usize,
    /// Leading `xsl:param` slots, in declaration order.
    pub params: Vec<QualifiedName>,
}

impl TemplateDecl {
    pub fn in_args_size(&self) -> usize {
        self.params.len()
    }
}

/// `xsl:variable`, `xsl:param` and `xsl:with-param`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: QualifiedName,
    pub select: Option<Expression>,
    /// Local slot, or global index for top-level declarations.
    pub slot: usize,
    /// Frame needed by the body of a top-level declaration.
    pub frame_size: usize,
}

impl VariableDecl {
    pub fn new(name: QualifiedName, select: Option<Expression>) -> Self {
        Self {
            name,
            select,
            slot: 0,
            frame_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSetDecl {
    pub name: QualifiedName,
    pub use_attribute_sets: Vec<QualifiedName>,
    pub precedence: usize,
    pub position: usize,
    pub frame_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Template(TemplateDecl),
    If {
        test: Expression,
    },
    Choose,
    When {
        test: Expression,
    },
    Otherwise,
    ForEach {
        select: Expression,
        sort_keys: Vec<SortKey>,
        frame_size: usize,
    },
    ApplyTemplates {
        select: Option<Expression>,
        mode: Option<QualifiedName>,
        sort_keys: Vec<SortKey>,
    },
    ApplyImports,
    CallTemplate {
        name: QualifiedName,
        /// Resolved by compose.
        target: Option<InstructionId>,
    },
    Variable(VariableDecl),
    Param(VariableDecl),
    WithParam(VariableDecl),
    /// `xsl:element`.
    Element {
        name: Avt,
        namespace: Option<Avt>,
        namespaces: NamespaceBindings,
        use_attribute_sets: Vec<QualifiedName>,
    },
    /// `xsl:attribute`.
    Attribute {
        name: Avt,
        namespace: Option<Avt>,
        namespaces: NamespaceBindings,
    },
    /// A literal result element.
    LiteralElement {
        name: QualifiedName,
        attributes: Vec<(QualifiedName, Avt)>,
        /// Namespace declarations to emit as prefix mappings.
        namespace_decls: Vec<(Option<String>, String)>,
        use_attribute_sets: Vec<QualifiedName>,
    },
    Text {
        text: String,
        disable_escaping: bool,
    },
    ValueOf {
        select: Expression,
        disable_escaping: bool,
    },
    Copy {
        use_attribute_sets: Vec<QualifiedName>,
    },
    CopyOf {
        select: Expression,
    },
    Comment,
    ProcessingInstruction {
        name: Avt,
    },
    Message {
        terminate: bool,
    },
    AttributeSet(AttributeSetDecl),
    /// An element in an extension namespace.
    ExtensionCall {
        name: QualifiedName,
        attributes: Vec<(QualifiedName, String)>,
    },
    Fallback,
}

impl Instruction {
    pub fn display_name(&self) -> &'static str {
        match self {
            Instruction::Template(_) => "xsl:template",
            Instruction::If { .. } => "xsl:if",
            Instruction::Choose => "xsl:choose",
            Instruction::When { .. } => "xsl:when",
            Instruction::Otherwise => "xsl:otherwise",
            Instruction::ForEach { .. } => "xsl:for-each",
            Instruction::ApplyTemplates { .. } => "xsl:apply-templates",
            Instruction::ApplyImports => "xsl:apply-imports",
            Instruction::CallTemplate { .. } => "xsl:call-template",
            Instruction::Variable(_) => "xsl:variable",
            Instruction::Param(_) => "xsl:param",
            Instruction::WithParam(_) => "xsl:with-param",
            Instruction::Element { .. } => "xsl:element",
            Instruction::Attribute { .. } => "xsl:attribute",
            Instruction::LiteralElement { .. } => "literal result element",
            Instruction::Text { .. } => "xsl:text",
            Instruction::ValueOf { .. } => "xsl:value-of",
            Instruction::Copy { .. } => "xsl:copy",
            Instruction::CopyOf { .. } => "xsl:copy-of",
            Instruction::Comment => "xsl:comment",
            Instruction::ProcessingInstruction { .. } => "xsl:processing-instruction",
            Instruction::Message { .. } => "xsl:message",
            Instruction::AttributeSet(_) => "xsl:attribute-set",
            Instruction::ExtensionCall { .. } => "extension element",
            Instruction::Fallback => "xsl:fallback",
        }
    }

    /// Instructions that may appear in a template body.
    fn is_content(&self) -> bool {
        !matches!(
            self,
            Instruction::Template(_)
                | Instruction::When { .. }
                | Instruction::Otherwise
                | Instruction::Param(_)
                | Instruction::WithParam(_)
                | Instruction::AttributeSet(_)
        )
    }

    /// Whether `child` may be appended under an instruction of this kind.
    pub fn allows_child(&self, child: &Instruction) -> bool {
        match self {
            Instruction::Choose => matches!(child, Instruction::When { .. } | Instruction::Otherwise),
            Instruction::ApplyTemplates { .. } | Instruction::CallTemplate { .. } => {
                matches!(child, Instruction::WithParam(_))
            }
            Instruction::AttributeSet(_) => matches!(child, Instruction::Attribute { .. }),
            Instruction::Template(_) => child.is_content() || matches!(child, Instruction::Param(_)),
            Instruction::Text { .. }
            | Instruction::ValueOf { .. }
            | Instruction::CopyOf { .. }
            | Instruction::ApplyImports => false,
            _ => child.is_content(),
        }
    }

    /// Every expression held by the instruction, including those inside AVTs and sort keys.
    pub fn expressions_mut(&mut self) -> Vec<&mut Expression> {
        let mut out: Vec<&mut Expression> = Vec::new();
        match self {
            Instruction::If { test } | Instruction::When { test } => out.push(test),
            Instruction::ForEach {
                select, sort_keys, ..
            } => {
                out.push(select);
                out.extend(sort_keys.iter_mut().map(|k| &mut k.select));
            }
            Instruction::ApplyTemplates {
                select, sort_keys, ..
            } => {
                out.extend(select.as_mut());
                out.extend(sort_keys.iter_mut().map(|k| &mut k.select));
            }
            Instruction::Variable(decl) | Instruction::Param(decl) | Instruction::WithParam(decl) => {
                out.extend(decl.select.as_mut())
            }
            Instruction::Element {
                name, namespace, ..
            }
            | Instruction::Attribute {
                name, namespace, ..
            } => {
                out.extend(name.expressions_mut());
                if let Some(ns) = namespace {
                    out.extend(ns.expressions_mut());
                }
            }
            Instruction::LiteralElement { attributes, .. } => {
                out.extend(attributes.iter_mut().flat_map(|(_, avt)| avt.expressions_mut()))
            }
            Instruction::ValueOf { select, .. } | Instruction::CopyOf { select } => out.push(select),
            Instruction::ProcessingInstruction { name } => out.extend(name.expressions_mut()),
            Instruction::Template(_)
            | Instruction::Choose
            | Instruction::Otherwise
            | Instruction::ApplyImports
            | Instruction::CallTemplate { .. }
            | Instruction::Text { .. }
            | Instruction::Copy { .. }
            | Instruction::Comment
            | Instruction::Message { .. }
            | Instruction::AttributeSet(_)
            | Instruction::ExtensionCall { .. }
            | Instruction::Fallback => {}
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct InstructionNode {
    pub kind: Instruction,
    pub parent: Option<InstructionId>,
    pub children: Vec<InstructionId>,
    pub location: Location,
}

/// Owns every instruction of a stylesheet. Top-level declarations have no parent.
#[derive(Debug, Clone, Default)]
pub struct InstructionArena {
    nodes: Vec<InstructionNode>,
}

impl InstructionArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, kind: Instruction, location: Location) -> InstructionId {
        let id = InstructionId(self.nodes.len());
        self.nodes.push(InstructionNode {
            kind,
            parent: None,
            children: Vec::new(),
            location,
        });
        id
    }

    /// Appends `kind` as the last child of `parent`, checking that the nesting is allowed.
    pub fn append(
        &mut self,
        parent: InstructionId,
        kind: Instruction,
        location: Location,
    ) -> Result<InstructionId, XsltError> {
        let parent_kind = &self.node(parent).kind;
        if !parent_kind.allows_child(&kind) {
            return Err(XsltError::compose(
                format!(
                    "{} is not allowed inside {}",
                    kind.display_name(),
                    parent_kind.display_name()
                ),
                location,
            ));
        }
        let id = InstructionId(self.nodes.len());
        self.nodes.push(InstructionNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            location,
        });
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: InstructionId) -> &InstructionNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: InstructionId) -> &mut InstructionNode {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: InstructionId) -> &Instruction {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: InstructionId) -> &[InstructionId] {
        &self.nodes[id.0].children
    }

    /// Detaches every child of `id`. The nodes stay in the arena, unreachable.
    pub fn clear_children(&mut self, id: InstructionId) {
        self.nodes[id.0].children.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
