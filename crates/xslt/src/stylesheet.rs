//! The composed, immutable form of a stylesheet shared by every run.
use crate::ast::{Instruction, InstructionArena, InstructionId, InstructionNode, NamespaceBindings};
use crate::diagnostics::Diagnostic;
use crate::dispatch::ModeTable;
use crate::keys::KeyDecl;
use crate::number_format::DecimalFormat;
use std::collections::HashMap;
use weft_xpath1::QualifiedName;

/// A visible top-level `xsl:variable` or `xsl:param`.
#[derive(Debug, Clone)]
pub struct GlobalDecl {
    pub name: QualifiedName,
    pub instruction: InstructionId,
    pub is_param: bool,
}

#[derive(Debug)]
pub struct Stylesheet {
    pub(crate) arena: InstructionArena,
    pub(crate) modes: HashMap<Option<QualifiedName>, ModeTable>,
    pub(crate) named_templates: HashMap<QualifiedName, InstructionId>,
    pub(crate) globals: Vec<GlobalDecl>,
    pub(crate) global_index: HashMap<QualifiedName, usize>,
    pub(crate) keys: HashMap<QualifiedName, Vec<KeyDecl>>,
    pub(crate) attribute_sets: HashMap<QualifiedName, InstructionId>,
    pub(crate) decimal_formats: HashMap<Option<QualifiedName>, DecimalFormat>,
    pub(crate) namespaces: NamespaceBindings,
    pub(crate) warnings: Vec<Diagnostic>,
}

impl Stylesheet {
    pub fn node(&self, id: InstructionId) -> &InstructionNode {
        self.arena.node(id)
    }

    pub fn instruction(&self, id: InstructionId) -> &Instruction {
        self.arena.kind(id)
    }

    pub fn children(&self, id: InstructionId) -> &[InstructionId] {
        self.arena.children(id)
    }

    pub fn instruction_count(&self) -> usize {
        self.arena.len()
    }

    /// The rule table of `mode`; `None` is the default mode.
    pub fn mode(&self, mode: Option<&QualifiedName>) -> Option<&ModeTable> {
        self.modes.get(&mode.cloned())
    }

    pub fn template_rule_count(&self) -> usize {
        self.modes.values().map(|table| table.rules().len()).sum()
    }

    pub fn named_template(&self, name: &QualifiedName) -> Option<InstructionId> {
        self.named_templates.get(name).copied()
    }

    pub fn globals(&self) -> &[GlobalDecl] {
        &self.globals
    }

    pub fn global_index(&self, name: &QualifiedName) -> Option<usize> {
        self.global_index.get(name).copied()
    }

    pub fn key_decls(&self, name: &QualifiedName) -> Option<&[KeyDecl]> {
        self.keys.get(name).map(Vec::as_slice)
    }

    pub fn attribute_set(&self, name: &QualifiedName) -> Option<InstructionId> {
        self.attribute_sets.get(name).copied()
    }

    pub fn decimal_format(&self, name: Option<&QualifiedName>) -> Option<&DecimalFormat> {
        self.decimal_formats.get(&name.cloned())
    }

    /// Namespace bindings in scope on the principal module's root element.
    pub fn namespaces(&self) -> &NamespaceBindings {
        &self.namespaces
    }

    /// Recoverable problems found while compiling.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }
}
