//! Compose-time slot allocation: maps variable and parameter names to frame
//! slots by lexical scope.
use crate::error::{Location, XsltError};
use std::collections::HashMap;
use weft_xpath1::ast::ExpressionVisitorMut;
use weft_xpath1::{Expression, QualifiedName, VarSlot, VariableRef, XPathError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A template, attribute set or global variable body. Names declared
    /// outside it are not visible, except globals.
    Opaque,
    /// A `for-each` body. It gets its own frame, but the enclosing frame stays
    /// addressable one level further down.
    Transparent,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    names: Vec<QualifiedName>,
    blocks: Vec<usize>,
    high_water: usize,
}

#[derive(Debug, Default)]
pub struct SlotAllocator {
    scopes: Vec<Scope>,
    globals: HashMap<QualifiedName, usize>,
}

impl SlotAllocator {
    pub fn new(globals: HashMap<QualifiedName, usize>) -> Self {
        Self {
            scopes: Vec::new(),
            globals,
        }
    }

    pub fn enter_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            kind,
            names: Vec::new(),
            blocks: Vec::new(),
            high_water: 0,
        });
    }

    /// Closes the current scope and returns the frame size it needs.
    pub fn end_scope(&mut self) -> usize {
        self.scopes.pop().map(|scope| scope.high_water).unwrap_or(0)
    }

    /// Declares `name` in the current scope. A later declaration of the same
    /// name shadows the earlier one from this point on.
    pub fn declare(&mut self, name: QualifiedName) -> usize {
        let Some(scope) = self.scopes.last_mut() else {
            return 0;
        };
        let slot = scope.names.len();
        scope.names.push(name);
        scope.high_water = scope.high_water.max(scope.names.len());
        slot
    }

    /// Opens a lexical block. Names declared in it go out of scope at `pop_block`
    /// and their slots become reusable.
    pub fn push_block(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.blocks.push(scope.names.len());
        }
    }

    pub fn pop_block(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            if let Some(mark) = scope.blocks.pop() {
                scope.names.truncate(mark);
            }
        }
    }

    pub fn in_scope(&self) -> bool {
        !self.scopes.is_empty()
    }

    /// Finds the nearest visible declaration of `name`, scanning backward from
    /// the current point and then through transparent parents.
    pub fn resolve(&self, name: &QualifiedName) -> Option<VarSlot> {
        let mut depth = 0;
        for scope in self.scopes.iter().rev() {
            if let Some(index) = scope.names.iter().rposition(|n| n == name) {
                return Some(VarSlot::Local { depth, index });
            }
            if scope.kind == ScopeKind::Opaque {
                break;
            }
            depth += 1;
        }
        self.globals.get(name).map(|&index| VarSlot::Global(index))
    }

    /// Rewrites every variable reference in `expr` to its slot.
    pub fn fixup(&self, expr: &mut Expression, location: Location) -> Result<(), XsltError> {
        let mut visitor = SlotFixup { allocator: self };
        expr.accept_mut(&mut visitor).map_err(|e| match e {
            XPathError::UnknownVariable(name) => {
                XsltError::compose(format!("Variable '${}' is not declared in this scope", name), location)
            }
            other => XsltError::compose(other.to_string(), location),
        })
    }
}

struct SlotFixup<'s> {
    allocator: &'s SlotAllocator,
}

impl ExpressionVisitorMut for SlotFixup<'_> {
    fn visit_variable(&mut self, var: &mut VariableRef) -> Result<(), XPathError> {
        match self.allocator.resolve(&var.name) {
            Some(slot) => {
                var.slot = Some(slot);
                Ok(())
            }
            None => Err(XPathError::UnknownVariable(var.name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_xpath1::parse_expression;

    fn qn(name: &str) -> QualifiedName {
        QualifiedName::local(name)
    }

    fn slot_of(alloc: &SlotAllocator, text: &str) -> Option<VarSlot> {
        let mut expr = parse_expression(text).unwrap();
        alloc.fixup(&mut expr, Location::default()).unwrap();
        match expr {
            Expression::Variable(var) => var.slot,
            other => panic!("Expected a variable, got {:?}", other),
        }
    }

    #[test]
    fn test_sibling_shadowing_resolves_to_latest() {
        let mut alloc = SlotAllocator::default();
        alloc.enter_scope(ScopeKind::Opaque);
        assert_eq!(alloc.declare(qn("x")), 0);
        assert_eq!(slot_of(&alloc, "$x"), Some(VarSlot::Local { depth: 0, index: 0 }));
        assert_eq!(alloc.declare(qn("x")), 1);
        assert_eq!(slot_of(&alloc, "$x"), Some(VarSlot::Local { depth: 0, index: 1 }));
        assert_eq!(alloc.end_scope(), 2);
    }

    #[test]
    fn test_blocks_release_slots_but_keep_high_water() {
        let mut alloc = SlotAllocator::default();
        alloc.enter_scope(ScopeKind::Opaque);
        alloc.declare(qn("a"));
        alloc.push_block();
        alloc.declare(qn("b"));
        alloc.declare(qn("c"));
        alloc.pop_block();
        assert_eq!(alloc.declare(qn("d")), 1);
        assert!(alloc.resolve(&qn("b")).is_none());
        assert_eq!(alloc.end_scope(), 3);
    }

    #[test]
    fn test_transparent_scope_reaches_parent_frame() {
        let mut alloc = SlotAllocator::default();
        alloc.enter_scope(ScopeKind::Opaque);
        alloc.declare(qn("outer"));
        alloc.enter_scope(ScopeKind::Transparent);
        alloc.declare(qn("inner"));
        assert_eq!(alloc.resolve(&qn("outer")), Some(VarSlot::Local { depth: 1, index: 0 }));
        assert_eq!(alloc.resolve(&qn("inner")), Some(VarSlot::Local { depth: 0, index: 0 }));
        assert_eq!(alloc.end_scope(), 1);

        alloc.enter_scope(ScopeKind::Opaque);
        assert!(alloc.resolve(&qn("outer")).is_none());
    }

    #[test]
    fn test_globals_are_the_fallback() {
        let globals = HashMap::from([(qn("g"), 4), (qn("x"), 0)]);
        let mut alloc = SlotAllocator::new(globals);
        assert_eq!(slot_of(&alloc, "$g"), Some(VarSlot::Global(4)));
        alloc.enter_scope(ScopeKind::Opaque);
        alloc.declare(qn("x"));
        assert_eq!(slot_of(&alloc, "$x"), Some(VarSlot::Local { depth: 0, index: 0 }));
    }

    #[test]
    fn test_undeclared_reference_is_a_static_error() {
        let mut alloc = SlotAllocator::default();
        alloc.enter_scope(ScopeKind::Opaque);
        let mut expr = parse_expression("1 + $missing").unwrap();
        let err = alloc.fixup(&mut expr, Location { line: 7, col: 3 }).unwrap_err();
        assert!(matches!(err, XsltError::StaticCompose { .. }));
        assert!(err.to_string().contains("$missing"));
    }
}
