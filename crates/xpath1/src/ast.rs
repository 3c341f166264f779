//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.

use crate::error::XPathError;
use crate::name::QualifiedName;

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    Variable(VariableRef),
    FunctionCall {
        name: QualifiedName,
        args: Vec<Expression>,
    },
    /// A primary expression followed by predicates, like `$items[2]` or `(a|b)[last()]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
}

/// A `$name` reference. `slot` is filled in by the stylesheet compose pass; an
/// unresolved reference is looked up by name by the evaluation host.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub name: QualifiedName,
    pub slot: Option<VarSlot>,
}

impl VariableRef {
    pub fn new(name: QualifiedName) -> Self {
        Self { name, slot: None }
    }
}

/// Where a variable's value lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarSlot {
    /// `index` within the frame `depth` levels below the current one.
    Local { depth: usize, index: usize },
    Global(usize),
}

impl Expression {
    /// Checks if the expression is a `LocationPath` variant.
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::LocationPath(_))
    }

    /// Checks if the expression is a `BinaryOp` variant.
    pub fn is_binary_op(&self) -> bool {
        matches!(self, Expression::BinaryOp { .. })
    }

    /// Walks the expression depth-first, handing every variable reference,
    /// function name and node test to `visitor`.
    pub fn accept_mut(&mut self, visitor: &mut dyn ExpressionVisitorMut) -> Result<(), XPathError> {
        match self {
            Expression::Literal(_) | Expression::Number(_) => Ok(()),
            Expression::Variable(var) => visitor.visit_variable(var),
            Expression::LocationPath(path) => path.accept_mut(visitor),
            Expression::FunctionCall { name, args } => {
                visitor.visit_function_name(name)?;
                args.iter_mut().try_for_each(|arg| arg.accept_mut(visitor))
            }
            Expression::Filter {
                primary,
                predicates,
            } => {
                primary.accept_mut(visitor)?;
                predicates.iter_mut().try_for_each(|p| p.accept_mut(visitor))
            }
            Expression::BinaryOp { left, right, .. } => {
                left.accept_mut(visitor)?;
                right.accept_mut(visitor)
            }
            Expression::UnaryOp { expr, .. } => expr.accept_mut(visitor),
        }
    }

    /// Resolves every prefix in the expression (variable names, function names,
    /// name tests) through `lookup`.
    pub fn resolve_prefixes<F>(&mut self, lookup: F) -> Result<(), XPathError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolver = PrefixResolver { lookup };
        self.accept_mut(&mut resolver)
    }
}

impl LocationPath {
    pub(crate) fn accept_mut(&mut self, visitor: &mut dyn ExpressionVisitorMut) -> Result<(), XPathError> {
        if let Some(start) = self.start_point.as_mut() {
            start.accept_mut(visitor)?;
        }
        for step in &mut self.steps {
            visitor.visit_node_test(&mut step.node_test)?;
            for predicate in &mut step.predicates {
                predicate.accept_mut(visitor)?;
            }
        }
        Ok(())
    }
}

/// Callbacks for [`Expression::accept_mut`]. Every method defaults to a no-op.
pub trait ExpressionVisitorMut {
    fn visit_variable(&mut self, _var: &mut VariableRef) -> Result<(), XPathError> {
        Ok(())
    }

    fn visit_function_name(&mut self, _name: &mut QualifiedName) -> Result<(), XPathError> {
        Ok(())
    }

    fn visit_node_test(&mut self, _test: &mut NodeTest) -> Result<(), XPathError> {
        Ok(())
    }
}

struct PrefixResolver<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> PrefixResolver<F> {
    fn resolve(&self, name: &mut QualifiedName) -> Result<(), XPathError> {
        name.resolve(&self.lookup).map_err(XPathError::UnknownPrefix)
    }
}

impl<F: Fn(&str) -> Option<String>> ExpressionVisitorMut for PrefixResolver<F> {
    fn visit_variable(&mut self, var: &mut VariableRef) -> Result<(), XPathError> {
        self.resolve(&mut var.name)
    }

    fn visit_function_name(&mut self, name: &mut QualifiedName) -> Result<(), XPathError> {
        self.resolve(name)
    }

    fn visit_node_test(&mut self, test: &mut NodeTest) -> Result<(), XPathError> {
        match test {
            NodeTest::Name(name) => self.resolve(name),
            NodeTest::NamespaceWildcard {
                prefix,
                namespace_uri,
            } => match (self.lookup)(prefix.as_str()) {
                Some(uri) => {
                    *namespace_uri = Some(uri);
                    Ok(())
                }
                None => Err(XPathError::UnknownPrefix(prefix.clone())),
            },
            NodeTest::Wildcard | NodeTest::NodeType(_) => Ok(()),
        }
    }
}

/// A unary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
    // Set
    Union,
}

/// A full location path, like `/child::foo`, `descendant::bar[1]`, or `$var/item`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// An optional starting expression, for paths like `$var/foo` or `func()/foo`.
    pub start_point: Option<Box<Expression>>,
    /// True if the path starts from the document root (e.g., `/foo`).
    /// Meaningless if `start_point` is `Some`.
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

/// A single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Self {
            axis,
            node_test,
            predicates: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    /// Reverse axes number their proximity positions backward from the context node.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::Parent
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// A qualified name test (e.g., `foo`, `svg:rect`).
    Name(QualifiedName),
    /// `prefix:*`
    NamespaceWildcard {
        prefix: String,
        namespace_uri: Option<String>,
    },
    /// `*`
    Wildcard,
    NodeType(NodeTypeTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTypeTest {
    Text,
    Node,
    Comment,
    /// `processing-instruction()` with an optional literal target.
    ProcessingInstruction(Option<String>),
}
