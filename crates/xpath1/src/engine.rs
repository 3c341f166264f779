//! The evaluation engine for executing a parsed expression against a generic `DataSourceNode`.

use super::ast::{Axis, BinaryOperator, Expression, LocationPath, NodeTest, NodeTypeTest, Step, UnaryOperator, VariableRef};
use super::{axes, functions, operators};
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use crate::name::QualifiedName;
use crate::value::XPathValue;
use std::collections::HashMap;

/// The environment an expression is evaluated in: variable storage and any
/// function that is not part of the core library.
pub trait EvaluationHost<'a, N: DataSourceNode<'a>> {
    fn variable(&self, var: &VariableRef) -> Result<XPathValue<N>, XPathError>;

    /// Calls a function outside the core library. Returns `None` if the host
    /// does not provide `name`.
    fn call_function(
        &self,
        name: &QualifiedName,
        args: Vec<XPathValue<N>>,
        e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Option<Result<XPathValue<N>, XPathError>>;

    /// Whether `call_function` provides `name`.
    fn has_function(&self, _name: &QualifiedName) -> bool {
        false
    }
}

/// A host that binds variables by name and offers no extra functions.
#[derive(Debug, Clone)]
pub struct VariableMap<N> {
    variables: HashMap<String, XPathValue<N>>,
}

impl<N> Default for VariableMap<N> {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
        }
    }
}

impl<N> VariableMap<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: XPathValue<N>) {
        self.variables.insert(name.into(), value);
    }
}

impl<'a, N: DataSourceNode<'a>> EvaluationHost<'a, N> for VariableMap<N> {
    fn variable(&self, var: &VariableRef) -> Result<XPathValue<N>, XPathError> {
        let key = var.name.to_string();
        self.variables
            .get(&key)
            .cloned()
            .ok_or(XPathError::UnknownVariable(key))
    }

    fn call_function(
        &self,
        _name: &QualifiedName,
        _args: Vec<XPathValue<N>>,
        _e_ctx: &EvaluationContext<'a, '_, N>,
    ) -> Option<Result<XPathValue<N>, XPathError>> {
        None
    }
}

/// All state needed during expression evaluation.
/// `'a` is the lifetime of the source document, `'d` that of the host.
pub struct EvaluationContext<'a, 'd, N: DataSourceNode<'a>> {
    pub context_node: N,
    /// 1-based.
    pub context_position: usize,
    pub context_size: usize,
    /// The node returned by `current()`: the context node of the outermost expression.
    pub current_node: N,
    pub host: &'d dyn EvaluationHost<'a, N>,
}

impl<'a, 'd, N: DataSourceNode<'a>> EvaluationContext<'a, 'd, N> {
    pub fn new(context_node: N, host: &'d dyn EvaluationHost<'a, N>) -> Self {
        Self {
            context_node,
            context_position: 1,
            context_size: 1,
            current_node: context_node,
            host,
        }
    }

    pub fn with_position(mut self, position: usize, size: usize) -> Self {
        self.context_position = position;
        self.context_size = size;
        self
    }

    /// A context for an inner expression (a predicate). `current()` is preserved.
    fn focus(&self, node: N, position: usize, size: usize) -> Self {
        Self {
            context_node: node,
            context_position: position,
            context_size: size,
            current_node: self.current_node,
            host: self.host,
        }
    }

    pub fn root_node(&self) -> N {
        self.context_node.root()
    }
}

/// Evaluates a compiled expression and returns a concrete `XPathValue`.
pub fn evaluate<'a, N>(
    expr: &Expression,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::LocationPath(path) => {
            let nodes = evaluate_location_path(path, e_ctx)?;
            Ok(XPathValue::NodeSet(nodes))
        }
        Expression::Variable(var) => e_ctx.host.variable(var),
        Expression::FunctionCall { name, args } => {
            let mut evaluated_args = Vec::with_capacity(args.len());
            for arg in args {
                evaluated_args.push(evaluate(arg, e_ctx)?);
            }
            functions::call(name, evaluated_args, e_ctx)
        }
        Expression::Filter {
            primary,
            predicates,
        } => {
            let nodes = expect_node_set(evaluate(primary, e_ctx)?, "a filter expression")?;
            Ok(XPathValue::NodeSet(apply_predicates(nodes, predicates, e_ctx)?))
        }
        Expression::BinaryOp { left, op, right } => {
            let left_val = evaluate(left, e_ctx)?;
            match op {
                BinaryOperator::And if !left_val.to_bool() => Ok(XPathValue::Boolean(false)),
                BinaryOperator::Or if left_val.to_bool() => Ok(XPathValue::Boolean(true)),
                _ => {
                    let right_val = evaluate(right, e_ctx)?;
                    operators::evaluate(*op, left_val, right_val)
                }
            }
        }
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, e_ctx)?;
            match op {
                UnaryOperator::Minus => Ok(XPathValue::Number(-val.to_number())),
            }
        }
    }
}

fn expect_node_set<'a, N: DataSourceNode<'a>>(
    value: XPathValue<N>,
    what: &str,
) -> Result<Vec<N>, XPathError> {
    value.into_node_set().map_err(|other| {
        XPathError::TypeError(format!(
            "{} must produce a node-set, found {}",
            what,
            other.type_name()
        ))
    })
}

fn evaluate_location_path<'a, N>(
    path: &LocationPath,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut current_nodes = if let Some(start_expr) = &path.start_point {
        expect_node_set(evaluate(start_expr, e_ctx)?, "the start of a path")?
    } else if path.is_absolute {
        vec![e_ctx.root_node()]
    } else {
        vec![e_ctx.context_node]
    };

    for step in &path.steps {
        current_nodes = evaluate_step(step, &current_nodes, e_ctx)?;
    }
    Ok(current_nodes)
}

/// Evaluates one step from every context node. Predicates see proximity
/// positions relative to each context node; the union comes back in document order.
fn evaluate_step<'a, N>(
    step: &Step,
    context_nodes: &[N],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut result = Vec::new();
    let mut axis_nodes = Vec::new();
    for &node in context_nodes {
        axis_nodes.clear();
        axes::collect(step.axis, node, &mut axis_nodes);
        let tested: Vec<N> = axis_nodes
            .iter()
            .copied()
            .filter(|n| node_test_matches(&step.node_test, step.axis, *n))
            .collect();
        result.extend(apply_predicates(tested, &step.predicates, e_ctx)?);
    }
    if context_nodes.len() > 1 || step.axis.is_reverse() {
        result.sort();
        result.dedup();
    }
    Ok(result)
}

/// Whether `node` passes `test` on `axis`. Name tests select the axis' principal
/// node type: attributes on the attribute axis, elements everywhere else.
pub fn node_test_matches<'a, N: DataSourceNode<'a>>(test: &NodeTest, axis: Axis, node: N) -> bool {
    let principal = if axis == Axis::Attribute {
        NodeType::Attribute
    } else {
        NodeType::Element
    };
    match test {
        NodeTest::Wildcard => node.node_type() == principal,
        NodeTest::NamespaceWildcard {
            prefix,
            namespace_uri,
        } => {
            node.node_type() == principal
                && match namespace_uri {
                    Some(uri) => node.namespace_uri() == Some(uri.as_str()),
                    None => node.name().and_then(|q| q.prefix) == Some(prefix.as_str()),
                }
        }
        NodeTest::Name(name) => {
            node.node_type() == principal
                && node.name().is_some_and(|q| {
                    q.local_part == name.local_part
                        && match (&name.namespace_uri, &name.prefix) {
                            (Some(uri), _) => node.namespace_uri() == Some(uri.as_str()),
                            (None, Some(prefix)) => q.prefix == Some(prefix.as_str()),
                            (None, None) => node.namespace_uri().is_none(),
                        }
                })
        }
        NodeTest::NodeType(ntt) => match ntt {
            NodeTypeTest::Node => true,
            NodeTypeTest::Text => node.node_type() == NodeType::Text,
            NodeTypeTest::Comment => node.node_type() == NodeType::Comment,
            NodeTypeTest::ProcessingInstruction(target) => {
                node.node_type() == NodeType::ProcessingInstruction
                    && target.as_deref().is_none_or(|t| {
                        node.name().is_some_and(|q| q.local_part == t)
                    })
            }
        },
    }
}

/// Filters `nodes` (in proximity order) through each predicate in turn.
pub fn apply_predicates<'a, N>(
    nodes: Vec<N>,
    predicates: &[Expression],
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<Vec<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut current = nodes;
    for predicate in predicates {
        let size = current.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in current.into_iter().enumerate() {
            let inner = e_ctx.focus(node, i + 1, size);
            let keep = match evaluate(predicate, &inner)? {
                XPathValue::Number(n) => n == (i + 1) as f64,
                other => other.to_bool(),
            };
            if keep {
                kept.push(node);
            }
        }
        current = kept;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::{MockNode, MockTree, create_test_tree};
    use crate::parser::parse_expression;

    fn eval<'a>(tree: &'a MockTree, vars: &VariableMap<MockNode<'a>>, text: &str) -> XPathValue<MockNode<'a>> {
        let e_ctx = EvaluationContext::new(tree.root(), vars);
        let expr = parse_expression(text).unwrap();
        evaluate(&expr, &e_ctx).unwrap()
    }

    fn node_ids(value: XPathValue<MockNode>) -> Vec<usize> {
        match value {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.id).collect(),
            other => panic!("Expected a NodeSet, got {:?}", other),
        }
    }

    #[test]
    fn test_node_tests() {
        let tree = create_test_tree();
        let para = tree.node(1);
        let attr = tree.node(2);
        let text = tree.node(4);
        assert!(node_test_matches(&NodeTest::Wildcard, Axis::Child, para));
        assert!(!node_test_matches(&NodeTest::Wildcard, Axis::Child, text));
        assert!(node_test_matches(&NodeTest::Wildcard, Axis::Attribute, attr));
        assert!(node_test_matches(
            &NodeTest::Name(QualifiedName::local("para")),
            Axis::Child,
            para
        ));
        assert!(node_test_matches(
            &NodeTest::NodeType(NodeTypeTest::Text),
            Axis::Child,
            text
        ));
        assert!(node_test_matches(
            &NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some("pi-target".into()))),
            Axis::Child,
            tree.node(7)
        ));
    }

    #[test]
    fn test_predicate_by_attribute() {
        let tree = create_test_tree();
        let vars = VariableMap::new();
        assert_eq!(node_ids(eval(&tree, &vars, "child::para[@id='p1']")), vec![1]);
    }

    #[test]
    fn test_predicate_positions_are_per_context_node() {
        let tree = create_test_tree();
        let vars = VariableMap::new();
        assert_eq!(node_ids(eval(&tree, &vars, "para[1]")), vec![1]);
        assert_eq!(node_ids(eval(&tree, &vars, "para[last()]")), vec![8]);
        assert_eq!(node_ids(eval(&tree, &vars, "//text()[1]")), vec![4, 9]);
    }

    #[test]
    fn test_reverse_axis_positions() {
        let tree = create_test_tree();
        let vars = VariableMap::new();
        let e_ctx = EvaluationContext::new(tree.node(9), &vars);
        let expr = parse_expression("ancestor::node()[1]").unwrap();
        assert_eq!(node_ids(evaluate(&expr, &e_ctx).unwrap()), vec![8]);
        let expr = parse_expression("preceding-sibling::*[1]").unwrap();
        let e_ctx = EvaluationContext::new(tree.node(8), &vars);
        assert_eq!(node_ids(evaluate(&expr, &e_ctx).unwrap()), vec![6]);
    }

    #[test]
    fn test_variable_evaluation() {
        let tree = create_test_tree();
        let mut vars = VariableMap::new();
        vars.insert("myVar", XPathValue::String("test-value".to_string()));
        assert_eq!(eval(&tree, &vars, "$myVar").to_string(), "test-value");

        let e_ctx = EvaluationContext::new(tree.root(), &vars);
        let missing = parse_expression("$nope").unwrap();
        assert!(matches!(
            evaluate(&missing, &e_ctx),
            Err(XPathError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_path_from_variable_node_set() {
        let tree = create_test_tree();
        let mut vars = VariableMap::new();
        vars.insert("para_node", XPathValue::NodeSet(vec![tree.node(1)]));
        let result = eval(&tree, &vars, "$para_node/text()");
        assert_eq!(result.to_string(), "Hello");
        assert_eq!(node_ids(result), vec![4]);
    }

    #[test]
    fn test_filter_expression() {
        let tree = create_test_tree();
        let vars = VariableMap::new();
        assert_eq!(node_ids(eval(&tree, &vars, "(//para | //div)[2]")), vec![6]);
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let tree = create_test_tree();
        let vars = VariableMap::new();
        // `$undefined` would fail if it were evaluated.
        assert!(!eval(&tree, &vars, "false() and $undefined").to_bool());
        assert!(eval(&tree, &vars, "true() or $undefined").to_bool());
    }

    #[test]
    fn test_fragment_cannot_be_navigated() {
        let tree = create_test_tree();
        let mut vars = VariableMap::new();
        vars.insert(
            "rtf",
            XPathValue::Fragment(crate::fragment::TreeFragment::empty()),
        );
        let e_ctx = EvaluationContext::new(tree.root(), &vars);
        let expr = parse_expression("$rtf/para").unwrap();
        assert!(matches!(
            evaluate(&expr, &e_ctx),
            Err(XPathError::TypeError(_))
        ));
    }
}
