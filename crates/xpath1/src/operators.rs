//! Pure functions for evaluating XPath binary operators.
//!
//! `and`/`or` short-circuit, so the engine handles them before both operands exist.

use crate::ast::BinaryOperator;
use crate::datasource::DataSourceNode;
use crate::error::XPathError;
use crate::value::{XPathValue, parse_number};

pub fn evaluate<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    use BinaryOperator::*;
    let value = match op {
        Or => XPathValue::Boolean(left.to_bool() || right.to_bool()),
        And => XPathValue::Boolean(left.to_bool() && right.to_bool()),
        Equals | NotEquals | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual => {
            XPathValue::Boolean(compare(op, &left, &right))
        }
        Plus => XPathValue::Number(left.to_number() + right.to_number()),
        Minus => XPathValue::Number(left.to_number() - right.to_number()),
        Multiply => XPathValue::Number(left.to_number() * right.to_number()),
        Divide => XPathValue::Number(left.to_number() / right.to_number()),
        // Truncating remainder, same sign as the dividend.
        Modulo => XPathValue::Number(left.to_number() % right.to_number()),
        Union => union(left, right)?,
    };
    Ok(value)
}

fn union<'a, N: DataSourceNode<'a>>(
    left: XPathValue<N>,
    right: XPathValue<N>,
) -> Result<XPathValue<N>, XPathError> {
    let operand = |value: XPathValue<N>, side: &str| {
        value.into_node_set().map_err(|other| {
            XPathError::TypeError(format!(
                "{} operand of '|' must be a node-set, found {}",
                side,
                other.type_name()
            ))
        })
    };
    let mut merged = operand(left, "Left")?;
    merged.extend(operand(right, "Right")?);
    merged.sort();
    merged.dedup();
    Ok(XPathValue::NodeSet(merged))
}

/// Node-sets and fragments compare through the string values of their nodes.
fn string_values<'a, N: DataSourceNode<'a>>(value: &XPathValue<N>) -> Option<Vec<String>> {
    match value {
        XPathValue::NodeSet(nodes) => Some(nodes.iter().map(|n| n.string_value()).collect()),
        XPathValue::Fragment(fragment) => Some(vec![fragment.string_value().to_string()]),
        _ => None,
    }
}

fn compare<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    match (string_values(left), string_values(right)) {
        (Some(ls), Some(rs)) => ls
            .iter()
            .any(|l| rs.iter().any(|r| compare_strings(op, l, r))),
        (Some(ls), None) => compare_set_with_scalar(op, &ls, right, false),
        (None, Some(rs)) => compare_set_with_scalar(op, &rs, left, true),
        (None, None) => compare_scalars(op, left, right),
    }
}

fn compare_set_with_scalar<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    set: &[String],
    scalar: &XPathValue<N>,
    set_on_right: bool,
) -> bool {
    match scalar {
        XPathValue::Boolean(b) => {
            let set_bool = !set.is_empty();
            let (l, r) = if set_on_right { (*b, set_bool) } else { (set_bool, *b) };
            compare_booleans(op, l, r)
        }
        XPathValue::Number(n) => set.iter().any(|s| {
            let v = parse_number(s);
            let (l, r) = if set_on_right { (*n, v) } else { (v, *n) };
            compare_numbers(op, l, r)
        }),
        _ => {
            let text = scalar.to_string();
            set.iter().any(|s| {
                if set_on_right {
                    compare_strings(op, &text, s)
                } else {
                    compare_strings(op, s, &text)
                }
            })
        }
    }
}

fn compare_scalars<'a, N: DataSourceNode<'a>>(
    op: BinaryOperator,
    left: &XPathValue<N>,
    right: &XPathValue<N>,
) -> bool {
    let is_equality = matches!(op, BinaryOperator::Equals | BinaryOperator::NotEquals);
    if !is_equality {
        return compare_numbers(op, left.to_number(), right.to_number());
    }
    match (left, right) {
        (XPathValue::Boolean(_), _) | (_, XPathValue::Boolean(_)) => {
            compare_booleans(op, left.to_bool(), right.to_bool())
        }
        (XPathValue::Number(_), _) | (_, XPathValue::Number(_)) => {
            compare_numbers(op, left.to_number(), right.to_number())
        }
        _ => compare_strings(op, &left.to_string(), &right.to_string()),
    }
}

fn compare_strings(op: BinaryOperator, l: &str, r: &str) -> bool {
    match op {
        BinaryOperator::Equals => l == r,
        BinaryOperator::NotEquals => l != r,
        _ => compare_numbers(op, parse_number(l), parse_number(r)),
    }
}

fn compare_booleans(op: BinaryOperator, l: bool, r: bool) -> bool {
    match op {
        BinaryOperator::Equals => l == r,
        BinaryOperator::NotEquals => l != r,
        _ => compare_numbers(op, f64::from(u8::from(l)), f64::from(u8::from(r))),
    }
}

fn compare_numbers(op: BinaryOperator, l: f64, r: f64) -> bool {
    match op {
        BinaryOperator::Equals => l == r,
        BinaryOperator::NotEquals => l != r,
        BinaryOperator::LessThan => l < r,
        BinaryOperator::LessThanOrEqual => l <= r,
        BinaryOperator::GreaterThan => l > r,
        BinaryOperator::GreaterThanOrEqual => l >= r,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::{MockNode, create_test_tree};

    fn truth(op: BinaryOperator, l: XPathValue<MockNode>, r: XPathValue<MockNode>) -> bool {
        evaluate(op, l, r).unwrap().to_bool()
    }

    #[test]
    fn test_arithmetic_operators() {
        let ten = XPathValue::Number::<MockNode>(10.0);
        let three = XPathValue::Number::<MockNode>(3.0);
        let num = |op| evaluate(op, ten.clone(), three.clone()).unwrap().to_number();
        assert_eq!(num(BinaryOperator::Plus), 13.0);
        assert_eq!(num(BinaryOperator::Minus), 7.0);
        assert_eq!(num(BinaryOperator::Multiply), 30.0);
        assert_eq!(num(BinaryOperator::Modulo), 1.0);
        assert!((num(BinaryOperator::Divide) - 3.333).abs() < 0.001);
    }

    #[test]
    fn test_node_set_equality_is_existential() {
        let tree = create_test_tree();
        let paras = XPathValue::NodeSet(vec![tree.node(1), tree.node(8)]);
        assert!(truth(
            BinaryOperator::Equals,
            paras.clone(),
            XPathValue::String("World".into())
        ));
        assert!(truth(
            BinaryOperator::NotEquals,
            paras.clone(),
            XPathValue::String("World".into())
        ));
        assert!(!truth(
            BinaryOperator::Equals,
            XPathValue::NodeSet(vec![]),
            XPathValue::String("".into())
        ));
        assert!(truth(
            BinaryOperator::Equals,
            XPathValue::NodeSet(vec![]),
            XPathValue::Boolean(false)
        ));
    }

    #[test]
    fn test_scalar_equality_precedence() {
        let one = XPathValue::<MockNode>::String("1.0".into());
        assert!(truth(BinaryOperator::Equals, one.clone(), XPathValue::Number(1.0)));
        assert!(!truth(
            BinaryOperator::Equals,
            one.clone(),
            XPathValue::String("1".into())
        ));
        assert!(truth(BinaryOperator::Equals, one, XPathValue::Boolean(true)));
        assert!(truth(
            BinaryOperator::LessThan,
            XPathValue::<MockNode>::String("2".into()),
            XPathValue::String("10".into())
        ));
    }

    #[test]
    fn test_union_operator() {
        let tree = create_test_tree();
        let root = tree.root();
        let para = tree.node(1);
        let text = tree.node(4);

        let left = XPathValue::NodeSet(vec![para, root]);
        let right = XPathValue::NodeSet(vec![para, text]);
        match evaluate(BinaryOperator::Union, left, right).unwrap() {
            XPathValue::NodeSet(nodes) => assert_eq!(nodes, vec![root, para, text]),
            other => panic!("Expected NodeSet result, got {:?}", other),
        }

        let bad = evaluate(
            BinaryOperator::Union,
            XPathValue::NodeSet(vec![root]),
            XPathValue::Number(1.0),
        );
        assert!(matches!(bad, Err(XPathError::TypeError(_))));
    }
}
