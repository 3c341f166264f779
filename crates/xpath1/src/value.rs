//! The typed values an expression can produce, with the XPath 1.0 coercions.

use crate::datasource::DataSourceNode;
use crate::fragment::TreeFragment;
use std::fmt;

/// The possible result types of an expression evaluation.
#[derive(Debug, Clone)]
pub enum XPathValue<N> {
    /// Nodes in document order, without duplicates.
    NodeSet(Vec<N>),
    String(String),
    Number(f64),
    Boolean(bool),
    /// A result tree fragment. It behaves like a node-set holding one root node.
    Fragment(TreeFragment),
}

impl<'a, N: DataSourceNode<'a>> XPathValue<N> {
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
            XPathValue::Fragment(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => parse_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(nodes) => nodes
                .first()
                .map(|n| parse_number(&n.string_value()))
                .unwrap_or(f64::NAN),
            XPathValue::Fragment(fragment) => parse_number(fragment.string_value()),
        }
    }

    pub fn is_node_set(&self) -> bool {
        matches!(self, XPathValue::NodeSet(_))
    }

    /// Consumes the value as a node-set, handing it back unchanged otherwise.
    pub fn into_node_set(self) -> Result<Vec<N>, Self> {
        match self {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(other),
        }
    }

    /// A short name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
            XPathValue::Fragment(_) => "result tree fragment",
        }
    }
}

impl<'a, N: DataSourceNode<'a>> fmt::Display for XPathValue<N> {
    /// Coerces the value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => match nodes.first() {
                Some(node) => f.write_str(&node.string_value()),
                None => Ok(()),
            },
            XPathValue::String(s) => f.write_str(s),
            XPathValue::Number(n) => f.write_str(&format_number(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
            XPathValue::Fragment(fragment) => f.write_str(fragment.string_value()),
        }
    }
}

/// Converts a number to its XPath string form: no exponent, no trailing `.0`,
/// `NaN` and `Infinity` spelled out, negative zero printed as `0`.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Parses a string with the XPath `Number` grammar: optional surrounding
/// whitespace, an optional minus sign, digits with at most one decimal point.
/// Anything else is `NaN`.
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let valid = !digits.is_empty()
        && digits != "."
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|&c| c == '.').count() <= 1;
    if valid {
        trimmed.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::{MockNode, create_test_tree};
    use crate::fragment::{FragmentEvent, TreeFragment};

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(0.1), "0.1");
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number("-3.5"), -3.5);
        assert_eq!(parse_number(".5"), 0.5);
        assert!(parse_number("1e3").is_nan());
        assert!(parse_number("+1").is_nan());
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("").is_nan());
    }

    #[test]
    fn test_coercions() {
        let tree = create_test_tree();
        let para = tree.node(1);
        let nodes: XPathValue<MockNode> = XPathValue::NodeSet(vec![para, tree.node(8)]);
        assert!(nodes.to_bool());
        assert_eq!(nodes.to_string(), "Hello");
        assert!(nodes.to_number().is_nan());

        let empty: XPathValue<MockNode> = XPathValue::NodeSet(vec![]);
        assert!(!empty.to_bool());
        assert_eq!(empty.to_string(), "");

        let fragment: XPathValue<MockNode> = XPathValue::Fragment(TreeFragment::from_events(vec![
            FragmentEvent::Text("12".into()),
        ]));
        assert!(fragment.to_bool());
        assert_eq!(fragment.to_number(), 12.0);
    }
}
