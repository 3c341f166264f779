//! The XPath 1.0 core function library plus `current()`.
//!
//! Anything not listed in [`CORE_FUNCTIONS`] is offered to the evaluation host.

use super::engine::EvaluationContext;
use crate::datasource::{DataSourceNode, NodeType};
use crate::error::XPathError;
use crate::name::{QualifiedName, XML_NAMESPACE};
use crate::value::{XPathValue, parse_number};
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub const CORE_FUNCTIONS: &[&str] = &[
    // node-set
    "last",
    "position",
    "count",
    "id",
    "local-name",
    "namespace-uri",
    "name",
    "generate-id",
    "current",
    // string
    "string",
    "concat",
    "starts-with",
    "contains",
    "substring-before",
    "substring-after",
    "substring",
    "string-length",
    "normalize-space",
    "translate",
    // boolean
    "boolean",
    "not",
    "true",
    "false",
    "lang",
    // number
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
];

pub fn is_core_function(name: &QualifiedName) -> bool {
    name.prefix.is_none() && CORE_FUNCTIONS.contains(&name.local_part.as_str())
}

/// Dispatches a call to the core library or, failing that, the host.
pub fn call<'a, N: DataSourceNode<'a>>(
    name: &QualifiedName,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    if is_core_function(name) {
        return call_core(&name.local_part, args, e_ctx);
    }
    log::trace!("passing {}() with {} argument(s) to the host", name, args.len());
    match e_ctx.host.call_function(name, args, e_ctx) {
        Some(result) => result,
        None => {
            log::debug!("no implementation found for function {}()", name);
            Err(XPathError::function(&name.to_string(), "Unknown function"))
        }
    }
}

fn call_core<'a, N: DataSourceNode<'a>>(
    name: &str,
    args: Vec<XPathValue<N>>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> Result<XPathValue<N>, XPathError> {
    let mut args = Args::new(name, args);
    let value = match name {
        "last" => {
            args.arity(0, 0)?;
            XPathValue::Number(e_ctx.context_size as f64)
        }
        "position" => {
            args.arity(0, 0)?;
            XPathValue::Number(e_ctx.context_position as f64)
        }
        "count" => {
            args.arity(1, 1)?;
            XPathValue::Number(args.node_set()?.len() as f64)
        }
        "id" => {
            args.arity(1, 1)?;
            func_id(args.next(), e_ctx)
        }
        "local-name" | "namespace-uri" | "name" => {
            args.arity(0, 1)?;
            let node = args.optional_node(e_ctx)?;
            XPathValue::String(node.map(|n| node_name_part(name, n)).unwrap_or_default())
        }
        "generate-id" => {
            args.arity(0, 1)?;
            let node = args.optional_node(e_ctx)?;
            XPathValue::String(node.map(generate_id).unwrap_or_default())
        }
        "current" => {
            args.arity(0, 0)?;
            XPathValue::NodeSet(vec![e_ctx.current_node])
        }
        "string" => {
            args.arity(0, 1)?;
            XPathValue::String(args.string_or_context(e_ctx))
        }
        "concat" => {
            args.arity(2, usize::MAX)?;
            XPathValue::String(args.rest().map(|v| v.to_string()).collect())
        }
        "starts-with" => {
            args.arity(2, 2)?;
            let (s, prefix) = (args.string(), args.string());
            XPathValue::Boolean(s.starts_with(&prefix))
        }
        "contains" => {
            args.arity(2, 2)?;
            let (s, needle) = (args.string(), args.string());
            XPathValue::Boolean(s.contains(&needle))
        }
        "substring-before" => {
            args.arity(2, 2)?;
            let (s, sep) = (args.string(), args.string());
            let before = s.find(&sep).map(|i| &s[..i]).unwrap_or("");
            XPathValue::String(before.to_string())
        }
        "substring-after" => {
            args.arity(2, 2)?;
            let (s, sep) = (args.string(), args.string());
            let after = s.find(&sep).map(|i| &s[i + sep.len()..]).unwrap_or("");
            XPathValue::String(after.to_string())
        }
        "substring" => {
            args.arity(2, 3)?;
            let s = args.string();
            let start = args.number();
            let length = args.optional_number();
            XPathValue::String(substring(&s, start, length))
        }
        "string-length" => {
            args.arity(0, 1)?;
            XPathValue::Number(args.string_or_context(e_ctx).chars().count() as f64)
        }
        "normalize-space" => {
            args.arity(0, 1)?;
            let s = args.string_or_context(e_ctx);
            XPathValue::String(s.split_whitespace().collect::<Vec<_>>().join(" "))
        }
        "translate" => {
            args.arity(3, 3)?;
            let (s, from, to) = (args.string(), args.string(), args.string());
            XPathValue::String(translate(&s, &from, &to))
        }
        "boolean" => {
            args.arity(1, 1)?;
            XPathValue::Boolean(args.next().to_bool())
        }
        "not" => {
            args.arity(1, 1)?;
            XPathValue::Boolean(!args.next().to_bool())
        }
        "true" => {
            args.arity(0, 0)?;
            XPathValue::Boolean(true)
        }
        "false" => {
            args.arity(0, 0)?;
            XPathValue::Boolean(false)
        }
        "lang" => {
            args.arity(1, 1)?;
            XPathValue::Boolean(lang_matches(e_ctx.context_node, &args.string()))
        }
        "number" => {
            args.arity(0, 1)?;
            if args.is_empty() {
                XPathValue::Number(parse_number(&e_ctx.context_node.string_value()))
            } else {
                XPathValue::Number(args.number())
            }
        }
        "sum" => {
            args.arity(1, 1)?;
            let total = args
                .node_set()?
                .iter()
                .map(|n| parse_number(&n.string_value()))
                .sum();
            XPathValue::Number(total)
        }
        "floor" => {
            args.arity(1, 1)?;
            XPathValue::Number(args.number().floor())
        }
        "ceiling" => {
            args.arity(1, 1)?;
            XPathValue::Number(args.number().ceil())
        }
        "round" => {
            args.arity(1, 1)?;
            XPathValue::Number(round(args.number()))
        }
        _ => return Err(XPathError::function(name, "Unknown function")),
    };
    Ok(value)
}

/// Positional access to evaluated arguments, with the arity already checked.
struct Args<'n, N> {
    name: &'n str,
    values: std::vec::IntoIter<XPathValue<N>>,
    len: usize,
}

impl<'n, 'a, N: DataSourceNode<'a>> Args<'n, N> {
    fn new(name: &'n str, values: Vec<XPathValue<N>>) -> Self {
        let len = values.len();
        Self {
            name,
            values: values.into_iter(),
            len,
        }
    }

    fn arity(&self, min: usize, max: usize) -> Result<(), XPathError> {
        if self.len < min || self.len > max {
            let expected = if min == max {
                format!("{}", min)
            } else if max == usize::MAX {
                format!("at least {}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(XPathError::function(
                self.name,
                format!("Expected {} arguments, found {}", expected, self.len),
            ));
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn next(&mut self) -> XPathValue<N> {
        self.values
            .next()
            .unwrap_or(XPathValue::String(String::new()))
    }

    fn rest(&mut self) -> impl Iterator<Item = XPathValue<N>> + '_ {
        self.values.by_ref()
    }

    fn string(&mut self) -> String {
        self.next().to_string()
    }

    fn number(&mut self) -> f64 {
        self.next().to_number()
    }

    fn optional_number(&mut self) -> Option<f64> {
        self.values.next().map(|v| v.to_number())
    }

    fn node_set(&mut self) -> Result<Vec<N>, XPathError> {
        let name = self.name;
        self.next().into_node_set().map_err(|other| {
            XPathError::function(
                name,
                format!("Expected a node-set argument, found {}", other.type_name()),
            )
        })
    }

    /// The first node of the optional node-set argument, or the context node.
    fn optional_node(&mut self, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<Option<N>, XPathError> {
        if self.is_empty() {
            Ok(Some(e_ctx.context_node))
        } else {
            Ok(self.node_set()?.into_iter().min())
        }
    }

    fn string_or_context(&mut self, e_ctx: &EvaluationContext<'a, '_, N>) -> String {
        if self.is_empty() {
            e_ctx.context_node.string_value()
        } else {
            self.string()
        }
    }
}

fn node_name_part<'a, N: DataSourceNode<'a>>(function: &str, node: N) -> String {
    let Some(q_name) = node.name() else {
        return String::new();
    };
    match function {
        "local-name" => q_name.local_part.to_string(),
        "namespace-uri" => node.namespace_uri().unwrap_or_default().to_string(),
        _ => match q_name.prefix {
            Some(prefix) => format!("{}:{}", prefix, q_name.local_part),
            None => q_name.local_part.to_string(),
        },
    }
}

/// A stable identifier for a node within one document.
fn generate_id<'a, N: DataSourceNode<'a>>(node: N) -> String {
    let mut hasher = DefaultHasher::new();
    Hash::hash(&node, &mut hasher);
    format!("id{:x}", hasher.finish())
}

fn func_id<'a, N: DataSourceNode<'a>>(
    arg: XPathValue<N>,
    e_ctx: &EvaluationContext<'a, '_, N>,
) -> XPathValue<N> {
    let tokens: Vec<String> = match &arg {
        XPathValue::NodeSet(nodes) => nodes
            .iter()
            .flat_map(|n| {
                n.string_value()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect(),
        other => other
            .to_string()
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    };
    let wanted: HashSet<&str> = tokens.iter().map(String::as_str).collect();
    if wanted.is_empty() {
        return XPathValue::NodeSet(vec![]);
    }

    let mut results = Vec::new();
    let mut stack: Vec<N> = e_ctx.root_node().children().collect();
    while let Some(node) = stack.pop() {
        if node.node_type() == NodeType::Element {
            let is_match = node.attributes().any(|attr| {
                let is_id = attr.name().is_some_and(|q| {
                    q.local_part == "id"
                        && (attr.namespace_uri().is_none()
                            || attr.namespace_uri() == Some(XML_NAMESPACE))
                });
                is_id && wanted.contains(attr.string_value().as_str())
            });
            if is_match {
                results.push(node);
            }
        }
        stack.extend(node.children());
    }
    results.sort();
    XPathValue::NodeSet(results)
}

fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let first = round(start);
    let end = length.map(|len| first + round(len));
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= first && end.is_none_or(|e| pos < e)
        })
        .map(|(_, c)| c)
        .collect()
}

fn translate(s: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.iter().position(|&f| f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect()
}

fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else if (-0.5..0.0).contains(&n) {
        -0.0
    } else {
        (n + 0.5).floor()
    }
}

fn lang_matches<'a, N: DataSourceNode<'a>>(node: N, wanted: &str) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        let lang = n.attributes().find(|attr| {
            attr.namespace_uri() == Some(XML_NAMESPACE)
                && attr.name().is_some_and(|q| q.local_part == "lang")
        });
        if let Some(attr) = lang {
            let value = attr.string_value().to_lowercase();
            let wanted = wanted.to_lowercase();
            return value == wanted
                || value
                    .strip_prefix(&wanted)
                    .is_some_and(|rest| rest.starts_with('-'));
        }
        current = n.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::{MockNode, MockTree, create_test_tree};
    use crate::engine::{VariableMap, evaluate};
    use crate::parser::parse_expression;

    fn eval_at<'a>(tree: &'a MockTree, node: usize, text: &str) -> XPathValue<MockNode<'a>> {
        let vars = VariableMap::new();
        let e_ctx = EvaluationContext::new(tree.node(node), &vars);
        evaluate(&parse_expression(text).unwrap(), &e_ctx).unwrap()
    }

    fn string_of(text: &str) -> String {
        let tree = create_test_tree();
        eval_at(&tree, 0, text).to_string()
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(string_of("concat('a', 1, true())"), "a1true");
        assert_eq!(string_of("substring('12345', 2, 3)"), "234");
        assert_eq!(string_of("substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(string_of("substring('12345', 0 div 0, 3)"), "");
        assert_eq!(string_of("substring-before('1999/04/01', '/')"), "1999");
        assert_eq!(string_of("substring-after('1999/04/01', '/')"), "04/01");
        assert_eq!(string_of("normalize-space('  a   b ')"), "a b");
        assert_eq!(string_of("translate('--aaa--', 'abc-', 'ABC')"), "AAA");
        assert_eq!(string_of("string-length('héllo')"), "5");
    }

    #[test]
    fn test_generate_id_is_stable_per_node() {
        assert_eq!(string_of("generate-id(/) = generate-id(/)"), "true");
        assert_eq!(string_of("generate-id(//para[1]) = generate-id(//para[2])"), "false");
        assert!(string_of("generate-id(//para[1])").starts_with("id"));
    }

    #[test]
    fn test_number_functions() {
        assert_eq!(string_of("round(2.5)"), "3");
        assert_eq!(string_of("round(-2.5)"), "-2");
        assert_eq!(string_of("floor(-1.5)"), "-2");
        assert_eq!(string_of("ceiling(1.2)"), "2");
        assert_eq!(string_of("number('abc')"), "NaN");
        assert_eq!(string_of("count(//para)"), "2");
    }

    #[test]
    fn test_node_functions() {
        let tree = create_test_tree();
        assert_eq!(eval_at(&tree, 3, "name()").to_string(), "xml:lang");
        assert_eq!(eval_at(&tree, 3, "local-name()").to_string(), "lang");
        assert_eq!(
            eval_at(&tree, 3, "namespace-uri()").to_string(),
            XML_NAMESPACE
        );
        assert_eq!(eval_at(&tree, 0, "name(//para)").to_string(), "para");
        assert!(eval_at(&tree, 4, "lang('EN')").to_bool());
        assert!(!eval_at(&tree, 9, "lang('en')").to_bool());
        assert_eq!(eval_at(&tree, 0, "id('p1')/text()").to_string(), "Hello");
        assert_eq!(
            eval_at(&tree, 1, "generate-id()").to_string(),
            eval_at(&tree, 0, "generate-id(//para)").to_string()
        );
    }

    #[test]
    fn test_current_is_stable_inside_predicates() {
        let tree = create_test_tree();
        // From the first para, select paras whose text differs from the current one.
        let others = eval_at(&tree, 1, "//para[. != current()]");
        assert_eq!(others.to_string(), "World");
    }

    #[test]
    fn test_arity_and_unknown_functions() {
        let tree = create_test_tree();
        let vars = VariableMap::new();
        let e_ctx = EvaluationContext::new(tree.root(), &vars);
        let err = evaluate(&parse_expression("concat('a')").unwrap(), &e_ctx).unwrap_err();
        assert!(matches!(err, XPathError::FunctionError { .. }));
        let err = evaluate(&parse_expression("frobnicate()").unwrap(), &e_ctx).unwrap_err();
        assert!(err.to_string().contains("Unknown function"));
    }
}
