//! Parsing and matching of template `match` patterns.
use crate::error::XsltError;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::multispace0;
use nom::combinator::{map, opt, value};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair};
use nom::{IResult, Parser};
use std::fmt;
use weft_xpath1::ast::{Axis, NodeTest, NodeTypeTest};
use weft_xpath1::engine::{apply_predicates, node_test_matches};
use weft_xpath1::parser as xpath_parser;
use weft_xpath1::{DataSourceNode, EvaluationContext, EvaluationHost, Expression, NodeType, XPathError};

/// The axes a pattern step may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternAxis {
    Child,
    Attribute,
}

/// How a step is joined to the step on its left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `/`: the left step matches the parent.
    Child,
    /// `//`: the left step matches some ancestor.
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternStep {
    pub axis: PatternAxis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
    pub separator: Separator,
}

/// One alternative of a pattern, e.g. `/doc//para[1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    /// Anchored at the root node. The separator of the first step says whether
    /// that step must be a child of the root or any descendant.
    pub absolute: bool,
    pub steps: Vec<PatternStep>,
}

/// A compiled match pattern: a union of path alternatives.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    alternatives: Vec<PathPattern>,
    text: String,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// The node kind a pattern alternative can match, used to bucket template rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    Element(String),
    Attribute(String),
    Text,
    Comment,
    ProcessingInstruction,
    Root,
}

impl DispatchKey {
    pub fn of<'a, N: DataSourceNode<'a>>(node: N) -> Option<Self> {
        match node.node_type() {
            NodeType::Root => Some(DispatchKey::Root),
            NodeType::Element => node.name().map(|q| DispatchKey::Element(q.local_part.to_string())),
            NodeType::Attribute => node.name().map(|q| DispatchKey::Attribute(q.local_part.to_string())),
            NodeType::Text => Some(DispatchKey::Text),
            NodeType::Comment => Some(DispatchKey::Comment),
            NodeType::ProcessingInstruction => Some(DispatchKey::ProcessingInstruction),
        }
    }
}

impl Pattern {
    pub fn alternatives(&self) -> &[PathPattern] {
        &self.alternatives
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Splits a union into one pattern per alternative.
    pub fn split(self) -> Vec<Pattern> {
        let text = self.text;
        self.alternatives
            .into_iter()
            .map(|alternative| Pattern {
                alternatives: vec![alternative],
                text: text.clone(),
            })
            .collect()
    }

    pub fn matches<'a, N>(&self, node: N, host: &dyn EvaluationHost<'a, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        for alternative in &self.alternatives {
            if alternative.matches(node, host)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every predicate expression, for slot resolution.
    pub fn expressions_mut(&mut self) -> impl Iterator<Item = &mut Expression> {
        self.alternatives
            .iter_mut()
            .flat_map(|alt| alt.steps.iter_mut())
            .flat_map(|step| step.predicates.iter_mut())
    }

    pub fn resolve_prefixes<F>(&mut self, lookup: F) -> Result<(), XPathError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for step in self.alternatives.iter_mut().flat_map(|alt| alt.steps.iter_mut()) {
            match &mut step.node_test {
                NodeTest::Name(name) => name.resolve(&lookup).map_err(XPathError::UnknownPrefix)?,
                NodeTest::NamespaceWildcard {
                    prefix,
                    namespace_uri,
                } => {
                    *namespace_uri = Some(lookup(prefix.as_str()).ok_or_else(|| XPathError::UnknownPrefix(prefix.clone()))?);
                }
                NodeTest::Wildcard | NodeTest::NodeType(_) => {}
            }
            for predicate in &mut step.predicates {
                predicate.resolve_prefixes(&lookup)?;
            }
        }
        Ok(())
    }
}

impl PathPattern {
    /// The priority a rule gets when it does not declare one.
    pub fn default_priority(&self) -> f64 {
        match self.steps.as_slice() {
            [step] if !self.absolute && step.predicates.is_empty() => match &step.node_test {
                NodeTest::Name(_) => 0.0,
                NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some(_))) => 0.0,
                NodeTest::NamespaceWildcard { .. } => -0.25,
                NodeTest::Wildcard | NodeTest::NodeType(_) => -0.5,
            },
            _ => 0.5,
        }
    }

    /// `None` when the alternative can match nodes of more than one name or kind.
    pub fn dispatch_key(&self) -> Option<DispatchKey> {
        let Some(last) = self.steps.last() else {
            return Some(DispatchKey::Root);
        };
        match (&last.node_test, last.axis) {
            (NodeTest::Name(name), PatternAxis::Child) => Some(DispatchKey::Element(name.local_part.clone())),
            (NodeTest::Name(name), PatternAxis::Attribute) => Some(DispatchKey::Attribute(name.local_part.clone())),
            (NodeTest::NodeType(NodeTypeTest::Text), PatternAxis::Child) => Some(DispatchKey::Text),
            (NodeTest::NodeType(NodeTypeTest::Comment), PatternAxis::Child) => Some(DispatchKey::Comment),
            (NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(_)), PatternAxis::Child) => {
                Some(DispatchKey::ProcessingInstruction)
            }
            _ => None,
        }
    }

    pub fn matches<'a, N>(&self, node: N, host: &dyn EvaluationHost<'a, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        if self.steps.is_empty() {
            return Ok(self.absolute && node.node_type() == NodeType::Root);
        }
        let e_ctx = EvaluationContext::new(node, host);
        self.match_step(self.steps.len() - 1, node, &e_ctx)
    }

    fn match_step<'a, N>(&self, index: usize, node: N, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        let step = &self.steps[index];
        if !step.matches(node, e_ctx)? {
            return Ok(false);
        }
        let Some(parent) = node.parent() else {
            return Ok(false);
        };
        if index == 0 {
            return Ok(!self.absolute
                || match step.separator {
                    Separator::Child => parent.node_type() == NodeType::Root,
                    Separator::Descendant => parent.root().node_type() == NodeType::Root,
                });
        }
        match step.separator {
            Separator::Child => self.match_step(index - 1, parent, e_ctx),
            Separator::Descendant => {
                let mut ancestor = Some(parent);
                while let Some(candidate) = ancestor {
                    if self.match_step(index - 1, candidate, e_ctx)? {
                        return Ok(true);
                    }
                    ancestor = candidate.parent();
                }
                Ok(false)
            }
        }
    }
}

impl PatternStep {
    fn axis(&self) -> Axis {
        match self.axis {
            PatternAxis::Child => Axis::Child,
            PatternAxis::Attribute => Axis::Attribute,
        }
    }

    fn test<'a, N: DataSourceNode<'a>>(&self, node: N) -> bool {
        let type_ok = match self.axis {
            PatternAxis::Attribute => node.node_type() == NodeType::Attribute,
            PatternAxis::Child => !matches!(node.node_type(), NodeType::Attribute | NodeType::Root),
        };
        type_ok && node_test_matches(&self.node_test, self.axis(), node)
    }

    /// Tests the node, then evaluates the predicates with the node's position
    /// among the siblings that pass the same test.
    fn matches<'a, N>(&self, node: N, e_ctx: &EvaluationContext<'a, '_, N>) -> Result<bool, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
    {
        if !self.test(node) {
            return Ok(false);
        }
        if self.predicates.is_empty() {
            return Ok(true);
        }
        let candidates: Vec<N> = match node.parent() {
            Some(parent) => {
                let siblings = match self.axis {
                    PatternAxis::Child => parent.children(),
                    PatternAxis::Attribute => parent.attributes(),
                };
                siblings.filter(|n| self.test(*n)).collect()
            }
            None => vec![node],
        };
        let kept = apply_predicates(candidates, &self.predicates, e_ctx)?;
        Ok(kept.contains(&node))
    }
}

// --- Parser ---

pub fn parse(text: &str) -> Result<Pattern, XsltError> {
    match union_pattern(text.trim()) {
        Ok(("", alternatives)) => Ok(Pattern {
            alternatives,
            text: text.to_string(),
        }),
        Ok((rem, _)) => Err(XsltError::XPathParse(
            text.to_string(),
            format!("Unconsumed input in pattern: {}", rem),
        )),
        Err(e) => Err(XsltError::XPathParse(text.to_string(), e.to_string())),
    }
}

fn separator(input: &str) -> IResult<&str, Separator> {
    alt((
        value(Separator::Descendant, tag("//")),
        value(Separator::Child, tag("/")),
    ))
    .parse(input)
}

fn step(input: &str) -> IResult<&str, (PatternAxis, NodeTest, Vec<Expression>)> {
    let (i, axis) = opt(alt((
        value(PatternAxis::Attribute, tag("@")),
        value(PatternAxis::Attribute, pair(tag("attribute"), delimited(multispace0, tag("::"), multispace0))),
        value(PatternAxis::Child, pair(tag("child"), delimited(multispace0, tag("::"), multispace0))),
    )))
    .parse(input)?;
    let (i, node_test) = xpath_parser::node_test(i)?;
    let (i, predicates) = many0(xpath_parser::predicate).parse(i)?;
    Ok((i, (axis.unwrap_or(PatternAxis::Child), node_test, predicates)))
}

fn path_pattern(input: &str) -> IResult<&str, PathPattern> {
    let (i, lead) = opt(separator).parse(input)?;
    let (i, first) = match lead {
        // The root on its own.
        Some(Separator::Child) => match step(i) {
            Ok(ok) => (ok.0, Some(ok.1)),
            Err(_) => (i, None),
        },
        _ => map(step, Some).parse(i)?,
    };
    let Some(first) = first else {
        return Ok((
            i,
            PathPattern {
                absolute: true,
                steps: vec![],
            },
        ));
    };
    let (i, rest) = many0(pair(separator, step)).parse(i)?;

    let make = |separator, (axis, node_test, predicates)| PatternStep {
        axis,
        node_test,
        predicates,
        separator,
    };
    let mut steps = vec![make(lead.unwrap_or(Separator::Child), first)];
    steps.extend(rest.into_iter().map(|(sep, s)| make(sep, s)));
    Ok((
        i,
        PathPattern {
            absolute: lead.is_some(),
            steps,
        },
    ))
}

fn union_pattern(input: &str) -> IResult<&str, Vec<PathPattern>> {
    separated_list1(delimited(multispace0, tag("|"), multispace0), path_pattern).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_xpath1::VariableMap;
    use weft_xpath1::datasource::mock::{MockNode, MockTree, MockTreeBuilder, create_test_tree};

    fn matches<'a>(pattern: &str, node: MockNode<'a>) -> bool {
        let vars = VariableMap::new();
        parse(pattern).unwrap().matches(node, &vars).unwrap()
    }

    fn nested_tree() -> MockTree {
        // <doc><sec><p/><p/></sec><p/></doc>
        let mut b = MockTreeBuilder::new();
        let doc = b.element(MockTreeBuilder::ROOT, "doc");
        let sec = b.element(doc, "sec");
        b.element(sec, "p");
        b.element(sec, "p");
        b.element(doc, "p");
        b.build()
    }

    #[test]
    fn test_pattern_parsing() {
        for text in [
            "foo",
            "foo/bar",
            "/",
            "/*",
            "/root/item",
            "foo | bar",
            "text()",
            "@id",
            "*",
            "foo/*/@id",
            "//para",
            "doc//p[2]",
            "child::para",
            "attribute::xml:lang",
            "processing-instruction('x')",
        ] {
            assert!(parse(text).is_ok(), "failed to parse {}", text);
        }
        assert!(parse("foo/").is_err());
        assert!(parse("").is_err());
        assert!(parse("foo bar").is_err());
    }

    #[test]
    fn test_simple_name_match() {
        let tree = create_test_tree();
        assert!(matches("para", tree.node(1)));
        assert!(!matches("para", tree.root()));
        assert!(!matches("para", tree.node(6)));
    }

    #[test]
    fn test_absolute_wildcard_match() {
        let tree = create_test_tree();
        assert!(matches("/*", tree.node(1)));
        assert!(!matches("/*", tree.root()));
        assert!(!matches("/*", tree.node(4)));
    }

    #[test]
    fn test_root_pattern() {
        let tree = create_test_tree();
        assert!(matches("/", tree.root()));
        assert!(!matches("/", tree.node(1)));
        assert!(!matches("node()", tree.root()));
    }

    #[test]
    fn test_path_match() {
        let tree = create_test_tree();
        assert!(matches("para/text()", tree.node(4)));
        assert!(!matches("para/text()", tree.node(1)));
        assert!(matches("comment()", tree.node(5)));
        assert!(matches("processing-instruction('pi-target')", tree.node(7)));
        assert!(!matches("processing-instruction('other')", tree.node(7)));
    }

    #[test]
    fn test_attribute_match() {
        let tree = create_test_tree();
        assert!(matches("@id", tree.node(2)));
        assert!(matches("para/@*", tree.node(3)));
        assert!(matches("@xml:lang", tree.node(3)));
        assert!(!matches("@id", tree.node(1)));
        assert!(!matches("node()", tree.node(2)));
    }

    #[test]
    fn test_descendant_separator_backtracks() {
        let tree = nested_tree();
        assert!(matches("doc//p", tree.node(3)));
        assert!(matches("doc//p", tree.node(5)));
        assert!(matches("//p", tree.node(4)));
        assert!(matches("/doc//sec/p", tree.node(4)));
        assert!(!matches("doc/p", tree.node(3)));
        assert!(!matches("sec//p", tree.node(5)));
    }

    #[test]
    fn test_positional_predicate_counts_matching_siblings() {
        let tree = nested_tree();
        assert!(matches("p[1]", tree.node(3)));
        assert!(matches("p[2]", tree.node(4)));
        assert!(matches("p[last()]", tree.node(4)));
        assert!(matches("p[1]", tree.node(5)));
        assert!(!matches("sec/p[1]", tree.node(4)));
        assert!(matches("para[@id='p1']", create_test_tree().node(1)));
    }

    #[test]
    fn test_union_alternatives() {
        let tree = create_test_tree();
        let pattern = parse("nonexistent|para").unwrap();
        let vars = VariableMap::new();
        assert!(pattern.matches(tree.node(1), &vars).unwrap());
        assert_eq!(pattern.clone().split().len(), 2);
        assert_eq!(pattern.to_string(), "nonexistent|para");
    }

    #[test]
    fn test_default_priorities() {
        let priority = |text: &str| parse(text).unwrap().alternatives()[0].default_priority();
        assert_eq!(priority("para"), 0.0);
        assert_eq!(priority("@id"), 0.0);
        assert_eq!(priority("processing-instruction('x')"), 0.0);
        assert_eq!(priority("ex:*"), -0.25);
        assert_eq!(priority("*"), -0.5);
        assert_eq!(priority("text()"), -0.5);
        assert_eq!(priority("node()"), -0.5);
        assert_eq!(priority("para[1]"), 0.5);
        assert_eq!(priority("doc/para"), 0.5);
        assert_eq!(priority("/"), 0.5);
    }

    #[test]
    fn test_dispatch_keys() {
        let key = |text: &str| parse(text).unwrap().alternatives()[0].dispatch_key();
        assert_eq!(key("doc/para"), Some(DispatchKey::Element("para".into())));
        assert_eq!(key("@id"), Some(DispatchKey::Attribute("id".into())));
        assert_eq!(key("/"), Some(DispatchKey::Root));
        assert_eq!(key("text()"), Some(DispatchKey::Text));
        assert_eq!(key("*"), None);
        assert_eq!(key("node()"), None);

        let tree = create_test_tree();
        assert_eq!(DispatchKey::of(tree.node(1)), Some(DispatchKey::Element("para".into())));
        assert_eq!(DispatchKey::of(tree.node(4)), Some(DispatchKey::Text));
    }

    #[test]
    fn test_prefix_resolution() {
        let mut pattern = parse("ex:item/@ex:*").unwrap();
        pattern
            .resolve_prefixes(|p| (p == "ex").then(|| "urn:ex".to_string()))
            .unwrap();
        let steps = &pattern.alternatives()[0].steps;
        let NodeTest::Name(name) = &steps[0].node_test else {
            panic!("Expected a name test");
        };
        assert_eq!(name.namespace_uri.as_deref(), Some("urn:ex"));

        let mut unknown = parse("nope:item").unwrap();
        assert!(unknown.resolve_prefixes(|_| None).is_err());
    }
}
