//! Defines the core abstraction for a navigable, read-only source tree.
use crate::name::QualifiedName;
use std::hash::Hash;

pub mod mock;

/// A borrowed qualified name as it appears on a source node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QName<'a> {
    pub prefix: Option<&'a str>,
    pub local_part: &'a str,
}

/// The type of a node in the source tree, aligned with the XPath 1.0 data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// The contract for a node in a read-only, hierarchical source tree.
///
/// The expression engine and the transformation runtime are written exclusively
/// against this trait. `Ord` must follow document order, with an element ordered
/// before its attributes and its attributes before its children.
///
/// `'a` is the lifetime of the underlying document.
pub trait DataSourceNode<'a>:
    std::fmt::Debug + Clone + Copy + PartialEq + Eq + Hash + PartialOrd + Ord
{
    fn node_type(&self) -> NodeType;

    /// The name of the node as written in the source. `None` for root, text and
    /// comment nodes. For a processing instruction this is its target.
    fn name(&self) -> Option<QName<'a>>;

    /// The namespace URI of an element or attribute name.
    fn namespace_uri(&self) -> Option<&'a str>;

    /// The string value of the node, as defined by the XPath 1.0 `string()` function.
    fn string_value(&self) -> String;

    /// The attribute nodes of an element; empty for every other node type.
    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The child nodes in document order; empty for leaf nodes.
    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a>;

    /// The parent node. An attribute's parent is its owner element.
    fn parent(&self) -> Option<Self>;

    /// The root node of the document containing this node. It doubles as the
    /// document's identity.
    fn root(&self) -> Self {
        let mut current = *self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// The expanded name of an element, attribute or processing instruction.
    fn expanded_name(&self) -> Option<QualifiedName> {
        self.name()
            .map(|q| QualifiedName::new(q.prefix, q.local_part, self.namespace_uri()))
    }
}
