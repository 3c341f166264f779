//! An in-memory tree for tests, publicly available to downstream crates.
//!
//! Nodes are numbered in creation order and that number is their document
//! order, so trees must be built depth-first: an element, then its attributes,
//! then its content.

use super::{DataSourceNode, NodeType, QName};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
struct MockNodeData {
    node_type: NodeType,
    prefix: Option<String>,
    local_name: Option<String>,
    namespace_uri: Option<String>,
    value: String,
    parent: Option<usize>,
    children: Vec<usize>,
    attributes: Vec<usize>,
}

impl MockNodeData {
    fn new(node_type: NodeType, parent: Option<usize>) -> Self {
        Self {
            node_type,
            prefix: None,
            local_name: None,
            namespace_uri: None,
            value: String::new(),
            parent,
            children: vec![],
            attributes: vec![],
        }
    }
}

#[derive(Debug)]
pub struct MockTree {
    nodes: Vec<MockNodeData>,
}

impl MockTree {
    pub fn root(&self) -> MockNode<'_> {
        MockNode { id: 0, tree: self }
    }

    pub fn node(&self, id: usize) -> MockNode<'_> {
        MockNode { id, tree: self }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}

/// Builds a [`MockTree`]. Every method returns the id of the new node.
#[derive(Debug)]
pub struct MockTreeBuilder {
    nodes: Vec<MockNodeData>,
}

impl Default for MockTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTreeBuilder {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        Self {
            nodes: vec![MockNodeData::new(NodeType::Root, None)],
        }
    }

    fn push_child(&mut self, parent: usize, data: MockNodeData) -> usize {
        let id = self.nodes.len();
        self.nodes.push(data);
        self.nodes[parent].children.push(id);
        id
    }

    pub fn element(&mut self, parent: usize, name: &str) -> usize {
        self.element_ns(parent, name, None)
    }

    /// An element whose name may carry a prefix bound to `namespace_uri`.
    pub fn element_ns(&mut self, parent: usize, name: &str, namespace_uri: Option<&str>) -> usize {
        let mut data = MockNodeData::new(NodeType::Element, Some(parent));
        set_name(&mut data, name, namespace_uri);
        self.push_child(parent, data)
    }

    pub fn attribute(&mut self, owner: usize, name: &str, value: &str) -> usize {
        self.attribute_ns(owner, name, None, value)
    }

    pub fn attribute_ns(
        &mut self,
        owner: usize,
        name: &str,
        namespace_uri: Option<&str>,
        value: &str,
    ) -> usize {
        let mut data = MockNodeData::new(NodeType::Attribute, Some(owner));
        set_name(&mut data, name, namespace_uri);
        data.value = value.to_string();
        let id = self.nodes.len();
        self.nodes.push(data);
        self.nodes[owner].attributes.push(id);
        id
    }

    pub fn text(&mut self, parent: usize, text: &str) -> usize {
        let mut data = MockNodeData::new(NodeType::Text, Some(parent));
        data.value = text.to_string();
        self.push_child(parent, data)
    }

    pub fn comment(&mut self, parent: usize, text: &str) -> usize {
        let mut data = MockNodeData::new(NodeType::Comment, Some(parent));
        data.value = text.to_string();
        self.push_child(parent, data)
    }

    pub fn processing_instruction(&mut self, parent: usize, target: &str, value: &str) -> usize {
        let mut data = MockNodeData::new(NodeType::ProcessingInstruction, Some(parent));
        data.local_name = Some(target.to_string());
        data.value = value.to_string();
        self.push_child(parent, data)
    }

    pub fn build(self) -> MockTree {
        MockTree { nodes: self.nodes }
    }
}

fn set_name(data: &mut MockNodeData, name: &str, namespace_uri: Option<&str>) {
    match name.split_once(':') {
        Some((prefix, local)) => {
            data.prefix = Some(prefix.to_string());
            data.local_name = Some(local.to_string());
        }
        None => data.local_name = Some(name.to_string()),
    }
    data.namespace_uri = namespace_uri.map(str::to_string);
}

/// A node handle that carries a reference to its tree so it can navigate.
#[derive(Debug, Clone, Copy)]
pub struct MockNode<'a> {
    pub id: usize,
    pub tree: &'a MockTree,
}

impl<'a> MockNode<'a> {
    fn data(&self) -> &'a MockNodeData {
        &self.tree.nodes[self.id]
    }
}

impl PartialEq for MockNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.tree, other.tree)
    }
}

impl Eq for MockNode<'_> {}

impl PartialOrd for MockNode<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MockNode<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for MockNode<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<'a> DataSourceNode<'a> for MockNode<'a> {
    fn node_type(&self) -> NodeType {
        self.data().node_type
    }

    fn name(&self) -> Option<QName<'a>> {
        let data = self.data();
        data.local_name.as_deref().map(|local_part| QName {
            prefix: data.prefix.as_deref(),
            local_part,
        })
    }

    fn namespace_uri(&self) -> Option<&'a str> {
        self.data().namespace_uri.as_deref()
    }

    fn string_value(&self) -> String {
        let data = self.data();
        match data.node_type {
            NodeType::Root | NodeType::Element => {
                let mut out = String::new();
                let mut stack: Vec<usize> = data.children.iter().rev().copied().collect();
                while let Some(id) = stack.pop() {
                    let node = &self.tree.nodes[id];
                    match node.node_type {
                        NodeType::Text => out.push_str(&node.value),
                        NodeType::Element => stack.extend(node.children.iter().rev()),
                        _ => {}
                    }
                }
                out
            }
            _ => data.value.clone(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        let tree = self.tree;
        Box::new(
            self.data()
                .attributes
                .iter()
                .map(move |&id| MockNode { id, tree }),
        )
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        let tree = self.tree;
        Box::new(
            self.data()
                .children
                .iter()
                .map(move |&id| MockNode { id, tree }),
        )
    }

    fn parent(&self) -> Option<Self> {
        self.data().parent.map(|id| MockNode {
            id,
            tree: self.tree,
        })
    }

    fn root(&self) -> Self {
        MockNode {
            id: 0,
            tree: self.tree,
        }
    }
}

/// Creates a simple mock tree for testing:
/// ```text
/// /                                          0
///   <para id="p1" xml:lang="en">Hello</para> 1, @id 2, @xml:lang 3, text 4
///   <!-- comment node -->                    5
///   <div/>                                   6
///   <?pi-target pi-value?>                   7
///   <para>World</para>                       8, text 9
/// ```
pub fn create_test_tree() -> MockTree {
    let mut b = MockTreeBuilder::new();
    let root = MockTreeBuilder::ROOT;
    let para = b.element(root, "para");
    b.attribute(para, "id", "p1");
    b.attribute_ns(para, "xml:lang", Some(crate::name::XML_NAMESPACE), "en");
    b.text(para, "Hello");
    b.comment(root, " comment node ");
    b.element(root, "div");
    b.processing_instruction(root, "pi-target", "pi-value");
    let second = b.element(root, "para");
    b.text(second, "World");
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_shape_and_values() {
        let tree = create_test_tree();
        let root = tree.root();
        assert_eq!(root.node_type(), NodeType::Root);
        assert_eq!(root.children().count(), 5);
        assert_eq!(root.string_value(), "HelloWorld");

        let para = tree.node(1);
        assert_eq!(para.name().unwrap().local_part, "para");
        assert_eq!(para.attributes().count(), 2);
        assert_eq!(tree.node(3).name().unwrap().prefix, Some("xml"));
        assert_eq!(tree.node(9).parent(), Some(tree.node(8)));
        assert_eq!(tree.node(9).root(), root);
        assert_eq!(tree.node(7).name().unwrap().local_part, "pi-target");
    }
}
