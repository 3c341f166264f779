//! Source trees backed by roxmltree.
use roxmltree::Node;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use weft_xpath1::{DataSourceNode, NodeType, QName, XML_NAMESPACE};

/// A parsed source document.
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(text)?;
        Ok(Self { doc })
    }

    pub fn root_node(&self) -> XmlNode<'_, 'input> {
        XmlNode::Tree(self.doc.root())
    }
}

/// A node of an [`XmlDocument`]. roxmltree keeps attributes as data on their
/// element, so an attribute node is addressed by its owner and index.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a, 'input> {
    Tree(Node<'a, 'input>),
    Attribute { owner: Node<'a, 'input>, index: usize },
}

impl<'a, 'input> XmlNode<'a, 'input> {
    pub fn new(node: Node<'a, 'input>) -> Self {
        XmlNode::Tree(node)
    }

    pub fn inner(&self) -> Option<Node<'a, 'input>> {
        match self {
            XmlNode::Tree(node) => Some(*node),
            XmlNode::Attribute { .. } => None,
        }
    }

    /// Document order key: the tree node id, then 0 for the node itself or
    /// 1 + index for its attributes.
    fn order_key(&self) -> (usize, usize) {
        match self {
            XmlNode::Tree(node) => (node.id().get_usize(), 0),
            XmlNode::Attribute { owner, index } => (owner.id().get_usize(), index + 1),
        }
    }

    fn attribute(&self) -> Option<roxmltree::Attribute<'a, 'input>> {
        match self {
            XmlNode::Attribute { owner, index } => owner.attributes().nth(*index),
            XmlNode::Tree(_) => None,
        }
    }
}

impl PartialEq for XmlNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.order_key() == other.order_key()
    }
}

impl Eq for XmlNode<'_, '_> {}

impl PartialOrd for XmlNode<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XmlNode<'_, '_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl Hash for XmlNode<'_, '_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order_key().hash(state);
    }
}

fn prefix_of<'a>(scope: Node<'a, 'a>, namespace: Option<&str>) -> Option<&'a str> {
    match namespace {
        Some(XML_NAMESPACE) => Some("xml"),
        Some(uri) => scope.lookup_prefix(uri),
        None => None,
    }
}

impl<'a> DataSourceNode<'a> for XmlNode<'a, 'a> {
    fn node_type(&self) -> NodeType {
        match self {
            XmlNode::Tree(node) => match node.node_type() {
                roxmltree::NodeType::Root => NodeType::Root,
                roxmltree::NodeType::Element => NodeType::Element,
                roxmltree::NodeType::Text => NodeType::Text,
                roxmltree::NodeType::Comment => NodeType::Comment,
                roxmltree::NodeType::PI => NodeType::ProcessingInstruction,
            },
            XmlNode::Attribute { .. } => NodeType::Attribute,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self {
            XmlNode::Tree(node) if node.is_element() => {
                let tag = node.tag_name();
                Some(QName {
                    prefix: prefix_of(*node, tag.namespace()),
                    local_part: tag.name(),
                })
            }
            XmlNode::Tree(node) => node.pi().map(|pi| QName {
                prefix: None,
                local_part: pi.target,
            }),
            XmlNode::Attribute { owner, .. } => self.attribute().map(|attr| QName {
                prefix: prefix_of(*owner, attr.namespace()),
                local_part: attr.name(),
            }),
        }
    }

    fn namespace_uri(&self) -> Option<&'a str> {
        match self {
            XmlNode::Tree(node) if node.is_element() => node.tag_name().namespace(),
            XmlNode::Tree(_) => None,
            XmlNode::Attribute { .. } => self.attribute().and_then(|attr| attr.namespace()),
        }
    }

    fn string_value(&self) -> String {
        match self {
            XmlNode::Tree(node) => match node.node_type() {
                roxmltree::NodeType::Root | roxmltree::NodeType::Element => node
                    .descendants()
                    .filter(|n| n.is_text())
                    .filter_map(|n| n.text())
                    .collect(),
                roxmltree::NodeType::Text | roxmltree::NodeType::Comment => {
                    node.text().unwrap_or_default().to_string()
                }
                roxmltree::NodeType::PI => node
                    .pi()
                    .and_then(|pi| pi.value)
                    .unwrap_or_default()
                    .to_string(),
            },
            XmlNode::Attribute { .. } => self
                .attribute()
                .map(|attr| attr.value().to_string())
                .unwrap_or_default(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Tree(node) if node.is_element() => {
                let owner = *node;
                let count = node.attributes().len();
                Box::new((0..count).map(move |index| XmlNode::Attribute { owner, index }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Tree(node) => Box::new(node.children().map(XmlNode::Tree)),
            XmlNode::Attribute { .. } => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self {
            XmlNode::Tree(node) => node.parent().map(XmlNode::Tree),
            XmlNode::Attribute { owner, .. } => Some(XmlNode::Tree(*owner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child<'a>(node: XmlNode<'a, 'a>, name: &str) -> XmlNode<'a, 'a> {
        node.children()
            .find(|n| n.name().is_some_and(|q| q.local_part == name))
            .unwrap()
    }

    #[test]
    fn test_attributes_are_navigable_nodes() {
        let xml = r#"<root><item id="123" status="active">Text</item></root>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let item = child(child(doc.root_node(), "root"), "item");

        let attrs: Vec<_> = item.attributes().collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].node_type(), NodeType::Attribute);
        assert_eq!(attrs[0].name().unwrap().local_part, "id");
        assert_eq!(attrs[1].string_value(), "active");
        assert_eq!(attrs[0].parent(), Some(item));
    }

    #[test]
    fn test_document_order_puts_attributes_before_children() {
        let xml = r#"<a x="1"><b/></a>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let a = child(doc.root_node(), "a");
        let x = a.attributes().next().unwrap();
        let b = child(a, "b");
        assert!(a < x);
        assert!(x < b);
        assert!(doc.root_node() < a);
    }

    #[test]
    fn test_namespaces_and_prefixes() {
        let xml = r#"<p:doc xmlns:p="urn:p" xml:lang="en"><?style href="a.css"?><!--note--></p:doc>"#;
        let doc = XmlDocument::parse(xml).unwrap();
        let root_elem = doc.root_node().children().next().unwrap();
        let name = root_elem.name().unwrap();
        assert_eq!(name.prefix, Some("p"));
        assert_eq!(root_elem.namespace_uri(), Some("urn:p"));

        let lang = root_elem.attributes().next().unwrap();
        assert_eq!(lang.name().unwrap().prefix, Some("xml"));

        let kinds: Vec<NodeType> = root_elem.children().map(|n| n.node_type()).collect();
        assert_eq!(kinds, vec![NodeType::ProcessingInstruction, NodeType::Comment]);
        let pi = root_elem.children().next().unwrap();
        assert_eq!(pi.name().unwrap().local_part, "style");
        assert_eq!(pi.string_value(), r#"href="a.css""#);
    }
}
