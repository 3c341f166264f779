//! Node collection along each XPath axis.
//!
//! Forward axes yield nodes in document order; reverse axes yield them nearest
//! first, which is the order proximity positions are counted in.

use crate::ast::Axis;
use crate::datasource::{DataSourceNode, NodeType};

/// Appends the nodes on `axis` from `node` to `out`, in axis order.
pub fn collect<'a, N: DataSourceNode<'a>>(axis: Axis, node: N, out: &mut Vec<N>) {
    match axis {
        Axis::Child => out.extend(node.children()),
        Axis::Attribute => out.extend(node.attributes()),
        Axis::SelfAxis => out.push(node),
        Axis::Parent => out.extend(node.parent()),
        Axis::Descendant => push_descendants(node, out),
        Axis::DescendantOrSelf => {
            out.push(node);
            push_descendants(node, out);
        }
        Axis::Ancestor => push_ancestors(node, out),
        Axis::AncestorOrSelf => {
            out.push(node);
            push_ancestors(node, out);
        }
        Axis::FollowingSibling => {
            if node.node_type() != NodeType::Attribute {
                out.extend(siblings(node).1);
            }
        }
        Axis::PrecedingSibling => {
            if node.node_type() != NodeType::Attribute {
                out.extend(siblings(node).0.into_iter().rev());
            }
        }
        Axis::Following => push_following(node, out),
        Axis::Preceding => push_preceding(node, out),
    }
}

fn push_descendants<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut stack: Vec<N> = node.children().collect();
    stack.reverse();
    while let Some(current) = stack.pop() {
        out.push(current);
        let mut children: Vec<N> = current.children().collect();
        children.reverse();
        stack.extend(children);
    }
}

fn push_ancestors<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node.parent();
    while let Some(parent) = current {
        out.push(parent);
        current = parent.parent();
    }
}

/// Splits the parent's children around `node`: (before, after), both in document order.
fn siblings<'a, N: DataSourceNode<'a>>(node: N) -> (Vec<N>, Vec<N>) {
    let Some(parent) = node.parent() else {
        return (vec![], vec![]);
    };
    let mut before = Vec::new();
    let mut after = Vec::new();
    let mut seen_self = false;
    for sibling in parent.children() {
        if sibling == node {
            seen_self = true;
        } else if seen_self {
            after.push(sibling);
        } else {
            before.push(sibling);
        }
    }
    (before, after)
}

fn push_following<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = node;
    if node.node_type() == NodeType::Attribute {
        match node.parent() {
            Some(owner) => {
                push_descendants(owner, out);
                current = owner;
            }
            None => return,
        }
    }
    loop {
        for sibling in siblings(current).1 {
            out.push(sibling);
            push_descendants(sibling, out);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
}

fn push_preceding<'a, N: DataSourceNode<'a>>(node: N, out: &mut Vec<N>) {
    let mut current = match node.node_type() {
        NodeType::Attribute => match node.parent() {
            Some(owner) => owner,
            None => return,
        },
        _ => node,
    };
    loop {
        for sibling in siblings(current).0.into_iter().rev() {
            let mut subtree = vec![sibling];
            push_descendants(sibling, &mut subtree);
            out.extend(subtree.into_iter().rev());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
}
