//! `xsl:key` declarations and the lazily built per-document index behind `key()`.
use crate::error::ExecutionError;
use crate::pattern::Pattern;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use weft_xpath1::{
    DataSourceNode, EvaluationContext, EvaluationHost, Expression, QualifiedName, XPathError, XPathValue, evaluate,
};

#[derive(Debug, Clone, PartialEq)]
pub struct KeyDecl {
    pub name: QualifiedName,
    pub pattern: Pattern,
    pub use_expr: Expression,
}

/// Value to document-ordered nodes, for one key name in one document.
pub type KeyTable<N> = HashMap<String, Vec<N>>;

/// Per-run cache of key tables, keyed by document root and key name.
#[derive(Debug)]
pub struct KeyIndex<N> {
    tables: HashMap<(N, QualifiedName), KeyTable<N>>,
    building: HashSet<(N, QualifiedName)>,
}

impl<N> Default for KeyIndex<N> {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            building: HashSet::new(),
        }
    }
}

impl<N: Copy + Eq + Hash> KeyIndex<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The nodes indexed under `value`, or `None` if the table is not built yet.
    pub fn lookup(&self, root: N, name: &QualifiedName, value: &str) -> Option<Vec<N>> {
        self.tables
            .get(&(root, name.clone()))
            .map(|table| table.get(value).cloned().unwrap_or_default())
    }

    /// Marks the table as under construction. A second request for the same
    /// table before `finish_build` means the key is used by its own definition.
    pub fn begin_build(&mut self, root: N, name: &QualifiedName) -> Result<(), ExecutionError> {
        if !self.building.insert((root, name.clone())) {
            return Err(ExecutionError::RecursiveKey(name.to_string()));
        }
        Ok(())
    }

    pub fn finish_build(&mut self, root: N, name: &QualifiedName, table: KeyTable<N>) {
        let key = (root, name.clone());
        self.building.remove(&key);
        self.tables.insert(key, table);
    }

    pub fn abandon_build(&mut self, root: N, name: &QualifiedName) {
        self.building.remove(&(root, name.clone()));
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// Builds the table for one key name: every node of the document, in document
/// order, is matched against every declaration and indexed under each value of
/// the declaration's use expression.
pub fn build_table<'a, N>(
    root: N,
    decls: &[&KeyDecl],
    host: &dyn EvaluationHost<'a, N>,
) -> Result<KeyTable<N>, XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    let mut table: KeyTable<N> = HashMap::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        index_node(node, decls, host, &mut table)?;
        for attr in node.attributes() {
            index_node(attr, decls, host, &mut table)?;
        }
        let children: Vec<N> = node.children().collect();
        stack.extend(children.into_iter().rev());
    }
    for nodes in table.values_mut() {
        nodes.sort();
        nodes.dedup();
    }
    Ok(table)
}

fn index_node<'a, N>(
    node: N,
    decls: &[&KeyDecl],
    host: &dyn EvaluationHost<'a, N>,
    table: &mut KeyTable<N>,
) -> Result<(), XPathError>
where
    N: DataSourceNode<'a> + 'a,
{
    for decl in decls {
        if !decl.pattern.matches(node, host)? {
            continue;
        }
        let e_ctx = EvaluationContext::new(node, host);
        let values = match evaluate(&decl.use_expr, &e_ctx)? {
            XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
            other => vec![other.to_string()],
        };
        for value in values {
            table.entry(value).or_default().push(node);
        }
    }
    Ok(())
}
