//! Per-mode template rule tables and rule selection.
use crate::ast::InstructionId;
use crate::pattern::{DispatchKey, Pattern};
use std::cmp::Ordering;
use std::collections::HashMap;
use weft_xpath1::{DataSourceNode, EvaluationHost, XPathError};

/// One pattern alternative of a template, with everything needed to rank it.
#[derive(Debug, Clone)]
pub struct TemplateRule {
    pub pattern: Pattern,
    pub template: InstructionId,
    pub score: f64,
    pub priority: f64,
    pub precedence: usize,
    pub position: usize,
}

impl TemplateRule {
    /// Ranking order: match score, priority, import precedence, then declaration position.
    fn rank(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.priority.total_cmp(&other.priority))
            .then(self.precedence.cmp(&other.precedence))
            .then(self.position.cmp(&other.position))
    }

    fn ties_with(&self, other: &Self) -> bool {
        self.score == other.score && self.priority == other.priority && self.precedence == other.precedence
    }
}

/// The outcome of a successful selection.
#[derive(Debug)]
pub struct Selection<'t> {
    pub rule: &'t TemplateRule,
    /// Another matching rule that differs from the winner only by position.
    pub conflict: Option<&'t TemplateRule>,
}

/// The rules of one mode, best first, bucketed by the node kind and name they can match.
#[derive(Debug, Clone, Default)]
pub struct ModeTable {
    rules: Vec<TemplateRule>,
    buckets: HashMap<DispatchKey, Vec<usize>>,
    wildcard: Vec<usize>,
}

impl ModeTable {
    pub fn build(mut rules: Vec<TemplateRule>) -> Self {
        rules.sort_by(|a, b| b.rank(a));

        let mut keyed: HashMap<DispatchKey, Vec<usize>> = HashMap::new();
        let mut wildcard = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            match rule.pattern.alternatives().first().and_then(|alt| alt.dispatch_key()) {
                Some(key) => keyed.entry(key).or_default().push(index),
                None => wildcard.push(index),
            }
        }
        // Every bucket also holds the wildcard rules, keeping the global order.
        let buckets = keyed
            .into_iter()
            .map(|(key, mut indices)| {
                indices.extend(wildcard.iter().copied());
                indices.sort_unstable();
                (key, indices)
            })
            .collect();
        Self {
            rules,
            buckets,
            wildcard,
        }
    }

    pub fn rules(&self) -> &[TemplateRule] {
        &self.rules
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn candidates<'a, N: DataSourceNode<'a>>(&self, node: N) -> &[usize] {
        DispatchKey::of(node)
            .and_then(|key| self.buckets.get(&key))
            .unwrap_or(&self.wildcard)
    }

    /// Finds the best rule matching `node` among those accepted by `filter`.
    pub fn select<'t, 'a, N, F>(
        &'t self,
        node: N,
        host: &dyn EvaluationHost<'a, N>,
        filter: F,
    ) -> Result<Option<Selection<'t>>, XPathError>
    where
        N: DataSourceNode<'a> + 'a,
        F: Fn(&TemplateRule) -> bool,
    {
        let candidates = self.candidates(node);
        let mut iter = candidates.iter().map(|&i| &self.rules[i]).filter(|r| filter(r));
        let winner = loop {
            match iter.next() {
                Some(rule) if rule.pattern.matches(node, host)? => break rule,
                Some(_) => continue,
                None => return Ok(None),
            }
        };
        let mut conflict = None;
        for rule in iter.take_while(|r| r.ties_with(winner)) {
            if rule.pattern.matches(node, host)? {
                conflict = Some(rule);
                break;
            }
        }
        log::trace!(
            "rule '{}' (priority {}) selected for {:?}",
            winner.pattern,
            winner.priority,
            node
        );
        Ok(Some(Selection {
            rule: winner,
            conflict,
        }))
    }
}
