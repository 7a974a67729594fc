use crate::data::schema::{
    ACQUIRER_ISSUER_MATCH, ACQUIRER_RESPONSE_CODE, BANK_COMMISSION, BANK_SERVICE_TAX,
    EXTRA_DEDUCTION, INTEGRATION_MODE, PAYMENT_MODE, PAYOUT_STATUS, REFUND_AMOUNT,
    SETTLEMENT_AMOUNT, TRANSACTION_STATUS,
};
use crate::error::{AssistantError, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// Assumed causal direction between transaction fields.
pub const TRANSACTION_EDGES: &[(&str, &str)] = &[
    (PAYMENT_MODE, REFUND_AMOUNT),
    (TRANSACTION_STATUS, REFUND_AMOUNT),
    (ACQUIRER_RESPONSE_CODE, REFUND_AMOUNT),
    (INTEGRATION_MODE, REFUND_AMOUNT),
    (ACQUIRER_ISSUER_MATCH, REFUND_AMOUNT),
    (PAYOUT_STATUS, REFUND_AMOUNT),
    (REFUND_AMOUNT, SETTLEMENT_AMOUNT),
    (BANK_COMMISSION, SETTLEMENT_AMOUNT),
    (BANK_SERVICE_TAX, SETTLEMENT_AMOUNT),
    (EXTRA_DEDUCTION, SETTLEMENT_AMOUNT),
];

/// Directed acyclic graph over column names.
///
/// Nodes keep first-appearance order from the edge list, and
/// [`CausalGraph::topological_order`] is stable with respect to it, so two
/// graphs built from the same edges traverse identically.
#[derive(Debug, Clone)]
pub struct CausalGraph {
    nodes: Vec<String>,
    parents: HashMap<String, Vec<String>>,
    order: Vec<String>,
}

impl CausalGraph {
    /// Build from `(cause, effect)` pairs. Self-loops and cycles are rejected.
    pub fn from_edges(edges: &[(&str, &str)]) -> Result<Self> {
        let mut nodes: Vec<String> = Vec::new();
        let mut parents: HashMap<String, Vec<String>> = HashMap::new();

        for (source, target) in edges {
            if source == target {
                return Err(AssistantError::CausalModelFault(format!(
                    "self-loop on '{}'",
                    source
                )));
            }
            for node in [source, target] {
                if !parents.contains_key(*node) {
                    nodes.push(node.to_string());
                    parents.insert(node.to_string(), Vec::new());
                }
            }
            let entry = parents.entry(target.to_string()).or_default();
            if !entry.iter().any(|p| p == source) {
                entry.push(source.to_string());
            }
        }

        let order = topological_sort(&nodes, &parents)?;
        Ok(Self {
            nodes,
            parents,
            order,
        })
    }

    /// The fixed transaction graph.
    pub fn transactions() -> Result<Self> {
        Self::from_edges(TRANSACTION_EDGES)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn contains(&self, node: &str) -> bool {
        self.parents.contains_key(node)
    }

    pub fn parents(&self, node: &str) -> &[String] {
        self.parents.get(node).map(|p| p.as_slice()).unwrap_or(&[])
    }

    pub fn is_root(&self, node: &str) -> bool {
        self.parents(node).is_empty()
    }

    /// Direct children of `node`, in node order.
    pub fn children(&self, node: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| self.parents(n).iter().any(|p| p == node))
            .map(|n| n.as_str())
            .collect()
    }

    /// Every node from which `node` is reachable, in topological order.
    pub fn ancestors(&self, node: &str) -> Vec<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            for parent in self.parents(current) {
                if seen.insert(parent.as_str()) {
                    queue.push_back(parent.as_str());
                }
            }
        }
        self.order
            .iter()
            .map(|n| n.as_str())
            .filter(|n| seen.contains(n))
            .collect()
    }

    pub fn topological_order(&self) -> &[String] {
        &self.order
    }
}

/// Kahn's algorithm, always picking the earliest ready node in `nodes` order.
fn topological_sort(nodes: &[String], parents: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let mut remaining: HashMap<&str, usize> = nodes
        .iter()
        .map(|n| (n.as_str(), parents.get(n).map(|p| p.len()).unwrap_or(0)))
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(nodes.len());

    while order.len() < nodes.len() {
        let ready = nodes
            .iter()
            .find(|n| remaining.get(n.as_str()) == Some(&0))
            .ok_or_else(|| {
                let stuck: Vec<&str> = nodes
                    .iter()
                    .map(|n| n.as_str())
                    .filter(|n| remaining.contains_key(n))
                    .collect();
                AssistantError::CausalModelFault(format!(
                    "causal graph has a cycle through: {}",
                    stuck.join(", ")
                ))
            })?;

        remaining.remove(ready.as_str());
        for (child, child_parents) in parents {
            if child_parents.iter().any(|p| p == ready) {
                if let Some(count) = remaining.get_mut(child.as_str()) {
                    *count -= 1;
                }
            }
        }
        order.push(ready.clone());
    }

    Ok(order)
}
