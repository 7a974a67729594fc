use crate::causal::graph::CausalGraph;
use crate::causal::mechanism::Mechanism;
use crate::causal::NodeColumns;
use crate::error::{AssistantError, Result};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use tracing::debug;

/// Exact Shapley enumerates every coalition of the KPI's ancestors.
const MAX_SHAPLEY_PLAYERS: usize = 16;

/// Per-node contribution to a change in a KPI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributionScores {
    scores: Vec<(String, f64)>,
}

impl AttributionScores {
    pub fn new(scores: Vec<(String, f64)>) -> Self {
        Self { scores }
    }

    pub fn get(&self, node: &str) -> Option<f64> {
        self.scores.iter().find(|(n, _)| n == node).map(|(_, s)| *s)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.get(node).is_some()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.scores.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn total(&self) -> f64 {
        self.scores.iter().map(|(_, s)| s).sum()
    }

    pub fn without(self, nodes: &[&str]) -> Self {
        Self {
            scores: self
                .scores
                .into_iter()
                .filter(|(n, _)| !nodes.contains(&n.as_str()))
                .collect(),
        }
    }

    /// Absolute magnitudes, largest first; ties keep node order.
    pub fn magnitudes(self) -> Self {
        Self {
            scores: self
                .scores
                .into_iter()
                .map(|(n, s)| (n, s.abs()))
                .sorted_by(|a, b| b.1.total_cmp(&a.1))
                .collect(),
        }
    }

    /// One `node: 0.12` line per score.
    pub fn to_prompt_lines(&self) -> String {
        self.scores
            .iter()
            .map(|(n, s)| format!("{}: {:.2}", n, s))
            .join("\n")
    }
}

/// Swappable causal inference backend.
pub trait CausalModel {
    /// Assign and fit a mechanism per node on the full sample. This checks that
    /// every node has data and that each mechanism converges; `attribute`
    /// refits on the two samples it compares and only requires a prior fit.
    fn fit(&mut self, data: &NodeColumns) -> Result<()>;

    /// Contribution of each ancestor of `kpi` (and of `kpi` itself) to the
    /// change in its mean between `baseline` and `target`.
    fn attribute(&self, baseline: &NodeColumns, target: &NodeColumns, kpi: &str) -> Result<AttributionScores>;
}

/// Structural causal model over a fixed graph with empirical root
/// distributions and linear additive-noise mechanisms elsewhere.
///
/// The full-sample mechanisms from [`CausalModel::fit`] are kept for
/// inspection through [`StructuralCausalModel::mechanism`]. Attribution
/// compares distribution changes, so it refits the mechanisms on each sample
/// separately and computes exact Shapley values over mechanism swaps,
/// estimating each coalition's KPI mean by ancestral sampling with common
/// random numbers.
pub struct StructuralCausalModel {
    graph: CausalGraph,
    mechanisms: HashMap<String, Mechanism>,
    num_samples: usize,
    seed: u64,
}

impl StructuralCausalModel {
    pub fn new(graph: CausalGraph, num_samples: usize, seed: u64) -> Self {
        Self {
            graph,
            mechanisms: HashMap::new(),
            num_samples: num_samples.max(1),
            seed,
        }
    }

    pub fn graph(&self) -> &CausalGraph {
        &self.graph
    }

    pub fn is_fitted(&self) -> bool {
        !self.mechanisms.is_empty()
    }

    pub fn mechanism(&self, node: &str) -> Option<&Mechanism> {
        self.mechanisms.get(node)
    }

    fn fit_nodes<'a>(&self, nodes: impl Iterator<Item = &'a str>, data: &NodeColumns) -> Result<HashMap<String, Mechanism>> {
        let mut fitted = HashMap::new();
        for node in nodes {
            let target = column(data, node)?;
            let parents: Vec<&[f64]> = self
                .graph
                .parents(node)
                .iter()
                .map(|p| column(data, p))
                .collect::<Result<_>>()?;
            let mechanism = Mechanism::fit(&parents, target).map_err(|e| {
                AssistantError::CausalModelFault(format!("fitting '{}': {}", node, e))
            })?;
            fitted.insert(node.to_string(), mechanism);
        }
        Ok(fitted)
    }
}

impl CausalModel for StructuralCausalModel {
    fn fit(&mut self, data: &NodeColumns) -> Result<()> {
        let nodes: Vec<String> = self.graph.topological_order().to_vec();
        let fitted = self.fit_nodes(nodes.iter().map(|n| n.as_str()), data)?;
        debug!(
            "Fitted {} mechanisms: {}",
            fitted.len(),
            nodes
                .iter()
                .filter_map(|n| fitted.get(n).map(|m| format!("{}={}", n, m.kind())))
                .join(", ")
        );
        self.mechanisms = fitted;
        Ok(())
    }

    fn attribute(&self, baseline: &NodeColumns, target: &NodeColumns, kpi: &str) -> Result<AttributionScores> {
        if !self.is_fitted() {
            return Err(AssistantError::CausalModelFault(
                "model must be fitted before attribution".to_string(),
            ));
        }
        if !self.graph.contains(kpi) {
            return Err(AssistantError::CausalModelFault(format!(
                "'{}' is not a node of the causal graph",
                kpi
            )));
        }

        let mut players: Vec<&str> = self.graph.ancestors(kpi);
        players.push(kpi);
        if players.len() > MAX_SHAPLEY_PLAYERS {
            return Err(AssistantError::CausalModelFault(format!(
                "{} nodes is too many for exact attribution",
                players.len()
            )));
        }

        let old = self.fit_nodes(players.iter().copied(), baseline)?;
        let new = self.fit_nodes(players.iter().copied(), target)?;

        let sampler = CoalitionSampler::new(&self.graph, &players, self.num_samples, self.seed);
        let n = players.len();
        let values: Vec<f64> = (0..1usize << n)
            .map(|coalition| sampler.kpi_mean(coalition, &old, &new))
            .collect::<Result<_>>()?;

        let scores = (0..n)
            .map(|i| (players[i].to_string(), shapley_value(i, n, &values)))
            .collect();
        debug!(
            "Attribution for '{}': baseline mean {:.4}, target mean {:.4}",
            kpi,
            values[0],
            values[(1 << n) - 1]
        );
        Ok(AttributionScores::new(scores))
    }
}

/// Ancestral sampler over a fixed player set. Coalition bit `i` set means
/// player `i` uses its target-sample mechanism.
struct CoalitionSampler<'a> {
    players: &'a [&'a str],
    parent_index: Vec<Vec<usize>>,
    noise: Vec<Vec<f64>>,
}

impl<'a> CoalitionSampler<'a> {
    fn new(graph: &CausalGraph, players: &'a [&'a str], num_samples: usize, seed: u64) -> Self {
        // Players are already in topological order with the KPI last.
        let parent_index = players
            .iter()
            .map(|node| {
                graph
                    .parents(node)
                    .iter()
                    .filter_map(|p| players.iter().position(|q| *q == p.as_str()))
                    .collect()
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(seed);
        let noise = (0..num_samples)
            .map(|_| (0..players.len()).map(|_| rng.gen::<f64>()).collect())
            .collect();

        Self {
            players,
            parent_index,
            noise,
        }
    }

    fn kpi_mean(&self, coalition: usize, old: &HashMap<String, Mechanism>, new: &HashMap<String, Mechanism>) -> Result<f64> {
        let mechanisms: Vec<&Mechanism> = self
            .players
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let source = if coalition & (1 << i) != 0 { new } else { old };
                source.get(*node).ok_or_else(|| {
                    AssistantError::CausalModelFault(format!("no mechanism for '{}'", node))
                })
            })
            .collect::<Result<_>>()?;

        let last = self.players.len() - 1;
        let mut values = vec![0.0; self.players.len()];
        let mut parent_values: Vec<f64> = Vec::new();
        let mut total = 0.0;
        for draws in &self.noise {
            for (i, mechanism) in mechanisms.iter().enumerate() {
                parent_values.clear();
                parent_values.extend(self.parent_index[i].iter().map(|&p| values[p]));
                values[i] = mechanism.draw(&parent_values, draws[i]);
            }
            total += values[last];
        }

        let mean = total / self.noise.len() as f64;
        if !mean.is_finite() {
            return Err(AssistantError::CausalModelFault(
                "sampled KPI mean is not finite".to_string(),
            ));
        }
        Ok(mean)
    }
}

/// Exact Shapley value of player `i` given the value of every coalition
/// (indexed by bitmask).
fn shapley_value(i: usize, n: usize, values: &[f64]) -> f64 {
    let bit = 1usize << i;
    let weights: Vec<f64> = (0..n).map(|size| coalition_weight(size, n)).collect();
    (0..1usize << n)
        .filter(|coalition| coalition & bit == 0)
        .map(|coalition| {
            let size = coalition.count_ones() as usize;
            weights[size] * (values[coalition | bit] - values[coalition])
        })
        .sum()
}

/// `|S|! (n - |S| - 1)! / n!`
fn coalition_weight(size: usize, n: usize) -> f64 {
    let factorial = |k: usize| (1..=k).map(|v| v as f64).product::<f64>();
    factorial(size) * factorial(n - size - 1) / factorial(n)
}

fn column<'a>(data: &'a NodeColumns, node: &str) -> Result<&'a [f64]> {
    data.get(node).map(|c| c.as_slice()).ok_or_else(|| {
        AssistantError::CausalModelFault(format!("no data for node '{}'", node))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_graph() -> CausalGraph {
        CausalGraph::from_edges(&[("a", "y"), ("b", "y"), ("y", "z")]).unwrap()
    }

    fn sample(a_shift: f64, b_shift: f64, rows: usize) -> NodeColumns {
        let a: Vec<f64> = (0..rows).map(|i| (i % 10) as f64 + a_shift).collect();
        let b: Vec<f64> = (0..rows).map(|i| ((i * 3) % 7) as f64 + b_shift).collect();
        let y: Vec<f64> = a.iter().zip(&b).map(|(a, b)| 2.0 * a + b).collect();
        let z: Vec<f64> = y.iter().map(|y| y + 1.0).collect();
        NodeColumns::from([
            ("a".to_string(), a),
            ("b".to_string(), b),
            ("y".to_string(), y),
            ("z".to_string(), z),
        ])
    }

    #[test]
    fn test_shapley_weights_sum_to_one() {
        for n in 1..6 {
            let total: f64 = (0..n)
                .map(|size| {
                    let count = (0..1usize << (n - 1)).filter(|c| c.count_ones() as usize == size).count();
                    count as f64 * coalition_weight(size, n)
                })
                .sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_attribution_finds_shifted_root() {
        let mut model = StructuralCausalModel::new(chain_graph(), 500, 7);
        model.fit(&sample(0.0, 0.0, 200)).unwrap();
        let scores = model
            .attribute(&sample(0.0, 0.0, 200), &sample(5.0, 0.0, 200), "y")
            .unwrap();

        // y = 2a + b, so shifting a by 5 moves the mean of y by 10.
        assert!((scores.total() - 10.0).abs() < 0.5, "{:?}", scores);
        let a = scores.get("a").unwrap();
        let b = scores.get("b").unwrap();
        assert!(a > 9.0, "{:?}", scores);
        assert!(b.abs() < 0.5, "{:?}", scores);
        assert!(!scores.contains("z"));
    }

    #[test]
    fn test_scores_are_formatted_and_filtered() {
        let scores = AttributionScores::new(vec![
            ("a".into(), -0.5),
            ("y".into(), 2.0),
            ("b".into(), 0.126),
        ]);
        let shown = scores.without(&["y"]).magnitudes();
        assert_eq!(shown.to_prompt_lines(), "a: 0.50\nb: 0.13");
    }

    #[test]
    fn test_attribution_requires_fit_and_known_kpi() {
        let model = StructuralCausalModel::new(chain_graph(), 10, 1);
        let data = sample(0.0, 0.0, 20);
        assert!(model.attribute(&data, &data, "y").is_err());

        let mut model = model;
        model.fit(&data).unwrap();
        assert!(matches!(
            model.attribute(&data, &data, "gmv"),
            Err(AssistantError::CausalModelFault(_))
        ));
    }

    #[test]
    fn test_fit_needs_every_node() {
        let mut model = StructuralCausalModel::new(chain_graph(), 10, 1);
        let mut data = sample(0.0, 0.0, 20);
        data.remove("b");
        assert!(matches!(model.fit(&data), Err(AssistantError::CausalModelFault(_))));
        assert!(!model.is_fitted());
        assert!(model.mechanism("a").is_none());
    }

    #[test]
    fn test_empty_target_sample_fails() {
        let mut model = StructuralCausalModel::new(chain_graph(), 10, 1);
        let data = sample(0.0, 0.0, 20);
        model.fit(&data).unwrap();
        let empty = sample(0.0, 0.0, 0);
        assert!(model.attribute(&data, &empty, "y").is_err());
    }
}
