//! Replica ranking by recent outcomes

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Number of outcomes remembered per node
pub const STATS_WINDOW: usize = 20;

const SUCCESS: i64 = 1;
const FAILURE: i64 = -1;

/// Recent outcomes of one node, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStats {
    outcomes: VecDeque<i64>,
    weight: i64,
}

impl NodeStats {
    fn new() -> Self {
        let mut outcomes = VecDeque::with_capacity(STATS_WINDOW + 1);
        outcomes.push_back(SUCCESS);
        Self { outcomes, weight: SUCCESS }
    }

    fn record(&mut self, outcome: i64) {
        self.outcomes.push_back(outcome);
        if self.outcomes.len() > STATS_WINDOW {
            self.outcomes.pop_front();
        }
        // Later outcomes count more: weight = sum of (i + 1) * outcome_i.
        self.weight = self
            .outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| (i as i64 + 1) * outcome)
            .sum();
    }

    pub fn weight(&self) -> i64 {
        self.weight
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

struct HolderState {
    /// Sorted by weight, heaviest first
    nodes: Vec<String>,
    stats: HashMap<String, NodeStats>,
}

/// Process-wide replica ranking.
///
/// Every reported outcome re-sorts the node list by weight. The first
/// `consensus` entries are the healthy set.
pub struct NodeHolder {
    consensus: usize,
    state: Mutex<HolderState>,
}

impl NodeHolder {
    /// Create a holder over `nodes`, keeping their order as the initial ranking.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `consensus` nodes are given.
    pub fn new(nodes: Vec<String>, consensus: usize) -> Self {
        assert!(
            nodes.len() >= consensus,
            "node holder needs at least {} nodes, got {}",
            consensus,
            nodes.len()
        );

        let stats = nodes
            .iter()
            .map(|id| (id.clone(), NodeStats::new()))
            .collect();

        Self {
            consensus,
            state: Mutex::new(HolderState { nodes, stats }),
        }
    }

    /// Report a good answer from `id`
    pub fn success(&self, id: &str) {
        self.adjust(id, SUCCESS);
    }

    /// Report a failed request to `id`
    pub fn fail(&self, id: &str) {
        self.adjust(id, FAILURE);
    }

    fn adjust(&self, id: &str, outcome: i64) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(stats) = state.stats.get_mut(id) else {
            warn!(node = %id, "Outcome reported for unknown node");
            return;
        };
        stats.record(outcome);
        let weight = stats.weight;

        if let Some(pos) = state.nodes.iter().position(|n| n == id) {
            state.nodes.remove(pos);
        }

        let stats = &state.stats;
        let insert_at = state
            .nodes
            .iter()
            .position(|n| stats.get(n).map_or(i64::MIN, NodeStats::weight) < weight)
            .unwrap_or(state.nodes.len());
        state.nodes.insert(insert_at, id.to_string());

        debug!(node = %id, outcome, weight, rank = insert_at, "Node weight updated");
    }

    /// The `consensus` best nodes
    pub fn healthy(&self) -> Vec<String> {
        let state = self.state.lock();
        state.nodes[..self.consensus].to_vec()
    }

    /// Every node, best first
    pub fn all(&self) -> Vec<String> {
        self.state.lock().nodes.clone()
    }

    pub fn consensus(&self) -> usize {
        self.consensus
    }

    pub fn len(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().nodes.is_empty()
    }

    /// Current weight of `id`
    pub fn weight(&self, id: &str) -> Option<i64> {
        self.state.lock().stats.get(id).map(NodeStats::weight)
    }

    /// Snapshot of the stats for `id`
    pub fn stats(&self, id: &str) -> Option<NodeStats> {
        self.state.lock().stats.get(id).cloned()
    }
}

impl std::fmt::Debug for NodeHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHolder")
            .field("consensus", &self.consensus)
            .field("nodes", &self.all())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn assert_sorted(holder: &NodeHolder) {
        let weights: Vec<i64> = holder
            .all()
            .iter()
            .map(|id| holder.weight(id).unwrap())
            .collect();
        assert!(
            weights.windows(2).all(|w| w[0] >= w[1]),
            "weights not descending: {:?}",
            weights
        );
    }

    #[test]
    fn test_success_pulls_node_up() {
        let holder = NodeHolder::new(ids(&["1", "2", "3", "4", "5"]), 5);
        holder.success("5");
        assert_eq!(holder.healthy(), ids(&["5", "1", "2", "3", "4"]));
        assert_eq!(holder.weight("5"), Some(3));
    }

    #[test]
    fn test_fail_pushes_node_down() {
        let holder = NodeHolder::new(ids(&["1", "2", "3"]), 2);
        holder.fail("1");
        assert_eq!(holder.all(), ids(&["2", "3", "1"]));
        assert_eq!(holder.healthy(), ids(&["2", "3"]));
        assert_eq!(holder.weight("1"), Some(-1));
    }

    #[test]
    fn test_equal_weight_goes_after_peers() {
        let holder = NodeHolder::new(ids(&["a", "b", "c"]), 1);
        holder.success("c");
        holder.success("a");
        // a and c both weigh 3; a was moved last so it lands behind c
        assert_eq!(holder.all(), ids(&["c", "a", "b"]));
    }

    #[test]
    fn test_window_is_bounded() {
        let holder = NodeHolder::new(ids(&["a", "b"]), 1);
        for _ in 0..50 {
            holder.success("a");
        }
        let stats = holder.stats("a").unwrap();
        assert_eq!(stats.len(), STATS_WINDOW);
        assert_eq!(stats.weight(), (1..=STATS_WINDOW as i64).sum::<i64>());

        // Recent failures outweigh older successes.
        for _ in 0..12 {
            holder.fail("a");
        }
        assert!(holder.weight("a").unwrap() < 0);
        assert_eq!(holder.healthy(), ids(&["b"]));
    }

    #[test]
    fn test_unknown_node_is_ignored() {
        let holder = NodeHolder::new(ids(&["a", "b"]), 2);
        holder.success("zz");
        holder.fail("zz");
        assert_eq!(holder.all(), ids(&["a", "b"]));
        assert_eq!(holder.weight("zz"), None);
    }

    #[test]
    #[should_panic(expected = "at least 3 nodes")]
    fn test_too_few_nodes_panics() {
        NodeHolder::new(ids(&["a", "b"]), 3);
    }

    #[test]
    fn test_random_outcomes_keep_list_sorted() {
        let names: Vec<String> = (0..8).map(|i| format!("node-{}", i)).collect();
        let holder = NodeHolder::new(names.clone(), 4);
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let id = &names[rng.gen_range(0..names.len())];
            if rng.gen_bool(0.6) {
                holder.success(id);
            } else {
                holder.fail(id);
            }
            assert_sorted(&holder);
            assert_eq!(holder.healthy().len(), 4);
            assert_eq!(holder.len(), 8);
        }
    }

    #[test]
    fn test_concurrent_updates() {
        let holder = std::sync::Arc::new(NodeHolder::new(ids(&["a", "b", "c", "d"]), 2));
        let handles: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| {
                let holder = holder.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        if i % 3 == 0 {
                            holder.fail(id);
                        } else {
                            holder.success(id);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_sorted(&holder);
        assert_eq!(holder.len(), 4);
    }
}
