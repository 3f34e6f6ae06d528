//! Read-only views of the live connection set.
//!
//! Nothing here writes back into the simulation.

use crate::Simulation;
use p2psim_types::PeerId;
use petgraph::dot::Dot;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashMap;

impl Simulation {
    /// Undirected graph of the live connections: nodes are peer names, edge
    /// weights are connection bandwidth.
    ///
    /// Without `include_bootstrap_peers`, bootstrap peers and every edge
    /// incident to them are left out. The two directions of one link collapse
    /// into a single edge.
    pub fn connection_graph(&self, include_bootstrap_peers: bool) -> UnGraph<String, f64> {
        let mut graph = UnGraph::new_undirected();
        let mut nodes: HashMap<PeerId, NodeIndex> = HashMap::new();

        let mut current: Vec<PeerId> = self
            .peer_types()
            .flat_map(|t| self.peers_of_type(t).iter().copied())
            .collect();
        if include_bootstrap_peers {
            current.extend_from_slice(self.bootstrap_peers());
        }

        let mut node_for = |graph: &mut UnGraph<String, f64>, id: PeerId| -> Option<NodeIndex> {
            if let Some(index) = nodes.get(&id) {
                return Some(*index);
            }
            let peer = self.peer(id)?;
            let index = graph.add_node(peer.name().to_string());
            nodes.insert(id, index);
            Some(index)
        };

        for id in current {
            let (Some(peer), Some(a)) = (self.peer(id), node_for(&mut graph, id)) else {
                continue;
            };
            for (other, connection) in peer.connections() {
                if !include_bootstrap_peers && self.is_bootstrap(other) {
                    continue;
                }
                if let Some(b) = node_for(&mut graph, other) {
                    graph.update_edge(a, b, connection.bandwidth());
                }
            }
        }
        graph
    }

    /// [`connection_graph`](Self::connection_graph) in Graphviz DOT format.
    pub fn connection_graph_dot(&self, include_bootstrap_peers: bool) -> String {
        let graph = self.connection_graph(include_bootstrap_peers);
        Dot::new(&graph).to_string()
    }

    fn bandwidths(&self) -> Vec<f64> {
        self.peers()
            .iter()
            .flat_map(|peer| peer.connections().map(|(_, cnx)| cnx.bandwidth()))
            .collect()
    }

    /// Mean bandwidth over every connection entry of every peer.
    pub fn avg_bandwidth(&self) -> Option<f64> {
        let bandwidths = self.bandwidths();
        if bandwidths.is_empty() {
            return None;
        }
        Some(bandwidths.iter().sum::<f64>() / bandwidths.len() as f64)
    }

    /// Upper median bandwidth over every connection entry of every peer.
    pub fn median_bandwidth(&self) -> Option<f64> {
        let mut bandwidths = self.bandwidths();
        if bandwidths.is_empty() {
            return None;
        }
        bandwidths.sort_by(f64::total_cmp);
        Some(bandwidths[bandwidths.len() / 2])
    }
}
