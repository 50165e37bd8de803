use crate::graph::GraphModel;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use trellis_core::{EdgeId, EntityId};

/// (nearest visible source, nearest visible target)
pub type AggregationKey = (EntityId, EntityId);

/// Synthetic edge standing in for every hidden edge that resolves to the
/// same pair of visible endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedEdge {
    pub id: EdgeId,
    pub source: EntityId,
    pub target: EntityId,
    pub multiplicity: usize,
    /// Underlying edges in insertion order.
    pub edge_ids: Vec<EdgeId>,
}

impl AggregatedEdge {
    pub fn synthetic_id(source: &EntityId, target: &EntityId) -> EdgeId {
        EdgeId::new(format!("agg:{source}->{target}"))
    }
}

/// Groups hidden edges by the visible entities their endpoints collapse into.
pub struct EdgeAggregator;

impl EdgeAggregator {
    pub fn aggregate(model: &GraphModel) -> IndexMap<AggregationKey, AggregatedEdge> {
        let mut resolved: HashMap<&EntityId, Option<EntityId>> = HashMap::new();
        let mut bundles: IndexMap<AggregationKey, AggregatedEdge> = IndexMap::new();

        for edge in model.edges.values().filter(|e| e.hidden) {
            let source = resolved
                .entry(&edge.source)
                .or_insert_with(|| model.nearest_visible_unchecked(&edge.source))
                .clone();
            let target = resolved
                .entry(&edge.target)
                .or_insert_with(|| model.nearest_visible_unchecked(&edge.target))
                .clone();

            // Both ends inside the same collapsed subtree, or nothing visible.
            let (Some(source), Some(target)) = (source, target) else {
                continue;
            };
            if source == target {
                continue;
            }

            bundles
                .entry((source.clone(), target.clone()))
                .or_insert_with(|| AggregatedEdge {
                    id: AggregatedEdge::synthetic_id(&source, &target),
                    source,
                    target,
                    multiplicity: 0,
                    edge_ids: Vec::new(),
                })
                .push(edge.id.clone());
        }

        bundles
    }
}

impl AggregatedEdge {
    fn push(&mut self, edge: EdgeId) {
        self.multiplicity += 1;
        self.edge_ids.push(edge);
    }
}

impl GraphModel {
    pub(crate) fn refresh_aggregation(&mut self) {
        self.aggregated = EdgeAggregator::aggregate(self);
        tracing::trace!("Aggregated edges: {}", self.aggregated.len());
    }
}
