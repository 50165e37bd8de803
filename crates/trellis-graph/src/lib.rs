//! Graph state engine: entities, containment, collapse/expand, aggregated
//! edges, search, and the layout and render bridges.

pub mod aggregation;
pub mod graph;
pub mod hierarchy;
pub mod layered;
pub mod layout;
pub mod render;
pub mod search;
pub mod style;
pub mod visibility;

pub use aggregation::{AggregatedEdge, AggregationKey, EdgeAggregator};
pub use graph::{
    GraphModel, GraphStats, MutationOutcome, SnapshotEdge, SnapshotEntity, SnapshotHighlight,
    VisibleSets, VisibleSubgraph,
};
pub use layered::LayeredLayoutEngine;
pub use layout::{
    LayoutBridge, LayoutEngine, LayoutEntry, LayoutItem, LayoutLink, LayoutPhase, LayoutRequest,
};
pub use render::{RenderBridge, RenderData, RenderEdge, RenderNode};
pub use search::{MatchField, SearchResult};
pub use style::{Color, NodeColors};
pub use visibility::{BatchOutcome, ToggleAction};
