//! Conversion of the visible subgraph into renderer-ready primitives.

use crate::graph::VisibleSubgraph;
use crate::style::{self, Color, NodeColors};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use trellis_core::{EdgeId, EdgeStyleKind, EntityId, EntityKind, Size, StyleConfig, Vec2};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderNode {
    pub id: EntityId,
    pub label: String,
    pub kind: String,
    pub parent: Option<EntityId>,
    pub is_container: bool,
    pub collapsed: bool,
    pub child_count: usize,
    pub position: Option<Vec2>,
    pub size: Option<Size>,
    pub colors: NodeColors,
    /// Search rank and the label range to highlight, if this entity matched.
    pub search_rank: Option<usize>,
    pub highlight: Option<Range<usize>>,
    pub highlight_color: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderEdge {
    pub id: EdgeId,
    pub source: EntityId,
    pub target: EntityId,
    pub aggregated: bool,
    pub multiplicity: usize,
    pub color: Color,
    pub width: f32,
    pub dashed: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderData {
    /// Model revision the frame was built from.
    pub revision: u64,
    pub edge_style: EdgeStyleKind,
    /// Containers then nodes, in model insertion order.
    pub nodes: Vec<RenderNode>,
    /// Original edges then aggregated edges.
    pub edges: Vec<RenderEdge>,
}

impl RenderData {
    pub fn node(&self, id: &EntityId) -> Option<&RenderNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn aggregated_edges(&self) -> impl Iterator<Item = &RenderEdge> {
        self.edges.iter().filter(|e| e.aggregated)
    }
}

/// Pure conversion from snapshot to render data.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderBridge;

impl RenderBridge {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, snapshot: &VisibleSubgraph, style: &StyleConfig) -> RenderData {
        let highlights: HashMap<&EntityId, (usize, Option<Range<usize>>)> = snapshot
            .highlights
            .iter()
            .map(|h| (&h.id, (h.rank, h.range.clone())))
            .collect();

        let nodes = snapshot
            .entities
            .iter()
            .map(|entity| {
                let is_container = entity.entity_kind == EntityKind::Container;
                let colors = if is_container {
                    style::container_colors(entity.collapsed, style.palette)
                } else {
                    style::node_colors(&entity.kind, style.palette)
                };
                let hit = highlights.get(&entity.id);
                RenderNode {
                    id: entity.id.clone(),
                    label: entity.label.clone(),
                    kind: entity.kind.clone(),
                    parent: entity.parent.clone(),
                    is_container,
                    collapsed: entity.collapsed,
                    child_count: entity.child_count,
                    position: entity.position,
                    size: entity.size,
                    colors,
                    search_rank: hit.map(|(rank, _)| *rank),
                    highlight: hit.and_then(|(_, range)| range.clone()),
                    highlight_color: hit.map(|_| style::highlight_color(style.palette)),
                }
            })
            .collect();

        let original = snapshot.edges.iter().map(|edge| RenderEdge {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            aggregated: false,
            multiplicity: 1,
            color: style::edge_color(&edge.kind, false, style.palette),
            width: style::edge_width(style, 1),
            dashed: false,
            label: None,
        });
        let aggregated = snapshot.aggregated_edges.iter().map(|edge| RenderEdge {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            aggregated: true,
            multiplicity: edge.multiplicity,
            color: style::edge_color("", true, style.palette),
            width: style::edge_width(style, edge.multiplicity),
            dashed: style.dashed_aggregates,
            label: (style.show_multiplicity && edge.multiplicity > 1)
                .then(|| format!("×{}", edge.multiplicity)),
        });

        RenderData {
            revision: snapshot.revision,
            edge_style: style.edge_style,
            nodes,
            edges: original.chain(aggregated).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphModel;
    use trellis_core::{Container, Edge, Node, Palette};

    fn eid(id: &str) -> EntityId {
        EntityId::from(id)
    }

    fn model() -> GraphModel {
        let mut model = GraphModel::new();
        model.add_node(Node::new("x", "Outside").with_kind("function")).unwrap();
        model.add_container(Container::new("c", "Box")).unwrap();
        model.add_node(Node::new("n1", "One")).unwrap();
        model.add_node(Node::new("n2", "Two")).unwrap();
        model.assign_to_container(&eid("n1"), &eid("c")).unwrap();
        model.assign_to_container(&eid("n2"), &eid("c")).unwrap();
        model.add_edge(Edge::new("e1", "n1", "x")).unwrap();
        model.add_edge(Edge::new("e2", "n2", "x")).unwrap();
        model.add_edge(Edge::new("e3", "x", "c")).unwrap();
        model
    }

    #[test]
    fn containers_come_first_and_originals_before_aggregates() {
        let mut model = model();
        model.collapse_container(&eid("c"));
        let data = RenderBridge::new().render(&model.snapshot(), &StyleConfig::default());

        let ids: Vec<_> = data.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "x"]);
        let edges: Vec<_> = data.edges.iter().map(|e| (e.id.as_str(), e.aggregated)).collect();
        assert_eq!(edges, vec![("e3", false), ("agg:c->x", true)]);

        let agg = data.aggregated_edges().next().unwrap();
        assert_eq!(agg.multiplicity, 2);
        assert!(agg.dashed);
        assert_eq!(agg.label.as_deref(), Some("×2"));
        assert!(agg.width > data.edges[0].width);
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut model = model();
        model.collapse_container(&eid("c"));
        let snapshot = model.snapshot();
        let style = StyleConfig {
            palette: Palette::Muted,
            ..StyleConfig::default()
        };
        let bridge = RenderBridge::new();
        assert_eq!(bridge.render(&snapshot, &style), bridge.render(&snapshot, &style));
    }

    #[test]
    fn search_highlights_are_attached() {
        let mut model = model();
        model.search("outside");
        let data = RenderBridge::new().render(&model.snapshot(), &StyleConfig::default());
        let x = data.node(&eid("x")).unwrap();
        assert_eq!(x.search_rank, Some(0));
        assert_eq!(x.highlight, Some(0..7));
        assert!(data.node(&eid("c")).unwrap().highlight.is_none());
    }

    #[test]
    fn style_flags_are_honoured() {
        let mut model = model();
        model.collapse_container(&eid("c"));
        let style = StyleConfig {
            dashed_aggregates: false,
            show_multiplicity: false,
            ..StyleConfig::default()
        };
        let data = RenderBridge::new().render(&model.snapshot(), &style);
        let agg = data.aggregated_edges().next().unwrap();
        assert!(!agg.dashed);
        assert!(agg.label.is_none());
    }
}
