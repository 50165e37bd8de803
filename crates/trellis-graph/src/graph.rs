use crate::aggregation::{AggregatedEdge, AggregationKey};
use crate::layout::LayoutPhase;
use crate::search::SearchState;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use trellis_core::{
    Container, Edge, EdgeId, EntityId, EntityKind, LayoutConfig, Node, NotFoundError, Size,
    StructuralError, StyleConfig, Vec2,
};

/// Result of a coordinator-facing mutation.
///
/// Unknown ids are not errors on this surface: they resolve to
/// [`MutationOutcome::UnknownTarget`] and leave the model untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOutcome {
    Applied,
    Unchanged,
    UnknownTarget,
}

impl MutationOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }

    pub(crate) fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Applied, _) | (_, Self::Applied) => Self::Applied,
            (Self::Unchanged, _) | (_, Self::Unchanged) => Self::Unchanged,
            _ => Self::UnknownTarget,
        }
    }
}

/// Ids of entities whose hidden flag is false, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleSets {
    pub nodes: Vec<EntityId>,
    pub edges: Vec<EdgeId>,
    pub containers: Vec<EntityId>,
}

impl VisibleSets {
    fn compute(model: &GraphModel) -> Self {
        Self {
            nodes: model
                .nodes
                .values()
                .filter(|n| !n.hidden)
                .map(|n| n.id.clone())
                .collect(),
            edges: model
                .edges
                .values()
                .filter(|e| !e.hidden)
                .map(|e| e.id.clone())
                .collect(),
            containers: model
                .containers
                .values()
                .filter(|c| !c.hidden)
                .map(|c| c.id.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub container_count: usize,
    pub visible_node_count: usize,
    pub visible_edge_count: usize,
    pub visible_container_count: usize,
    pub aggregated_edge_count: usize,
    pub collapsed_container_count: usize,
}

/// One visible node or container as handed to the layout and render bridges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntity {
    pub id: EntityId,
    pub entity_kind: EntityKind,
    pub label: String,
    pub kind: String,
    pub parent: Option<EntityId>,
    pub collapsed: bool,
    /// Visible direct children.
    pub children: Vec<EntityId>,
    /// All direct children, visible or not.
    pub child_count: usize,
    pub position: Option<Vec2>,
    pub size: Option<Size>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub id: EdgeId,
    pub source: EntityId,
    pub target: EntityId,
    pub kind: String,
}

/// Highlight for one search result in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHighlight {
    pub id: EntityId,
    pub rank: usize,
    pub range: Option<std::ops::Range<usize>>,
}

/// Visible portion of the model, detached from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleSubgraph {
    pub revision: u64,
    /// Containers then nodes, each in insertion order.
    pub entities: Vec<SnapshotEntity>,
    pub edges: Vec<SnapshotEdge>,
    pub aggregated_edges: Vec<AggregatedEdge>,
    pub highlights: Vec<SnapshotHighlight>,
}

impl VisibleSubgraph {
    pub fn entity(&self, id: &EntityId) -> Option<&SnapshotEntity> {
        self.entities.iter().find(|e| &e.id == id)
    }
}

/// Owner of every node, edge and container, plus the derived state built on
/// top of them (hierarchy index, visibility, aggregated edges, search).
#[derive(Debug, Clone)]
pub struct GraphModel {
    pub(crate) nodes: IndexMap<EntityId, Node>,
    pub(crate) containers: IndexMap<EntityId, Container>,
    pub(crate) edges: IndexMap<EdgeId, Edge>,
    /// Global insertion order of nodes and containers.
    pub(crate) entities: IndexMap<EntityId, EntityKind>,
    /// child -> parent container
    pub(crate) parents: HashMap<EntityId, EntityId>,
    /// Containers that were expanded when an ancestor collapse forced them shut.
    pub(crate) remembered_expanded: HashSet<EntityId>,
    pub(crate) visible: OnceLock<VisibleSets>,
    pub(crate) aggregated: IndexMap<AggregationKey, AggregatedEdge>,
    pub(crate) search: SearchState,
    pub(crate) layout_phase: LayoutPhase,
    pub(crate) layout_config: LayoutConfig,
    pub(crate) style_config: StyleConfig,
    pub(crate) revision: u64,
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModel {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            containers: IndexMap::new(),
            edges: IndexMap::new(),
            entities: IndexMap::new(),
            parents: HashMap::new(),
            remembered_expanded: HashSet::new(),
            visible: OnceLock::new(),
            aggregated: IndexMap::new(),
            search: SearchState::default(),
            layout_phase: LayoutPhase::Idle,
            layout_config: LayoutConfig::default(),
            style_config: StyleConfig::default(),
            revision: 0,
        }
    }

    // ------------------------------------------------------------------
    // Insertion
    // ------------------------------------------------------------------

    pub fn add_node(&mut self, mut node: Node) -> Result<(), StructuralError> {
        if self.entities.contains_key(&node.id) {
            return Err(StructuralError::DuplicateEntity(node.id));
        }
        node.hidden = false;
        self.entities.insert(node.id.clone(), EntityKind::Node);
        self.nodes.insert(node.id.clone(), node);
        self.touch();
        Ok(())
    }

    /// Insert a container. Its `children` list is ignored; use
    /// [`GraphModel::assign_to_container`] to populate it.
    pub fn add_container(&mut self, mut container: Container) -> Result<(), StructuralError> {
        if self.entities.contains_key(&container.id) {
            return Err(StructuralError::DuplicateEntity(container.id));
        }
        if !container.children.is_empty() {
            tracing::debug!(
                "Ignoring {} inline children of container {}; assign them explicitly",
                container.children.len(),
                container.id
            );
        }
        container.children.clear();
        container.hidden = false;
        self.entities
            .insert(container.id.clone(), EntityKind::Container);
        self.containers.insert(container.id.clone(), container);
        self.touch();
        Ok(())
    }

    pub fn add_edge(&mut self, mut edge: Edge) -> Result<(), StructuralError> {
        if self.edges.contains_key(&edge.id) {
            return Err(StructuralError::DuplicateEdge(edge.id));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !self.entities.contains_key(endpoint) {
                return Err(StructuralError::MissingEndpoint {
                    edge: edge.id.clone(),
                    endpoint: endpoint.clone(),
                });
            }
        }
        edge.hidden = self.is_hidden_unchecked(&edge.source) || self.is_hidden_unchecked(&edge.target);
        let crosses_boundary = edge.hidden;
        self.edges.insert(edge.id.clone(), edge);
        if crosses_boundary {
            self.refresh_aggregation();
        }
        self.touch();
        Ok(())
    }

    /// Make `child` a direct child of `container`, detaching it from any
    /// previous parent. Rejects assignments that would create a cycle.
    pub fn assign_to_container(
        &mut self,
        child: &EntityId,
        container: &EntityId,
    ) -> Result<(), StructuralError> {
        if !self.entities.contains_key(child) {
            return Err(StructuralError::UnknownEntity(child.clone()));
        }
        match self.entities.get(container) {
            None => return Err(StructuralError::UnknownEntity(container.clone())),
            Some(EntityKind::Node) => {
                return Err(StructuralError::NotAContainer(container.clone()));
            }
            Some(EntityKind::Container) => {}
        }
        if child == container {
            return Err(StructuralError::SelfContainment(child.clone()));
        }
        if self.is_ancestor_or_self(child, container) {
            return Err(StructuralError::Cycle {
                child: child.clone(),
                container: container.clone(),
            });
        }
        if self.parents.get(child) == Some(container) {
            return Ok(());
        }

        if let Some(old_parent) = self.parents.remove(child)
            && let Some(old) = self.containers.get_mut(&old_parent)
        {
            old.children.retain(|c| c != child);
        }
        self.parents.insert(child.clone(), container.clone());
        if let Some(parent) = self.containers.get_mut(container) {
            parent.children.push(child.clone());
        }

        let parent_conceals = self
            .containers
            .get(container)
            .map(|c| c.collapsed || c.hidden)
            .unwrap_or(false);
        if parent_conceals {
            self.conceal(child);
        } else if self.is_hidden_unchecked(child) {
            self.reveal_entity(child);
        }

        self.refresh_derived();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public query API: unknown ids are reported as NotFoundError
    // ------------------------------------------------------------------

    pub fn node(&self, id: &EntityId) -> Result<&Node, NotFoundError> {
        self.nodes
            .get(id)
            .ok_or_else(|| NotFoundError::Entity(id.clone()))
    }

    pub fn container(&self, id: &EntityId) -> Result<&Container, NotFoundError> {
        self.containers
            .get(id)
            .ok_or_else(|| NotFoundError::Entity(id.clone()))
    }

    pub fn edge(&self, id: &EdgeId) -> Result<&Edge, NotFoundError> {
        self.edges
            .get(id)
            .ok_or_else(|| NotFoundError::Edge(id.clone()))
    }

    pub fn entity_kind(&self, id: &EntityId) -> Result<EntityKind, NotFoundError> {
        self.entities
            .get(id)
            .copied()
            .ok_or_else(|| NotFoundError::Entity(id.clone()))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn parent_of(&self, id: &EntityId) -> Result<Option<&EntityId>, NotFoundError> {
        self.entity_kind(id)?;
        Ok(self.parents.get(id))
    }

    /// Direct children of a container. Nodes have none.
    pub fn children_of(&self, id: &EntityId) -> Result<&[EntityId], NotFoundError> {
        match self.entity_kind(id)? {
            EntityKind::Container => Ok(self
                .containers
                .get(id)
                .map(|c| c.children.as_slice())
                .unwrap_or_default()),
            EntityKind::Node => Ok(&[]),
        }
    }

    /// Ancestors ordered nearest first.
    pub fn ancestors_of(&self, id: &EntityId) -> Result<Vec<EntityId>, NotFoundError> {
        self.entity_kind(id)?;
        Ok(self.ancestors_unchecked(id))
    }

    pub fn is_collapsed(&self, id: &EntityId) -> Result<bool, NotFoundError> {
        match self.entity_kind(id)? {
            EntityKind::Container => Ok(self
                .containers
                .get(id)
                .map(|c| c.collapsed)
                .unwrap_or(false)),
            EntityKind::Node => Ok(false),
        }
    }

    pub fn is_hidden(&self, id: &EntityId) -> Result<bool, NotFoundError> {
        self.entity_kind(id)?;
        Ok(self.is_hidden_unchecked(id))
    }

    /// The entity itself when visible, otherwise its closest visible ancestor.
    pub fn nearest_visible(&self, id: &EntityId) -> Result<Option<EntityId>, NotFoundError> {
        self.entity_kind(id)?;
        Ok(self.nearest_visible_unchecked(id))
    }

    pub fn top_level_containers(&self) -> Vec<&EntityId> {
        self.containers
            .keys()
            .filter(|id| !self.parents.contains_key(*id))
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn visible_sets(&self) -> &VisibleSets {
        self.visible.get_or_init(|| VisibleSets::compute(self))
    }

    pub fn visible_nodes(&self) -> &[EntityId] {
        &self.visible_sets().nodes
    }

    pub fn visible_edges(&self) -> &[EdgeId] {
        &self.visible_sets().edges
    }

    pub fn visible_containers(&self) -> &[EntityId] {
        &self.visible_sets().containers
    }

    pub fn aggregated_edges(&self) -> Vec<&AggregatedEdge> {
        self.aggregated.values().collect()
    }

    pub fn aggregated_edge(&self, source: &EntityId, target: &EntityId) -> Option<&AggregatedEdge> {
        self.aggregated.get(&(source.clone(), target.clone()))
    }

    pub fn layout_phase(&self) -> LayoutPhase {
        self.layout_phase
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.layout_config
    }

    pub fn style_config(&self) -> &StyleConfig {
        &self.style_config
    }

    /// Incremented on every applied mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn stats(&self) -> GraphStats {
        let visible = self.visible_sets();
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            container_count: self.containers.len(),
            visible_node_count: visible.nodes.len(),
            visible_edge_count: visible.edges.len(),
            visible_container_count: visible.containers.len(),
            aggregated_edge_count: self.aggregated.len(),
            collapsed_container_count: self.containers.values().filter(|c| c.collapsed).count(),
        }
    }

    /// Detach the visible portion of the model for the layout and render
    /// bridges.
    pub fn snapshot(&self) -> VisibleSubgraph {
        let mut entities = Vec::new();

        for container in self.containers.values().filter(|c| !c.hidden) {
            let children = if container.collapsed {
                Vec::new()
            } else {
                container
                    .children
                    .iter()
                    .filter(|c| !self.is_hidden_unchecked(c))
                    .cloned()
                    .collect()
            };
            entities.push(SnapshotEntity {
                id: container.id.clone(),
                entity_kind: EntityKind::Container,
                label: container.label.clone(),
                kind: String::from("container"),
                parent: self.parents.get(&container.id).cloned(),
                collapsed: container.collapsed,
                children,
                child_count: container.children.len(),
                position: container.position,
                size: container.size,
            });
        }

        for node in self.nodes.values().filter(|n| !n.hidden) {
            entities.push(SnapshotEntity {
                id: node.id.clone(),
                entity_kind: EntityKind::Node,
                label: node.label.clone(),
                kind: node.kind.clone(),
                parent: self.parents.get(&node.id).cloned(),
                collapsed: false,
                children: Vec::new(),
                child_count: 0,
                position: node.position,
                size: node.size,
            });
        }

        let edges = self
            .edges
            .values()
            .filter(|e| !e.hidden)
            .map(|e| SnapshotEdge {
                id: e.id.clone(),
                source: e.source.clone(),
                target: e.target.clone(),
                kind: e.kind.clone(),
            })
            .collect();

        let highlights = self
            .search
            .results
            .iter()
            .enumerate()
            .filter(|(_, r)| !self.is_hidden_unchecked(&r.id))
            .map(|(rank, r)| SnapshotHighlight {
                id: r.id.clone(),
                rank,
                range: r.label_range(),
            })
            .collect();

        VisibleSubgraph {
            revision: self.revision,
            entities,
            edges,
            aggregated_edges: self.aggregated.values().cloned().collect(),
            highlights,
        }
    }

    // ------------------------------------------------------------------
    // Configuration updates (coordinator-facing)
    // ------------------------------------------------------------------

    pub fn set_layout_config(&mut self, config: LayoutConfig) -> MutationOutcome {
        if self.layout_config == config {
            return MutationOutcome::Unchanged;
        }
        self.layout_config = config;
        self.touch();
        MutationOutcome::Applied
    }

    pub fn set_style_config(&mut self, config: StyleConfig) -> MutationOutcome {
        if self.style_config == config {
            return MutationOutcome::Unchanged;
        }
        self.style_config = config;
        self.touch();
        MutationOutcome::Applied
    }

    // ------------------------------------------------------------------
    // Internal helpers shared by the submodules
    // ------------------------------------------------------------------

    pub(crate) fn is_hidden_unchecked(&self, id: &EntityId) -> bool {
        match self.entities.get(id) {
            Some(EntityKind::Node) => self.nodes.get(id).is_some_and(|n| n.hidden),
            Some(EntityKind::Container) => self.containers.get(id).is_some_and(|c| c.hidden),
            None => false,
        }
    }

    pub(crate) fn set_hidden(&mut self, id: &EntityId, hidden: bool) {
        match self.entities.get(id) {
            Some(EntityKind::Node) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.hidden = hidden;
                }
            }
            Some(EntityKind::Container) => {
                if let Some(container) = self.containers.get_mut(id) {
                    container.hidden = hidden;
                }
            }
            None => {}
        }
    }

    pub(crate) fn nearest_visible_unchecked(&self, id: &EntityId) -> Option<EntityId> {
        if !self.is_hidden_unchecked(id) {
            return Some(id.clone());
        }
        self.ancestors_unchecked(id)
            .into_iter()
            .find(|ancestor| !self.is_hidden_unchecked(ancestor))
    }

    pub(crate) fn insertion_rank(&self, id: &EntityId) -> usize {
        self.entities.get_index_of(id).unwrap_or(usize::MAX)
    }

    /// Record a mutation: drop the visible-set cache and bump the revision.
    pub(crate) fn touch(&mut self) {
        self.visible.take();
        self.revision += 1;
    }

    /// Recompute state derived from collapse flags after a mutation pass.
    pub(crate) fn refresh_derived(&mut self) {
        let hidden: HashSet<EntityId> = self
            .entities
            .keys()
            .filter(|id| self.is_hidden_unchecked(id))
            .cloned()
            .collect();
        for edge in self.edges.values_mut() {
            edge.hidden = hidden.contains(&edge.source) || hidden.contains(&edge.target);
        }
        self.refresh_aggregation();
        self.touch();
    }
}
