//! Bridge between the model and an external layout engine.
//!
//! The engine sees a detached [`LayoutRequest`] built from the visible
//! subgraph and answers with one [`LayoutEntry`] per entity it placed. The
//! answer is validated as a whole before anything is written back.

use crate::graph::{GraphModel, VisibleSubgraph};
use crate::layered::LayeredLayoutEngine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trellis_core::{
    EdgeId, EntityId, EntityKind, LayoutConfig, Size, ValidationError, ValidationReason, Vec2,
};

pub use trellis_core::LayoutPhase;

/// One visible node or container handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutItem {
    pub id: EntityId,
    pub entity_kind: EntityKind,
    pub parent: Option<EntityId>,
    /// Visible direct children; empty for collapsed containers.
    pub children: Vec<EntityId>,
    pub collapsed: bool,
    /// Intrinsic size. Containers always start from the default and are
    /// grown by the engine around their visible children.
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutLink {
    pub id: EdgeId,
    pub source: EntityId,
    pub target: EntityId,
    pub aggregated: bool,
    pub multiplicity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRequest {
    pub revision: u64,
    /// Containers then nodes, in model insertion order.
    pub items: Vec<LayoutItem>,
    pub links: Vec<LayoutLink>,
    pub config: LayoutConfig,
}

impl LayoutRequest {
    pub const DEFAULT_NODE_SIZE: Size = Size {
        width: 100.0,
        height: 30.0,
    };

    pub fn from_snapshot(snapshot: &VisibleSubgraph, config: &LayoutConfig) -> Self {
        let items = snapshot
            .entities
            .iter()
            .map(|entity| LayoutItem {
                id: entity.id.clone(),
                entity_kind: entity.entity_kind,
                parent: entity.parent.clone(),
                children: entity.children.clone(),
                collapsed: entity.collapsed,
                size: match entity.entity_kind {
                    EntityKind::Node => entity.size.unwrap_or(Self::DEFAULT_NODE_SIZE),
                    // The stored size is the last layout's output, not a minimum.
                    EntityKind::Container => Self::DEFAULT_NODE_SIZE,
                },
            })
            .collect();

        let links = snapshot
            .edges
            .iter()
            .map(|edge| LayoutLink {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                aggregated: false,
                multiplicity: 1,
            })
            .chain(snapshot.aggregated_edges.iter().map(|edge| LayoutLink {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                aggregated: true,
                multiplicity: edge.multiplicity,
            }))
            .collect();

        Self {
            revision: snapshot.revision,
            items,
            links,
            config: config.clone(),
        }
    }

    pub fn item(&self, id: &EntityId) -> Option<&LayoutItem> {
        self.items.iter().find(|item| &item.id == id)
    }
}

/// Position and size reported by a layout engine. Every field is optional on
/// the wire; a missing one fails validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub id: EntityId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl LayoutEntry {
    pub fn new(id: impl Into<EntityId>, position: Vec2, size: Size) -> Self {
        Self {
            id: id.into(),
            x: Some(position.x),
            y: Some(position.y),
            width: Some(size.width),
            height: Some(size.height),
        }
    }

    fn validate(&self) -> Result<(Vec2, Size), ValidationError> {
        let coord = |field: &'static str, value: Option<f32>| match value {
            None => Err(ValidationError::new(self.id.as_str(), field, ValidationReason::Missing)),
            Some(v) if !v.is_finite() => {
                Err(ValidationError::new(self.id.as_str(), field, ValidationReason::NonFinite))
            }
            Some(v) => Ok(v),
        };
        let extent = |field: &'static str, value: Option<f32>| -> Result<f32, ValidationError> {
            let v = coord(field, value)?;
            if v <= 0.0 {
                return Err(ValidationError::new(
                    self.id.as_str(),
                    field,
                    ValidationReason::NonPositive,
                ));
            }
            Ok(v)
        };

        Ok((
            Vec2::new(coord("x", self.x)?, coord("y", self.y)?),
            Size::new(extent("width", self.width)?, extent("height", self.height)?),
        ))
    }
}

#[async_trait]
pub trait LayoutEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn compute(&self, request: LayoutRequest) -> anyhow::Result<Vec<LayoutEntry>>;
}

/// Builds layout requests and writes validated results back into the model.
///
/// The model is passed per call; the coordinator owns it.
#[derive(Clone)]
pub struct LayoutBridge {
    engine: Arc<dyn LayoutEngine>,
}

impl Default for LayoutBridge {
    fn default() -> Self {
        Self::new(Arc::new(LayeredLayoutEngine::default()))
    }
}

impl LayoutBridge {
    pub fn new(engine: Arc<dyn LayoutEngine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn build_request(&self, model: &GraphModel) -> LayoutRequest {
        LayoutRequest::from_snapshot(&model.snapshot(), model.layout_config())
    }

    pub async fn compute(&self, request: LayoutRequest) -> anyhow::Result<Vec<LayoutEntry>> {
        let revision = request.revision;
        let entries = self.engine.compute(request).await?;
        tracing::debug!(
            "Layout engine '{}' placed {} entities for revision {}",
            self.engine.name(),
            entries.len(),
            revision
        );
        Ok(entries)
    }

    pub fn apply(
        &self,
        model: &mut GraphModel,
        entries: &[LayoutEntry],
    ) -> Result<usize, ValidationError> {
        model.apply_layout(entries)
    }
}

impl GraphModel {
    pub fn begin_layout(&mut self) {
        self.layout_phase = LayoutPhase::Computing;
    }

    pub fn fail_layout(&mut self) {
        self.layout_phase = LayoutPhase::Error;
    }

    /// Write engine results into the model.
    ///
    /// Entries for unknown or hidden entities are ignored. If any remaining
    /// entry is malformed nothing is written, the phase becomes
    /// [`LayoutPhase::Error`] and the first failure is returned.
    pub fn apply_layout(&mut self, entries: &[LayoutEntry]) -> Result<usize, ValidationError> {
        let mut accepted = Vec::with_capacity(entries.len());
        for entry in entries {
            if !self.contains(&entry.id) || self.is_hidden_unchecked(&entry.id) {
                tracing::debug!("Ignoring layout entry for {}", entry.id);
                continue;
            }
            match entry.validate() {
                Ok((position, size)) => accepted.push((&entry.id, position, size)),
                Err(err) => {
                    tracing::warn!("Rejecting layout result: {}", err);
                    self.layout_phase = LayoutPhase::Error;
                    return Err(err);
                }
            }
        }

        for (id, position, size) in &accepted {
            if let Some(node) = self.nodes.get_mut(*id) {
                node.position = Some(*position);
                node.size = Some(*size);
            } else if let Some(container) = self.containers.get_mut(*id) {
                container.position = Some(*position);
                container.size = Some(*size);
            }
        }

        self.layout_phase = LayoutPhase::Ready;
        self.touch();
        Ok(accepted.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Container, Node};

    fn model() -> GraphModel {
        let mut model = GraphModel::new();
        model.add_container(Container::new("c", "C")).unwrap();
        model.add_node(Node::new("a", "A")).unwrap();
        model.add_node(Node::new("b", "B")).unwrap();
        model
            .assign_to_container(&EntityId::from("b"), &EntityId::from("c"))
            .unwrap();
        model
    }

    #[test]
    fn valid_entries_are_written() {
        let mut model = model();
        let applied = model
            .apply_layout(&[LayoutEntry::new("a", Vec2::new(1.0, 2.0), Size::new(10.0, 20.0))])
            .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(model.layout_phase(), LayoutPhase::Ready);
        let node = model.node(&EntityId::from("a")).unwrap();
        assert_eq!(node.position, Some(Vec2::new(1.0, 2.0)));
    }

    #[test]
    fn invalid_batch_is_rejected_atomically() {
        let mut model = model();
        let mut bad = LayoutEntry::new("b", Vec2::new(0.0, 0.0), Size::new(10.0, 10.0));
        bad.width = Some(f32::NAN);
        let err = model
            .apply_layout(&[
                LayoutEntry::new("a", Vec2::new(5.0, 5.0), Size::new(10.0, 10.0)),
                bad,
            ])
            .unwrap_err();

        assert_eq!(err.field, "width");
        assert_eq!(err.reason, ValidationReason::NonFinite);
        assert_eq!(model.layout_phase(), LayoutPhase::Error);
        assert_eq!(model.node(&EntityId::from("a")).unwrap().position, None);
    }

    #[test]
    fn missing_and_non_positive_values_fail() {
        let mut model = model();
        let mut missing = LayoutEntry::new("a", Vec2::new(0.0, 0.0), Size::new(1.0, 1.0));
        missing.y = None;
        let err = model.apply_layout(&[missing]).unwrap_err();
        assert_eq!(err.reason, ValidationReason::Missing);

        let err = model
            .apply_layout(&[LayoutEntry::new("a", Vec2::new(0.0, 0.0), Size::new(0.0, 1.0))])
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::NonPositive);
    }

    #[test]
    fn unknown_and_hidden_entries_are_ignored() {
        let mut model = model();
        model.collapse_container(&EntityId::from("c"));
        let mut garbage = LayoutEntry::new("b", Vec2::new(0.0, 0.0), Size::new(1.0, 1.0));
        garbage.x = None;
        let applied = model
            .apply_layout(&[
                LayoutEntry::new("ghost", Vec2::new(0.0, 0.0), Size::new(1.0, 1.0)),
                garbage,
            ])
            .unwrap();
        assert_eq!(applied, 0);
        assert_eq!(model.layout_phase(), LayoutPhase::Ready);
    }

    #[test]
    fn entries_deserialize_with_missing_fields() {
        let entry: LayoutEntry = serde_json::from_str(r#"{"id":"a","x":1.0,"y":2.0}"#).unwrap();
        assert_eq!(entry.width, None);
    }

    #[test]
    fn request_includes_aggregated_links() {
        let mut model = model();
        model
            .add_edge(trellis_core::Edge::new("e", "a", "b"))
            .unwrap();
        model.collapse_container(&EntityId::from("c"));

        let request = LayoutBridge::default().build_request(&model);
        assert_eq!(request.items.len(), 2);
        assert_eq!(request.links.len(), 1);
        assert!(request.links[0].aggregated);
        assert_eq!(request.links[0].target, EntityId::from("c"));
        assert_eq!(request.item(&EntityId::from("a")).unwrap().size, LayoutRequest::DEFAULT_NODE_SIZE);
    }
}
