use crate::layout::{LayoutEngine, LayoutEntry, LayoutItem, LayoutRequest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use trellis_core::{
    CustomOption, EntityId, LayoutAlgorithm, LayoutConfig, LayoutDirection, Size, Vec2,
};

/// Default engine for nested graphs.
///
/// Top-level entities are ranked along the flow direction by the links
/// between their subtrees, each layer is ordered by barycenter, and expanded
/// containers are sized from a grid of their visible children.
#[derive(Debug, Clone)]
pub struct LayeredLayoutEngine {
    /// Padding between a container border and its children
    pub inner_padding: f32,
    /// Space reserved for a container's title
    pub header_height: f32,
    /// Spacing between siblings inside a container
    pub child_spacing: f32,
}

#[derive(Default)]
struct RootRelations {
    root_edges: Vec<(usize, usize)>,
    incoming: HashMap<usize, Vec<usize>>,
    outgoing: HashMap<usize, Vec<usize>>,
}

/// Index of request items by id plus per-item root.
struct ItemIndex<'a> {
    items: &'a [LayoutItem],
    by_id: HashMap<&'a EntityId, usize>,
}

impl<'a> ItemIndex<'a> {
    fn new(items: &'a [LayoutItem]) -> Self {
        let by_id = items.iter().enumerate().map(|(i, item)| (&item.id, i)).collect();
        Self { items, by_id }
    }

    fn get(&self, id: &EntityId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    fn roots(&self) -> Vec<usize> {
        (0..self.items.len())
            .filter(|&i| {
                self.items[i]
                    .parent
                    .as_ref()
                    .is_none_or(|parent| self.get(parent).is_none())
            })
            .collect()
    }

    fn resolve_root(&self, idx: usize, cache: &mut HashMap<usize, usize>) -> usize {
        if let Some(&cached) = cache.get(&idx) {
            return cached;
        }

        let mut trail = Vec::new();
        let mut seen = HashSet::new();
        let mut current = idx;
        let root = loop {
            if let Some(&cached) = cache.get(&current) {
                break cached;
            }
            if !seen.insert(current) {
                break current;
            }
            trail.push(current);
            match self.items[current]
                .parent
                .as_ref()
                .and_then(|parent| self.get(parent))
            {
                Some(parent) => current = parent,
                None => break current,
            }
        };

        for i in trail {
            cache.insert(i, root);
        }
        root
    }
}

impl Default for LayeredLayoutEngine {
    fn default() -> Self {
        Self {
            inner_padding: Self::DEFAULT_INNER_PADDING,
            header_height: Self::DEFAULT_HEADER_HEIGHT,
            child_spacing: Self::DEFAULT_CHILD_SPACING,
        }
    }
}

impl LayeredLayoutEngine {
    pub const DEFAULT_INNER_PADDING: f32 = 10.0;
    pub const DEFAULT_HEADER_HEIGHT: f32 = 30.0;
    pub const DEFAULT_CHILD_SPACING: f32 = 5.0;

    const MAX_NESTING_DEPTH: u32 = 100;
    const MAX_RANKING_ITERATIONS: usize = 1000;

    /// Whether `compute` accepts requests for this algorithm. Tree layouts
    /// are layered layouts of a forest.
    pub fn supports(algorithm: LayoutAlgorithm) -> bool {
        matches!(algorithm, LayoutAlgorithm::Layered | LayoutAlgorithm::Tree)
    }

    /// This engine with `layered.*` custom options applied on top.
    pub fn tuned(&self, config: &LayoutConfig) -> Self {
        let mut engine = self.clone();
        for (key, value) in &config.custom {
            let target = match key.as_str() {
                "layered.inner_padding" => &mut engine.inner_padding,
                "layered.header_height" => &mut engine.header_height,
                "layered.child_spacing" => &mut engine.child_spacing,
                _ => {
                    tracing::debug!("Layered engine ignores custom option {}", key);
                    continue;
                }
            };
            match value {
                CustomOption::Number(n) if n.is_finite() && *n >= 0.0 => *target = *n as f32,
                other => {
                    tracing::warn!("Ignoring {} = {:?}: expected a non-negative number", key, other)
                }
            }
        }
        engine
    }

    /// Synchronous entry point used by the async trait impl and benchmarks.
    pub fn layout(&self, request: &LayoutRequest) -> Vec<LayoutEntry> {
        self.tuned(&request.config).layout_untuned(request)
    }

    fn layout_untuned(&self, request: &LayoutRequest) -> Vec<LayoutEntry> {
        if request.items.is_empty() {
            return Vec::new();
        }

        let index = ItemIndex::new(&request.items);
        let roots = index.roots();
        let relations = Self::build_root_relations(&index, request);
        let ranks = Self::assign_root_ranks(&roots, &relations);

        let mut layers = Self::build_layers(&ranks);
        let sorted_ranks = Self::sorted_ranks(&layers);
        let spacing = request.config.node_spacing;
        let mut layer_coords = Self::initialize_layer_coords(&layers, &sorted_ranks, spacing);
        Self::run_barycenter_passes(
            &mut layers,
            &sorted_ranks,
            &mut layer_coords,
            &relations,
            spacing,
        );

        let mut sizes = HashMap::with_capacity(request.items.len());
        for &root in &roots {
            self.compute_subtree_size(&index, &mut sizes, root, 0);
        }

        let channels = Self::links_between_layers(&ranks, &relations);
        let mut positions = HashMap::with_capacity(request.items.len());
        self.place_roots_in_layers(
            &index,
            request,
            &layers,
            &sorted_ranks,
            &channels,
            &sizes,
            &mut positions,
        );

        request
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let position = positions.get(&i)?;
                let size = sizes.get(&i).copied().unwrap_or(item.size);
                Some(LayoutEntry::new(item.id.clone(), *position, size))
            })
            .collect()
    }

    fn build_root_relations(index: &ItemIndex<'_>, request: &LayoutRequest) -> RootRelations {
        let mut cache = HashMap::with_capacity(request.items.len());
        let mut relations = RootRelations::default();

        for link in &request.links {
            let (Some(source), Some(target)) = (index.get(&link.source), index.get(&link.target))
            else {
                continue;
            };
            let source_root = index.resolve_root(source, &mut cache);
            let target_root = index.resolve_root(target, &mut cache);
            if source_root == target_root {
                continue;
            }

            relations.root_edges.push((source_root, target_root));
            relations
                .incoming
                .entry(target_root)
                .or_default()
                .push(source_root);
            relations
                .outgoing
                .entry(source_root)
                .or_default()
                .push(target_root);
        }

        relations
    }

    fn assign_root_ranks(roots: &[usize], relations: &RootRelations) -> HashMap<usize, i32> {
        let mut ranks: HashMap<usize, i32> = roots.iter().map(|&r| (r, 0)).collect();

        let max_iterations = (roots.len() + 2).min(Self::MAX_RANKING_ITERATIONS);
        let mut converged = false;
        for _ in 0..max_iterations {
            let mut changed = false;
            for &(source_root, target_root) in &relations.root_edges {
                if let (Some(&source_rank), Some(&target_rank)) =
                    (ranks.get(&source_root), ranks.get(&target_root))
                    && target_rank <= source_rank
                {
                    ranks.insert(target_root, source_rank + 1);
                    changed = true;
                }
            }
            if !changed {
                converged = true;
                break;
            }
        }

        if !converged {
            // Cyclic links between roots; ranks stay bounded by the cap.
            tracing::debug!(
                "Root ranking did not converge after {} iterations",
                max_iterations
            );
        }

        Self::compress_ranks(&mut ranks);
        ranks
    }

    fn compress_ranks(ranks: &mut HashMap<usize, i32>) {
        let mut unique: Vec<i32> = ranks.values().copied().collect();
        unique.sort_unstable();
        unique.dedup();
        let remap: HashMap<i32, i32> = unique
            .iter()
            .enumerate()
            .map(|(i, rank)| (*rank, i as i32))
            .collect();
        for rank in ranks.values_mut() {
            if let Some(new_rank) = remap.get(rank) {
                *rank = *new_rank;
            }
        }
    }

    fn build_layers(ranks: &HashMap<usize, i32>) -> HashMap<i32, Vec<usize>> {
        let mut layers: HashMap<i32, Vec<usize>> = HashMap::new();
        for (&item, &rank) in ranks {
            layers.entry(rank).or_default().push(item);
        }
        // Request order is model insertion order.
        for items in layers.values_mut() {
            items.sort_unstable();
        }
        layers
    }

    fn sorted_ranks(layers: &HashMap<i32, Vec<usize>>) -> Vec<i32> {
        let mut sorted: Vec<_> = layers.keys().copied().collect();
        sorted.sort_unstable();
        sorted
    }

    fn initialize_layer_coords(
        layers: &HashMap<i32, Vec<usize>>,
        sorted_ranks: &[i32],
        spacing: f32,
    ) -> HashMap<usize, f32> {
        let mut coords = HashMap::new();
        for rank in sorted_ranks {
            if let Some(layer) = layers.get(rank) {
                for (j, &item) in layer.iter().enumerate() {
                    coords.insert(item, j as f32 * spacing);
                }
            }
        }
        coords
    }

    fn order_layer_by_barycenter(
        layer: &mut [usize],
        coords: &HashMap<usize, f32>,
        neighbors: &HashMap<usize, Vec<usize>>,
    ) {
        let barycenters: HashMap<usize, f32> = layer
            .iter()
            .map(|&item| {
                let placed: Vec<f32> = neighbors
                    .get(&item)
                    .into_iter()
                    .flatten()
                    .filter_map(|n| coords.get(n).copied())
                    .collect();
                let center = if placed.is_empty() {
                    coords.get(&item).copied().unwrap_or(0.0)
                } else {
                    placed.iter().sum::<f32>() / placed.len() as f32
                };
                (item, center)
            })
            .collect();

        layer.sort_by(|a, b| {
            let (ca, cb) = (barycenters[a], barycenters[b]);
            ca.total_cmp(&cb).then(a.cmp(b))
        });
    }

    fn run_barycenter_passes(
        layers: &mut HashMap<i32, Vec<usize>>,
        sorted_ranks: &[i32],
        coords: &mut HashMap<usize, f32>,
        relations: &RootRelations,
        spacing: f32,
    ) {
        let mut reorder = |rank: i32, neighbors: &HashMap<usize, Vec<usize>>| {
            if let Some(layer) = layers.get_mut(&rank) {
                Self::order_layer_by_barycenter(layer, coords, neighbors);
                for (j, &item) in layer.iter().enumerate() {
                    coords.insert(item, j as f32 * spacing);
                }
            }
        };

        for _ in 0..2 {
            for &rank in sorted_ranks.iter().skip(1) {
                reorder(rank, &relations.incoming);
            }
            for &rank in sorted_ranks.iter().rev().skip(1) {
                reorder(rank, &relations.outgoing);
            }
        }
    }

    /// Links leaving each layer towards a later one, keyed by the earlier rank.
    fn links_between_layers(
        ranks: &HashMap<usize, i32>,
        relations: &RootRelations,
    ) -> HashMap<i32, usize> {
        let mut channels = HashMap::new();
        for (source, target) in &relations.root_edges {
            if let (Some(&a), Some(&b)) = (ranks.get(source), ranks.get(target))
                && a != b
            {
                *channels.entry(a.min(b)).or_insert(0) += 1;
            }
        }
        channels
    }

    fn grid_columns(child_count: usize) -> usize {
        ((child_count as f32).sqrt().ceil() as usize).max(1)
    }

    fn visible_children(index: &ItemIndex<'_>, idx: usize) -> Vec<usize> {
        let item = &index.items[idx];
        if item.collapsed {
            return Vec::new();
        }
        item.children.iter().filter_map(|c| index.get(c)).collect()
    }

    fn compute_subtree_size(
        &self,
        index: &ItemIndex<'_>,
        sizes: &mut HashMap<usize, Size>,
        idx: usize,
        depth: u32,
    ) -> Size {
        if let Some(&size) = sizes.get(&idx) {
            return size;
        }
        let item = &index.items[idx];
        if depth > Self::MAX_NESTING_DEPTH {
            tracing::warn!(
                "Maximum nesting depth ({}) exceeded at {}, using its own size",
                Self::MAX_NESTING_DEPTH,
                item.id
            );
            sizes.insert(idx, item.size);
            return item.size;
        }

        let children = Self::visible_children(index, idx);
        if children.is_empty() {
            sizes.insert(idx, item.size);
            return item.size;
        }

        let cols = Self::grid_columns(children.len());
        let mut current_x = self.inner_padding;
        let mut current_y = self.header_height + self.inner_padding;
        let mut row_max_height: f32 = 0.0;
        let mut content_width: f32 = 0.0;

        for (i, &child) in children.iter().enumerate() {
            if i > 0 && i % cols == 0 {
                current_x = self.inner_padding;
                current_y += row_max_height + self.child_spacing;
                row_max_height = 0.0;
            }
            let child_size = self.compute_subtree_size(index, sizes, child, depth + 1);
            current_x += child_size.width + self.child_spacing;
            row_max_height = row_max_height.max(child_size.height);
            content_width = content_width.max(current_x);
        }
        current_y += row_max_height;

        let size = Size::new(
            content_width.max(item.size.width) + self.inner_padding,
            (current_y + self.inner_padding).max(item.size.height),
        );
        sizes.insert(idx, size);
        size
    }

    fn place_subtree(
        &self,
        index: &ItemIndex<'_>,
        idx: usize,
        origin: Vec2,
        positions: &mut HashMap<usize, Vec2>,
        sizes: &HashMap<usize, Size>,
    ) {
        if positions.insert(idx, origin).is_some() {
            return;
        }

        let children = Self::visible_children(index, idx);
        if children.is_empty() {
            return;
        }

        let cols = Self::grid_columns(children.len());
        let start_y = origin.y + self.header_height + self.inner_padding;
        let mut current_x = origin.x + self.inner_padding;
        let mut current_y = start_y;
        let mut row_max_height: f32 = 0.0;

        for (i, &child) in children.iter().enumerate() {
            if i > 0 && i % cols == 0 {
                current_x = origin.x + self.inner_padding;
                current_y += row_max_height + self.child_spacing;
                row_max_height = 0.0;
            }
            self.place_subtree(index, child, Vec2::new(current_x, current_y), positions, sizes);
            let child_size = sizes
                .get(&child)
                .copied()
                .unwrap_or(index.items[child].size);
            current_x += child_size.width + self.child_spacing;
            row_max_height = row_max_height.max(child_size.height);
        }
    }

    fn place_roots_in_layers(
        &self,
        index: &ItemIndex<'_>,
        request: &LayoutRequest,
        layers: &HashMap<i32, Vec<usize>>,
        sorted_ranks: &[i32],
        channels: &HashMap<i32, usize>,
        sizes: &HashMap<usize, Size>,
        positions: &mut HashMap<usize, Vec2>,
    ) {
        let direction = request.config.direction;
        let node_spacing = request.config.node_spacing;
        let size_of = |idx: usize| sizes.get(&idx).copied().unwrap_or(index.items[idx].size);

        // Layer depth along the flow axis is the largest root in the layer.
        let mut rank_pos = 0.0;
        for rank in sorted_ranks {
            let Some(layer) = layers.get(rank) else {
                continue;
            };
            let (extent, depth) = layer.iter().fold((0.0_f32, 0.0_f32), |(extent, depth), &i| {
                let size = size_of(i);
                if direction.is_vertical() {
                    (extent + size.width, depth.max(size.height))
                } else {
                    (extent + size.height, depth.max(size.width))
                }
            });
            let extent = extent + layer.len().saturating_sub(1) as f32 * node_spacing;
            let flow = if direction.is_reversed() {
                -rank_pos - depth
            } else {
                rank_pos
            };

            let mut offset = -extent / 2.0;
            for &idx in layer {
                let size = size_of(idx);
                let origin = match direction {
                    LayoutDirection::Down | LayoutDirection::Up => Vec2::new(offset, flow),
                    LayoutDirection::Left | LayoutDirection::Right => Vec2::new(flow, offset),
                };
                self.place_subtree(index, idx, origin, positions, sizes);
                let along = if direction.is_vertical() {
                    size.width
                } else {
                    size.height
                };
                offset += along + node_spacing;
            }

            // Parallel links between two layers each need their own lane.
            let lanes = channels.get(rank).copied().unwrap_or(0).saturating_sub(1);
            rank_pos += depth
                + request.config.layer_spacing
                + lanes as f32 * request.config.edge_spacing;
        }
    }
}

#[async_trait]
impl LayoutEngine for LayeredLayoutEngine {
    fn name(&self) -> &str {
        "layered"
    }

    async fn compute(&self, request: LayoutRequest) -> anyhow::Result<Vec<LayoutEntry>> {
        let algorithm = request.config.algorithm;
        if !Self::supports(algorithm) {
            anyhow::bail!("The layered engine does not implement the {:?} algorithm", algorithm);
        }
        Ok(self.layout(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphModel;
    use crate::layout::LayoutBridge;
    use trellis_core::{Container, Edge, LayoutConfig, Node};

    fn eid(id: &str) -> EntityId {
        EntityId::from(id)
    }

    fn chain() -> GraphModel {
        let mut model = GraphModel::new();
        model.add_node(Node::new("a", "A")).unwrap();
        model.add_node(Node::new("b", "B")).unwrap();
        model.add_edge(Edge::new("e", "a", "b")).unwrap();
        model
    }

    fn entry_for<'a>(entries: &'a [LayoutEntry], id: &str) -> &'a LayoutEntry {
        entries.iter().find(|e| e.id.as_str() == id).unwrap()
    }

    #[test]
    fn ranks_follow_edges_along_the_flow_axis() {
        let model = chain();
        let request = LayoutBridge::default().build_request(&model);
        let entries = LayeredLayoutEngine::default().layout(&request);

        assert_eq!(entries.len(), 2);
        let (a, b) = (entry_for(&entries, "a"), entry_for(&entries, "b"));
        assert!(b.y.unwrap() > a.y.unwrap());
    }

    #[test]
    fn horizontal_direction_switches_axis() {
        let mut model = chain();
        model.set_layout_config(LayoutConfig {
            direction: LayoutDirection::Right,
            ..LayoutConfig::default()
        });
        let request = LayoutBridge::default().build_request(&model);
        let entries = LayeredLayoutEngine::default().layout(&request);
        let (a, b) = (entry_for(&entries, "a"), entry_for(&entries, "b"));
        assert!(b.x.unwrap() > a.x.unwrap());
    }

    #[test]
    fn containers_wrap_their_visible_children() {
        let mut model = chain();
        model.add_container(Container::new("c", "C")).unwrap();
        model.assign_to_container(&eid("a"), &eid("c")).unwrap();
        model.assign_to_container(&eid("b"), &eid("c")).unwrap();

        let request = LayoutBridge::default().build_request(&model);
        let entries = LayeredLayoutEngine::default().layout(&request);
        let c = entry_for(&entries, "c");
        let a = entry_for(&entries, "a");
        assert!(c.width.unwrap() > a.width.unwrap());
        assert!(a.y.unwrap() > c.y.unwrap());

        model.collapse_container(&eid("c"));
        let request = LayoutBridge::default().build_request(&model);
        let entries = LayeredLayoutEngine::default().layout(&request);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].width, Some(LayoutRequest::DEFAULT_NODE_SIZE.width));
    }

    #[test]
    fn collapsed_container_shrinks_after_a_laid_out_expansion() {
        let mut model = GraphModel::new();
        model.add_container(Container::new("c", "C")).unwrap();
        for i in 0..9 {
            let id = format!("n{i}");
            model.add_node(Node::new(id.as_str(), id.as_str())).unwrap();
            model.assign_to_container(&eid(&id), &eid("c")).unwrap();
        }
        let engine = LayeredLayoutEngine::default();
        let bridge = LayoutBridge::default();

        let entries = engine.layout(&bridge.build_request(&model));
        model.apply_layout(&entries).unwrap();
        let expanded = model.container(&eid("c")).unwrap().size.unwrap();

        model.collapse_container(&eid("c"));
        let entries = engine.layout(&bridge.build_request(&model));
        model.apply_layout(&entries).unwrap();
        let collapsed = model.container(&eid("c")).unwrap().size.unwrap();
        assert_eq!(collapsed, LayoutRequest::DEFAULT_NODE_SIZE);
        assert!(collapsed.width < expanded.width);

        model.expand_container(&eid("c"));
        let entries = engine.layout(&bridge.build_request(&model));
        model.apply_layout(&entries).unwrap();
        assert_eq!(model.container(&eid("c")).unwrap().size.unwrap(), expanded);
    }

    #[test]
    fn output_is_accepted_by_the_model() {
        let mut model = chain();
        let request = LayoutBridge::default().build_request(&model);
        let entries = LayeredLayoutEngine::default().layout(&request);
        assert_eq!(model.apply_layout(&entries).unwrap(), 2);
    }

    #[test]
    fn edge_spacing_widens_crowded_layer_gaps() {
        let mut model = chain();
        model.add_node(Node::new("c", "C")).unwrap();
        model.add_edge(Edge::new("e2", "a", "c")).unwrap();
        let gap = |model: &GraphModel, edge_spacing: f32| {
            let mut model = model.clone();
            model.set_layout_config(LayoutConfig {
                edge_spacing,
                ..LayoutConfig::default()
            });
            let request = LayoutBridge::default().build_request(&model);
            let entries = LayeredLayoutEngine::default().layout(&request);
            entry_for(&entries, "b").y.unwrap() - entry_for(&entries, "a").y.unwrap()
        };
        assert_eq!(gap(&model, 50.0) - gap(&model, 0.0), 50.0);
    }

    #[test]
    fn custom_options_tune_container_padding() {
        let mut model = chain();
        model.add_container(Container::new("c", "C")).unwrap();
        model.assign_to_container(&eid("a"), &eid("c")).unwrap();
        let mut config = LayoutConfig::default();
        config
            .custom
            .insert("layered.inner_padding".into(), CustomOption::Number(40.0));
        config.custom.insert("elk.seed".into(), CustomOption::Number(3.0));
        model.set_layout_config(config);

        let request = LayoutBridge::default().build_request(&model);
        let padded = LayeredLayoutEngine::default().layout(&request);
        let default = LayeredLayoutEngine::default().layout_untuned(&request);
        let width = |entries: &[LayoutEntry]| entry_for(entries, "c").width.unwrap();
        assert_eq!(width(&padded) - width(&default), 60.0);
    }

    #[tokio::test]
    async fn unsupported_algorithms_are_refused() {
        let mut model = chain();
        model.set_layout_config(LayoutConfig {
            algorithm: LayoutAlgorithm::Force,
            ..LayoutConfig::default()
        });
        let request = LayoutBridge::default().build_request(&model);
        let err = LayeredLayoutEngine::default().compute(request).await.unwrap_err();
        assert!(err.to_string().contains("Force"));

        model.set_layout_config(LayoutConfig {
            algorithm: LayoutAlgorithm::Tree,
            ..LayoutConfig::default()
        });
        let request = LayoutBridge::default().build_request(&model);
        assert_eq!(LayeredLayoutEngine::default().compute(request).await.unwrap().len(), 2);
    }

    #[test]
    fn cyclic_links_terminate() {
        let mut model = chain();
        model.add_edge(Edge::new("back", "b", "a")).unwrap();
        let request = LayoutBridge::default().build_request(&model);
        assert_eq!(LayeredLayoutEngine::default().layout(&request).len(), 2);
    }
}
