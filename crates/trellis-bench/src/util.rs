use trellis_core::{Container, Edge, EntityId, Node};
use trellis_graph::GraphModel;

/// Shape of a synthetic containment tree.
#[derive(Debug, Clone, Copy)]
pub struct GraphShape {
    /// Child containers per container.
    pub branching: usize,
    /// Container levels below the roots.
    pub depth: usize,
    pub roots: usize,
    pub leaves_per_container: usize,
    /// Edges between random leaves, on top of one chain edge per leaf.
    pub cross_edges: usize,
}

impl Default for GraphShape {
    fn default() -> Self {
        Self {
            branching: 3,
            depth: 3,
            roots: 4,
            leaves_per_container: 8,
            cross_edges: 2_000,
        }
    }
}

/// Deterministic xorshift so runs are comparable.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self, bound: usize) -> usize {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 % bound as u64) as usize
    }
}

const LABELS: &[&str] = &[
    "Parser", "Lexer", "Renderer", "Scheduler", "Cache", "Resolver", "Indexer", "Printer",
];

pub fn generate_nested_graph(shape: GraphShape) -> anyhow::Result<GraphModel> {
    let mut model = GraphModel::new();
    let mut leaves: Vec<EntityId> = Vec::new();
    let mut frontier: Vec<(EntityId, usize)> = Vec::new();

    for r in 0..shape.roots {
        let id = EntityId::new(format!("root_{r}"));
        model.add_container(Container::new(id.clone(), format!("Package {r}")))?;
        frontier.push((id, 0));
    }

    let mut counter = 0usize;
    while let Some((container, level)) = frontier.pop() {
        for l in 0..shape.leaves_per_container {
            counter += 1;
            let id = EntityId::new(format!("node_{counter}"));
            let label = format!("{}{}", LABELS[counter % LABELS.len()], l);
            model.add_node(Node::new(id.clone(), label).with_kind("function"))?;
            model.assign_to_container(&id, &container)?;
            leaves.push(id);
        }
        if level < shape.depth {
            for b in 0..shape.branching {
                let id = EntityId::new(format!("{container}.{b}"));
                model.add_container(Container::new(id.clone(), format!("Module {b}")))?;
                model.assign_to_container(&id, &container)?;
                frontier.push((id, level + 1));
            }
        }
    }

    for (i, pair) in leaves.windows(2).enumerate() {
        model.add_edge(Edge::new(format!("chain_{i}").as_str(), pair[0].clone(), pair[1].clone()))?;
    }
    let mut rng = Xorshift(0x9E37_79B9_7F4A_7C15);
    for i in 0..shape.cross_edges {
        let source = leaves[rng.next(leaves.len())].clone();
        let target = leaves[rng.next(leaves.len())].clone();
        model.add_edge(Edge::new(format!("cross_{i}").as_str(), source, target).with_kind("call"))?;
    }
    Ok(model)
}
