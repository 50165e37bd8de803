//! Graph description files.
//!
//! ```json
//! {
//!   "nodes": [{"id": "n1", "label": "Parser", "type": "function"}],
//!   "containers": [{"id": "c1", "label": "Frontend", "children": ["n1"]}],
//!   "edges": [{"id": "e1", "source": "n1", "target": "n2"}]
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use trellis_core::{Container, Edge, Node};
use trellis_graph::GraphModel;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphFile {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphFile {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Malformed graph description")
    }

    /// Entities first, then containment, then edges, so that edges crossing
    /// an initially collapsed container aggregate straight away.
    pub fn into_model(self) -> Result<GraphModel> {
        let mut model = GraphModel::new();
        let mut containment = Vec::new();
        for container in self.containers {
            for child in &container.children {
                containment.push((child.clone(), container.id.clone()));
            }
            model.add_container(container)?;
        }
        for node in self.nodes {
            model.add_node(node)?;
        }
        for (child, container) in containment {
            model
                .assign_to_container(&child, &container)
                .with_context(|| format!("Cannot place {child} in {container}"))?;
        }
        for edge in self.edges {
            model.add_edge(edge)?;
        }
        Ok(model)
    }
}

pub fn load_graph(path: &Path) -> Result<GraphModel> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let model = GraphFile::parse(&text)?.into_model()?;
    let stats = model.stats();
    tracing::info!(
        "Loaded {} nodes, {} containers and {} edges from {}",
        stats.node_count,
        stats.container_count,
        stats.edge_count,
        path.display()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use trellis_core::EntityId;

    const SAMPLE: &str = r#"{
        "nodes": [
            {"id": "n1", "label": "Parser", "type": "function"},
            {"id": "n2", "label": "Printer"},
            {"id": "x", "label": "Main"}
        ],
        "containers": [
            {"id": "outer", "label": "Outer", "children": ["inner"]},
            {"id": "inner", "label": "Inner", "children": ["n1", "n2"], "collapsed": true}
        ],
        "edges": [
            {"id": "e1", "source": "n1", "target": "x"},
            {"id": "e2", "source": "n2", "target": "x", "type": "call"}
        ]
    }"#;

    #[test]
    fn loads_nested_containers_and_aggregates() {
        let model = GraphFile::parse(SAMPLE).unwrap().into_model().unwrap();
        let inner = EntityId::from("inner");

        assert_eq!(model.parent_of(&inner).unwrap(), Some(&EntityId::from("outer")));
        assert!(model.is_collapsed(&inner).unwrap());
        assert!(model.is_hidden(&EntityId::from("n1")).unwrap());
        let aggregated = model.aggregated_edges();
        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].multiplicity, 2);
        assert!(model.audit().is_empty());
    }

    #[test]
    fn rejects_unknown_fields_and_dangling_edges() {
        assert!(GraphFile::parse(r#"{"vertices": []}"#).is_err());

        let dangling = r#"{"nodes": [{"id": "a", "label": "A"}],
                           "edges": [{"id": "e", "source": "a", "target": "b"}]}"#;
        let err = GraphFile::parse(dangling).unwrap().into_model().unwrap_err();
        assert!(err.to_string().contains("missing endpoint b"));
    }

    #[test]
    fn node_without_label_is_malformed() {
        assert!(GraphFile::parse(r#"{"nodes": [{"id": "a"}]}"#).is_err());
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let model = load_graph(file.path()).unwrap();
        assert_eq!(model.stats().container_count, 2);
        assert!(load_graph(Path::new("/nonexistent/graph.json")).is_err());
    }
}
