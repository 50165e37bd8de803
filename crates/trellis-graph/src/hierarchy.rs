//! Containment traversal over the child -> parent index.

use crate::graph::GraphModel;
use std::collections::HashSet;
use trellis_core::EntityId;

impl GraphModel {
    /// Ancestors ordered nearest first. Stops on a malformed cyclic chain.
    pub(crate) fn ancestors_unchecked(&self, id: &EntityId) -> Vec<EntityId> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        let mut current = id;
        while let Some(parent) = self.parents.get(current) {
            if !seen.insert(parent) {
                tracing::warn!("Containment cycle detected above {}", id);
                break;
            }
            ancestors.push(parent.clone());
            current = parent;
        }
        ancestors
    }

    /// True when `ancestor` is `id` itself or sits above it.
    pub(crate) fn is_ancestor_or_self(&self, ancestor: &EntityId, id: &EntityId) -> bool {
        ancestor == id || self.ancestors_unchecked(id).iter().any(|a| a == ancestor)
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::GraphModel;
    use trellis_core::{Container, EntityId, Node};

    fn eid(id: &str) -> EntityId {
        EntityId::from(id)
    }

    fn nested() -> GraphModel {
        let mut model = GraphModel::new();
        model.add_container(Container::new("outer", "Outer")).unwrap();
        model.add_container(Container::new("inner", "Inner")).unwrap();
        model.add_node(Node::new("leaf", "Leaf")).unwrap();
        model.add_node(Node::new("side", "Side")).unwrap();
        model.assign_to_container(&eid("inner"), &eid("outer")).unwrap();
        model.assign_to_container(&eid("leaf"), &eid("inner")).unwrap();
        model.assign_to_container(&eid("side"), &eid("outer")).unwrap();
        model
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let model = nested();
        assert_eq!(
            model.ancestors_of(&eid("leaf")).unwrap(),
            vec![eid("inner"), eid("outer")]
        );
        assert!(model.ancestors_of(&eid("outer")).unwrap().is_empty());
    }

    #[test]
    fn containment_checks_walk_the_parent_chain() {
        let model = nested();
        assert!(model.is_ancestor_or_self(&eid("outer"), &eid("leaf")));
        assert!(model.is_ancestor_or_self(&eid("leaf"), &eid("leaf")));
        assert!(!model.is_ancestor_or_self(&eid("side"), &eid("leaf")));
    }
}
