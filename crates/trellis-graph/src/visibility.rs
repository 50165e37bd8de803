//! Collapse / expand cascade and the invariant audit.
//!
//! A collapsed container hides every descendant and forces every descendant
//! container shut. Containers forced shut this way are remembered, so that
//! expanding the ancestor again brings them back in the state the user left
//! them in.

use crate::graph::{GraphModel, MutationOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use trellis_core::{EntityId, EntityKind, InvariantViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleAction {
    Expand,
    Collapse,
    Toggle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub applied: usize,
    pub unchanged: usize,
    pub unknown: usize,
}

impl BatchOutcome {
    pub fn is_applied(&self) -> bool {
        self.applied > 0
    }

    fn record(&mut self, outcome: MutationOutcome) {
        match outcome {
            MutationOutcome::Applied => self.applied += 1,
            MutationOutcome::Unchanged => self.unchanged += 1,
            MutationOutcome::UnknownTarget => self.unknown += 1,
        }
    }
}

impl GraphModel {
    pub fn collapse_container(&mut self, id: &EntityId) -> MutationOutcome {
        let outcome = self.collapse_in_place(id);
        if outcome.is_applied() {
            self.refresh_derived();
        }
        outcome
    }

    /// Expand a container. Direct children become visible; nested containers
    /// come back collapsed or expanded as they were before the ancestor
    /// collapse. A hidden container has its collapsed ancestors opened first.
    pub fn expand_container(&mut self, id: &EntityId) -> MutationOutcome {
        let outcome = self.expand_in_place(id);
        if outcome.is_applied() {
            self.refresh_derived();
        }
        outcome
    }

    pub fn toggle_container(&mut self, id: &EntityId) -> MutationOutcome {
        let outcome = self.toggle_in_place(id);
        if outcome.is_applied() {
            self.refresh_derived();
        }
        outcome
    }

    /// Collapse every top-level container with a single derived-state refresh.
    pub fn collapse_all(&mut self) -> MutationOutcome {
        let top_level: Vec<EntityId> = self.top_level_containers().into_iter().cloned().collect();
        let mut outcome = MutationOutcome::Unchanged;
        for id in &top_level {
            outcome = outcome.merge(self.collapse_in_place(id));
        }
        if outcome.is_applied() {
            self.refresh_derived();
        }
        outcome
    }

    /// Expand every top-level container with a single derived-state refresh.
    /// Nested containers keep the state they had before the ancestor collapse.
    pub fn expand_all(&mut self) -> MutationOutcome {
        let top_level: Vec<EntityId> = self.top_level_containers().into_iter().cloned().collect();
        let mut outcome = MutationOutcome::Unchanged;
        for id in &top_level {
            outcome = outcome.merge(self.expand_in_place(id));
        }
        if outcome.is_applied() {
            self.refresh_derived();
        }
        outcome
    }

    /// Apply several toggle actions, refreshing derived state once.
    pub fn apply_batch(&mut self, actions: &[(EntityId, ToggleAction)]) -> BatchOutcome {
        let mut batch = BatchOutcome::default();
        for (id, action) in actions {
            let outcome = match action {
                ToggleAction::Expand => self.expand_in_place(id),
                ToggleAction::Collapse => self.collapse_in_place(id),
                ToggleAction::Toggle => self.toggle_in_place(id),
            };
            batch.record(outcome);
        }
        if batch.is_applied() {
            self.refresh_derived();
        }
        batch
    }

    /// Make an entity visible by opening its collapsed ancestors. The
    /// entity's own collapsed flag is left alone.
    pub fn expand_container_for_search(&mut self, id: &EntityId) -> MutationOutcome {
        if !self.contains(id) {
            tracing::warn!("Ignoring reveal of unknown entity {}", id);
            return MutationOutcome::UnknownTarget;
        }
        if !self.is_hidden_unchecked(id) {
            return MutationOutcome::Unchanged;
        }
        let opened = self.reveal_path(id);
        self.search.revealed.extend(opened);
        self.refresh_derived();
        MutationOutcome::Applied
    }

    /// Whether applying `action` to `id` would change anything.
    pub fn would_change(&self, id: &EntityId, action: ToggleAction) -> bool {
        let Some(container) = self.containers.get(id) else {
            return false;
        };
        match action {
            ToggleAction::Expand => container.collapsed || container.hidden,
            ToggleAction::Collapse => !container.collapsed,
            ToggleAction::Toggle => true,
        }
    }

    pub(crate) fn collapse_in_place(&mut self, id: &EntityId) -> MutationOutcome {
        let Some(container) = self.containers.get_mut(id) else {
            return self.not_a_container(id, "collapse");
        };
        if container.collapsed {
            return MutationOutcome::Unchanged;
        }
        container.collapsed = true;
        let children = container.children.clone();
        self.remembered_expanded.remove(id);
        for child in &children {
            self.conceal(child);
        }
        MutationOutcome::Applied
    }

    pub(crate) fn expand_in_place(&mut self, id: &EntityId) -> MutationOutcome {
        let Some(container) = self.containers.get(id) else {
            return self.not_a_container(id, "expand");
        };
        if !container.collapsed && !container.hidden {
            return MutationOutcome::Unchanged;
        }
        if container.hidden {
            self.reveal_path(id);
        }
        if self.containers.get(id).is_some_and(|c| c.collapsed) {
            self.open_container(id);
        }
        MutationOutcome::Applied
    }

    pub(crate) fn toggle_in_place(&mut self, id: &EntityId) -> MutationOutcome {
        match self.containers.get(id) {
            Some(c) if c.collapsed || c.hidden => self.expand_in_place(id),
            Some(_) => self.collapse_in_place(id),
            None => self.not_a_container(id, "toggle"),
        }
    }

    fn not_a_container(&self, id: &EntityId, action: &str) -> MutationOutcome {
        if self.nodes.contains_key(id) {
            tracing::debug!("Ignoring {} of {}: it is a node", action, id);
            MutationOutcome::Unchanged
        } else {
            tracing::warn!("Ignoring {} of unknown container {}", action, id);
            MutationOutcome::UnknownTarget
        }
    }

    /// Hide `id` and everything beneath it, forcing expanded containers shut
    /// and remembering them.
    pub(crate) fn conceal(&mut self, id: &EntityId) {
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            self.set_hidden(&current, true);
            let Some(container) = self.containers.get_mut(&current) else {
                continue;
            };
            if container.collapsed {
                // Already shut: its descendants are hidden.
                continue;
            }
            container.collapsed = true;
            stack.extend(container.children.iter().cloned());
            self.remembered_expanded.insert(current);
        }
    }

    /// Show `id`, re-opening remembered containers beneath it.
    pub(crate) fn reveal_entity(&mut self, id: &EntityId) {
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            self.set_hidden(&current, false);
            if !self.remembered_expanded.remove(&current) {
                continue;
            }
            if let Some(container) = self.containers.get_mut(&current) {
                container.collapsed = false;
                stack.extend(container.children.iter().cloned());
            }
        }
    }

    fn open_container(&mut self, id: &EntityId) {
        let Some(container) = self.containers.get_mut(id) else {
            return;
        };
        container.collapsed = false;
        let children = container.children.clone();
        self.remembered_expanded.remove(id);
        for child in &children {
            self.reveal_entity(child);
        }
    }

    /// Open collapsed ancestors top-down until `id` is visible. Returns the
    /// containers that were opened.
    pub(crate) fn reveal_path(&mut self, id: &EntityId) -> Vec<EntityId> {
        let mut opened = Vec::new();
        for ancestor in self.ancestors_unchecked(id).into_iter().rev() {
            if self.containers.get(&ancestor).is_some_and(|c| c.collapsed) {
                self.open_container(&ancestor);
                opened.push(ancestor);
            }
        }
        opened
    }

    /// Check every structural invariant and report all violations found.
    pub fn audit(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for (id, kind) in &self.entities {
            let mut seen = HashSet::new();
            let mut current = id;
            let mut collapsed_ancestor = None;
            let mut cyclic = false;
            while let Some(parent) = self.parents.get(current) {
                if parent == id || !seen.insert(parent) {
                    cyclic = true;
                    break;
                }
                if collapsed_ancestor.is_none()
                    && self.containers.get(parent).is_some_and(|c| c.collapsed)
                {
                    collapsed_ancestor = Some(parent.clone());
                }
                current = parent;
            }
            if cyclic {
                violations.push(InvariantViolation::Cycle(id.clone()));
                continue;
            }

            let hidden = self.is_hidden_unchecked(id);
            match (&collapsed_ancestor, hidden) {
                (Some(ancestor), false) => {
                    violations.push(InvariantViolation::VisibleUnderCollapsed {
                        entity: id.clone(),
                        ancestor: ancestor.clone(),
                    });
                }
                (None, true) => {
                    violations.push(InvariantViolation::HiddenWithoutCollapsedAncestor(
                        id.clone(),
                    ));
                }
                _ => {}
            }

            if *kind == EntityKind::Container
                && let Some(container) = self.containers.get(id)
                && container.hidden
                && !container.collapsed
            {
                violations.push(InvariantViolation::ExpandedWhileHidden(id.clone()));
            }
        }

        for (child, parent) in &self.parents {
            let listed = self
                .containers
                .get(parent)
                .is_some_and(|c| c.children.contains(child));
            if !listed {
                violations.push(InvariantViolation::ParentIndexMismatch(parent.clone()));
            }
        }
        for container in self.containers.values() {
            if container
                .children
                .iter()
                .any(|c| self.parents.get(c) != Some(&container.id))
            {
                violations.push(InvariantViolation::ParentIndexMismatch(container.id.clone()));
            }
        }

        for edge in self.edges.values() {
            let expected =
                self.is_hidden_unchecked(&edge.source) || self.is_hidden_unchecked(&edge.target);
            if edge.hidden != expected {
                violations.push(InvariantViolation::EdgeVisibilityMismatch(edge.id.clone()));
            }
        }

        violations
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match self.audit().into_iter().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}
