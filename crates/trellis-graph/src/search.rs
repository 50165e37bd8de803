//! Search state held by the model: query, ranked results, history and the
//! containers opened to reveal matches.

use crate::graph::{GraphModel, MutationOutcome};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use trellis_core::{EdgeId, EntityId, EntityKind};
use trellis_search::{MatchKind, SearchHistory, SearchMatcher, TextMatch};

/// Which text of the candidate matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Label,
    LongLabel,
    Tag,
    /// A tag on an edge touching this entity.
    EdgeTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: EntityId,
    pub entity_kind: EntityKind,
    pub match_kind: MatchKind,
    pub field: MatchField,
    /// Character range within the matched field.
    pub range: Range<usize>,
    pub via_edge: Option<EdgeId>,
}

impl SearchResult {
    /// Range to highlight in the rendered label, when the label itself matched.
    pub fn label_range(&self) -> Option<Range<usize>> {
        (self.field == MatchField::Label).then(|| self.range.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub(crate) query: String,
    pub(crate) results: Vec<SearchResult>,
    pub(crate) active: bool,
    pub(crate) history: SearchHistory,
    /// Containers opened to reveal a match.
    pub(crate) revealed: IndexSet<EntityId>,
}

impl GraphModel {
    /// Run a case-insensitive search over labels and tags.
    ///
    /// A blank query clears the results and deactivates search. Any other
    /// query is pushed to the history, whether or not it matched.
    pub fn search(&mut self, query: &str) -> MutationOutcome {
        let Some(mut matcher) = SearchMatcher::new(query) else {
            let was_active = self.search.active || !self.search.results.is_empty();
            self.search.query.clear();
            self.search.results.clear();
            self.search.active = false;
            if was_active {
                self.touch();
                return MutationOutcome::Applied;
            }
            return MutationOutcome::Unchanged;
        };

        let results = self.collect_matches(&mut matcher);
        tracing::debug!(
            "Search '{}' matched {} entities",
            matcher.query(),
            results.len()
        );

        self.search.history.push(matcher.query());
        self.search.query = matcher.query().to_string();
        self.search.results = results;
        self.search.active = true;
        self.touch();
        MutationOutcome::Applied
    }

    /// Reset query and results. History is kept.
    pub fn clear_search(&mut self) -> MutationOutcome {
        if !self.search.active && self.search.results.is_empty() && self.search.query.is_empty() {
            return MutationOutcome::Unchanged;
        }
        self.search.query.clear();
        self.search.results.clear();
        self.search.active = false;
        self.search.revealed.clear();
        self.touch();
        MutationOutcome::Applied
    }

    /// Reveal the result at `index` (0 is the best match).
    pub fn reveal_match(&mut self, index: usize) -> MutationOutcome {
        let Some(result) = self.search.results.get(index) else {
            return MutationOutcome::Unchanged;
        };
        let id = result.id.clone();
        self.expand_container_for_search(&id)
    }

    pub fn search_results(&self) -> &[SearchResult] {
        &self.search.results
    }

    pub fn search_query(&self) -> &str {
        &self.search.query
    }

    pub fn is_search_active(&self) -> bool {
        self.search.active
    }

    pub fn search_history(&self) -> Vec<String> {
        self.search.history.to_vec()
    }

    pub fn revealed_containers(&self) -> impl Iterator<Item = &EntityId> {
        self.search.revealed.iter()
    }

    fn collect_matches(&self, matcher: &mut SearchMatcher) -> Vec<SearchResult> {
        let mut best: IndexMap<EntityId, SearchResult> = IndexMap::new();
        let mut offer = |result: SearchResult| match best.get_mut(&result.id) {
            Some(existing) if existing.match_kind <= result.match_kind => {}
            Some(existing) => *existing = result,
            None => {
                best.insert(result.id.clone(), result);
            }
        };

        for node in self.nodes.values() {
            let mut fields = vec![(MatchField::Label, node.label.as_str())];
            if let Some(long_label) = &node.long_label {
                fields.push((MatchField::LongLabel, long_label.as_str()));
            }
            fields.extend(node.tags.iter().map(|t| (MatchField::Tag, t.as_str())));

            if let Some((field, found)) = Self::best_field(matcher, &fields) {
                offer(Self::result(&node.id, EntityKind::Node, field, found, None));
            }
        }

        for container in self.containers.values() {
            if let Some(found) = matcher.match_text(&container.label) {
                offer(Self::result(
                    &container.id,
                    EntityKind::Container,
                    MatchField::Label,
                    found,
                    None,
                ));
            }
        }

        for edge in self.edges.values() {
            let fields: Vec<_> = edge.tags.iter().map(|t| (MatchField::EdgeTag, t.as_str())).collect();
            let Some((_, found)) = Self::best_field(matcher, &fields) else {
                continue;
            };
            for endpoint in [&edge.source, &edge.target] {
                if let Some(kind) = self.entities.get(endpoint) {
                    offer(Self::result(
                        endpoint,
                        *kind,
                        MatchField::EdgeTag,
                        found.clone(),
                        Some(edge.id.clone()),
                    ));
                }
            }
        }

        let mut results: Vec<SearchResult> = best.into_values().collect();
        results.sort_by_key(|r| (r.match_kind, self.insertion_rank(&r.id)));
        results
    }

    fn best_field(
        matcher: &mut SearchMatcher,
        fields: &[(MatchField, &str)],
    ) -> Option<(MatchField, TextMatch)> {
        let (index, found) = matcher.match_best(fields.iter().map(|(_, text)| *text))?;
        Some((fields[index].0, found))
    }

    fn result(
        id: &EntityId,
        entity_kind: EntityKind,
        field: MatchField,
        found: TextMatch,
        via_edge: Option<EdgeId>,
    ) -> SearchResult {
        SearchResult {
            id: id.clone(),
            entity_kind,
            match_kind: found.kind,
            field,
            range: found.range,
            via_edge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Container, Edge, Node};

    fn eid(id: &str) -> EntityId {
        EntityId::from(id)
    }

    fn sample() -> GraphModel {
        let mut model = GraphModel::new();
        model.add_node(Node::new("js", "JavaScript Function")).unwrap();
        model
            .add_node(Node::new("py", "Python Module").with_tags(["scripting"]))
            .unwrap();
        model.add_container(Container::new("lang", "Languages")).unwrap();
        model.add_node(Node::new("rs", "Rust Crate")).unwrap();
        model
            .add_edge(Edge::new("e1", "rs", "lang").with_tags(["membership"]))
            .unwrap();
        model
    }

    #[test]
    fn blank_query_deactivates_search() {
        let mut model = sample();
        model.search("rust");
        assert!(model.is_search_active());
        model.search("   ");
        assert!(!model.is_search_active());
        assert!(model.search_results().is_empty());
        assert_eq!(model.search_history(), vec!["rust".to_string()]);
    }

    #[test]
    fn substring_match_records_range() {
        let mut model = sample();
        model.search("javascript");
        let results = model.search_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, eid("js"));
        assert_eq!(results[0].match_kind, MatchKind::Exact);
        assert_eq!(results[0].label_range(), Some(0..10));
    }

    #[test]
    fn exact_matches_rank_before_fuzzy_then_insertion_order() {
        let mut model = GraphModel::new();
        model.add_node(Node::new("a", "m_o_d")).unwrap();
        model.add_node(Node::new("b", "Module")).unwrap();
        model.add_node(Node::new("c", "Model")).unwrap();
        model.search("mod");
        let ids: Vec<_> = model.search_results().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn tag_and_edge_tag_matches() {
        let mut model = sample();
        model.search("scripting");
        assert_eq!(model.search_results()[0].field, MatchField::Tag);
        assert_eq!(model.search_results()[0].label_range(), None);

        model.search("membership");
        let results = model.search_results();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["lang", "rs"]);
        assert!(results.iter().all(|r| r.via_edge == Some(EdgeId::from("e1"))));
    }

    #[test]
    fn clear_search_keeps_history() {
        let mut model = sample();
        model.search("rust");
        model.search("python");
        assert_eq!(model.clear_search(), MutationOutcome::Applied);
        assert!(!model.is_search_active());
        assert_eq!(model.search_query(), "");
        assert_eq!(
            model.search_history(),
            vec!["python".to_string(), "rust".to_string()]
        );
        assert_eq!(model.clear_search(), MutationOutcome::Unchanged);
    }

    #[test]
    fn reveal_match_opens_ancestors() {
        let mut model = sample();
        model.assign_to_container(&eid("rs"), &eid("lang")).unwrap();
        model.collapse_container(&eid("lang"));
        model.search("rust");
        assert_eq!(model.reveal_match(0), MutationOutcome::Applied);
        assert!(!model.is_hidden(&eid("rs")).unwrap());
        assert_eq!(model.revealed_containers().collect::<Vec<_>>(), vec![&eid("lang")]);
        assert_eq!(model.reveal_match(5), MutationOutcome::Unchanged);
    }
}
