use proptest::prelude::*;
use trellis_core::{Container, Edge, EntityId, LayoutConfig, Node, ValidationReason, Vec2};
use trellis_graph::{
    GraphModel, LayoutBridge, LayoutEntry, LayoutPhase, MutationOutcome, ToggleAction,
};

fn eid(id: &str) -> EntityId {
    EntityId::from(id)
}

/// Container C holding n1 and n2, both linked to an outside node x.
fn boundary_model() -> GraphModel {
    let mut model = GraphModel::new();
    model.add_container(Container::new("C", "Cluster")).unwrap();
    model.add_node(Node::new("n1", "First")).unwrap();
    model.add_node(Node::new("n2", "Second")).unwrap();
    model.add_node(Node::new("x", "Elsewhere")).unwrap();
    model.assign_to_container(&eid("n1"), &eid("C")).unwrap();
    model.assign_to_container(&eid("n2"), &eid("C")).unwrap();
    model.add_edge(Edge::new("e1", "n1", "x")).unwrap();
    model.add_edge(Edge::new("e2", "n2", "x")).unwrap();
    model
}

#[test]
fn expanding_an_expanded_container_is_a_no_op() {
    let mut model = boundary_model();
    let revision = model.revision();
    let visible = model.visible_sets().clone();

    assert_eq!(model.expand_container(&eid("C")), MutationOutcome::Unchanged);
    assert_eq!(model.revision(), revision);
    assert_eq!(model.visible_sets(), &visible);
}

#[test]
fn collapse_then_expand_restores_visible_sets() {
    let mut model = boundary_model();
    let before = model.visible_sets().clone();

    model.collapse_container(&eid("C"));
    assert_ne!(model.visible_sets(), &before);
    model.expand_container(&eid("C"));
    assert_eq!(model.visible_sets(), &before);
}

#[test]
fn boundary_edges_aggregate_into_one() {
    let mut model = boundary_model();
    model.collapse_container(&eid("C"));

    let aggregated = model.aggregated_edges();
    assert_eq!(aggregated.len(), 1);
    assert_eq!(aggregated[0].source, eid("C"));
    assert_eq!(aggregated[0].target, eid("x"));
    assert_eq!(aggregated[0].multiplicity, 2);
}

#[test]
fn search_behaviour() {
    let mut model = GraphModel::new();
    model
        .add_node(Node::new("js", "JavaScript Function"))
        .unwrap();

    model.search("");
    assert!(model.search_results().is_empty());
    assert!(!model.is_search_active());

    model.search("javascript");
    assert_eq!(model.search_results().len(), 1);
    assert_eq!(model.search_results()[0].id, eid("js"));

    for i in 0..12 {
        model.search(&format!("query {i}"));
    }
    let history = model.search_history();
    assert_eq!(history.len(), 10);
    assert_eq!(history[0], "query 11");
    assert_eq!(history[9], "query 2");
    let unique: std::collections::HashSet<_> = history.iter().collect();
    assert_eq!(unique.len(), history.len());
}

#[test]
fn invalid_layout_recovers_on_the_next_valid_result() {
    let mut model = GraphModel::new();
    model.add_node(Node::new("n1", "Only")).unwrap();
    let bridge = LayoutBridge::default();

    let incomplete: LayoutEntry = serde_json::from_str(r#"{"id":"n1"}"#).unwrap();
    let err = bridge.apply(&mut model, &[incomplete]).unwrap_err();
    assert_eq!(err.reason, ValidationReason::Missing);
    assert_eq!(model.layout_phase(), LayoutPhase::Error);

    let valid: LayoutEntry =
        serde_json::from_str(r#"{"id":"n1","x":100,"y":50,"width":120,"height":60}"#).unwrap();
    bridge.apply(&mut model, &[valid]).unwrap();
    assert_eq!(model.layout_phase(), LayoutPhase::Ready);
    assert_eq!(
        model.node(&eid("n1")).unwrap().position,
        Some(Vec2::new(100.0, 50.0))
    );
}

#[test]
fn repeated_expand_mutates_once() {
    let mut model = boundary_model();
    model.collapse_container(&eid("C"));
    let outcomes: Vec<_> = (0..3).map(|_| model.expand_container(&eid("C"))).collect();
    assert_eq!(
        outcomes,
        vec![
            MutationOutcome::Applied,
            MutationOutcome::Unchanged,
            MutationOutcome::Unchanged
        ]
    );
}

#[tokio::test]
async fn default_engine_round_trips_through_the_bridge() {
    let mut model = boundary_model();
    model.set_layout_config(LayoutConfig::default());
    let bridge = LayoutBridge::default();

    let request = bridge.build_request(&model);
    let entries = bridge.compute(request).await.unwrap();
    assert_eq!(bridge.apply(&mut model, &entries).unwrap(), 4);
    assert!(model.node(&eid("n1")).unwrap().size.is_some());
}

#[derive(Debug, Clone)]
enum Step {
    Expand(usize),
    Collapse(usize),
    Toggle(usize),
    Reveal(usize),
    CollapseAll,
    ExpandAll,
    Batch(Vec<(usize, u8)>),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0usize..32).prop_map(Step::Expand),
        4 => (0usize..32).prop_map(Step::Collapse),
        4 => (0usize..32).prop_map(Step::Toggle),
        2 => (0usize..32).prop_map(Step::Reveal),
        1 => Just(Step::CollapseAll),
        1 => Just(Step::ExpandAll),
        1 => prop::collection::vec((0usize..32, 0u8..3), 1..6).prop_map(Step::Batch),
    ]
}

/// Entity `i` is a container when `is_container[i]`; `parents[i]` picks an
/// earlier entity to nest under (only honoured when that entity is a
/// container), so the tree is acyclic by construction.
fn build_model(
    is_container: &[bool],
    parents: &[Option<usize>],
    edges: &[(usize, usize)],
) -> GraphModel {
    let mut model = GraphModel::new();
    let id = |i: usize| format!("e{i}");
    for (i, container) in is_container.iter().enumerate() {
        if *container {
            model.add_container(Container::new(id(i), id(i))).unwrap();
        } else {
            model.add_node(Node::new(id(i), id(i))).unwrap();
        }
    }
    for (i, parent) in parents.iter().enumerate().skip(1) {
        if let Some(p) = parent {
            let p = p % i;
            if is_container[p] {
                model
                    .assign_to_container(&EntityId::new(id(i)), &EntityId::new(id(p)))
                    .unwrap();
            }
        }
    }
    for (k, (s, t)) in edges.iter().enumerate() {
        let n = is_container.len();
        model
            .add_edge(Edge::new(format!("l{k}").as_str(), id(s % n), id(t % n)))
            .unwrap();
    }
    model
}

fn target(model: &GraphModel, i: usize) -> EntityId {
    let n = model.stats().node_count + model.stats().container_count;
    EntityId::new(format!("e{}", i % n))
}

fn action(code: u8) -> ToggleAction {
    match code {
        0 => ToggleAction::Expand,
        1 => ToggleAction::Collapse,
        _ => ToggleAction::Toggle,
    }
}

proptest! {
    #[test]
    fn prop_cascade_preserves_invariants(
        is_container in prop::collection::vec(any::<bool>(), 2..24),
        parents in prop::collection::vec(prop::option::of(0usize..64), 24),
        edges in prop::collection::vec((0usize..64, 0usize..64), 0..30),
        steps in prop::collection::vec(step_strategy(), 1..40),
    ) {
        let mut model = build_model(&is_container, &parents[..is_container.len()], &edges);
        prop_assert!(model.audit().is_empty());

        for step in steps {
            match step {
                Step::Expand(i) => { model.expand_container(&target(&model, i)); }
                Step::Collapse(i) => { model.collapse_container(&target(&model, i)); }
                Step::Toggle(i) => { model.toggle_container(&target(&model, i)); }
                Step::Reveal(i) => { model.expand_container_for_search(&target(&model, i)); }
                Step::CollapseAll => { model.collapse_all(); }
                Step::ExpandAll => { model.expand_all(); }
                Step::Batch(actions) => {
                    let actions: Vec<_> = actions
                        .into_iter()
                        .map(|(i, code)| (target(&model, i), action(code)))
                        .collect();
                    model.apply_batch(&actions);
                }
            }
            let violations = model.audit();
            prop_assert!(violations.is_empty(), "{:?}", violations);

            for edge in model.aggregated_edges() {
                prop_assert!(edge.source != edge.target);
                prop_assert!(!model.is_hidden(&edge.source).unwrap());
                prop_assert!(!model.is_hidden(&edge.target).unwrap());
                prop_assert_eq!(edge.multiplicity, edge.edge_ids.len());
            }
        }
    }

    #[test]
    fn prop_collapse_expand_round_trips(
        is_container in prop::collection::vec(any::<bool>(), 2..24),
        parents in prop::collection::vec(prop::option::of(0usize..64), 24),
        edges in prop::collection::vec((0usize..64, 0usize..64), 0..30),
        collapsed_first in prop::collection::vec(0usize..64, 0..6),
        pick in 0usize..64,
    ) {
        let mut model = build_model(&is_container, &parents[..is_container.len()], &edges);
        for i in collapsed_first {
            model.collapse_container(&target(&model, i));
        }

        let n = is_container.len();
        let candidate = (0..n)
            .map(|offset| target(&model, pick + offset))
            .find(|id| {
                model.container(id).is_ok()
                    && !model.is_collapsed(id).unwrap()
                    && !model.is_hidden(id).unwrap()
            });
        let Some(id) = candidate else {
            return Ok(());
        };

        let before = model.visible_sets().clone();
        let aggregated_before = model.aggregated_edges().len();
        model.collapse_container(&id);
        model.expand_container(&id);
        prop_assert_eq!(model.visible_sets(), &before);
        prop_assert_eq!(model.aggregated_edges().len(), aggregated_before);
    }
}
