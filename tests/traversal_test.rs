//! Tests for relationship traversal and cardinality/depth sizing.

use rendr::application::GraphWalker;
use rendr::config::Settings;
use rendr::domain::relationship::{
    flatten, ARCROLE_DIMENSION_DOMAIN, ARCROLE_DOMAIN_MEMBER, ARCROLE_PARENT_CHILD,
};
use rendr::domain::{AxisSpec, EvalContext, Edge, QName, RelNode, RelationshipQuery};
use rendr::infrastructure::di::ServiceContainer;
use rendr::infrastructure::document::DocumentLoader;
use rendr::infrastructure::memory::MemoryGraph;
use rendr::infrastructure::traits::ConceptInfo;
use rendr::util::testing;

const ROLE: &str = "http://example.com/role/bs";
const OTHER_ROLE: &str = "http://example.com/role/is";

fn qn(s: &str) -> QName {
    QName::parse(s).unwrap()
}

fn item(s: &str) -> RelNode {
    RelNode::Item(qn(s))
}

fn edge(from: &str, to: &str) -> Edge {
    Edge {
        from: qn(from),
        to: qn(to),
        arcrole: ARCROLE_PARENT_CHILD.to_string(),
        link_role: ROLE.to_string(),
        target_role: None,
        link_name: None,
        arc_name: None,
        order: 0.0,
    }
}

/// ex:A
/// ├── ex:B
/// │   └── ex:D
/// └── ex:C
fn graph() -> MemoryGraph {
    testing::init_test_setup();
    MemoryGraph::new()
        .with_edge(edge("ex:A", "ex:B"))
        .with_edge(edge("ex:A", "ex:C"))
        .with_edge(edge("ex:B", "ex:D"))
}

fn query(source: Option<&str>, axis: &str) -> RelationshipQuery {
    let axis: AxisSpec = axis.parse().unwrap();
    RelationshipQuery::new(source.map(qn), ARCROLE_PARENT_CHILD)
        .with_generations(axis.axis.default_generations())
        .with_axis(axis)
}

#[test]
fn given_child_axis_when_walked_then_direct_children_only() {
    let graph = graph();

    let result = GraphWalker::new(&graph, 0).walk(&query(Some("ex:A"), "child"));

    assert_eq!(result, vec![item("ex:B"), item("ex:C")]);
}

#[test]
fn given_descendant_axis_when_walked_then_nests_grandchildren() {
    let graph = graph();

    let result = GraphWalker::new(&graph, 0).walk(&query(Some("ex:A"), "descendant"));

    assert_eq!(
        result,
        vec![item("ex:B"), RelNode::Nested(vec![item("ex:D")]), item("ex:C")]
    );
}

#[test]
fn given_generation_limit_when_walked_then_stops_at_limit() {
    let graph = graph();
    let limited = query(Some("ex:A"), "descendant").with_generations(1);

    let result = GraphWalker::new(&graph, 0).walk(&limited);

    assert_eq!(result, vec![item("ex:B"), item("ex:C")]);
}

#[test]
fn given_generation_cap_when_walking_unlimited_then_cap_applies() {
    let graph = graph();

    let result = GraphWalker::new(&graph, 1).walk(&query(Some("ex:A"), "descendant"));

    assert_eq!(result, vec![item("ex:B"), item("ex:C")]);
}

#[test]
fn given_upward_axes_when_walked_then_follow_incoming_edges() {
    let graph = graph();
    let walker = GraphWalker::new(&graph, 0);

    assert_eq!(walker.walk(&query(Some("ex:D"), "parent")), vec![item("ex:B")]);
    assert_eq!(
        walker.walk(&query(Some("ex:D"), "ancestor")),
        vec![item("ex:B"), RelNode::Nested(vec![item("ex:A")])]
    );
}

#[test]
fn given_sibling_axis_when_walked_then_excludes_source() {
    let graph = graph();

    let result = GraphWalker::new(&graph, 0).walk(&query(Some("ex:B"), "sibling"));

    assert_eq!(result, vec![item("ex:C")]);
}

#[test]
fn given_no_source_when_walked_then_starts_at_graph_roots() {
    let graph = graph();

    let result = GraphWalker::new(&graph, 0).walk(&query(None, "descendant"));

    let names: Vec<String> = flatten(&result).iter().map(|q| q.to_string()).collect();
    assert_eq!(names, vec!["ex:A", "ex:B", "ex:D", "ex:C"]);
    assert_eq!(result[0], item("ex:A"));
}

#[test]
fn given_cycle_when_walked_then_revisit_is_skipped() {
    let graph = graph().with_edge(edge("ex:D", "ex:A"));

    let result = GraphWalker::new(&graph, 0).walk(&query(Some("ex:A"), "descendant"));

    assert_eq!(
        result,
        vec![item("ex:B"), RelNode::Nested(vec![item("ex:D")]), item("ex:C")]
    );
}

#[test]
fn given_link_role_when_walked_then_other_roles_are_ignored() {
    let mut other = edge("ex:A", "ex:X");
    other.link_role = OTHER_ROLE.to_string();
    let graph = graph().with_edge(other);
    let walker = GraphWalker::new(&graph, 0);

    let scoped = query(Some("ex:A"), "child").with_link_role(Some(ROLE));
    let unscoped = query(Some("ex:A"), "child");

    assert_eq!(walker.walk(&scoped), vec![item("ex:B"), item("ex:C")]);
    assert_eq!(walker.walk(&unscoped), vec![item("ex:B"), item("ex:C"), item("ex:X")]);
}

#[test]
fn given_target_role_when_walked_then_next_hop_continues_in_it() {
    let mut hop = edge("ex:P", "ex:Q");
    hop.target_role = Some(OTHER_ROLE.to_string());
    let mut next = edge("ex:Q", "ex:R");
    next.link_role = OTHER_ROLE.to_string();
    let graph = MemoryGraph::new()
        .with_edge(hop)
        .with_edge(next)
        .with_edge(edge("ex:Q", "ex:Ignored"));

    let result = GraphWalker::new(&graph, 0)
        .walk(&query(Some("ex:P"), "descendant").with_link_role(Some(ROLE)));

    assert_eq!(result, vec![item("ex:Q"), RelNode::Nested(vec![item("ex:R")])]);
}

#[test]
fn given_member_when_resolving_dimension_then_walks_up_to_dimension() {
    let mut domain = edge("ex:Region", "ex:AllRegions");
    domain.arcrole = ARCROLE_DIMENSION_DOMAIN.to_string();
    let mut member = edge("ex:AllRegions", "ex:North");
    member.arcrole = ARCROLE_DOMAIN_MEMBER.to_string();
    let graph = MemoryGraph::new()
        .with_concept(
            qn("ex:Region"),
            ConceptInfo {
                is_dimension: true,
                is_item: false,
            },
        )
        .with_edge(domain)
        .with_edge(member);
    let arcroles = Settings::default().traversal.dimension_arcroles;
    let walker = GraphWalker::new(&graph, 0);

    assert_eq!(walker.governing_dimension(&qn("ex:North"), None, &arcroles), Some(qn("ex:Region")));
    assert_eq!(walker.governing_dimension(&qn("ex:Region"), None, &arcroles), Some(qn("ex:Region")));
    assert_eq!(walker.governing_dimension(&qn("ex:Elsewhere"), None, &arcroles), None);
}

#[test]
fn given_structural_nodes_when_sized_then_count_and_depth_per_kind() {
    testing::init_test_setup();
    let doc = DocumentLoader::parse(
        r#"
[[edges]]
from = "ex:Assets"
to = "ex:Cash"
link_role = "http://example.com/role/bs"
[[edges]]
from = "ex:Assets"
to = "ex:Receivables"
link_role = "http://example.com/role/bs"
[[edges]]
from = "ex:Receivables"
to = "ex:Trade"
link_role = "http://example.com/role/bs"

[[tables]]
id = "t"
[[tables.breakdowns]]
id = "t.y"
ordinate = "y"

[[tables.breakdowns.nodes]]
id = "assets"
kind = "concept-relationship"
source = "ex:Assets"
axis = "descendant-or-self"

[[tables.breakdowns.nodes]]
id = "with-rules"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { concept = "ex:Cash" }

[[tables.breakdowns.nodes]]
id = "empty-rule"
kind = "rule"

[[tables.breakdowns.nodes]]
id = "group"
kind = "composition"

[[tables.breakdowns.nodes]]
id = "labelled"
kind = "composition"

[[labels]]
definition = "labelled"
text = "Labelled"
"#,
    )
    .unwrap();
    let loaded = ServiceContainer::new(Settings::default()).bind(doc);
    let table = loaded.tables(None).unwrap()[0];
    let (tree, axes) = loaded.build(table).unwrap();
    let pass = loaded.pass(&tree);
    let mut ctx = EvalContext::new();

    let sizes: Vec<(usize, usize)> = tree
        .node(axes.y[0])
        .unwrap()
        .children
        .iter()
        .map(|&node| pass.cardinality_and_depth(&mut ctx, node).unwrap())
        .collect();

    // assets: Cash, Receivables, [Trade] plus the source itself
    assert_eq!(sizes, vec![(4, 3), (1, 1), (0, 0), (1, 0), (1, 1)]);
}
