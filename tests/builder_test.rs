//! Tests for StructuralTreeBuilder: expansion of definition nodes into the
//! structural tree of one render pass.

use rendr::application::{HeaderRequest, TableAxes};
use rendr::config::Settings;
use rendr::domain::{Aspect, EvalContext, NodeId, RollUp, StructuralTree, Value};
use rendr::infrastructure::di::{LoadedDocument, ServiceContainer};
use rendr::infrastructure::document::DocumentLoader;
use rendr::util::testing;

const BALANCE_SHEET: &str = r#"
[[concepts]]
name = "ex:Region"
is_dimension = true
is_item = false

[[edges]]
from = "ex:Assets"
to = "ex:Cash"
link_role = "http://example.com/role/bs"
order = 1.0

[[edges]]
from = "ex:Assets"
to = "ex:Receivables"
link_role = "http://example.com/role/bs"
order = 2.0

[[edges]]
from = "ex:Receivables"
to = "ex:TradeReceivables"
link_role = "http://example.com/role/bs"

[[edges]]
from = "ex:Region"
to = "ex:AllRegions"
arcrole = "http://xbrl.org/int/dim/arcrole/dimension-domain"
link_role = "http://example.com/role/bs"

[[edges]]
from = "ex:AllRegions"
to = "ex:North"
arcrole = "http://xbrl.org/int/dim/arcrole/domain-member"
link_role = "http://example.com/role/bs"

[[edges]]
from = "ex:AllRegions"
to = "ex:South"
arcrole = "http://xbrl.org/int/dim/arcrole/domain-member"
link_role = "http://example.com/role/bs"

[[tables]]
id = "bs"
parameters = { year = 2020 }

[[tables.breakdowns]]
id = "bs.z"
ordinate = "z"

[[tables.breakdowns.nodes]]
id = "fy2020"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { period-instant = "2020-12-31" }

[[tables.breakdowns.nodes]]
id = "fy2021"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { period-instant = "2021-12-31" }

[[tables.breakdowns]]
id = "bs.x"
ordinate = "x"

[[tables.breakdowns.nodes]]
id = "assets"
kind = "concept-relationship"
source = "ex:Assets"
axis = "descendant-or-self"

[[tables.breakdowns]]
id = "bs.y"
ordinate = "y"

[[tables.breakdowns.nodes]]
id = "regions"
kind = "dimension-relationship"
dimension = "ex:Region"
source = "ex:AllRegions"
axis = "child"
"#;

fn load(text: &str) -> LoadedDocument {
    testing::init_test_setup();
    let doc = DocumentLoader::parse(text).expect("parse document");
    ServiceContainer::new(Settings::default()).bind(doc)
}

fn build(loaded: &LoadedDocument, table: &str) -> (StructuralTree, TableAxes) {
    let tables = loaded.tables(Some(table)).expect("table exists");
    loaded.build(tables[0]).expect("build table")
}

fn concept_of(loaded: &LoadedDocument, tree: &StructuralTree, node: NodeId) -> Option<String> {
    let pass = loaded.pass(tree);
    let mut ctx = EvalContext::new();
    pass.aspect_value(&mut ctx, node, &Aspect::Concept)
        .unwrap()
        .map(|v| v.to_string())
}

#[test]
fn given_table_when_built_then_has_one_root_per_breakdown() {
    let loaded = load(BALANCE_SHEET);

    let (tree, axes) = build(&loaded, "bs");

    assert_eq!(axes.x.len(), 1);
    assert_eq!(axes.y.len(), 1);
    assert_eq!(axes.z.len(), 1);
    for root in axes.x.iter().chain(&axes.y).chain(&axes.z) {
        assert!(tree.node(*root).unwrap().parent.is_none());
        assert!(tree.table_of(*root).is_some());
    }
}

#[test]
fn given_descendant_or_self_relationship_when_built_then_nests_generated_nodes() {
    let loaded = load(BALANCE_SHEET);

    let (tree, axes) = build(&loaded, "bs");

    // root -> assets -> ex:Assets -> [ex:Cash, ex:Receivables -> [ex:TradeReceivables]]
    let root = axes.x[0];
    let relationship = tree.node(root).unwrap().children[0];
    let source = tree.node(relationship).unwrap().children[0];
    assert_eq!(concept_of(&loaded, &tree, source).as_deref(), Some("ex:Assets"));

    let children = tree.node(source).unwrap().children.clone();
    assert_eq!(children.len(), 2);
    assert_eq!(concept_of(&loaded, &tree, children[0]).as_deref(), Some("ex:Cash"));
    assert_eq!(concept_of(&loaded, &tree, children[1]).as_deref(), Some("ex:Receivables"));

    let leaves: Vec<String> = tree
        .leaf_nodes(root)
        .into_iter()
        .filter_map(|leaf| concept_of(&loaded, &tree, leaf))
        .collect();
    assert_eq!(leaves, vec!["ex:Cash", "ex:TradeReceivables"]);
}

#[test]
fn given_generated_nodes_when_built_then_parent_is_classified() {
    let loaded = load(BALANCE_SHEET);

    let (tree, axes) = build(&loaded, "bs");

    let relationship = tree.node(axes.x[0]).unwrap().children[0];
    let source = tree.node(relationship).unwrap().children[0];
    assert_eq!(tree.node(source).unwrap().subtree_roll_up, RollUp::ChildFirst);
    let cash = tree.node(source).unwrap().children[0];
    assert_eq!(tree.node(cash).unwrap().subtree_roll_up, RollUp::NotAnalyzed);
}

#[test]
fn given_dimension_relationship_when_built_then_children_carry_members() {
    let loaded = load(BALANCE_SHEET);

    let (tree, axes) = build(&loaded, "bs");

    let regions = tree.node(axes.y[0]).unwrap().children[0];
    let state = tree.node(regions).unwrap().resolved().cloned().unwrap();
    assert_eq!(state.covered_dimension.map(|d| d.to_string()).as_deref(), Some("ex:Region"));

    let pass = loaded.pass(&tree);
    let mut ctx = EvalContext::new();
    let region = Aspect::Dimension(rendr::domain::QName::parse("ex:Region").unwrap());
    let members: Vec<String> = tree
        .node(regions)
        .unwrap()
        .children
        .iter()
        .map(|&child| pass.aspect_value(&mut ctx, child, &region).unwrap().unwrap().to_string())
        .collect();
    assert_eq!(members, vec!["ex:North", "ex:South"]);
}

#[test]
fn given_two_z_children_when_built_then_become_choices_of_one_node() {
    let loaded = load(BALANCE_SHEET);

    let (mut tree, axes) = build(&loaded, "bs");

    let z_children = tree.node(axes.z[0]).unwrap().children.clone();
    assert_eq!(z_children.len(), 1);
    let owner = z_children[0];
    assert_eq!(tree.node(owner).unwrap().choices.len(), 2);

    // x and y roots inherit from the first z leaf
    assert_eq!(tree.node(axes.x[0]).unwrap().z_inheritance, Some(owner));
    assert_eq!(tree.node(axes.y[0]).unwrap().z_inheritance, Some(owner));

    let instant = |tree: &StructuralTree| {
        let pass = loaded.pass(tree);
        pass.aspect_value(&mut EvalContext::new(), owner, &Aspect::Instant)
            .unwrap()
            .map(|v| v.to_string())
    };
    assert_eq!(instant(&tree).as_deref(), Some("2021-01-01T00:00:00"));

    tree.select_choice(owner, 1).unwrap();
    assert_eq!(instant(&tree).as_deref(), Some("2022-01-01T00:00:00"));
    assert!(tree.select_choice(owner, 2).is_err());
}

/// z: two alternatives with disjoint aspects, then a grouping alternative
/// whose roll-up child carries the header.
const CHOICES: &str = r#"
[[concepts]]
name = "ex:Region"
is_dimension = true
is_item = false

[[tables]]
id = "pages"
[[tables.breakdowns]]
id = "pages.z"
ordinate = "z"

[[tables.breakdowns.nodes]]
id = "by-concept"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { concept = "ex:Revenue" }

[[tables.breakdowns.nodes]]
id = "by-region"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { "ex:Region" = "ex:North" }

[[tables]]
id = "grouped"
[[tables.breakdowns]]
id = "grouped.z"
ordinate = "z"

[[tables.breakdowns.nodes]]
id = "grp"
kind = "composition"
[[tables.breakdowns.nodes.children]]
id = "part"
kind = "rule"
[[tables.breakdowns.nodes.children.rules]]
values = { concept = "ex:Part" }
[[tables.breakdowns.nodes.children]]
id = "sum"
kind = "rule"
roll_up = true

[[tables.breakdowns.nodes]]
id = "other"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { concept = "ex:Other" }

[[labels]]
concept = "ex:Revenue"
lang = "en"
text = "Revenue"

[[labels]]
concept = "ex:North"
lang = "en"
text = "North"

[[labels]]
concept = "ex:Other"
lang = "en"
text = "Other"

[[labels]]
definition = "sum"
text = "Total"
"#;

#[test]
fn given_choice_with_disjoint_alternatives_when_switching_then_only_selected_aspects_are_visible() {
    let loaded = load(CHOICES);
    let (mut tree, axes) = build(&loaded, "pages");
    let owner = tree.node(axes.z[0]).unwrap().children[0];
    let region = Aspect::Dimension(rendr::domain::QName::parse("ex:Region").unwrap());

    let observe = |tree: &StructuralTree| {
        let pass = loaded.pass(tree);
        let mut ctx = EvalContext::new();
        (
            pass.has_aspect(owner, &Aspect::Concept, false).unwrap(),
            pass.has_aspect(owner, &region, false).unwrap(),
            pass.aspect_value(&mut ctx, owner, &Aspect::Concept).unwrap().map(|v| v.to_string()),
            pass.aspect_value(&mut ctx, owner, &region).unwrap().map(|v| v.to_string()),
            pass.header(&mut ctx, owner, HeaderRequest::default()).unwrap(),
        )
    };

    assert_eq!(
        observe(&tree),
        (true, false, Some("ex:Revenue".to_string()), None, Some("Revenue".to_string()))
    );

    tree.select_choice(owner, 1).unwrap();
    assert_eq!(
        observe(&tree),
        (false, true, None, Some("ex:North".to_string()), Some("North".to_string()))
    );

    tree.select_choice(owner, 0).unwrap();
    assert_eq!(observe(&tree).4.as_deref(), Some("Revenue"));
}

#[test]
fn given_choice_when_header_requested_then_matches_selected_alternative() {
    let loaded = load(CHOICES);
    let (mut tree, axes) = build(&loaded, "grouped");
    let owner = tree.node(axes.z[0]).unwrap().children[0];

    for index in 0..2 {
        tree.select_choice(owner, index).unwrap();
        let alternative = tree.active(owner);
        let pass = loaded.pass(&tree);
        let mut ctx = EvalContext::new();

        let from_owner = pass.header(&mut ctx, owner, HeaderRequest::default()).unwrap();
        let from_alternative = pass.header(&mut ctx, alternative, HeaderRequest::default()).unwrap();

        assert_eq!(from_owner, from_alternative, "alternative {}", index);
    }

    tree.select_choice(owner, 0).unwrap();
    let header = loaded
        .pass(&tree)
        .header(&mut EvalContext::new(), owner, HeaderRequest::default())
        .unwrap();
    assert_eq!(header.as_deref(), Some("Total"));
}

#[test]
fn given_unknown_table_when_looked_up_then_table_not_found() {
    let loaded = load(BALANCE_SHEET);

    let result = loaded.tables(Some("nope"));

    let err = result.unwrap_err();
    assert!(err.to_string().contains("table not found: nope"), "got: {}", err);
}

#[test]
fn given_aspect_node_when_built_then_partitions_facts_by_member() {
    let loaded = load(
        r#"
[[concepts]]
name = "ex:Region"
is_dimension = true
is_item = false

[[tables]]
id = "t"
[[tables.breakdowns]]
id = "t.y"
ordinate = "y"
[[tables.breakdowns.nodes]]
id = "by-region"
kind = "aspect"
aspect = "ex:Region"

[[facts]]
id = "f1"
concept = "ex:Cash"
dimensions = { "ex:Region" = "ex:North" }
[[facts]]
id = "f2"
concept = "ex:Cash"
dimensions = { "ex:Region" = "ex:South" }
[[facts]]
id = "f3"
concept = "ex:Debt"
dimensions = { "ex:Region" = "ex:North" }
[[facts]]
id = "f4"
concept = "ex:Cash"
"#,
    );

    let (tree, axes) = build(&loaded, "t");

    let node = tree.node(axes.y[0]).unwrap().children[0];
    let partitions = tree.node(node).unwrap().children.clone();
    let bound: Vec<String> = partitions
        .iter()
        .map(|&p| tree.node(p).unwrap().context_fact.clone().unwrap().to_string())
        .collect();
    // f4 reports no region and is dropped; f3 joins f1's group
    assert_eq!(bound, vec!["f1", "f2"]);
}

#[test]
fn given_tuple_node_when_built_then_one_child_per_tuple_fact() {
    let loaded = load(
        r#"
[[tables]]
id = "t"
[[tables.breakdowns]]
id = "t.y"
ordinate = "y"
[[tables.breakdowns.nodes]]
id = "addresses"
kind = "tuple"
[[tables.breakdowns.nodes.rules]]
values = { concept = "ex:Address" }

[[facts]]
id = "a1"
concept = "ex:Address"
tuple = true
[[facts]]
id = "a2"
concept = "ex:Address"
tuple = true
[[facts]]
id = "plain"
concept = "ex:Address"
[[facts]]
id = "other"
concept = "ex:Phone"
tuple = true
"#,
    );

    let (tree, axes) = build(&loaded, "t");

    let node = tree.node(axes.y[0]).unwrap().children[0];
    let bound: Vec<String> = tree
        .node(node)
        .unwrap()
        .children
        .iter()
        .map(|&c| tree.node(c).unwrap().context_fact.clone().unwrap().to_string())
        .collect();
    assert_eq!(bound, vec!["a1", "a2"]);

    let pass = loaded.pass(&tree);
    let first = tree.node(node).unwrap().children[0];
    let location = pass.aspect_value(&mut EvalContext::new(), first, &Aspect::Location).unwrap();
    assert!(matches!(location, Some(Value::Fact(id)) if id.to_string() == "a1"));
}

#[test]
fn given_selection_node_when_built_then_binds_variable_from_table_parameter() {
    let loaded = load(
        r#"
[[tables]]
id = "t"
parameters = { year = 2020 }
[[tables.breakdowns]]
id = "t.x"
ordinate = "x"
[[tables.breakdowns.nodes]]
id = "fiscal"
kind = "selection"
select = "concat('FY', $year)"
covered_aspect = "unit"
variable = "label"
"#,
    );

    let (tree, axes) = build(&loaded, "t");

    let node = tree.node(axes.x[0]).unwrap().children[0];
    let structural = tree.node(node).unwrap();
    assert!(structural.selection_binding);
    assert_eq!(structural.variables.get("label"), Some(&Value::text("FY2020")));
}

#[test]
fn given_failing_select_when_built_then_variable_stays_unbound() {
    let loaded = load(
        r#"
[[tables]]
id = "t"
[[tables.breakdowns]]
id = "t.x"
ordinate = "x"
[[tables.breakdowns.nodes]]
id = "broken"
kind = "selection"
select = "error('ex:E1', 'no value')"
covered_aspect = "concept"
variable = "c"
"#,
    );

    let (tree, axes) = build(&loaded, "t");

    let node = tree.node(axes.x[0]).unwrap().children[0];
    assert!(tree.node(node).unwrap().variables.is_empty());
}

#[test]
fn given_roll_up_child_when_built_then_parent_points_at_it() {
    let loaded = load(
        r#"
[[tables]]
id = "t"
[[tables.breakdowns]]
id = "t.y"
ordinate = "y"
[[tables.breakdowns.nodes]]
id = "total"
kind = "rule"
parent_child_order = "children-first"
[[tables.breakdowns.nodes.rules]]
values = { concept = "ex:Total" }

[[tables.breakdowns.nodes.children]]
id = "part"
kind = "rule"
[[tables.breakdowns.nodes.children.rules]]
values = { concept = "ex:Part" }

[[tables.breakdowns.nodes.children]]
id = "sum"
kind = "rule"
roll_up = true

[[tables.breakdowns.nodes]]
id = "group"
kind = "rule"
abstract = true
[[tables.breakdowns.nodes.children]]
id = "member"
kind = "rule"
"#,
    );

    let (tree, axes) = build(&loaded, "t");

    let top = tree.node(axes.y[0]).unwrap().children.clone();
    let (total, group) = (top[0], top[1]);
    let total_node = tree.node(total).unwrap();
    assert_eq!(total_node.subtree_roll_up, RollUp::ChildLast);
    assert_eq!(total_node.roll_up_child, Some(total_node.children[1]));

    assert_eq!(tree.node(group).unwrap().subtree_roll_up, RollUp::ChildrenNoRollUp);
    assert!(tree.is_abstract(group, &loaded.model).unwrap());
}

#[test]
fn given_tagged_rule_sets_when_built_then_selectors_accumulate_down_the_tree() {
    let loaded = load(
        r#"
[[tables]]
id = "t"
[[tables.breakdowns]]
id = "t.y"
ordinate = "y"
[[tables.breakdowns.nodes]]
id = "outer"
kind = "composition"
tag_selector = "audited"
[[tables.breakdowns.nodes.children]]
id = "inner"
kind = "rule"
tag_selector = "restated"
[[tables.breakdowns.nodes.children.rules]]
values = { unit = "iso4217:USD" }
[[tables.breakdowns.nodes.children.rules]]
tag = "audited"
values = { unit = "iso4217:EUR" }
"#,
    );

    let (tree, axes) = build(&loaded, "t");

    let outer = tree.node(axes.y[0]).unwrap().children[0];
    let inner = tree.node(outer).unwrap().children[0];
    let selectors = tree.tag_selectors(inner, &loaded.model).unwrap();
    assert_eq!(selectors.iter().collect::<Vec<_>>(), vec!["audited", "restated"]);

    let pass = loaded.pass(&tree);
    let unit = pass.aspect_value(&mut EvalContext::new(), inner, &Aspect::Unit).unwrap();
    assert_eq!(unit, Some(Value::text("iso4217:EUR")));
}
