//! Tests for the aspect cascade: override resolution, DIMENSIONS union,
//! OMIT-DIMENSIONS, tagged constraint sets and period typing.

use std::collections::BTreeSet;

use rstest::rstest;

use rendr::application::TableAxes;
use rendr::config::Settings;
use rendr::domain::{Aspect, EvalContext, NodeId, QName, StructuralTree, Value};
use rendr::infrastructure::di::{LoadedDocument, ServiceContainer};
use rendr::infrastructure::document::DocumentLoader;
use rendr::util::testing;

/// y axis: revenue (concept, region) -> actual (scenario) -> no-region (omit region)
///                                   -> computed (expression concept)
///                                   -> audited-only (tagged set only)
const CASCADE: &str = r#"
[[tables]]
id = "t"
parameters = { year = 2020 }

[[tables.breakdowns]]
id = "t.y"
ordinate = "y"

[[tables.breakdowns.nodes]]
id = "revenue"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { concept = "ex:Revenue", "ex:Region" = "ex:North", unit = "iso4217:EUR" }

[[tables.breakdowns.nodes.children]]
id = "actual"
kind = "rule"
[[tables.breakdowns.nodes.children.rules]]
values = { "ex:Scenario" = "ex:Actual" }

[[tables.breakdowns.nodes.children.children]]
id = "no-region"
kind = "rule"
[[tables.breakdowns.nodes.children.children.rules]]
omit = ["ex:Region"]

[[tables.breakdowns.nodes.children]]
id = "computed"
kind = "rule"
[[tables.breakdowns.nodes.children.rules]]
expressions = { concept = "qname(concat('ex:Revenue', $year))", unit = "error('ex:E', 'no unit')" }

[[tables.breakdowns.nodes.children]]
id = "audited-only"
kind = "rule"
[[tables.breakdowns.nodes.children.rules]]
tag = "audited"
values = { concept = "ex:AuditedRevenue" }
"#;

fn load(text: &str) -> LoadedDocument {
    testing::init_test_setup();
    let doc = DocumentLoader::parse(text).expect("parse document");
    ServiceContainer::new(Settings::default()).bind(doc)
}

fn build(loaded: &LoadedDocument) -> (StructuralTree, TableAxes) {
    let table = loaded.tables(None).unwrap()[0];
    loaded.build(table).expect("build table")
}

fn qn(s: &str) -> QName {
    QName::parse(s).unwrap()
}

/// Follow child indices down from `root`.
fn node_at(tree: &StructuralTree, root: NodeId, path: &[usize]) -> NodeId {
    path.iter()
        .fold(root, |node, &i| tree.node(node).unwrap().children[i])
}

fn value(loaded: &LoadedDocument, tree: &StructuralTree, node: NodeId, aspect: &Aspect) -> Option<Value> {
    loaded
        .pass(tree)
        .aspect_value(&mut EvalContext::new(), node, aspect)
        .unwrap()
}

#[test]
fn given_child_without_concept_when_resolved_then_inherits_from_parent() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);

    let actual = node_at(&tree, axes.y[0], &[0, 0]);

    assert_eq!(value(&loaded, &tree, actual, &Aspect::Concept), Some(Value::QName(qn("ex:Revenue"))));
    assert_eq!(value(&loaded, &tree, actual, &Aspect::Unit), Some(Value::text("iso4217:EUR")));
}

#[test]
fn given_no_inheritance_when_resolved_then_only_own_aspects() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);
    let actual = node_at(&tree, axes.y[0], &[0, 0]);
    let pass = loaded.pass(&tree);

    let concept = pass
        .aspect_value_with(&mut EvalContext::new(), actual, &Aspect::Concept, false, None)
        .unwrap();

    assert_eq!(concept, None);
    assert!(pass.has_aspect(actual, &Aspect::Concept, true).unwrap());
    assert!(!pass.has_aspect(actual, &Aspect::Concept, false).unwrap());
}

#[test]
fn given_nested_dimension_rules_when_resolved_then_dimensions_accumulate() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);

    let actual = node_at(&tree, axes.y[0], &[0, 0]);

    let expected: BTreeSet<QName> = [qn("ex:Region"), qn("ex:Scenario")].into_iter().collect();
    assert_eq!(value(&loaded, &tree, actual, &Aspect::Dimensions), Some(Value::Dimensions(expected)));
}

#[test]
fn given_omitted_dimension_when_resolved_then_removed_from_dimensions() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);

    let no_region = node_at(&tree, axes.y[0], &[0, 0, 0]);

    let expected: BTreeSet<QName> = [qn("ex:Scenario")].into_iter().collect();
    assert_eq!(value(&loaded, &tree, no_region, &Aspect::Dimensions), Some(Value::Dimensions(expected)));
    assert_eq!(
        value(&loaded, &tree, no_region, &Aspect::OmitDimensions),
        Some(Value::Dimensions([qn("ex:Region")].into_iter().collect()))
    );
}

#[test]
fn given_expression_rule_when_resolved_then_evaluates_in_scope() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);

    let computed = node_at(&tree, axes.y[0], &[0, 1]);

    assert_eq!(
        value(&loaded, &tree, computed, &Aspect::Concept),
        Some(Value::QName(qn("ex:Revenue2020")))
    );
}

#[test]
fn given_failing_rule_expression_when_resolved_then_recovers_to_empty_text() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);

    let computed = node_at(&tree, axes.y[0], &[0, 1]);

    assert_eq!(value(&loaded, &tree, computed, &Aspect::Unit), Some(Value::empty()));
}

#[test]
fn given_only_tagged_set_without_selector_when_resolved_then_falls_through_to_parent() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);

    let audited_only = node_at(&tree, axes.y[0], &[0, 2]);

    assert_eq!(value(&loaded, &tree, audited_only, &Aspect::Concept), Some(Value::QName(qn("ex:Revenue"))));
}

#[test]
fn given_explicit_selectors_when_resolved_then_tagged_set_wins() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);
    let audited_only = node_at(&tree, axes.y[0], &[0, 2]);
    let selectors = ["audited"].into_iter().collect();

    let concept = loaded
        .pass(&tree)
        .aspect_value_with(&mut EvalContext::new(), audited_only, &Aspect::Concept, true, Some(&selectors))
        .unwrap();

    assert_eq!(concept, Some(Value::QName(qn("ex:AuditedRevenue"))));
}

#[test]
fn given_leaf_when_listing_resolved_aspects_then_own_first_then_inherited() {
    let loaded = load(CASCADE);
    let (tree, axes) = build(&loaded);
    let actual = node_at(&tree, axes.y[0], &[0, 0]);

    let aspects: Vec<Aspect> = loaded
        .pass(&tree)
        .resolved_aspects(&mut EvalContext::new(), actual)
        .unwrap()
        .into_iter()
        .map(|(aspect, _)| aspect)
        .collect();

    assert_eq!(aspects[0], Aspect::Dimension(qn("ex:Scenario")));
    assert!(aspects.contains(&Aspect::Concept));
    assert!(aspects.contains(&Aspect::Unit));
    assert!(aspects.contains(&Aspect::Dimension(qn("ex:Region"))));
}

fn period_document(aspect: &str, text: &str) -> String {
    format!(
        r#"
[[tables]]
id = "t"
[[tables.breakdowns]]
id = "t.x"
ordinate = "x"
[[tables.breakdowns.nodes]]
id = "p"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = {{ {} = "{}" }}
"#,
        aspect, text
    )
}

#[rstest]
#[case("period-instant", "2020-12-31", Some("2021-01-01T00:00:00"))]
#[case("period-end", "2020-12-31", Some("2021-01-01T00:00:00"))]
#[case("period-instant-end", "2020-12-31", Some("2021-01-01T00:00:00"))]
#[case("period-start", "2020-01-01", Some("2020-01-01T00:00:00"))]
#[case("period-end", "2020-12-31T12:00:00", Some("2020-12-31T12:00:00"))]
#[case("period-instant", "2020-13-45", None)]
fn given_period_rule_when_resolved_then_typed(
    #[case] token: &str,
    #[case] text: &str,
    #[case] expected: Option<&str>,
) {
    let loaded = load(&period_document(token, text));
    let (tree, axes) = build(&loaded);
    let node = node_at(&tree, axes.x[0], &[0]);
    let aspect: Aspect = token.parse().unwrap();

    let resolved = value(&loaded, &tree, node, &aspect);

    assert_eq!(resolved.map(|v| v.to_string()).as_deref(), expected);
    if expected.is_some() {
        assert!(matches!(value(&loaded, &tree, node, &aspect), Some(Value::DateTime(_))));
    }
}

#[test]
fn given_local_omit_override_when_resolving_dimensions_then_omitted_dimension_is_removed() {
    let loaded = load(CASCADE);
    let (mut tree, axes) = build(&loaded);
    let actual = node_at(&tree, axes.y[0], &[0, 0]);
    let region = qn("ex:Region");
    tree.set_aspect(
        actual,
        Aspect::OmitDimensions,
        Value::Dimensions([region.clone()].into_iter().collect()),
    )
    .unwrap();

    let dims = value(&loaded, &tree, actual, &Aspect::Dimensions);
    let omit = value(&loaded, &tree, actual, &Aspect::OmitDimensions);

    assert_eq!(dims, Some(Value::Dimensions([qn("ex:Scenario")].into_iter().collect())));
    assert_eq!(omit, Some(Value::Dimensions([region].into_iter().collect())));
}
