//! Tests for header resolution and its fallback order.

use rendr::application::{HeaderRequest, TableAxes};
use rendr::config::Settings;
use rendr::domain::{EvalContext, NodeId, StructuralTree};
use rendr::infrastructure::di::{LoadedDocument, ServiceContainer};
use rendr::infrastructure::document::DocumentLoader;
use rendr::util::testing;

const VERBOSE: &str = "http://www.xbrl.org/2008/role/verboseLabel";

const HEADERS: &str = r#"
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
values = { concept = "ex:Revenue" }

[[tables.breakdowns.nodes]]
id = "cash"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { concept = "ex:Cash" }

[[tables.breakdowns.nodes]]
id = "total"
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
id = "entity"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { entity-identifier = "ACME Corp" }

[[tables.breakdowns.nodes]]
id = "always"
kind = "rule"
[[tables.breakdowns.nodes.rules]]
values = { period = "forever" }

[[tables.breakdowns.nodes]]
id = "pick"
kind = "selection"
select = "'FY2020'"
covered_aspect = "unit"
variable = "fy"

[[tables.breakdowns.nodes]]
id = "pick-msg"
kind = "selection"
select = "'FY2021'"
covered_aspect = "unit"
variable = "fy"

[[tables.breakdowns.nodes]]
id = "group"
kind = "composition"
[[tables.breakdowns.nodes.children]]
id = "plain"
kind = "composition"

[[tables.breakdowns.nodes]]
id = "by-customer"
kind = "aspect"
aspect = "ex:Customer"

[[labels]]
concept = "ex:Cash"
lang = "en"
text = "Cash"

[[labels]]
concept = "ex:Cash"
lang = "de"
text = "Kasse"

[[labels]]
definition = "sum"
text = "Total"

[[labels]]
definition = "group"
role = "http://www.xbrl.org/2008/role/verboseLabel"
text = "Group (verbose)"

[[messages]]
definition = "revenue"
text = "Revenue {year}"
expression = "concat('Revenue ', $year)"

[[messages]]
definition = "pick-msg"
kind = "selection-message"
text = "Fiscal year"

[[facts]]
id = "s1"
concept = "ex:Sales"
typed_dimensions = { "ex:Customer" = "ACME" }
"#;

struct Fixture {
    loaded: LoadedDocument,
    tree: StructuralTree,
    axes: TableAxes,
}

impl Fixture {
    fn new() -> Self {
        testing::init_test_setup();
        let doc = DocumentLoader::parse(HEADERS).expect("parse document");
        let loaded = ServiceContainer::new(Settings::default()).bind(doc);
        let table = loaded.tables(None).unwrap()[0];
        let (tree, axes) = loaded.build(table).expect("build table");
        Self { loaded, tree, axes }
    }

    /// Top-level y node by definition id.
    fn node(&self, id: &str) -> NodeId {
        let definition = self.loaded.model.find(id).unwrap();
        self.tree
            .iter(self.axes.y[0])
            .find(|(_, node)| node.definition == definition)
            .map(|(idx, _)| idx)
            .unwrap()
    }

    fn child(&self, node: NodeId, index: usize) -> NodeId {
        self.tree.node(node).unwrap().children[index]
    }

    fn header(&self, node: NodeId, request: HeaderRequest<'_>) -> Option<String> {
        self.loaded
            .pass(&self.tree)
            .header(&mut EvalContext::new(), node, request)
            .unwrap()
    }
}

#[test]
fn given_message_when_header_requested_then_evaluated_message_wins() {
    let f = Fixture::new();
    let revenue = f.node("revenue");

    assert_eq!(f.header(revenue, HeaderRequest::default()).as_deref(), Some("Revenue 2020"));
    assert_eq!(
        f.header(revenue, HeaderRequest::default().unevaluated()).as_deref(),
        Some("Revenue {year}")
    );
    let format_only = HeaderRequest {
        return_message_format: true,
        ..HeaderRequest::default()
    };
    assert_eq!(f.header(revenue, format_only).as_deref(), Some("Revenue {year}"));
}

#[test]
fn given_role_when_header_requested_then_messages_are_skipped() {
    let f = Fixture::new();
    let revenue = f.node("revenue");

    // no label in that role and no concept label for ex:Revenue
    assert_eq!(f.header(revenue, HeaderRequest::default().with_role(VERBOSE)), None);
}

#[test]
fn given_concept_rule_when_header_requested_then_concept_label_in_language() {
    let f = Fixture::new();
    let cash = f.node("cash");

    assert_eq!(f.header(cash, HeaderRequest::default()).as_deref(), Some("Cash"));
    assert_eq!(f.header(cash, HeaderRequest::default().with_lang("de")).as_deref(), Some("Kasse"));
    assert_eq!(f.header(cash, HeaderRequest::default().with_lang("fr")), None);
}

#[test]
fn given_roll_up_child_when_header_requested_then_delegates_to_it() {
    let f = Fixture::new();
    let total = f.node("total");

    assert_eq!(f.header(total, HeaderRequest::default()).as_deref(), Some("Total"));
}

#[test]
fn given_structured_aspect_when_header_requested_then_inner_text() {
    let f = Fixture::new();

    assert_eq!(f.header(f.node("entity"), HeaderRequest::default()).as_deref(), Some("ACME Corp"));
    assert_eq!(f.header(f.node("always"), HeaderRequest::default()).as_deref(), Some("forever"));
}

#[test]
fn given_selection_without_message_when_header_requested_then_bound_value() {
    let f = Fixture::new();

    assert_eq!(f.header(f.node("pick"), HeaderRequest::default()).as_deref(), Some("FY2020"));
}

#[test]
fn given_selection_message_when_header_requested_then_message_text() {
    let f = Fixture::new();

    assert_eq!(f.header(f.node("pick-msg"), HeaderRequest::default()).as_deref(), Some("Fiscal year"));
}

#[test]
fn given_role_and_no_own_label_when_header_requested_then_falls_back_to_parent() {
    let f = Fixture::new();
    let plain = f.child(f.node("group"), 0);

    assert_eq!(f.header(plain, HeaderRequest::default()), None);
    assert_eq!(
        f.header(plain, HeaderRequest::default().with_role(VERBOSE)).as_deref(),
        Some("Group (verbose)")
    );
}

#[test]
fn given_typed_dimension_partition_when_header_requested_then_member_text() {
    let f = Fixture::new();
    let partition = f.child(f.node("by-customer"), 0);

    assert_eq!(f.header(partition, HeaderRequest::default()).as_deref(), Some("ACME"));
}
