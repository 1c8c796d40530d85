use journey_flow::{
    condition::Condition,
    loader::{load_flow_from_path, load_flow_from_str},
    model::{HttpMethod, NodeKind},
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;

#[test]
fn loads_signup_fixture() {
    let flow = load_flow_from_path(Path::new("tests/data/signup.json")).unwrap();
    assert_eq!(flow.id, "signup");
    assert_eq!(flow.title.as_deref(), Some("Newsletter signup"));
    assert_eq!(flow.graph.nodes.len(), 4);
    assert_eq!(flow.graph.edges.len(), 4);

    let check = flow.graph.node("B").unwrap();
    assert_eq!(check.kind, NodeKind::ApiCondition);
    let api = check.data.api.as_ref().unwrap();
    assert_eq!(api.method, HttpMethod::Post);
    assert_eq!(api.body_template.as_deref(), Some(r#"{"email":"{{email}}"}"#));
    assert_eq!(
        check.response_mapping().unwrap().get("status").map(String::as_str),
        Some("result.status")
    );

    let conditioned = flow.graph.edges.iter().find(|e| e.id.as_deref() == Some("e3")).unwrap();
    assert_eq!(conditioned.condition, Some(Condition::equals("status", json!("ok"))));
}

#[test]
fn tagged_and_null_conditions() {
    let flow = load_flow_from_path(Path::new("tests/data/survey.json")).unwrap();
    let out_of_gate: Vec<_> = flow.graph.outgoing("gate").collect();
    assert_eq!(
        out_of_gate[0].condition,
        Some(Condition::equals("answers.adult", json!(true)))
    );
    assert_eq!(out_of_gate[1].condition, None);
}

#[test]
fn node_type_defaults_to_page_and_extra_data_is_kept() {
    let flow = load_flow_from_str(
        r#"{
            "id": "tiny",
            "graph": {
                "nodes": [
                    {"id": "s", "type": "start"},
                    {"id": "p", "data": {"pagePath": "/p", "theme": "dark"}}
                ],
                "edges": [{"source": "s", "target": "p", "condition": "   "}]
            }
        }"#,
    )
    .unwrap();
    let page = flow.graph.node("p").unwrap();
    assert_eq!(page.kind, NodeKind::Page);
    assert_eq!(page.data.extra.get("theme"), Some(&json!("dark")));
    assert!(flow.graph.edges[0].condition.is_none());
}

#[test]
fn dangling_edges_are_left_for_runtime() {
    let flow = load_flow_from_path(Path::new("tests/data/dangling.json")).unwrap();
    assert!(flow.graph.node("ghost").is_none());
}
