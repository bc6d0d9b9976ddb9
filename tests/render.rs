use formeo_core::render::{EventKind, render_html_page};
use formeo_core::{ComponentKey, Components, FormDataDocument, Renderer};
use pretty_assertions::assert_eq;
use serde_json::json;

fn field_in_new_row(components: &mut Components, control: &str) -> ComponentKey {
    let stage = components.first_stage().unwrap();
    components.add_control_to_stage(&stage, control).unwrap()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn saved(components: &Components) -> FormDataDocument {
    FormDataDocument::from_json(&components.json().unwrap()).unwrap()
}

#[test]
fn editor_output_renders_one_named_control_per_field() {
    let mut components = Components::default();
    let field = field_in_new_row(&mut components, "text-input");

    let rendered = Renderer::default().render(&saved(&components));
    let controls = rendered.form_controls();
    assert_eq!(controls.len(), 1);
    let name = format!("f-{}", field.id);
    assert_eq!(rendered.dom().attr(controls[0], "name"), Some(name.as_str()));
    assert_eq!(rendered.dom().attr(controls[0], "id"), Some(name.as_str()));
    assert_eq!(rendered.listener_count(), 0);

    let label = rendered
        .dom()
        .descendants(rendered.root())
        .into_iter()
        .find(|n| rendered.dom().tag(*n) == Some("label"))
        .unwrap();
    assert_eq!(rendered.dom().attr(label, "for"), Some(name.as_str()));
    assert_eq!(rendered.dom().text_content(label), "Input");
}

#[test]
fn editor_conditions_drive_the_rendered_form() {
    let mut components = Components::default();
    let agree = field_in_new_row(&mut components, "checkbox");
    let details = field_in_new_row(&mut components, "text-input");
    components
        .set_address(
            &format!("{}.conditions", agree),
            json!([{
                "if": [{"source": agree.to_string(), "sourceProperty": "isChecked", "comparison": "equals", "target": "true"}],
                "then": [{"target": details.to_string(), "targetProperty": "isNotVisible", "assignment": "equals", "value": true}]
            }]),
        )
        .unwrap();

    let mut rendered = Renderer::default().render(&saved(&components));
    let agree_node = rendered.field(&agree.id).unwrap().node;
    let details_node = rendered.field(&details.id).unwrap().node;
    assert_eq!(rendered.listener_count(), 1);
    assert_eq!(rendered.dom().listeners(agree_node)[0].event, EventKind::Change);
    assert!(rendered.dom().is_visible(details_node));

    let reports = rendered.set_checked(agree_node, true);
    assert_eq!(reports.len(), 1);
    assert!(reports[0].matched);
    assert!(!rendered.dom().is_visible(details_node));

    let data = rendered.user_form_data();
    assert_eq!(data.get(&format!("f-{}", agree.id)), Some(&json!("on")));
}

#[test]
fn input_group_rows_repeat_their_fields() {
    let mut components = Components::default();
    let phone = field_in_new_row(&mut components, "text-input");
    let column = components.parent_key(&phone).unwrap();
    let row = components.parent_key(&column).unwrap();
    components
        .set_address(&format!("{}.config.inputGroup", row), json!(true))
        .unwrap();

    let mut rendered = Renderer::default().render(&saved(&components));
    let row_node = rendered.container(&row.to_string()).unwrap();
    let wrapper = rendered.dom().parent(row_node).unwrap();
    assert!(rendered.dom().has_class(wrapper, "f-input-group-wrap"));
    let add = *rendered.dom().children(wrapper).last().unwrap();
    assert_eq!(rendered.listener_count(), 1);

    rendered.click(add);
    rendered.click(add);
    assert_eq!(rendered.dom().children(wrapper).len(), 4);
    assert_eq!(rendered.form_controls().len(), 3);

    let name = format!("f-{}", phone.id);
    for (i, node) in rendered.form_controls().into_iter().enumerate() {
        rendered.set_value(node, &format!("{}", i));
    }
    assert_eq!(
        rendered.user_form_data().get(&name),
        Some(&json!(["0", "1", "2"]))
    );
    assert_eq!(
        rendered.user_data().get(&name),
        Some(&json!({"label": "Input", "value": ["0", "1", "2"]}))
    );
}

#[test]
fn rendered_page_contains_form_and_document() {
    let mut components = Components::default();
    let field = field_in_new_row(&mut components, "paragraph");
    components
        .set_address(&format!("{}.content", field), json!("Terms apply"))
        .unwrap();

    let document = saved(&components);
    let rendered = Renderer::default().render(&document);
    let node = rendered.field(&field.id).unwrap().node;
    assert_eq!(rendered.dom().tag(node), Some("p"));
    assert!(rendered.form_controls().is_empty());

    let page = render_html_page(&rendered).unwrap();
    assert!(page.contains("<p id=\"f-"));
    assert!(page.contains("Terms apply</p>"));
    assert!(page.contains(&document.id));
}

#[test]
fn loosely_typed_fields_still_render() {
    init_tracing();
    let hide_b = json!({"target": "fields.b", "targetProperty": "isNotVisible", "assignment": "equals", "value": true});
    let document = FormDataDocument::from_value(json!({
        "id": "loose",
        "stages": {"s": {"id": "s", "children": ["r"]}},
        "rows": {"r": {"id": "r", "children": ["c"]}},
        "columns": {"c": {"id": "c", "children": ["a", "b"]}},
        "fields": {
            "a": {"id": "a", "tag": "input", "attrs": {"type": "text"}, "config": {"label": "A"}},
            "b": {
                "id": "b", "tag": "select", "config": {"label": null},
                "options": [
                    {"label": "One", "value": "1"},
                    {"label": "Two", "value": "2", "selected": "true"}
                ],
                "conditions": [
                    "not a rule",
                    {"if": [{"source": "fields.a", "sourceProperty": "value", "comparison": "bogus", "target": "x"}], "then": [hide_b.clone()]},
                    {"if": [{"source": "fields.a", "sourceProperty": "value", "comparison": "equals", "target": "hide"}], "then": [hide_b.clone()]}
                ]
            }
        }
    }))
    .unwrap();

    let mut rendered = Renderer::default().render(&document);
    let a = rendered.field("a").unwrap().node;
    let b = rendered.field("b").unwrap().node;
    assert_eq!(rendered.form_controls().len(), 2);
    assert_eq!(rendered.field("b").unwrap().label, "");
    assert_eq!(rendered.user_form_data().get("f-b"), Some(&json!("2")));
    assert_eq!(rendered.listener_count(), 2);
    assert!(rendered.dom().is_visible(b));

    let reports = rendered.set_value(a, "hide");
    assert_eq!(reports.len(), 2);
    assert_eq!(reports.iter().filter(|r| r.matched).count(), 1);
    assert!(!rendered.dom().is_visible(b));
}

#[test]
fn dangling_children_are_skipped_not_fatal() {
    init_tracing();
    let document = FormDataDocument::from_value(json!({
        "id": "broken",
        "stages": {"s": {"id": "s", "children": ["r", "gone-row"]}},
        "rows": {"r": {"id": "r", "children": ["c"]}},
        "columns": {"c": {"id": "c", "children": ["gone-field", "kept"]}},
        "fields": {"kept": {"id": "kept", "tag": "input", "config": {"label": "Kept"}}}
    }))
    .unwrap();
    assert_eq!(document.integrity().dangling.len(), 2);
    assert!(document.validate().is_err());

    let rendered = Renderer::default().render(&document);
    let stage = rendered.container("stages.s").unwrap();
    assert_eq!(rendered.dom().children(stage).len(), 1);
    assert_eq!(rendered.form_controls().len(), 1);
    assert!(rendered.field("kept").is_some());
}
