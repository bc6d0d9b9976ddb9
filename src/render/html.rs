use super::Rendered;
use super::dom::{Dom, NodeData, NodeId};

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize a subtree. Live state (typed values, checked, selected) is
/// written back into attributes so the markup reflects what the user sees.
pub fn to_html(dom: &Dom, node: NodeId) -> String {
    let mut out = String::new();
    write_node(dom, node, &mut out);
    out
}

fn write_node(dom: &Dom, node: NodeId, out: &mut String) {
    let Some(n) = dom.node(node) else {
        return;
    };
    let element = match &n.data {
        NodeData::Text(text) => {
            out.push_str(&escape_html(text));
            return;
        }
        NodeData::Element(element) => element,
    };

    let tag = element.tag.as_str();
    let checkable = matches!(dom.input_type(node), Some("checkbox" | "radio"));
    out.push('<');
    out.push_str(tag);
    for (name, value) in &element.attrs {
        match name.as_str() {
            "checked" if checkable => continue,
            "selected" if tag == "option" => continue,
            "value" if tag == "input" && element.live_value().is_some() => continue,
            _ => {}
        }
        write_attr(out, name, value);
    }
    if tag == "input" {
        if let Some(live) = element.live_value() {
            write_attr(out, "value", live);
        }
    }
    if (checkable || tag == "option") && dom.is_checked(node) {
        let name = if tag == "option" { "selected" } else { "checked" };
        write_attr(out, name, "");
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&tag) {
        return;
    }
    match (tag, element.live_value()) {
        ("textarea", Some(live)) => out.push_str(&escape_html(live)),
        _ => {
            for child in dom.children(node) {
                write_node(dom, *child, out);
            }
        }
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    if !value.is_empty() {
        out.push_str("=\"");
        out.push_str(&escape_html(value));
        out.push('"');
    }
}

/// Render a self-contained page holding the form and its data document.
///
/// Built with `replace` rather than `format!()` so the CSS braces need no
/// escaping.
pub fn render_html_page(rendered: &Rendered) -> anyhow::Result<String> {
    let json = serde_json::to_string(rendered.document())?.replace("</", "<\\/");

    const TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>__TITLE__</title>
<style>
  body { font-family: system-ui, -apple-system, Segoe UI, Roboto, Arial, sans-serif; margin: 0; padding: 16px; }
  .f-row { display: flex; gap: 12px; }
  fieldset.f-row { border: 1px solid #ddd; border-radius: 6px; }
  .f-render-column { flex: 1; }
  .f-field-group { margin-bottom: 12px; }
  .f-field-group > label { display: block; font-size: 14px; color: #333; margin-bottom: 4px; }
  .f-input-group-wrap { border-left: 3px solid #cfe3ff; padding-left: 8px; }
  [hidden] { display: none !important; }
</style>
</head>
<body>
__FORM__
<script type="application/json" id="formeo-data">__DATA__</script>
</body>
</html>
"#;

    Ok(TEMPLATE
        .replace("__TITLE__", &escape_html(&rendered.document().id))
        .replace("__FORM__", &rendered.to_html())
        .replace("__DATA__", &json))
}
