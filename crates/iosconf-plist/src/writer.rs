use crate::value::Value;

const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
"#;

/// Encodes `value` as an XML property-list document.
///
/// Nested containers are indented with tabs, matching what Xcode writes.
/// Empty containers use the self-closing form (`<array/>`, `<dict/>`).
pub fn to_xml_string(value: &Value) -> String {
    let mut out = String::from(HEADER);
    write_value(&mut out, value, 0);
    out.push_str("</plist>\n");
    out
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    indent(out, depth);
    match value {
        Value::String(s) => write_scalar(out, "string", &escape(s)),
        Value::Boolean(true) => out.push_str("<true/>\n"),
        Value::Boolean(false) => out.push_str("<false/>\n"),
        Value::Integer(i) => write_scalar(out, "integer", &i.to_string()),
        Value::Real(r) => write_scalar(out, "real", &r.to_string()),
        Value::Date(d) => write_scalar(out, "date", &escape(d)),
        Value::Data(d) => write_scalar(out, "data", &escape(d)),
        Value::Array(items) if items.is_empty() => out.push_str("<array/>\n"),
        Value::Array(items) => {
            out.push_str("<array>\n");
            for item in items {
                write_value(out, item, depth + 1);
            }
            indent(out, depth);
            out.push_str("</array>\n");
        }
        Value::Dictionary(dict) if dict.is_empty() => out.push_str("<dict/>\n"),
        Value::Dictionary(dict) => {
            out.push_str("<dict>\n");
            for (key, item) in dict.iter() {
                indent(out, depth + 1);
                write_scalar(out, "key", &escape(key));
                write_value(out, item, depth + 1);
            }
            indent(out, depth);
            out.push_str("</dict>\n");
        }
    }
}

fn write_scalar(out: &mut String, tag: &str, text: &str) {
    out.push_str(&format!("<{tag}>{text}</{tag}>\n"));
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
