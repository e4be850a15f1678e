//! Page probes: result snapshot, failure banners and error text
//!
//! Every probe is a read-only script. Absence of what a probe looks for is
//! a normal answer, never an error.

use flowpilot_core::Snapshot;
use serde_json::Value;

use crate::locator::js_str;

/// Media sources of the first list row that contains any `<video>`
pub fn snapshot_script(tile_container: &str) -> String {
    format!(
        r#"(() => {{
  const rows = Array.from(document.querySelectorAll({rows}));
  const row = rows.find((r) => r.querySelectorAll('video').length > 0);
  if (!row) return JSON.stringify([]);
  const urls = [];
  for (const v of row.querySelectorAll('video')) {{
    const src = v.getAttribute('src') || v.currentSrc || '';
    if (src) urls.push(src);
  }}
  return JSON.stringify(urls);
}})()"#,
        rows = js_str(tile_container)
    )
}

/// Decode what [`snapshot_script`] returned
///
/// Anything that is not a list of strings reads as an empty snapshot, as a
/// row being remounted mid-read would.
pub fn parse_snapshot(value: &Value) -> Snapshot {
    let decoded;
    let list = match value {
        Value::String(json) => match serde_json::from_str::<Value>(json) {
            Ok(v) => {
                decoded = v;
                &decoded
            }
            Err(_) => return Snapshot::empty(),
        },
        other => other,
    };

    match list {
        Value::Array(items) => Snapshot::new(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => Snapshot::empty(),
    }
}

/// True when some visible element shows `text`
pub fn visible_text_script(text: &str) -> String {
    format!(
        r#"(() => {{
  const needle = {needle}.toLowerCase();
  const visible = (el) => {{
    const r = el.getBoundingClientRect();
    if (r.width === 0 && r.height === 0) return false;
    const st = getComputedStyle(el);
    return st.visibility !== 'hidden' && st.display !== 'none';
  }};
  return Array.from(document.querySelectorAll('body *')).some((el) =>
    (el.textContent || '').toLowerCase().includes(needle)
    && !Array.from(el.children).some((c) => (c.textContent || '').toLowerCase().includes(needle))
    && visible(el));
}})()"#,
        needle = js_str(text)
    )
}

/// Full visible text of the page
pub const BODY_TEXT_SCRIPT: &str = "document.body ? document.body.innerText : ''";

/// Text of the first visible element matching the error banner selector
pub fn error_banner_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const el = Array.from(document.querySelectorAll({sel})).find((e) => {{
    const r = e.getBoundingClientRect();
    return r.width > 0 || r.height > 0;
  }});
  return el ? (el.textContent || '') : null;
}})()"#,
        sel = js_str(selector)
    )
}

/// Keep alert text that looks like a real message
///
/// Short fragments and the bare product name show up in alert regions
/// without meaning anything.
pub fn classify_alert(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if text.chars().count() <= 5 || trimmed.eq_ignore_ascii_case("flow") {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_snapshot_from_json_string() {
        let value = Value::String(r#"["blob:a","https://x/b.mp4"]"#.to_string());
        assert_eq!(
            parse_snapshot(&value),
            Snapshot::from(vec!["blob:a", "https://x/b.mp4"])
        );
    }

    #[test]
    fn test_parse_snapshot_skips_empty_and_non_strings() {
        let value = json!(["a", "", 3, null, "b"]);
        assert_eq!(parse_snapshot(&value), Snapshot::from(vec!["a", "b"]));
    }

    #[test]
    fn test_parse_snapshot_garbage_is_empty() {
        assert!(parse_snapshot(&Value::Null).is_empty());
        assert!(parse_snapshot(&Value::String("not json".to_string())).is_empty());
        assert!(parse_snapshot(&json!({"urls": ["a"]})).is_empty());
    }

    #[test]
    fn test_snapshot_script_uses_container() {
        let script = snapshot_script("[data-virtuoso-scroller] [data-index]");
        assert!(script.contains(r#"document.querySelectorAll("[data-virtuoso-scroller] [data-index]")"#));
        assert!(script.contains("currentSrc"));
    }

    #[test]
    fn test_classify_alert() {
        assert_eq!(classify_alert("Flow"), None);
        assert_eq!(classify_alert("  flow  "), None);
        assert_eq!(classify_alert("Oops"), None);
        assert_eq!(
            classify_alert(" Something went wrong \n"),
            Some("Something went wrong".to_string())
        );
    }

    #[test]
    fn test_visible_text_script_quotes_needle() {
        let script = visible_text_script("Failed Generation");
        assert!(script.contains(r#""Failed Generation".toLowerCase()"#));
    }
}
