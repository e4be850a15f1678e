//! Element locators evaluated in the page
//!
//! A [`Locator`] compiles to a self-contained script that finds the first
//! matching element, optionally tags it with [`MARK_ATTRIBUTE`] so it can be
//! clicked through CDP, and reports its state as JSON.

use serde::Deserialize;

/// Attribute set on the element a locator resolved to
pub const MARK_ATTRIBUTE: &str = "data-flowpilot-mark";

/// CSS selector of the currently marked element
pub const MARKED_SELECTOR: &str = r#"[data-flowpilot-mark="target"]"#;

/// How candidates are collected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Plain CSS selector
    Css(String),
    /// ARIA role, optionally filtered by accessible name (substring)
    Role { role: String, name: Option<String> },
    /// Form control whose placeholder contains the text
    Placeholder(String),
    /// Innermost element whose text contains the string
    Text(String),
    /// The dropdown control belonging to a visible label
    LabelledDropdown(String),
}

/// Restrict the search to the dialog containing some text, if there is one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogScope {
    pub has_text: String,
}

/// Something to find on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    target: Target,
    has_text: Option<String>,
    scope: Option<DialogScope>,
}

/// What a locator resolved to
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementState {
    pub found: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub text: Option<String>,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::from_target(Target::Css(selector.into()))
    }

    /// `button` or `[role=button]` whose name contains `name`
    pub fn button(name: impl Into<String>) -> Self {
        Self::role("button", Some(name.into()))
    }

    pub fn role(role: &str, name: Option<String>) -> Self {
        Self::from_target(Target::Role {
            role: role.to_string(),
            name,
        })
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::from_target(Target::Placeholder(text.into()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_target(Target::Text(text.into()))
    }

    pub fn labelled_dropdown(label: impl Into<String>) -> Self {
        Self::from_target(Target::LabelledDropdown(label.into()))
    }

    /// Keep only candidates whose text contains `text`
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.has_text = Some(text.into());
        self
    }

    /// Search inside the dialog showing `text`, or the whole page without one
    pub fn in_dialog_with(mut self, text: impl Into<String>) -> Self {
        self.scope = Some(DialogScope {
            has_text: text.into(),
        });
        self
    }

    fn from_target(target: Target) -> Self {
        Self {
            target,
            has_text: None,
            scope: None,
        }
    }

    /// Human-readable description for logs and errors
    pub fn describe(&self) -> String {
        let mut out = match &self.target {
            Target::Css(css) => css.clone(),
            Target::Role { role, name: Some(n) } => format!("{}[name~=\"{}\"]", role, n),
            Target::Role { role, name: None } => role.clone(),
            Target::Placeholder(p) => format!("[placeholder~=\"{}\"]", p),
            Target::Text(t) => format!("text=\"{}\"", t),
            Target::LabelledDropdown(l) => format!("dropdown \"{}\"", l),
        };
        if let Some(text) = &self.has_text {
            out.push_str(&format!(" has-text \"{}\"", text));
        }
        if let Some(scope) = &self.scope {
            out = format!("dialog \"{}\" >> {}", scope.has_text, out);
        }
        out
    }

    /// Script returning the JSON-encoded [`ElementState`] of the first match
    ///
    /// With `mark` set, the match (and only the match) carries
    /// `data-flowpilot-mark="target"` afterwards.
    pub fn script(&self, mark: bool) -> String {
        format!(
            r#"(() => {{
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const textOf = (el) => el.innerText || el.textContent || '';
  const nameOf = (el) => norm(el.getAttribute('aria-label') || textOf(el) || el.value || '');
  const visible = (el) => {{
    if (!el || !el.isConnected) return false;
    const r = el.getBoundingClientRect();
    if (r.width === 0 && r.height === 0) return false;
    const st = getComputedStyle(el);
    return st.visibility !== 'hidden' && st.display !== 'none';
  }};
  const roleSelector = (role) => {{
    if (role === 'button') return 'button, [role="button"]';
    if (role === 'combobox') return 'select, [role="combobox"]';
    if (role === 'dialog') return 'dialog, [role="dialog"]';
    return '[role="' + role + '"]';
  }};
  const byRole = (root, role, name) => Array.from(root.querySelectorAll(roleSelector(role)))
    .filter((el) => name === null || nameOf(el).includes(norm(name)));
  const innermost = (root, pred) => Array.from(root.querySelectorAll('*'))
    .filter((el) => pred(norm(el.textContent)) && !Array.from(el.children).some((c) => pred(norm(c.textContent))));
  const scopeText = {scope};
  let roots = [document];
  if (scopeText !== null) {{
    const dialogs = byRole(document, 'dialog', null).filter((d) => norm(d.textContent).includes(norm(scopeText)));
    if (dialogs.length > 0) roots = [dialogs[0]];
  }}
  const collect = (root) => {{
{collect}
  }};
  const hasText = {has_text};
  let matches = [];
  for (const root of roots) matches = matches.concat(collect(root));
  matches = matches.filter((el, i) => el && matches.indexOf(el) === i);
  if (hasText !== null) matches = matches.filter((el) => norm(textOf(el)).includes(norm(hasText)));
  const el = matches.length > 0 ? matches[0] : null;
  if ({mark}) {{
    document.querySelectorAll('[{attr}]').forEach((m) => m.removeAttribute('{attr}'));
    if (el) el.setAttribute('{attr}', 'target');
  }}
  return JSON.stringify({{
    found: el !== null,
    count: matches.length,
    visible: visible(el),
    enabled: el !== null && !el.disabled && el.getAttribute('aria-disabled') !== 'true',
    text: el ? textOf(el) : null,
  }});
}})()"#,
            scope = js_opt(self.scope.as_ref().map(|s| s.has_text.as_str())),
            collect = self.collect_body(),
            has_text = js_opt(self.has_text.as_deref()),
            mark = mark,
            attr = MARK_ATTRIBUTE,
        )
    }

    fn collect_body(&self) -> String {
        match &self.target {
            Target::Css(css) => format!(
                "    return Array.from(root.querySelectorAll({}));",
                js_str(css)
            ),
            Target::Role { role, name } => format!(
                "    return byRole(root, {}, {});",
                js_str(role),
                js_opt(name.as_deref())
            ),
            Target::Placeholder(p) => format!(
                "    return Array.from(root.querySelectorAll('[placeholder]')).filter((el) => norm(el.getAttribute('placeholder')).includes(norm({})));",
                js_str(p)
            ),
            Target::Text(t) => format!(
                "    const t = norm({});\n    return innermost(root, (s) => s.includes(t));",
                js_str(t)
            ),
            Target::LabelledDropdown(label) => format!(
                r#"    const label = {label};
    let found = byRole(root, 'button', label);
    if (found.length === 0) found = byRole(root, 'combobox', label);
    if (found.length === 0) {{
      const exact = innermost(root, (s) => s === norm(label));
      for (const l of exact) {{
        const b = l.parentElement && l.parentElement.querySelector('button, [role="button"]');
        if (b) {{ found = [b]; break; }}
      }}
    }}
    if (found.length === 0) {{
      const loose = innermost(root, (s) => s.includes(norm(label)));
      if (loose.length > 0) {{
        const anc = loose[0].closest('button, [role="button"], [role="combobox"]');
        found = [anc || loose[0]];
      }}
    }}
    return found;"#,
                label = js_str(label)
            ),
        }
    }
}

/// Quote a string as a JavaScript string literal
pub(crate) fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn js_opt(s: Option<&str>) -> String {
    s.map(js_str).unwrap_or_else(|| "null".to_string())
}
