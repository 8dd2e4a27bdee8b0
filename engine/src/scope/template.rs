//! Prompt template rendering
//!
//! Placeholders have the form `{{ name }}`. A name is looked up as a whole
//! key first (so reserved keys such as `tool:Read` work), then as a dotted
//! path into nested objects (`{{user.name}}`). String values are inserted
//! raw, anything else as compact JSON. Unknown placeholders are left in the
//! output verbatim.

use super::Variables;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder_pattern() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.:\-]+)\s*\}\}").expect("Invalid placeholder pattern")
    })
}

/// Resolve a placeholder name against the variables
pub fn lookup<'a>(variables: &'a Variables, name: &str) -> Option<&'a Value> {
    if let Some(value) = variables.get(name) {
        return Some(value);
    }

    let mut segments = name.split('.');
    let mut current = variables.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Substitute every resolvable placeholder in `template`
pub fn render(template: &str, variables: &Variables) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| match lookup(variables, &caps[1]) {
            Some(value) => value_to_text(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder names in `template` that `variables` cannot resolve
pub fn unresolved(template: &str, variables: &Variables) -> Vec<String> {
    placeholder_pattern()
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .filter(|name| lookup(variables, name).is_none())
        .collect()
}
