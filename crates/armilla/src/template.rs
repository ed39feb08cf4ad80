//! The bracket-interpolation mini-language for display content.
//!
//! A template like `"[name]: [value]"` substitutes each `[field]`
//! placeholder with the live field value. A placeholder that does not
//! resolve is left untouched in the output, literal brackets included, so
//! partially inconsistent data degrades visibly instead of failing.
//!
//! Link label templates additionally support a `target.` prefix
//! (`"[target.weight]"`), which the caller maps to the edge's raw target
//! descriptor instead of the resolved element; this module only hands the
//! full placeholder name to the lookup.

use serde_json::Value;

/// Resolves every `[field]` placeholder through `lookup`.
pub fn resolve<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];

        match after_open.find(']') {
            Some(close) => {
                let name = &after_open[..close];
                match lookup(name) {
                    Some(text) => output.push_str(&text),
                    None => {
                        // Unresolved placeholder stays literal
                        output.push('[');
                        output.push_str(name);
                        output.push(']');
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                // Unterminated bracket: emit the remainder verbatim
                output.push_str(&rest[open..]);
                return output;
            }
        }
    }

    output.push_str(rest);
    output
}

/// Renders a JSON field value as display text.
///
/// Strings render bare (no quotes), numbers and booleans via their display
/// form. `null`, arrays and objects have no display form and resolve to
/// `None`, leaving the placeholder literal.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
