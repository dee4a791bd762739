// SPDX-License-Identifier: MIT

//! Prompt template rendering
//!
//! Templates use `{key}` placeholders filled from a JSON context map.
//! `{{` and `}}` escape literal braces. String values render bare; other
//! values render as compact JSON.

use serde_json::{Map, Value};

use crate::error::StageError;

/// Render `template`, substituting every `{key}` from `context`.
///
/// A placeholder with no matching context key is a
/// [`StageError::MissingKey`]; an unterminated placeholder is a generic
/// stage fault.
pub fn render(template: &str, context: &Map<String, Value>) -> Result<String, StageError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    key.push(c);
                }
                if !closed {
                    return Err(StageError::message(format!(
                        "unterminated placeholder '{{{}' in template",
                        key
                    )));
                }
                match context.get(&key) {
                    Some(value) => out.push_str(&display_value(value)),
                    None => return Err(StageError::MissingKey(key)),
                }
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Human-readable form of a JSON value for prompt text
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
