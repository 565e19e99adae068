//! `${KEY}` placeholder expansion.
//!
//! Placeholders resolve through the same precedence walk as direct lookups.
//! `${KEY:-fallback}` supplies literal text for an unresolved key and `$${`
//! produces a literal `${`. Keys currently being expanded are tracked on a
//! stack; meeting one again is a circular reference.

use super::{Chipmunk, merge, value_to_text};
use crate::ChipmunkError;
use log::debug;
use serde_json::Value;

const OPEN: &str = "${";
const ESCAPED_OPEN: &str = "$${";
const FALLBACK_MARKER: &str = ":-";

pub(super) struct Expander<'a> {
    chipmunk: &'a Chipmunk,
    stack: Vec<String>,
}

impl<'a> Expander<'a> {
    pub(super) fn new(chipmunk: &'a Chipmunk) -> Self {
        Self {
            chipmunk,
            stack: Vec::new(),
        }
    }

    /// Resolve a key and expand every placeholder in its value.
    pub(super) fn resolve(&mut self, key: &str) -> Result<Option<Value>, ChipmunkError> {
        if let Some(pos) = self.stack.iter().position(|seen| self.same_key(seen, key)) {
            let mut chain = self.stack[pos..].to_vec();
            chain.push(key.to_string());
            return Err(ChipmunkError::CircularReference { chain });
        }

        self.stack.push(key.to_string());
        let expanded = match merge::resolve_raw(self.chipmunk, key)? {
            Some(value) => Some(self.expand_value(value)?),
            None => None,
        };
        self.stack.pop();
        Ok(expanded)
    }

    fn same_key(&self, left: &str, right: &str) -> bool {
        if self.chipmunk.options().case_sensitive {
            left == right
        } else {
            left.eq_ignore_ascii_case(right)
        }
    }

    fn expand_value(&mut self, value: Value) -> Result<Value, ChipmunkError> {
        match value {
            Value::String(text) => Ok(Value::String(self.expand_str(&text)?)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.expand_value(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut expanded = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    expanded.insert(key, self.expand_value(value)?);
                }
                Ok(Value::Object(expanded))
            }
            other => Ok(other),
        }
    }

    fn expand_str(&mut self, input: &str) -> Result<String, ChipmunkError> {
        let mut output = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('$') {
            output.push_str(&rest[..start]);
            let tail = &rest[start..];

            if let Some(after) = tail.strip_prefix(ESCAPED_OPEN) {
                output.push_str(OPEN);
                rest = after;
                continue;
            }
            let Some(after_open) = tail.strip_prefix(OPEN) else {
                output.push('$');
                rest = &tail[1..];
                continue;
            };
            let Some(end) = after_open.find('}') else {
                // Unterminated placeholder stays literal.
                output.push_str(tail);
                return Ok(output);
            };

            let inner = &after_open[..end];
            output.push_str(&self.substitute(inner)?);
            rest = &after_open[end + 1..];
        }
        output.push_str(rest);
        Ok(output)
    }

    fn substitute(&mut self, inner: &str) -> Result<String, ChipmunkError> {
        let (name, fallback) = match inner.split_once(FALLBACK_MARKER) {
            Some((name, fallback)) => (name.trim(), Some(fallback)),
            None => (inner.trim(), None),
        };

        if let Some(value) = self.resolve(name)? {
            return Ok(value_to_text(value));
        }
        if let Some(fallback) = fallback {
            return Ok(fallback.to_string());
        }
        if self.chipmunk.options().strict_mode {
            return Err(ChipmunkError::KeyNotFound {
                key: name.to_string(),
            });
        }
        debug!("leaving unresolved placeholder in place (key={name})");
        Ok(format!("{OPEN}{inner}}}"))
    }
}
