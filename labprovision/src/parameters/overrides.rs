//! Parameter override strings.
//!
//! Overrides use a compact flag syntax: `-name value -other "two words"`.
//! Tokens are folded left to right into the base parameter set.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use super::set::{ParameterSet, ParameterValue};

static SURROUNDING_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)^"(.+)"$"#).expect("valid quote pattern"));

/// A unit of an override string.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OverrideToken {
    /// `-name`: opens a new parameter.
    Flag(String),
    /// Any other token: appended to the open parameter's value.
    Value(String),
}

/// Splits an override string into tokens.
///
/// Tokens are separated by single spaces; empty tokens produced by runs of
/// spaces are dropped.
#[must_use]
fn tokenize(overrides: &str) -> Vec<OverrideToken> {
    overrides
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| match token.strip_prefix('-') {
            Some(name) => OverrideToken::Flag(strip_surrounding_quotes(name).to_string()),
            None => OverrideToken::Value(token.to_string()),
        })
        .collect()
}

fn strip_surrounding_quotes(text: &str) -> &str {
    SURROUNDING_QUOTES
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or(text, |m| m.as_str())
}

fn strip_quote_chars(text: &str) -> String {
    text.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

/// Accumulates one `(name, value)` pair at a time.
#[derive(Debug, Default)]
struct OverrideParser {
    current_name: Option<String>,
    current_value: Option<String>,
}

impl OverrideParser {
    fn feed(&mut self, token: OverrideToken, target: &mut ParameterSet) {
        match token {
            OverrideToken::Flag(name) => {
                self.finalize(target);
                self.current_name = Some(name);
            }
            OverrideToken::Value(text) => {
                if self.current_name.is_none() {
                    warn!(token = %text, "Ignoring override value with no preceding parameter name");
                    return;
                }
                let joined = match self.current_value.take() {
                    None => text,
                    Some(mut value) => {
                        value.push(' ');
                        value.push_str(&text);
                        value
                    }
                };
                self.current_value =
                    Some(strip_quote_chars(strip_surrounding_quotes(&joined)));
            }
        }
    }

    fn finalize(&mut self, target: &mut ParameterSet) {
        let value = self.current_value.take().unwrap_or_default();
        let Some(name) = self.current_name.take() else {
            return;
        };
        if name.is_empty() {
            warn!("Ignoring override with an empty parameter name");
            return;
        }
        let value = ParameterValue::from_override(value, target.get(&name));
        target.upsert(name, value);
    }
}

/// Applies an override string to a copy of `base`.
///
/// A flag naming an existing parameter replaces its value in place; a novel
/// flag appends a new parameter. An empty override string returns `base`
/// unchanged.
#[must_use]
pub fn merge(base: &ParameterSet, overrides: &str) -> ParameterSet {
    let mut merged = base.clone();
    if overrides.trim().is_empty() {
        return merged;
    }

    let mut parser = OverrideParser::default();
    for token in tokenize(overrides) {
        parser.feed(token, &mut merged);
    }
    parser.finalize(&mut merged);

    merged
}
