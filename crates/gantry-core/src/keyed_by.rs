//! Keyed-value resolution
//!
//! Configuration values may be literals, or single-key mappings tagged
//! `by-<attribute>` whose arms map patterns to nested values (recursively
//! keyed or literal). Resolution picks arms against a context of attribute
//! values until a literal is reached. This underlies essentially every other
//! component's configuration handling.
//!
//! Arm patterns are matched first by exact equality, then as fully anchored
//! regular expressions; a `default` arm applies when nothing else matches.
//! A caller-supplied defer set stops resolution before consuming an attribute
//! that is not yet known, returning the partially resolved structure so a
//! later phase can finish the job.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

use crate::error::KeyedByError;

const DEFAULT_ARM: &str = "default";

/// Resolve a possibly keyed value down to a literal.
///
/// * `field` and `item_name` only qualify error messages.
/// * `context` supplies attribute values (e.g. `platform`, `level`).
/// * `defer` lists attributes that must not be consumed yet; hitting one
///   returns the current structure unchanged.
/// * With `enforce_single_match`, two simultaneously matching arms are an
///   error; without it the first matching arm in declaration order wins.
pub fn resolve_keyed_by(
    value: &Value,
    field: &str,
    item_name: &str,
    context: &BTreeMap<String, String>,
    defer: &[String],
    enforce_single_match: bool,
) -> Result<Value, KeyedByError> {
    let mut current = value.clone();

    loop {
        let Some(attribute) = keyed_attribute(&current) else {
            return Ok(current);
        };

        if defer.iter().any(|d| d == &attribute) {
            return Ok(current);
        }

        let key = format!("by-{attribute}");
        let arms = match current.get(&key).and_then(Value::as_object) {
            Some(arms) => arms.clone(),
            None => {
                return Err(KeyedByError::NotAMapping {
                    field: field.to_string(),
                    attribute,
                    item: item_name.to_string(),
                })
            }
        };

        let Some(ctx_value) = context.get(&attribute) else {
            return Err(KeyedByError::MissingContext {
                field: field.to_string(),
                attribute,
                item: item_name.to_string(),
                available: context
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        };

        let mut matched: Vec<(&String, &Value)> = Vec::new();
        for (pattern, arm) in &arms {
            if pattern == DEFAULT_ARM {
                continue;
            }
            if pattern_matches(pattern, ctx_value, field, item_name)? {
                matched.push((pattern, arm));
            }
        }

        current = match matched.len() {
            0 => match arms.get(DEFAULT_ARM) {
                Some(arm) => arm.clone(),
                None => {
                    return Err(KeyedByError::NoMatch {
                        field: field.to_string(),
                        attribute,
                        item: item_name.to_string(),
                        value: ctx_value.clone(),
                        patterns: arms
                            .keys()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                }
            },
            1 => matched[0].1.clone(),
            _ if enforce_single_match => {
                return Err(KeyedByError::MultipleMatches {
                    field: field.to_string(),
                    attribute,
                    item: item_name.to_string(),
                    value: ctx_value.clone(),
                    patterns: matched
                        .iter()
                        .map(|(p, _)| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
            }
            // first arm in declaration order wins
            _ => matched[0].1.clone(),
        };
    }
}

/// If `value` is a single-key `by-<attribute>` mapping, return the attribute
fn keyed_attribute(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    let key = object.keys().next()?;
    key.strip_prefix("by-").map(str::to_string)
}

fn pattern_matches(
    pattern: &str,
    value: &str,
    field: &str,
    item_name: &str,
) -> Result<bool, KeyedByError> {
    if pattern == value {
        return Ok(true);
    }
    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| KeyedByError::BadPattern {
        field: field.to_string(),
        item: item_name.to_string(),
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;
    Ok(regex.is_match(value))
}
