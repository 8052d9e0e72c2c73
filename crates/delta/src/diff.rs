//! Structural diff/patch algebra
//!
//! Operates on the generic `Value` type, not on any serialization library's
//! tree. A diff is a map from key to one of three moves:
//!
//! - `Set(v)` — the key is new or its value changed wholesale
//! - `Remove` — the key disappeared
//! - `Nested(d)` — both sides are objects; recurse instead of replacing the
//!   whole subtree, keeping deltas minimal
//!
//! Equal values under equal keys are omitted entirely. Because the diff is
//! keyed, two diffs with the same key set and values are equivalent
//! regardless of key order (tested property).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use chronicle_core::Value;

use crate::error::DeltaError;

/// One per-key move inside a diff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiffEntry {
    /// Key added or value replaced
    Set(Value),
    /// Key removed
    Remove,
    /// Both sides are objects; apply the inner diff to the subtree
    Nested(Diff),
}

/// Minimal structural patch transforming one state object into another
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Diff(pub HashMap<String, DiffEntry>);

impl Diff {
    /// True when applying this diff would change nothing
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of top-level moves
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Compute the minimal diff transforming `from` into `to`
pub fn diff_states(from: &HashMap<String, Value>, to: &HashMap<String, Value>) -> Diff {
    let mut entries = HashMap::new();

    for key in from.keys() {
        if !to.contains_key(key) {
            entries.insert(key.clone(), DiffEntry::Remove);
        }
    }

    for (key, new_value) in to {
        match from.get(key) {
            None => {
                entries.insert(key.clone(), DiffEntry::Set(new_value.clone()));
            }
            Some(old_value) if old_value == new_value => {}
            Some(Value::Object(old_map)) => {
                if let Value::Object(new_map) = new_value {
                    entries.insert(key.clone(), DiffEntry::Nested(diff_states(old_map, new_map)));
                } else {
                    entries.insert(key.clone(), DiffEntry::Set(new_value.clone()));
                }
            }
            Some(_) => {
                entries.insert(key.clone(), DiffEntry::Set(new_value.clone()));
            }
        }
    }

    Diff(entries)
}

/// Apply `diff` to `state` in place
///
/// Strict: a `Remove` of an absent key or a `Nested` move against a missing
/// or non-object value means the diff does not belong to this base state,
/// and the whole application fails.
pub fn apply_diff(state: &mut HashMap<String, Value>, diff: &Diff) -> Result<(), DeltaError> {
    for (key, entry) in &diff.0 {
        match entry {
            DiffEntry::Set(value) => {
                state.insert(key.clone(), value.clone());
            }
            DiffEntry::Remove => {
                if state.remove(key).is_none() {
                    return Err(malformed(format!("remove of absent key '{}'", key)));
                }
            }
            DiffEntry::Nested(inner) => match state.get_mut(key) {
                Some(Value::Object(map)) => apply_diff(map, inner)?,
                Some(other) => {
                    return Err(malformed(format!(
                        "nested patch for key '{}' against {} value",
                        key,
                        other.type_name()
                    )))
                }
                None => {
                    return Err(malformed(format!("nested patch for absent key '{}'", key)))
                }
            },
        }
    }
    Ok(())
}

fn malformed(reason: String) -> DeltaError {
    DeltaError::CorruptState {
        stream: String::new(),
        reason,
    }
}
