//! Tree access over `serde_json::Value`.
//!
//! `Value` is the tagged union the Monitor stores: `Object` for mappings,
//! `Array` for sequences, everything else is a leaf. All functions take a
//! pre-parsed path so a single call never splits the string twice.

use serde_json::{Map, Value};

use super::path::{ParsedPath, Step};
use crate::error::MonitorError;


/// Resolve a path to the value it addresses.
///
/// Returns `None` when a key is absent, a key is applied to a non-mapping,
/// an index is applied to a non-sequence, or an index is out of bounds.
/// Stored `null`, `false`, `0` and `""` are all found.
pub fn lookup<'a>(root: &'a Value, path: &ParsedPath) -> Option<&'a Value> {
    let mut node = root;
    for step in path.steps() {
        node = match (step, node) {
            (Step::Key(k), Value::Object(map)) => map.get(k)?,
            (Step::Index(i), Value::Array(arr)) => arr.get(i)?,
            _ => return None,
        };
    }
    Some(node)
}


/// Write `value` at `path`, creating missing containers on the way.
///
/// A missing (or `null`) intermediate becomes an array when the next step is
/// an index and an object otherwise. Arrays are padded with `null` up to the
/// target index. Existing non-null values of the wrong kind are never
/// overwritten: the call fails with `PathConflict` and the tree is left as it
/// was.
pub fn assign(root: &mut Value, path: &ParsedPath, value: Value) -> Result<(), MonitorError> {
    let steps = path.steps();
    if let Some(at) = first_conflict(root, &steps) {
        return Err(conflict(path, &steps, at));
    }

    let mut node = root;
    let last = steps.len() - 1;
    for (i, step) in steps.iter().enumerate() {
        match *step {
            Step::Key(k) => {
                if node.is_null() {
                    *node = Value::Object(Map::new());
                }
                let map = match node.as_object_mut() {
                    Some(m) => m,
                    None => return Err(conflict(path, &steps, i)),
                };
                if i == last {
                    map.insert(k.to_string(), value);
                    return Ok(());
                }
                node = map.entry(k.to_string()).or_insert(Value::Null);
            }
            Step::Index(idx) => {
                if node.is_null() {
                    *node = Value::Array(Vec::new());
                }
                let arr = match node.as_array_mut() {
                    Some(a) => a,
                    None => return Err(conflict(path, &steps, i)),
                };
                if arr.len() <= idx {
                    arr.resize(idx + 1, Value::Null);
                }
                if i == last {
                    arr[idx] = value;
                    return Ok(());
                }
                node = &mut arr[idx];
            }
        }
    }
    Ok(())
}


/// Remove the leaf at `path` from its parent and return it.
///
/// Sequence elements are removed with `Vec::remove`, so later elements shift
/// down by one.
pub fn remove(root: &mut Value, path: &ParsedPath) -> Option<Value> {
    let steps = path.steps();
    let (leaf, parents) = steps.split_last()?;

    let mut node = root;
    for step in parents {
        node = match (*step, node) {
            (Step::Key(k), Value::Object(map)) => map.get_mut(k)?,
            (Step::Index(i), Value::Array(arr)) => arr.get_mut(i)?,
            _ => return None,
        };
    }

    match (*leaf, node) {
        (Step::Key(k), Value::Object(map)) => map.remove(k),
        (Step::Index(i), Value::Array(arr)) if i < arr.len() => Some(arr.remove(i)),
        _ => None,
    }
}


// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

/// Index of the first step whose existing container has the wrong kind.
fn first_conflict(root: &Value, steps: &[Step<'_>]) -> Option<usize> {
    let mut node = Some(root);
    for (i, step) in steps.iter().enumerate() {
        let current = match node {
            Some(n) if !n.is_null() => n,
            _ => return None,
        };
        node = match (*step, current) {
            (Step::Key(k), Value::Object(map)) => map.get(k),
            (Step::Index(idx), Value::Array(arr)) => arr.get(idx),
            _ => return Some(i),
        };
    }
    None
}

fn conflict(path: &ParsedPath, steps: &[Step<'_>], at: usize) -> MonitorError {
    MonitorError::PathConflict {
        path: path.to_dotted(),
        segment: render_steps(&steps[..=at]),
    }
}

fn render_steps(steps: &[Step<'_>]) -> String {
    let mut out = String::new();
    for step in steps {
        match step {
            Step::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            Step::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}
