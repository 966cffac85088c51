//! Reference handling across pending changes
//!
//! A resource created locally may be referenced by other pending changes.
//! The server has to see the referenced resource first, and when it assigns
//! a new id every reference to the old one has to follow.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{LocalChangeType, ResourceKey, SquashedLocalChange};

/// Every literal reference found in a resource or a JSON patch.
///
/// Patch operations contribute both `{"reference": ..}` values and scalar
/// values written to a `.../reference` path.
pub fn collect_references(value: &Value) -> Vec<ResourceKey> {
    let mut found = Vec::new();
    walk(value, &mut found);
    found
}

fn walk(value: &Value, found: &mut Vec<ResourceKey>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("reference") {
                found.extend(ResourceKey::from_reference(reference));
            }
            let is_reference_op = map
                .get("path")
                .and_then(Value::as_str)
                .is_some_and(|path| path.ends_with("/reference"));
            if is_reference_op {
                if let Some(Value::String(reference)) = map.get("value") {
                    found.extend(ResourceKey::from_reference(reference));
                }
            }
            map.values().for_each(|child| walk(child, found));
        }
        Value::Array(items) => items.iter().for_each(|item| walk(item, found)),
        _ => {}
    }
}

/// Replace every string equal to `old` with `new`, returning whether
/// anything changed.
pub fn replace_reference(value: &mut Value, old: &str, new: &str) -> bool {
    match value {
        Value::String(text) if text == old => {
            *text = new.to_string();
            true
        }
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, child| replace_reference(child, old, new) || changed),
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, child| replace_reference(child, old, new) || changed),
        _ => false,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Reorder changes so that a resource created in this set is uploaded before
/// any change that references it.
///
/// Changes without such dependencies keep their relative order. A cycle of
/// references between created resources cannot be ordered and fails.
pub fn order_by_references(changes: Vec<SquashedLocalChange>) -> Result<Vec<SquashedLocalChange>> {
    let inserted: HashMap<ResourceKey, usize> = changes
        .iter()
        .enumerate()
        .filter(|(_, change)| change.change_type() == LocalChangeType::Insert)
        .map(|(index, change)| (change.key(), index))
        .collect();
    if inserted.is_empty() {
        return Ok(changes);
    }

    let edges: Vec<Vec<usize>> = changes
        .iter()
        .enumerate()
        .map(|(index, change)| {
            let mut targets = Vec::new();
            for key in payload_references(change) {
                if let Some(&target) = inserted.get(&key) {
                    if target != index && !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
            targets
        })
        .collect();

    let mut marks = vec![Mark::New; changes.len()];
    let mut order = Vec::with_capacity(changes.len());
    for start in 0..changes.len() {
        visit(start, &edges, &mut marks, &mut order, &changes)?;
    }

    let mut slots: Vec<Option<SquashedLocalChange>> = changes.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}

fn payload_references(change: &SquashedLocalChange) -> Vec<ResourceKey> {
    if change.change_type() == LocalChangeType::Delete {
        return Vec::new();
    }
    serde_json::from_str::<Value>(&change.local_change.payload)
        .map(|payload| collect_references(&payload))
        .unwrap_or_default()
}

fn visit(
    node: usize,
    edges: &[Vec<usize>],
    marks: &mut [Mark],
    order: &mut Vec<usize>,
    changes: &[SquashedLocalChange],
) -> Result<()> {
    match marks[node] {
        Mark::Done => return Ok(()),
        Mark::Active => {
            return Err(Error::InvalidLocalChange(format!(
                "Detected a cycle of references through {}",
                changes[node].key()
            )));
        }
        Mark::New => {}
    }
    marks[node] = Mark::Active;
    for &next in &edges[node] {
        visit(next, edges, marks, order, changes)?;
    }
    marks[node] = Mark::Done;
    order.push(node);
    Ok(())
}
