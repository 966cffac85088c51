//! Folding a resource's local change history into one net change

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::{
    LocalChange, LocalChangeEntity, LocalChangeToken, LocalChangeType, ResourceKey,
    SquashedLocalChange,
};
use crate::patch::{Differ, parse_patch, patch_to_json};

/// Merge two consecutive changes to the same resource.
///
/// `second` must have been recorded after `first`. The result carries the
/// ids of both tokens, the timestamp of `second` and the server version
/// `first` was made against.
pub fn merge(differ: &dyn Differ, first: LocalChange, second: LocalChange) -> Result<LocalChange> {
    if first.resource_id != second.resource_id || first.resource_type != second.resource_type {
        return Err(Error::InvalidLocalChange(format!(
            "Resource IDs {} and {} do not match",
            first.resource_id, second.resource_id
        )));
    }

    let (change_type, payload) = match (first.change_type, second.change_type) {
        (_, LocalChangeType::Delete) => (LocalChangeType::Delete, String::new()),
        (LocalChangeType::Update, LocalChangeType::Insert) => {
            return Err(Error::InvalidLocalChange(
                "Changes before creation of resource are not permitted".into(),
            ));
        }
        (_, LocalChangeType::Insert) => (LocalChangeType::Insert, second.payload),
        (LocalChangeType::Insert, LocalChangeType::Update) => {
            let base = serde_json::from_str(&first.payload)?;
            let patched = differ.apply(&base, &parse_patch(&second.payload)?)?;
            (LocalChangeType::Insert, serde_json::to_string(&patched)?)
        }
        (LocalChangeType::Update, LocalChangeType::Update) => {
            let composed = differ.compose(
                &parse_patch(&first.payload)?,
                &parse_patch(&second.payload)?,
            );
            (LocalChangeType::Update, patch_to_json(&composed)?)
        }
        (LocalChangeType::Delete, LocalChangeType::Update) => {
            return Err(Error::InvalidLocalChange(
                "Cannot merge local changes with type DELETE and UPDATE.".into(),
            ));
        }
    };

    let mut ids = first.token.0;
    ids.extend(second.token.0);
    let token = LocalChangeToken::new(ids);

    Ok(LocalChange {
        resource_type: second.resource_type,
        resource_id: second.resource_id,
        timestamp: second.timestamp,
        change_type,
        payload,
        version_id: first.version_id.or(second.version_id),
        token,
    })
}

/// Reduce one resource's entries, oldest first, into a single change.
pub fn squash(differ: &dyn Differ, mut entries: Vec<LocalChangeEntity>) -> Result<LocalChange> {
    entries.sort_by_key(|entry| entry.id);
    let mut entries = entries.into_iter().map(LocalChange::from);
    let first = entries
        .next()
        .ok_or_else(|| Error::InvalidLocalChange("cannot squash an empty change list".into()))?;
    entries.try_fold(first, |acc, next| merge(differ, acc, next))
}

/// Group entries by resource and squash each group.
///
/// Groups are returned in the order of their oldest entry.
pub fn squash_all(
    differ: &dyn Differ,
    mut entries: Vec<LocalChangeEntity>,
) -> Result<Vec<SquashedLocalChange>> {
    entries.sort_by_key(|entry| entry.id);

    let mut order: Vec<ResourceKey> = Vec::new();
    let mut groups: HashMap<ResourceKey, Vec<LocalChangeEntity>> = HashMap::new();
    for entry in entries {
        let key = entry.key();
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(entry);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(|group| {
            let local_change = squash(differ, group)?;
            Ok(SquashedLocalChange {
                token: local_change.token.clone(),
                local_change,
            })
        })
        .collect()
}
