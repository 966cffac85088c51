//! RFC 6902 JSON patches between resource states

use json_patch::Patch;
use serde_json::Value;

use crate::error::{Error, Result};

/// Computes, applies and composes patches between two resource states.
///
/// Implementations must satisfy `apply(old, diff(old, new)) == new`.
pub trait Differ: Send + Sync {
    /// Patch that turns `old` into `new`.
    fn diff(&self, old: &Value, new: &Value) -> Result<Patch>;

    /// Apply `patch` to a copy of `resource`.
    fn apply(&self, resource: &Value, patch: &Patch) -> Result<Value>;

    /// Patch equivalent to applying `first` and then `second`.
    fn compose(&self, first: &Patch, second: &Patch) -> Patch;
}

/// [`Differ`] backed by the `json-patch` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPatchDiffer;

impl Differ for JsonPatchDiffer {
    fn diff(&self, old: &Value, new: &Value) -> Result<Patch> {
        Ok(json_patch::diff(old, new))
    }

    fn apply(&self, resource: &Value, patch: &Patch) -> Result<Value> {
        let mut patched = resource.clone();
        json_patch::patch(&mut patched, &patch.0)
            .map_err(|e| Error::Patch(format!("failed to apply patch: {e}")))?;
        Ok(patched)
    }

    fn compose(&self, first: &Patch, second: &Patch) -> Patch {
        // ops run in sequence, so plain concatenation is exact
        Patch(first.0.iter().chain(second.0.iter()).cloned().collect())
    }
}

/// Parse a stored UPDATE payload.
pub fn parse_patch(payload: &str) -> Result<Patch> {
    serde_json::from_str(payload).map_err(|e| Error::Patch(format!("invalid patch payload: {e}")))
}

/// Encode a patch for storage as an UPDATE payload.
pub fn patch_to_json(patch: &Patch) -> Result<String> {
    Ok(serde_json::to_string(patch)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_diff_then_apply_reproduces_new_state() {
        let differ = JsonPatchDiffer;
        let old = json!({
            "resourceType": "Patient",
            "id": "p-1",
            "name": [{"family": "Doe", "given": ["Jane"]}],
            "active": true
        });
        let new = json!({
            "resourceType": "Patient",
            "id": "p-1",
            "name": [{"family": "Doe", "given": ["Janet", "M"]}],
            "gender": "female"
        });

        let patch = differ.diff(&old, &new).unwrap();
        assert_eq!(differ.apply(&old, &patch).unwrap(), new);
    }

    #[test]
    fn test_diff_of_equal_states_is_empty() {
        let differ = JsonPatchDiffer;
        let value = json!({"resourceType": "Patient", "id": "p-1"});
        assert!(differ.diff(&value, &value).unwrap().0.is_empty());
    }

    #[test]
    fn test_compose_applies_in_order() {
        let differ = JsonPatchDiffer;
        let a = json!({"resourceType": "Patient", "active": true});
        let b = json!({"resourceType": "Patient", "active": false});
        let c = json!({"resourceType": "Patient", "active": false, "gender": "male"});

        let first = differ.diff(&a, &b).unwrap();
        let second = differ.diff(&b, &c).unwrap();
        let composed = differ.compose(&first, &second);

        assert_eq!(composed.0.len(), first.0.len() + second.0.len());
        assert_eq!(differ.apply(&a, &composed).unwrap(), c);
    }

    #[test]
    fn test_apply_reports_bad_path() {
        let differ = JsonPatchDiffer;
        let patch = parse_patch(r#"[{"op":"remove","path":"/missing"}]"#).unwrap();
        let err = differ
            .apply(&json!({"resourceType": "Patient"}), &patch)
            .unwrap_err();
        assert!(matches!(err, Error::Patch(_)));
    }

    #[test]
    fn test_parse_patch_rejects_garbage() {
        assert!(parse_patch("{}").is_err());
        let patch = parse_patch("[]").unwrap();
        assert_eq!(patch_to_json(&patch).unwrap(), "[]");
    }
}
