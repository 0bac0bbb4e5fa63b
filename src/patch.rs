//! JSON merge-patch creation and application.
//!
//! Patches follow RFC 7396: an object lists only the fields to change,
//! `null` removes a field, and anything not mentioned is left alone.
//! Status updates are written this way so that a writer never clobbers
//! fields it did not mean to touch.

use crate::apis::GroupVersionKind;
use crate::error::{Error, Result};
use crate::scheme::Serializer;
use serde::Serialize;
use serde_json::{Map, Value};

/// Build a merge-patch describing what `mutator` changes on `original`.
///
/// The mutator runs on a deep copy, so `original` is never modified and
/// fields that only differ because of in-place defaulting do not leak
/// into the patch.
pub fn create<T, F>(original: &T, mutator: F) -> Result<Vec<u8>>
where
    T: Clone + Serialize,
    F: FnOnce(&mut T) -> Result<()>,
{
    let mut modified = original.clone();
    mutator(&mut modified)?;

    let before = serde_json::to_value(original).map_err(|e| Error::Encode(e.to_string()))?;
    let after = serde_json::to_value(&modified).map_err(|e| Error::Encode(e.to_string()))?;

    let patch = diff(&before, &after);
    serde_json::to_vec(&patch).map_err(|e| Error::Encode(e.to_string()))
}

/// Compute the merge-patch that turns `original` into `modified`.
pub fn diff(original: &Value, modified: &Value) -> Value {
    let (Value::Object(before), Value::Object(after)) = (original, modified) else {
        return modified.clone();
    };

    let mut patch = Map::new();
    for (key, old) in before {
        match after.get(key) {
            None => {
                patch.insert(key.clone(), Value::Null);
            }
            Some(new) if new != old => {
                patch.insert(key.clone(), diff(old, new));
            }
            Some(_) => {}
        }
    }
    for (key, new) in after {
        if !before.contains_key(key) {
            patch.insert(key.clone(), new.clone());
        }
    }
    Value::Object(patch)
}

/// Apply a merge-patch to stored object bytes.
///
/// The original must decode as `gvk`'s kind; the merged result must too,
/// otherwise the patch is rejected with [`Error::PatchConflict`]. The
/// merged document is returned as it will be written back.
pub fn apply(
    serializer: &Serializer,
    original: &[u8],
    patch: &[u8],
    gvk: &GroupVersionKind,
) -> Result<Vec<u8>> {
    let conflict = |message: String| Error::patch_conflict(gvk.kind.lower(), message);

    let current = serializer.decode(original, gvk.is_internal())?;
    if current.kind_name() != gvk.kind.as_str() {
        return Err(Error::Decode(format!(
            "stored object is a {}, expected {}",
            current.kind_name(),
            gvk.kind
        )));
    }

    let mut document: Value = serde_json::from_slice(original)?;
    let patch: Value = serde_json::from_slice(patch)
        .map_err(|e| conflict(format!("patch is not valid JSON: {}", e)))?;
    let Value::Object(fields) = &patch else {
        return Err(conflict("patch must be a JSON object".into()));
    };
    for immutable in ["kind", "apiVersion"] {
        if let Some(value) = fields.get(immutable) {
            if document.get(immutable) != Some(value) {
                return Err(conflict(format!("patch may not change {}", immutable)));
            }
        }
    }

    json_patch::merge(&mut document, &patch);

    let merged = serde_json::to_vec_pretty(&document).map_err(|e| Error::Encode(e.to_string()))?;
    serializer
        .decode(&merged, gvk.is_internal())
        .map_err(|e| conflict(e.to_string()))?;
    Ok(merged)
}
