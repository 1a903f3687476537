//! Protected fields: dot-paths whose stored value survives an update.

use serde_json::Value;

use kbsync_core::Entity;

use crate::error::SyncError;

/// Copy every configured path that is present (and not `null`) on `stored`
/// onto `collected`. Paths whose parent object is missing on the collected
/// side are skipped.
pub fn apply_protected_fields<T: Entity>(
    collected: T,
    stored: &T,
    paths: &[String],
) -> Result<T, SyncError> {
    if paths.is_empty() {
        return Ok(collected);
    }

    let source = serde_json::to_value(stored)?;
    let mut target = serde_json::to_value(&collected)?;
    let mut changed = false;
    for path in paths {
        let Some(value) = get_path(&source, path) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        changed |= set_path(&mut target, path, value.clone());
    }

    if !changed {
        return Ok(collected);
    }
    serde_json::from_value(target).map_err(|e| {
        SyncError::Transformation(format!("cannot apply protected fields to {}: {e}", T::KIND))
    })
}

/// Value at a dot-path such as `published.alternatives`.
pub fn get_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

fn set_path(target: &mut Value, path: &str, value: Value) -> bool {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return false;
    };

    let mut current = target;
    for segment in segments {
        current = match current.get_mut(segment) {
            Some(next) if next.is_object() => next,
            _ => return false,
        };
    }
    match current.as_object_mut() {
        Some(map) => {
            map.insert(last.to_string(), value);
            true
        }
        None => false,
    }
}
