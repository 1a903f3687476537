//! Equality over normalized JSON.

use std::collections::BTreeSet;

use serde_json::Value;

use kbsync_core::GENERATED_VALUE;

/// Compare a normalized collected value against a normalized stored value.
///
/// A [`GENERATED_VALUE`] placeholder on the collected side matches anything,
/// arrays of strings compare as sets, and a missing key equals `null`.
pub fn values_match(collected: &Value, stored: &Value) -> bool {
    if collected.as_str() == Some(GENERATED_VALUE) {
        return true;
    }
    match (collected, stored) {
        (Value::Object(left), Value::Object(right)) => {
            left.keys().chain(right.keys()).all(|key| {
                values_match(
                    left.get(key).unwrap_or(&Value::Null),
                    right.get(key).unwrap_or(&Value::Null),
                )
            })
        }
        (Value::Array(left), Value::Array(right)) => match (string_set(left), string_set(right)) {
            (Some(left), Some(right)) => left == right,
            _ => {
                left.len() == right.len()
                    && left.iter().zip(right).all(|(l, r)| values_match(l, r))
            }
        },
        _ => collected == stored,
    }
}

fn string_set(items: &[Value]) -> Option<BTreeSet<&str>> {
    items.iter().map(Value::as_str).collect()
}

/// Drop `null`, empty strings, empty arrays and empty objects, recursively.
pub fn prune_empty(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                prune_empty(child);
            }
            map.retain(|_, child| !is_empty(child));
        }
        Value::Array(items) => items.iter_mut().for_each(prune_empty),
        _ => {}
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::identical(json!({"name": "a"}), json!({"name": "a"}), true)]
    #[case::different(json!({"name": "a"}), json!({"name": "b"}), false)]
    #[case::generated_placeholder(json!({"color": "GENERATED"}), json!({"color": "#ff0000"}), true)]
    #[case::placeholder_only_on_collected_side(json!({"color": "#ff0000"}), json!({"color": "GENERATED"}), false)]
    #[case::string_arrays_as_sets(json!({"alt": ["x", "y"]}), json!({"alt": ["y", "x"]}), true)]
    #[case::set_sizes_differ(json!({"alt": ["x"]}), json!({"alt": ["x", "y"]}), false)]
    #[case::object_arrays_keep_order(json!([{"n": 1}, {"n": 2}]), json!([{"n": 2}, {"n": 1}]), false)]
    #[case::missing_equals_null(json!({"a": 1}), json!({"a": 1, "b": null}), true)]
    #[case::missing_vs_value(json!({"a": 1}), json!({"a": 1, "b": 2}), false)]
    fn value_matching(#[case] collected: Value, #[case] stored: Value, #[case] expected: bool) {
        assert_eq!(values_match(&collected, &stored), expected);
    }

    #[test]
    fn prune_removes_empty_values_recursively() {
        let mut value = json!({
            "title": "t",
            "labels": [],
            "category": {"name": null},
            "note": "",
            "variations": [{"name": null, "body": {"blocks": [1]}}],
        });
        prune_empty(&mut value);
        assert_eq!(
            value,
            json!({"title": "t", "variations": [{"body": {"blocks": [1]}}]})
        );
    }
}
