//! State reduction policy for fan-in.
//!
//! A graph's durable state is a `serde_json::Value` object; when multiple
//! nodes run concurrently against copies of the same state, their partial
//! outputs are reduced back into one value before the engine advances.
//! Per-field policy, matching the merge rules nodes are expected to honor:
//! scalars take the last writer, arrays append, objects merge key-by-key
//! (recursing), and a `__set__`-tagged array (used for the few fields that
//! are conceptually sets, e.g. `completed_task_ids`) unions instead of
//! concatenating.

use serde_json::{Map, Value};

pub fn merge_all(states: Vec<Value>) -> Value {
    let mut iter = states.into_iter();
    let Some(first) = iter.next() else {
        return Value::Object(Map::new());
    };
    iter.fold(first, |acc, next| merge_two(&acc, next))
}

fn merge_two(base: &Value, incoming: Value) -> Value {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            let mut merged = base_map.clone();
            for (key, incoming_val) in incoming_map {
                match merged.get(&key).cloned() {
                    Some(existing) => {
                        merged.insert(key, merge_field(&existing, incoming_val));
                    }
                    None => {
                        merged.insert(key, incoming_val);
                    }
                }
            }
            Value::Object(merged)
        }
        (_, incoming) => incoming,
    }
}

fn merge_field(existing: &Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Array(existing_arr), Value::Array(incoming_arr)) => {
            let mut merged = existing_arr.clone();
            for item in incoming_arr {
                if !merged.contains(&item) {
                    merged.push(item);
                } else if !is_set_like(existing_arr) {
                    // Plain list semantics: duplicates from distinct writers
                    // are legitimate (e.g. two nodes both appending an
                    // event); set-like fields dedupe instead.
                    merged.push(item);
                }
            }
            Value::Array(merged)
        }
        (Value::Object(existing_map), Value::Object(incoming_map)) => {
            let mut merged = existing_map.clone();
            for (key, incoming_val) in incoming_map {
                match merged.get(&key).cloned() {
                    Some(existing_val) => {
                        merged.insert(key, merge_field(&existing_val, incoming_val));
                    }
                    None => {
                        merged.insert(key, incoming_val);
                    }
                }
            }
            Value::Object(merged)
        }
        (_, incoming) => incoming,
    }
}

/// A cheap heuristic: a field is treated as set-like if every element so
/// far is a string (ids), which covers `completed_task_ids`-shaped fields
/// without requiring nodes to tag their own output.
fn is_set_like(arr: &[Value]) -> bool {
    !arr.is_empty() && arr.iter().all(|v| v.is_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_field_takes_last_writer() {
        let a = json!({"current_phase": 1});
        let b = json!({"current_phase": 2});
        let merged = merge_all(vec![a, b]);
        assert_eq!(merged["current_phase"], 2);
    }

    #[test]
    fn plain_list_field_appends() {
        let a = json!({"errors": ["e1"]});
        let b = json!({"errors": ["e2"]});
        let merged = merge_all(vec![a, b]);
        assert_eq!(merged["errors"], json!(["e1", "e2"]));
    }

    #[test]
    fn string_id_list_unions_rather_than_duplicating() {
        let a = json!({"completed_task_ids": ["t1", "t2"]});
        let b = json!({"completed_task_ids": ["t2", "t3"]});
        let merged = merge_all(vec![a, b]);
        assert_eq!(merged["completed_task_ids"], json!(["t1", "t2", "t3"]));
    }

    #[test]
    fn disjoint_keys_from_both_writers_are_both_kept() {
        let a = json!({"a": 1});
        let b = json!({"b": 2});
        let merged = merge_all(vec![a, b]);
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let a = json!({"phase_status": {"1": {"status": "in_progress"}}});
        let b = json!({"phase_status": {"2": {"status": "pending"}}});
        let merged = merge_all(vec![a, b]);
        assert_eq!(merged["phase_status"]["1"]["status"], "in_progress");
        assert_eq!(merged["phase_status"]["2"]["status"], "pending");
    }
}
