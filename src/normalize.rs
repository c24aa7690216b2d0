//! Normalize is the pure comparison function shared by the Reconciler and the Planner (§4.5,
//! §4.6, §9): it strips server-populated fields so that two objects can be compared for
//! semantic equality (the `no-change` classification) independent of how they were produced.

use kube::api::DynamicObject;
use serde_json::{Map, Value};

/// Normalize converts `obj` into a canonical `serde_json::Value` with server-populated fields
/// removed: `metadata.resourceVersion`, `metadata.uid`, `metadata.creationTimestamp`,
/// `metadata.generation`, `metadata.managedFields`, and the top-level `status`.
pub fn normalize(obj: &DynamicObject) -> Value {
    let mut value = serde_json::to_value(obj).unwrap_or(Value::Null);
    if let Value::Object(root) = &mut value {
        root.remove("status");
        if let Some(Value::Object(metadata)) = root.get_mut("metadata") {
            strip_server_populated(metadata);
        }
    }
    value
}

fn strip_server_populated(metadata: &mut Map<String, Value>) {
    for key in [
        "resourceVersion",
        "uid",
        "creationTimestamp",
        "generation",
        "managedFields",
        "selfLink",
    ] {
        metadata.remove(key);
    }
}

/// Equivalent reports whether `a` and `b` are semantically equal under [`normalize`] — the
/// basis for the Reconciler's `no-change` decision and the Planner's `no-change` classification.
pub fn equivalent(a: &DynamicObject, b: &DynamicObject) -> bool {
    normalize(a) == normalize(b)
}

/// To_canonical_yaml renders `obj`'s normalised form as YAML, used by the Planner to build
/// the `current`/`desired` sides of a unified diff.
pub fn to_canonical_yaml(obj: &DynamicObject) -> String {
    serde_yaml::to_string(&normalize(obj)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> DynamicObject {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn ignores_server_populated_fields() {
        let a = obj(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "x", "resourceVersion": "1", "uid": "abc", "generation": 1},
            "spec": {"replicas": 3},
            "status": {"readyReplicas": 3}
        }));
        let b = obj(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "x", "resourceVersion": "2", "uid": "abc", "generation": 2},
            "spec": {"replicas": 3},
            "status": {"readyReplicas": 1}
        }));
        assert!(equivalent(&a, &b));
    }

    #[test]
    fn detects_spec_change() {
        let a = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "x"}, "spec": {"replicas": 3}
        }));
        let b = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "x"}, "spec": {"replicas": 5}
        }));
        assert!(!equivalent(&a, &b));
    }
}
