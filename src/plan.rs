//! Plan implements the Planner (§4.6): the same steps as the Reconciler up to the
//! create/no-change/update comparison, but it never mutates the cluster — it renders a coloured
//! unified diff instead.

use std::path::Path;

use console::style;
use kube::api::DynamicObject;
use similar::{ChangeTag, TextDiff};
use tracing::instrument;

use crate::kube_gateway::Gateway;
use crate::normalize::{equivalent, to_canonical_yaml};
use crate::prepare::prepare;
use crate::result::Operation;
use crate::stack::Stack;
use crate::{Error, Result};

/// ObjectPlan is one object's planned outcome within a stack.
pub struct ObjectPlan {
    /// Kind is the object's `kind`.
    pub kind: String,
    /// Name is the object's `metadata.name`.
    pub name: String,
    /// Operation is the classification: `create` if absent, `no-change` if equivalent to the
    /// live object, `update` otherwise.
    pub operation: Operation,
    /// Diff is the coloured unified diff text (`current` vs `desired`), empty for `create` and
    /// `no-change`.
    pub diff: String,
}

/// StackPlan is a stack's full planned outcome: one [`ObjectPlan`] per rendered object.
pub struct StackPlan {
    /// Stack is the stack name.
    pub stack: String,
    /// Objects are the per-object plans, in document order.
    pub objects: Vec<ObjectPlan>,
}

impl StackPlan {
    /// Operation returns the coarsest operation across this stack's objects (§4.6 classifier,
    /// same precedence as the Reconciler: `update` > `create` > `no-change`).
    pub fn operation(&self) -> Operation {
        let mut coarsest = Operation::NoChange;
        for object in &self.objects {
            coarsest = match (coarsest, object.operation) {
                (Operation::Update, _) | (_, Operation::Update) => Operation::Update,
                (Operation::Create, _) | (_, Operation::Create) => Operation::Create,
                _ => Operation::NoChange,
            };
        }
        coarsest
    }
}

/// Plan_stack renders `stack` and diffs it against live cluster state through `gateway`,
/// without writing anything.
#[instrument(skip(gateway, config_root), fields(stack = %stack.name))]
pub async fn plan_stack(gateway: &Gateway, config_root: &Path, stack: &Stack) -> Result<StackPlan> {
    let manifests_dir = crate::manifests_dir(config_root);
    let prepared = prepare(stack, &manifests_dir)?;

    let mut objects = Vec::with_capacity(prepared.objects.len());
    for obj in &prepared.objects {
        objects.push(plan_object(gateway, stack, obj).await?);
    }

    Ok(StackPlan {
        stack: stack.name.clone(),
        objects,
    })
}

async fn plan_object(gateway: &Gateway, stack: &Stack, desired: &DynamicObject) -> Result<ObjectPlan> {
    let type_meta = desired
        .types
        .clone()
        .ok_or_else(|| Error::KindUnknown("(missing apiVersion/kind)".into()))?;
    let (resource, capabilities) = gateway.resolve(&type_meta)?;
    let ns = desired.metadata.namespace.as_deref().or(stack.config.namespace.as_deref());
    let api = gateway.api_for(&resource, &capabilities, ns);
    let name = desired
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::Other(anyhow::anyhow!("object missing metadata.name")))?;

    let current = gateway.get(&api, &name).await?;
    let (operation, diff) = match &current {
        None => (Operation::Create, String::new()),
        Some(live) if equivalent(live, desired) => (Operation::NoChange, String::new()),
        Some(live) => (Operation::Update, render_diff(live, desired)),
    };

    Ok(ObjectPlan {
        kind: type_meta.kind,
        name,
        operation,
        diff,
    })
}

/// Render_diff produces a coloured unified diff (`--- current` / `+++ desired`) between the
/// normalised forms of `current` and `desired`: bold headers, red `-` lines, green `+` lines,
/// plain context.
fn render_diff(current: &DynamicObject, desired: &DynamicObject) -> String {
    let current_yaml = to_canonical_yaml(current);
    let desired_yaml = to_canonical_yaml(desired);

    let diff = TextDiff::from_lines(&current_yaml, &desired_yaml);
    let mut out = String::new();
    out.push_str(&format!("{}\n", style("--- current").bold()));
    out.push_str(&format!("{}\n", style("+++ desired").bold()));
    for change in diff.iter_all_changes() {
        let line = change.to_string_lossy();
        match change.tag() {
            ChangeTag::Delete => out.push_str(&format!("{}", style(format!("-{line}")).red())),
            ChangeTag::Insert => out.push_str(&format!("{}", style(format!("+{line}")).green())),
            ChangeTag::Equal => out.push_str(&format!(" {line}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: serde_json::Value) -> DynamicObject {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn diff_contains_unified_headers_and_coloured_markers() {
        let current = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "x"}, "spec": {"replicas": 3}
        }));
        let desired = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "x"}, "spec": {"replicas": 5}
        }));
        let diff = render_diff(&current, &desired);
        assert!(diff.contains("--- current"));
        assert!(diff.contains("+++ desired"));
        assert!(diff.contains("replicas: 3"));
        assert!(diff.contains("replicas: 5"));
    }

    #[test]
    fn stack_plan_operation_is_coarsest_across_objects() {
        let plan = StackPlan {
            stack: "s".into(),
            objects: vec![
                ObjectPlan {
                    kind: "ConfigMap".into(),
                    name: "a".into(),
                    operation: Operation::NoChange,
                    diff: String::new(),
                },
                ObjectPlan {
                    kind: "Deployment".into(),
                    name: "b".into(),
                    operation: Operation::Create,
                    diff: String::new(),
                },
            ],
        };
        assert_eq!(plan.operation(), Operation::Create);
    }
}
