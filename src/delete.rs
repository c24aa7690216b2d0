//! Delete implements the Deleter (§4.7): sweeping every stack-tagged object across the
//! cluster, rather than rendering templates, and removing every object the filter matches.

use futures::stream::{self, StreamExt};
use tracing::{instrument, warn};

use crate::kube_gateway::Gateway;
use crate::result::{Operation, StackResult};
use crate::ANNOTATION_STACK_NAME;

const DELETE_CONCURRENCY: usize = 16;

/// Delete_matching lists every object of every kind in [`crate::SUPPORTED_KINDS`] across all
/// namespaces, keeps those whose stack-name annotation matches `filter` (§3 Stack Filter,
/// applied to the annotation value — see [`matches_filter`]), and deletes them in parallel.
/// A 404 during delete is success; other per-object errors are collected without aborting the
/// sweep.
#[instrument(skip(gateway), fields(filter))]
pub async fn delete_matching(gateway: &Gateway, filter: &str) -> Vec<StackResult> {
    let mut candidates = Vec::new();
    for (resource, capabilities) in gateway.resolve_supported_kinds() {
        let objects = match gateway.list(&resource, &capabilities, None).await {
            Ok(objects) => objects,
            Err(err) => {
                warn!(kind = resource.kind, error = %err, "failed to list kind during delete sweep");
                continue;
            }
        };
        for obj in objects {
            let Some(stack_name) = obj
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(ANNOTATION_STACK_NAME))
            else {
                continue;
            };
            if matches_filter(stack_name, filter) {
                candidates.push((resource.clone(), capabilities.clone(), obj, stack_name.clone()));
            }
        }
    }

    stream::iter(candidates)
        .map(|(resource, capabilities, obj, stack_name)| {
            let gateway = gateway.clone();
            async move {
                let ns = obj.metadata.namespace.clone();
                let name = obj.metadata.name.clone().unwrap_or_default();
                let api = gateway.api_for(&resource, &capabilities, ns.as_deref());
                match gateway.delete(&api, &name).await {
                    Ok(()) => StackResult::success(&stack_name, "", "", Operation::Delete),
                    Err(err) => StackResult::failure(&stack_name, "", "", format!("{} {name}: {err}", resource.kind)),
                }
            }
        })
        .buffer_unordered(DELETE_CONCURRENCY)
        .collect()
        .await
}

/// Matches_filter reports whether `stack_name` (the live annotation value) satisfies `filter`
/// (§3 Stack Filter, adapted from path segments to the annotation value): an empty filter
/// matches everything; a `/`-delimited filter (e.g. `dev/app`, mirroring a path relative to
/// `config/`) is normalised to `-` and matched as a trailing, boundary-respecting segment
/// sequence of the stack name (so `dev/app` matches `myapp-dev-app` but not `myapp-prod-app`);
/// otherwise equality, or `stack_name` starting with `filter` followed by a `-` boundary.
fn matches_filter(stack_name: &str, filter: &str) -> bool {
    if filter.is_empty() || stack_name == filter {
        return true;
    }
    let normalized = filter.replace('/', "-");
    if stack_name == normalized {
        return true;
    }
    let prefix_matches = stack_name
        .strip_prefix(&normalized)
        .map(|rest| rest.starts_with('-'))
        .unwrap_or(false);
    let suffix_matches = stack_name
        .strip_suffix(&normalized)
        .map(|rest| rest.is_empty() || rest.ends_with('-'))
        .unwrap_or(false);
    prefix_matches || suffix_matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches_filter("myapp-dev-web", ""));
    }

    #[test]
    fn exact_match() {
        assert!(matches_filter("myapp-dev-web", "myapp-dev-web"));
    }

    #[test]
    fn prefix_match_requires_boundary() {
        assert!(matches_filter("myapp-dev-web", "myapp-dev"));
        assert!(!matches_filter("myapp-devel-web", "myapp-dev"));
    }

    #[test]
    fn slash_delimited_filter_matches_trailing_segments() {
        assert!(matches_filter("myapp-dev-app", "dev/app"));
        assert!(!matches_filter("myapp-prod-app", "dev/app"));
    }

    #[test]
    fn slash_delimited_filter_requires_segment_boundary() {
        assert!(!matches_filter("myapp-dev-webapp", "dev/app"));
    }
}
