//! Readiness implements the per-kind readiness predicate and the bounded, cancellable polling
//! loop used after a create/update (§4.5, §9): a lazy sequence of observations with an upper
//! deadline.

use std::time::{Duration, Instant};

use kube::api::{Api, DynamicObject};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::kube_gateway::Gateway;
use crate::{Error, Result};

const BACKOFF_START: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Is_ready evaluates the per-kind readiness contract (§4.5) against the live object's JSON
/// representation.
pub fn is_ready(kind: &str, obj: &DynamicObject) -> bool {
    let data = &obj.data;
    let generation = obj.metadata.generation.unwrap_or(0);
    match kind {
        "Deployment" | "StatefulSet" => {
            let spec_replicas = data["spec"]["replicas"].as_i64().unwrap_or(1);
            let observed = data["status"]["observedGeneration"].as_i64().unwrap_or(-1);
            let ready = data["status"]["readyReplicas"].as_i64().unwrap_or(0);
            observed >= generation && ready == spec_replicas
        }
        "DaemonSet" => {
            let desired = data["status"]["desiredNumberScheduled"].as_i64().unwrap_or(0);
            let observed = data["status"]["observedGeneration"].as_i64().unwrap_or(-1);
            let ready = data["status"]["numberReady"].as_i64().unwrap_or(0);
            observed >= generation && ready == desired
        }
        "Pod" => {
            let phase = data["status"]["phase"].as_str().unwrap_or("");
            if phase == "Succeeded" {
                return true;
            }
            if phase != "Running" {
                return false;
            }
            data["status"]["containerStatuses"]
                .as_array()
                .map(|statuses| {
                    !statuses.is_empty()
                        && statuses
                            .iter()
                            .all(|c| c["ready"].as_bool().unwrap_or(false))
                })
                .unwrap_or(false)
        }
        "Job" => data["status"]["succeeded"].as_i64().unwrap_or(0) >= 1,
        _ => true,
    }
}

/// Wait_until_ready polls `api` for `name` until [`is_ready`] holds, `deadline` elapses
/// (returning [`Error::TimeoutExceeded`] for `stack_name`, per §4.5's "per-stack `timeout`
/// bounds the whole reconciliation"), or `cancel` fires (returning [`Error::Cancelled`]).
/// Polling uses bounded exponential backoff starting at 500ms and capping at 5s, with jitter.
#[instrument(skip(gateway, api, cancel), fields(kind, name))]
pub async fn wait_until_ready(
    gateway: &Gateway,
    api: &Api<DynamicObject>,
    kind: &str,
    name: &str,
    stack_name: &str,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut backoff = BACKOFF_START;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let obj = gateway
            .get(api, name)
            .await?
            .ok_or_else(|| Error::ReadinessFailed(kind.to_string(), "object disappeared".into()))?;
        if is_ready(kind, &obj) {
            trace!(kind, name, "resource is ready");
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::TimeoutExceeded(stack_name.to_string()));
        }

        let jitter = rand::thread_rng().gen_range(0..=(backoff.as_millis() as u64 / 4).max(1));
        let sleep_for = (backoff + Duration::from_millis(jitter)).min(backoff_remaining(deadline));
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }
        backoff = (backoff * 2).min(BACKOFF_CAP);
    }
}

fn backoff_remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: serde_json::Value) -> DynamicObject {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn deployment_readiness() {
        let o = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "x", "generation": 2},
            "spec": {"replicas": 3},
            "status": {"observedGeneration": 2, "readyReplicas": 3}
        }));
        assert!(is_ready("Deployment", &o));

        let o = obj(json!({
            "apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "x", "generation": 2},
            "spec": {"replicas": 3},
            "status": {"observedGeneration": 1, "readyReplicas": 3}
        }));
        assert!(!is_ready("Deployment", &o));
    }

    #[test]
    fn pod_readiness() {
        let running_ready = obj(json!({
            "apiVersion": "v1", "kind": "Pod", "metadata": {"name": "x"},
            "status": {"phase": "Running", "containerStatuses": [{"ready": true}]}
        }));
        assert!(is_ready("Pod", &running_ready));

        let running_not_ready = obj(json!({
            "apiVersion": "v1", "kind": "Pod", "metadata": {"name": "x"},
            "status": {"phase": "Running", "containerStatuses": [{"ready": false}]}
        }));
        assert!(!is_ready("Pod", &running_not_ready));

        let succeeded = obj(json!({
            "apiVersion": "v1", "kind": "Pod", "metadata": {"name": "x"},
            "status": {"phase": "Succeeded"}
        }));
        assert!(is_ready("Pod", &succeeded));
    }

    #[test]
    fn job_readiness() {
        let done = obj(json!({
            "apiVersion": "batch/v1", "kind": "Job", "metadata": {"name": "x"},
            "status": {"succeeded": 1}
        }));
        assert!(is_ready("Job", &done));
    }

    #[test]
    fn other_kinds_are_immediately_ready() {
        let cm = obj(json!({
            "apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "x"}
        }));
        assert!(is_ready("ConfigMap", &cm));
    }
}
