//! Kube_gateway wraps a kubeconfig-loaded client with a context override and a discovery-backed
//! GVR resolver (§4.4). The discovery cache is populated once per process and is safe for
//! concurrent reads thereafter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::{GroupVersionKind, TypeMeta};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::{Client, Config};
use tracing::{instrument, trace};

use crate::{Error, Result, DEFAULT_NAMESPACE};

const TRANSIENT_RETRY_LIMIT: u32 = 3;
const TRANSIENT_RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Gateway is the process-wide handle to the cluster: a `kube::Client` and a populated
/// discovery cache for resolving `kind` to a `GroupVersionResource`.
#[derive(Clone)]
pub struct Gateway {
    client: Client,
    discovery: Arc<Discovery>,
}

impl Gateway {
    /// Connect loads the kubeconfig using the standard default rules (`$KUBECONFIG`, then
    /// `~/.kube/config`), overrides the current context with `context` when non-empty, and
    /// runs discovery once.
    #[instrument(skip_all, fields(context))]
    pub async fn connect(context: &str) -> Result<Gateway> {
        let mut config = Config::infer()
            .await
            .map_err(|err| Error::KubeconfigError(err.to_string()))?;
        if !context.is_empty() {
            config = kubeconfig_for_context(context).await?;
        }
        let client = kube::client::ClientBuilder::try_from(config)
            .map_err(Error::ApiserverError)?
            .build();
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(Error::ApiserverError)?;
        Ok(Gateway {
            client,
            discovery: Arc::new(discovery),
        })
    }

    /// Resolve maps `apiVersion`/`kind` to a `(ApiResource, ApiCapabilities)` pair via the
    /// cached discovery document, failing with [`Error::KindUnknown`] if unmappable.
    pub fn resolve(&self, type_meta: &TypeMeta) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = gvk_from_type_meta(type_meta);
        self.discovery
            .resolve_gvk(&gvk)
            .ok_or_else(|| Error::KindUnknown(format!("{}/{}", type_meta.api_version, type_meta.kind)))
    }

    /// Api_for returns a dynamic API handle for `resource`, namespaced or cluster-scoped and
    /// defaulting the namespace to `"default"` as appropriate.
    pub fn api_for(&self, resource: &ApiResource, capabilities: &ApiCapabilities, ns: Option<&str>) -> Api<DynamicObject> {
        match capabilities.scope {
            Scope::Namespaced => {
                Api::namespaced_with(self.client.clone(), ns.unwrap_or(DEFAULT_NAMESPACE), resource)
            }
            Scope::Cluster => Api::all_with(self.client.clone(), resource),
        }
    }

    /// Get fetches the named object, returning `Ok(None)` on 404.
    #[instrument(skip(self, api))]
    pub async fn get(&self, api: &Api<DynamicObject>, name: &str) -> Result<Option<DynamicObject>> {
        retry_transient(|| api.get_opt(name)).await.map_err(classify)
    }

    /// Create posts a new object, retrying transient network errors (§5) up to
    /// [`TRANSIENT_RETRY_LIMIT`] times with backoff.
    #[instrument(skip(self, api, obj))]
    pub async fn create(&self, api: &Api<DynamicObject>, obj: &DynamicObject) -> Result<DynamicObject> {
        trace!("creating object");
        retry_transient(|| api.create(&PostParams::default(), obj))
            .await
            .map_err(classify)
    }

    /// Update replaces an existing object, carrying the live `resourceVersion` forward. A
    /// stale-resourceVersion conflict triggers one re-read-and-retry (§5); a persistent
    /// conflict is reported as [`Error::ConflictRetried`]. Transient network errors on the
    /// replace call itself retry with backoff (§5) independently of the conflict retry.
    #[instrument(skip(self, api, obj))]
    pub async fn update(&self, api: &Api<DynamicObject>, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        for attempt in 0..2 {
            let mut next = obj.clone();
            if let Some(current) = self.get(api, &name).await? {
                next.metadata.resource_version = current.metadata.resource_version.clone();
            }
            match retry_transient(|| api.replace(&name, &PostParams::default(), &next)).await {
                Ok(updated) => return Ok(updated),
                Err(kube::Error::Api(resp)) if resp.reason == "Conflict" && attempt == 0 => {
                    trace!(name, "update conflict, retrying once");
                    continue;
                }
                Err(kube::Error::Api(resp)) if resp.reason == "Conflict" => {
                    return Err(Error::ConflictRetried(name));
                }
                Err(kube::Error::Api(resp)) if resp.code == 422 || resp.reason == "Invalid" => {
                    return Err(Error::ImmutableFieldError(name, resp.message));
                }
                Err(err) => return Err(classify(err)),
            }
        }
        unreachable!("loop always returns")
    }

    /// Delete removes the named object; a 404 is treated as success by the caller via
    /// [`Error`]'s absence (the gateway surfaces it as `Ok(())`).
    #[instrument(skip(self, api))]
    pub async fn delete(&self, api: &Api<DynamicObject>, name: &str) -> Result<()> {
        match retry_transient(|| api.delete(name, &DeleteParams::default())).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(err) => Err(classify(err)),
        }
    }

    /// List returns every object of `resource` across the scope implied by `ns` (a namespace,
    /// or `None` for cluster-wide / all-namespaces).
    #[instrument(skip(self))]
    pub async fn list(&self, resource: &ApiResource, capabilities: &ApiCapabilities, ns: Option<&str>) -> Result<Vec<DynamicObject>> {
        let api = match (capabilities.scope, ns) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, resource),
            (Scope::Namespaced, None) => Api::all_with(self.client.clone(), resource),
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), resource),
        };
        let list = retry_transient(|| api.list(&ListParams::default()))
            .await
            .map_err(classify)?;
        Ok(list.items)
    }

    /// Resolve_supported_kinds resolves every kind in [`crate::SUPPORTED_KINDS`] to its
    /// `(ApiResource, ApiCapabilities)`, skipping (with a debug log) any kind the cluster does
    /// not expose (e.g. Ingress on a cluster without networking.k8s.io).
    pub fn resolve_supported_kinds(&self) -> Vec<(ApiResource, ApiCapabilities)> {
        let mut out: Vec<(ApiResource, ApiCapabilities)> = Vec::new();
        for group in self.discovery.groups() {
            for (resource, capabilities) in group.recommended_resources() {
                if crate::SUPPORTED_KINDS.contains(&resource.kind.as_str())
                    && !out.iter().any(|(r, _)| r.kind == resource.kind)
                {
                    out.push((resource, capabilities));
                }
            }
        }
        out
    }
}

/// Retry_transient re-invokes `op` up to [`TRANSIENT_RETRY_LIMIT`] extra times, with a linearly
/// increasing backoff, when the error it returns looks like a transient network failure rather
/// than a structured apiserver rejection (§5: "transient network errors retry with backoff up
/// to a small bounded count before failing the stack"). A 4xx/5xx response with a server-given
/// reason (conflict, not-found, invalid, forbidden...) is never transient and returns
/// immediately on the first attempt.
async fn retry_transient<T, F, Fut>(mut op: F) -> std::result::Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, kube::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < TRANSIENT_RETRY_LIMIT && is_transient(&err) => {
                attempt += 1;
                trace!(attempt, "retrying after transient apiserver error");
                tokio::time::sleep(TRANSIENT_RETRY_BACKOFF * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// A structured apiserver response (`kube::Error::Api`) is transient only for 5xx codes;
/// anything else reaching the client (connection reset, TLS handshake failure, timeout) is
/// assumed transient since it never got far enough to produce a structured rejection.
fn is_transient(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(resp) => matches!(resp.code, 500 | 502 | 503 | 504),
        _ => true,
    }
}

fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    match tm.api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: tm.kind.clone(),
        },
        None => GroupVersionKind {
            group: String::new(),
            version: tm.api_version.clone(),
            kind: tm.kind.clone(),
        },
    }
}

fn classify(err: kube::Error) -> Error {
    match &err {
        kube::Error::Api(resp) if resp.code == 403 => Error::PermissionDenied(resp.message.clone()),
        _ => Error::ApiserverError(err),
    }
}

async fn kubeconfig_for_context(context: &str) -> Result<Config> {
    use kube::config::{KubeConfigOptions, Kubeconfig};

    let kubeconfig = Kubeconfig::read().map_err(|err| Error::KubeconfigError(err.to_string()))?;
    if !kubeconfig.contexts.iter().any(|c| c.name == context) {
        return Err(Error::ContextNotFound(context.to_string()));
    }
    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };
    Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .map_err(|err| Error::KubeconfigError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("synthetic {reason}"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(is_transient(&api_error(503, "ServiceUnavailable")));
        assert!(is_transient(&api_error(500, "InternalError")));
    }

    #[test]
    fn client_rejections_are_not_transient() {
        assert!(!is_transient(&api_error(404, "NotFound")));
        assert!(!is_transient(&api_error(409, "Conflict")));
        assert!(!is_transient(&api_error(422, "Invalid")));
        assert!(!is_transient(&api_error(403, "Forbidden")));
    }

    #[tokio::test]
    async fn retry_transient_gives_up_after_the_bounded_count() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: std::result::Result<(), kube::Error> = retry_transient(|| {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(api_error(503, "ServiceUnavailable")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), TRANSIENT_RETRY_LIMIT + 1);
    }

    #[tokio::test]
    async fn retry_transient_stops_immediately_on_non_transient_error() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: std::result::Result<(), kube::Error> = retry_transient(|| {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(api_error(409, "Conflict")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
