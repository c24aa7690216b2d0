//! Reconcile implements the Reconciler (§4.5): for one stack, render, decide
//! create/update/no-change per object, write, and wait for readiness.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use std::path::Path;

use crate::config;
use crate::kube_gateway::Gateway;
use crate::normalize::equivalent;
use crate::prepare::prepare;
use crate::readiness::wait_until_ready;
use crate::result::{Operation, StackResult};
use crate::stack::Stack;
use crate::{Error, Result};

/// Reconcile_stack applies `stack`'s manifest to the cluster reachable through `gateway`,
/// returning one [`StackResult`] summarising the coarsest operation performed across its
/// objects (an `update` if any object updated, else `create` if any object was created, else
/// `no-change`).
#[instrument(skip(gateway, cancel), fields(stack = %stack.name))]
pub async fn reconcile_stack(
    gateway: &Gateway,
    config_root: &Path,
    stack: &Stack,
    cancel: &CancellationToken,
) -> StackResult {
    let manifest = stack.config.manifest.clone().unwrap_or_default();
    let context = stack.config.context.clone().unwrap_or_default();

    match reconcile_inner(gateway, config_root, stack, cancel).await {
        Ok(op) => StackResult::success(&stack.name, &context, &manifest, op),
        Err(err) => StackResult::failure(&stack.name, &context, &manifest, err),
    }
}

async fn reconcile_inner(
    gateway: &Gateway,
    config_root: &Path,
    stack: &Stack,
    cancel: &CancellationToken,
) -> Result<Operation> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let manifests_dir = crate::manifests_dir(config_root);
    let prepared = prepare(stack, &manifests_dir)?;

    let timeout = config::timeout(&stack.config)?;
    let deadline = Instant::now() + timeout;

    let mut coarsest = Operation::NoChange;
    for obj in &prepared.objects {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if Instant::now() >= deadline {
            return Err(Error::TimeoutExceeded(stack.name.clone()));
        }

        let type_meta = obj
            .types
            .clone()
            .ok_or_else(|| Error::KindUnknown("(missing apiVersion/kind)".into()))?;
        let (resource, capabilities) = gateway.resolve(&type_meta)?;
        let ns = obj.metadata.namespace.as_deref().or(stack.config.namespace.as_deref());
        let api = gateway.api_for(&resource, &capabilities, ns);
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("object missing metadata.name")))?;

        let current = gateway.get(&api, &name).await?;
        let op = match &current {
            None => {
                info!(kind = %type_meta.kind, %name, "creating resource");
                gateway.create(&api, obj).await?;
                Operation::Create
            }
            Some(live) if equivalent(live, obj) => {
                info!(kind = %type_meta.kind, %name, "resource is already up to date");
                Operation::NoChange
            }
            Some(_) => {
                info!(kind = %type_meta.kind, %name, "updating resource");
                gateway.update(&api, obj).await?;
                Operation::Update
            }
        };
        if op != Operation::NoChange {
            wait_until_ready(gateway, &api, &type_meta.kind, &name, &stack.name, deadline, cancel).await?;
            info!(kind = %type_meta.kind, %name, "resource is ready");
        }
        coarsest = coarsest_of(coarsest, op);
    }

    Ok(coarsest)
}

fn coarsest_of(a: Operation, b: Operation) -> Operation {
    use Operation::*;
    match (a, b) {
        (Update, _) | (_, Update) => Update,
        (Create, _) | (_, Create) => Create,
        _ => NoChange,
    }
}
