//! Engine fans a batch of stacks out across bounded parallel workers (§5): one logical worker
//! per stack, capped at `min(stacks.len(), 16)`, collecting results without letting one stack's
//! failure abort its siblings.

use std::path::Path;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::kube_gateway::Gateway;
use crate::plan::{plan_stack, StackPlan};
use crate::reconcile::reconcile_stack;
use crate::result::StackResult;
use crate::stack::Stack;

const MAX_CONCURRENCY: usize = 16;

fn concurrency_for(n: usize) -> usize {
    n.min(MAX_CONCURRENCY).max(1)
}

/// Apply_all reconciles every stack in `stacks` against `gateway`, running up to
/// `min(stacks.len(), 16)` concurrently. A SIGINT-style cancellation flips `cancel`; any stack
/// still running observes it at its next suspension point and reports [`crate::Error::Cancelled`].
#[instrument(skip(gateway, config_root, stacks, cancel))]
pub async fn apply_all(
    gateway: &Gateway,
    config_root: &Path,
    stacks: &[Stack],
    cancel: &CancellationToken,
) -> Vec<StackResult> {
    let concurrency = concurrency_for(stacks.len());
    stream::iter(stacks)
        .map(|stack| reconcile_stack(gateway, config_root, stack, cancel))
        .buffer_unordered(concurrency)
        .collect()
        .await
}

/// Plan_all renders and diffs every stack in `stacks` against `gateway`, the same way
/// [`apply_all`] dispatches but without ever mutating the cluster. A per-stack render/decode
/// failure surfaces as an `Err` entry rather than aborting the batch.
#[instrument(skip(gateway, config_root, stacks))]
pub async fn plan_all(gateway: &Gateway, config_root: &Path, stacks: &[Stack]) -> Vec<crate::Result<StackPlan>> {
    let concurrency = concurrency_for(stacks.len());
    stream::iter(stacks)
        .map(|stack| plan_stack(gateway, config_root, stack))
        .buffer_unordered(concurrency)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_bounded_by_sixteen() {
        assert_eq!(concurrency_for(3), 3);
        assert_eq!(concurrency_for(100), 16);
        assert_eq!(concurrency_for(0), 1);
    }
}
