//! Result holds the per-stack outcome record emitted by the Reconciler and Planner (§7):
//! `{stack, context, manifest, operation, error, timestamp}`.

use std::time::SystemTime;

/// Operation is the classification assigned to a single reconciled object, and — in aggregate
/// — to a stack's overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create indicates the object did not exist and was created.
    Create,
    /// Update indicates the object existed and differed, and was updated.
    Update,
    /// NoChange indicates the object existed and was already equivalent.
    NoChange,
    /// Delete indicates the object was removed by the Deleter.
    Delete,
    /// Cancelled indicates the stack was aborted by a global interrupt.
    Cancelled,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::NoChange => "no-change",
            Operation::Delete => "delete",
            Operation::Cancelled => "cancelled",
        })
    }
}

/// StackResult is the structured outcome of reconciling (or planning) one stack, never
/// aborting sibling stacks (§7 propagation policy).
#[derive(Debug, Clone)]
pub struct StackResult {
    /// Stack is the stack name.
    pub stack: String,
    /// Context is the Kubernetes context the stack targeted.
    pub context: String,
    /// Manifest is the manifest filename the stack rendered.
    pub manifest: String,
    /// Operation is the outcome classification, when the stack succeeded.
    pub operation: Option<Operation>,
    /// Error is a human description of the failure, when the stack failed.
    pub error: Option<String>,
    /// Timestamp is when this result was produced.
    pub timestamp: SystemTime,
}

impl StackResult {
    /// Success constructs a successful result.
    pub fn success(stack: &str, context: &str, manifest: &str, operation: Operation) -> StackResult {
        StackResult {
            stack: stack.to_string(),
            context: context.to_string(),
            manifest: manifest.to_string(),
            operation: Some(operation),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Failure constructs a failed result.
    pub fn failure(stack: &str, context: &str, manifest: &str, error: impl std::fmt::Display) -> StackResult {
        StackResult {
            stack: stack.to_string(),
            context: context.to_string(),
            manifest: manifest.to_string(),
            operation: None,
            error: Some(error.to_string()),
            timestamp: SystemTime::now(),
        }
    }

    /// Is_success reports whether this stack's result represents success.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Log emits this result as one structured log line, at `error` level on failure and
    /// `info` on success, carrying stack name, context, manifest, and either `response` or
    /// `error` (§7).
    pub fn log(&self) {
        match (&self.operation, &self.error) {
            (Some(op), None) => tracing::info!(
                stack = self.stack,
                context = self.context,
                manifest = self.manifest,
                response = %format!("{op}"),
                "stack reconciled"
            ),
            (_, Some(err)) => tracing::error!(
                stack = self.stack,
                context = self.context,
                manifest = self.manifest,
                error = %err,
                "stack failed"
            ),
            (None, None) => unreachable!("a result always has an operation or an error"),
        }
    }
}
