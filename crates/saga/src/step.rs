//! Saga step contract.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// Failure reported by a step's `execute` or `compensate`.
///
/// Steps that fail because a lower layer failed keep that error as the
/// source, so callers of the saga can recover it with
/// [`StepError::downcast_ref`].
#[derive(Debug, Clone)]
pub struct StepError {
    reason: String,
    source: Option<Arc<dyn Error + Send + Sync>>,
}

impl StepError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    /// Wraps a typed error, keeping its message as the reason.
    pub fn from_source<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            reason: error.to_string(),
            source: Some(Arc::new(error)),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.source.as_deref()?.downcast_ref::<E>()
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Equal when the reasons match; sources are not compared.
impl PartialEq for StepError {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason
    }
}

impl Eq for StepError {}

/// One step of a saga over a shared context `C`.
///
/// `execute` may be retried by a caller re-running the whole saga, so steps
/// that call an external party must be safe to repeat. `compensate` is only
/// invoked after this step's `execute` succeeded.
#[async_trait]
pub trait SagaStep<C: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &mut C) -> Result<(), StepError>;

    async fn compensate(&self, ctx: &mut C) -> Result<(), StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("supplier said no")]
    struct SupplierRefused;

    #[test]
    fn test_typed_source_is_recoverable() {
        let error = StepError::from_source(SupplierRefused);

        assert_eq!(error.reason(), "supplier said no");
        assert!(error.downcast_ref::<SupplierRefused>().is_some());
        assert!(error.source().is_some());
        assert!(error.downcast_ref::<std::fmt::Error>().is_none());
    }

    #[test]
    fn test_plain_reason_has_no_source() {
        let error = StepError::new("nothing to persist");
        assert!(error.source().is_none());
        assert!(error.downcast_ref::<SupplierRefused>().is_none());
        assert_eq!(error, StepError::new("nothing to persist"));
    }
}
