//! Call-count limit around any backend

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Wraps an [`LlmBackend`] and refuses calls once `limit` have been attempted.
///
/// Attempts are counted, not successes, so a failing provider still drains
/// the budget. The counter lives for the life of the process.
pub struct BudgetedBackend {
    inner: Box<dyn LlmBackend>,
    calls: Arc<AtomicU32>,
    limit: u32,
}

impl BudgetedBackend {
    #[must_use]
    pub fn new(inner: Box<dyn LlmBackend>, limit: u32) -> Self {
        debug!(limit, "Generation budget enabled");
        Self {
            inner,
            calls: Arc::new(AtomicU32::new(0)),
            limit,
        }
    }

    /// Calls attempted so far, including refused ones.
    #[must_use]
    pub fn attempted(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        // Reserve the slot before calling so concurrent tasks cannot overshoot.
        let current = self.calls.fetch_add(1, Ordering::SeqCst);
        if current >= self.limit {
            warn!(
                component = %inv.component_id,
                task = %inv.task,
                limit = self.limit,
                attempted = current + 1,
                "Generation budget exhausted"
            );
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted: current + 1,
            });
        }
        self.inner.invoke(inv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl LlmBackend for Echo {
        async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Ok(LlmResult::new(inv.task, "echo", "echo-1"))
        }
    }

    struct AlwaysDown;

    #[async_trait]
    impl LlmBackend for AlwaysDown {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Err(LlmError::ProviderOutage("503".to_string()))
        }
    }

    fn inv() -> LlmInvocation {
        LlmInvocation::new("auth", "questions", "", Duration::from_secs(5), vec![])
    }

    #[tokio::test]
    async fn calls_within_limit_pass_through() {
        let backend = BudgetedBackend::new(Box::new(Echo), 2);
        assert_eq!(backend.invoke(inv()).await.unwrap().raw_response, "questions");
        assert!(backend.invoke(inv()).await.is_ok());
        assert_eq!(backend.attempted(), 2);
    }

    #[tokio::test]
    async fn calls_beyond_limit_are_refused() {
        let backend = BudgetedBackend::new(Box::new(Echo), 1);
        backend.invoke(inv()).await.unwrap();
        let err = backend.invoke(inv()).await.unwrap_err();
        assert_eq!(
            err,
            LlmError::BudgetExceeded {
                limit: 1,
                attempted: 2
            }
        );
    }

    #[tokio::test]
    async fn failed_calls_consume_budget() {
        let backend = BudgetedBackend::new(Box::new(AlwaysDown), 2);
        assert!(matches!(
            backend.invoke(inv()).await,
            Err(LlmError::ProviderOutage(_))
        ));
        assert!(backend.invoke(inv()).await.is_err());
        assert!(matches!(
            backend.invoke(inv()).await,
            Err(LlmError::BudgetExceeded { .. })
        ));
        assert_eq!(backend.attempted(), 3);
    }

    #[tokio::test]
    async fn concurrent_calls_never_exceed_limit() {
        let backend = Arc::new(BudgetedBackend::new(Box::new(Echo), 5));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move { backend.invoke(inv()).await }));
        }
        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 5);
    }
}
