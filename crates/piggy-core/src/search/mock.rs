//! Mock search backend for testing
//!
//! Returns configurable canned output, optionally split into streaming
//! chunks, or fails with a chosen error kind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::{SearchBackend, SearchOutcome};

/// How the mock should fail, when configured to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    Quota,
}

/// Mock search capability
#[derive(Clone, Default)]
pub struct MockSearchBackend {
    chunks: Vec<String>,
    failure: Option<MockFailure>,
    /// Fail this many calls before succeeding (for retry tests)
    failures_before_success: u64,
    calls: Arc<AtomicU64>,
    pub healthy: bool,
}

impl MockSearchBackend {
    /// Succeed with a single final response.
    pub fn with_response(text: &str) -> Self {
        Self {
            chunks: vec![text.to_string()],
            failure: None,
            failures_before_success: 0,
            calls: Arc::new(AtomicU64::new(0)),
            healthy: true,
        }
    }

    /// Succeed, streaming the given chunks; the final text is their
    /// concatenation.
    pub fn with_chunks(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            failure: None,
            failures_before_success: 0,
            calls: Arc::new(AtomicU64::new(0)),
            healthy: true,
        }
    }

    /// Always fail with the given kind.
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            chunks: Vec::new(),
            failure: Some(failure),
            failures_before_success: 0,
            calls: Arc::new(AtomicU64::new(0)),
            healthy: false,
        }
    }

    /// Fail `n` calls with `failure`, then succeed with `text`.
    pub fn flaky(n: u64, failure: MockFailure, text: &str) -> Self {
        Self {
            chunks: vec![text.to_string()],
            failure: Some(failure),
            failures_before_success: n,
            calls: Arc::new(AtomicU64::new(0)),
            healthy: true,
        }
    }

    /// Number of calls made so far (run and run_stream combined).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self, call_index: u64) -> Result<()> {
        let Some(failure) = self.failure else {
            return Ok(());
        };
        if self.failures_before_success > 0 && call_index >= self.failures_before_success {
            return Ok(());
        }
        match failure {
            MockFailure::Unavailable => Err(Error::CapabilityUnavailable(
                "mock search backend is down".to_string(),
            )),
            MockFailure::Quota => Err(Error::CapabilityQuota(
                "mock search quota exhausted".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn run(&self, _prompt: &str) -> Result<SearchOutcome> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail(call_index)?;

        Ok(SearchOutcome {
            final_text: self.chunks.concat(),
            calls_made: 1,
        })
    }

    async fn run_stream(
        &self,
        _prompt: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<SearchOutcome> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_fail(call_index)?;

        for chunk in &self.chunks {
            if chunks.send(chunk.clone()).await.is_err() {
                return Err(Error::Cancelled("chunk consumer went away".to_string()));
            }
        }

        Ok(SearchOutcome {
            final_text: self.chunks.concat(),
            calls_made: 1,
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockSearchBackend::failing(MockFailure::Quota);
        assert!(matches!(
            mock.run("x").await,
            Err(Error::CapabilityQuota(_))
        ));
    }

    #[tokio::test]
    async fn test_flaky_mock_recovers() {
        let mock = MockSearchBackend::flaky(1, MockFailure::Unavailable, "[]");
        assert!(mock.run("x").await.is_err());
        let outcome = mock.run("x").await.unwrap();
        assert_eq!(outcome.final_text, "[]");
        assert_eq!(mock.call_count(), 2);
    }
}
