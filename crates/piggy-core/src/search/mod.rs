//! Web-search capability abstraction
//!
//! The weekly suggester talks to an external web-search capability through
//! a narrow contract: a prompt goes in, zero or more text chunks come out,
//! ending in a final text response. The capability is addressed by model
//! name and is rate-limited; quota errors are distinguishable from
//! transport errors.
//!
//! # Architecture
//!
//! - `SearchBackend` trait: the capability interface
//! - `SearchClient` enum: concrete wrapper providing Clone + compile-time
//!   dispatch
//! - Backend implementations: `HttpSearchBackend`, `MockSearchBackend`
//!
//! # Configuration
//!
//! - `PIGGY_SEARCH_HOST`: capability endpoint (required for the HTTP backend)
//! - `PIGGY_SEARCH_MODEL`: model identifier (default: openai/gpt-4o-mini)

mod http;
mod mock;
pub mod parsing;

pub use http::HttpSearchBackend;
pub use mock::{MockFailure, MockSearchBackend};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Result of one capability invocation
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The final textual output, expected to contain a JSON findings array
    pub final_text: String,
    /// Number of backend search calls counted into `mcp_calls_made`
    pub calls_made: i64,
}

/// Interface every search capability backend implements
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a prompt to completion and return the final text.
    async fn run(&self, prompt: &str) -> Result<SearchOutcome>;

    /// Run a prompt, forwarding intermediate text chunks as they arrive.
    ///
    /// Chunks go to `chunks`; the accumulated final text is returned. A
    /// closed receiver means the consumer went away and the call should
    /// stop early.
    async fn run_stream(&self, prompt: &str, chunks: mpsc::Sender<String>)
        -> Result<SearchOutcome>;

    /// Whether the backend currently answers.
    async fn health_check(&self) -> bool;

    /// Model identifier (for report metadata and logging).
    fn model(&self) -> &str;

    /// Host URL (for logging).
    fn host(&self) -> &str;
}

/// Concrete search client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum SearchClient {
    /// HTTP capability endpoint
    Http(HttpSearchBackend),
    /// Mock backend for testing
    Mock(MockSearchBackend),
}

impl SearchClient {
    /// Create a search client from environment variables.
    ///
    /// Returns None when `PIGGY_SEARCH_HOST` is not set — the weekly
    /// suggester then reports the capability as unavailable.
    pub fn from_env() -> Option<Self> {
        HttpSearchBackend::from_env().map(SearchClient::Http)
    }

    /// Create a mock backend for testing.
    pub fn mock(backend: MockSearchBackend) -> Self {
        SearchClient::Mock(backend)
    }
}

#[async_trait]
impl SearchBackend for SearchClient {
    async fn run(&self, prompt: &str) -> Result<SearchOutcome> {
        match self {
            SearchClient::Http(b) => b.run(prompt).await,
            SearchClient::Mock(b) => b.run(prompt).await,
        }
    }

    async fn run_stream(
        &self,
        prompt: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<SearchOutcome> {
        match self {
            SearchClient::Http(b) => b.run_stream(prompt, chunks).await,
            SearchClient::Mock(b) => b.run_stream(prompt, chunks).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            SearchClient::Http(b) => b.health_check().await,
            SearchClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            SearchClient::Http(b) => b.model(),
            SearchClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            SearchClient::Http(b) => b.host(),
            SearchClient::Mock(b) => b.host(),
        }
    }
}
