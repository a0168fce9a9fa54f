//! Architect (text-generation back end) abstraction layer.
//!
//! This module provides a trait-based abstraction over the external
//! back ends the development cycle talks to. Two interchangeable
//! implementations are supported, each invoked through its CLI:
//!
//! - [`ClaudeArchitect`] wrapping the `claude` CLI
//! - [`GeminiArchitect`] wrapping the `gemini` CLI
//!
//! A gateway performs exactly one external call per invocation and never
//! retries internally; retry and fallback policy live one level up in
//! [`crate::retry`] and [`crate::cycle`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use promethean::provider::{Architect, ArchitectId, create_architect};
//!
//! let architect = create_architect(ArchitectId::Claude, ".");
//! let result = architect.invoke("Hello!", Duration::from_secs(60)).await;
//! ```

pub mod claude;
mod cli;
pub mod error_kind;
pub mod gemini;

pub use claude::ClaudeArchitect;
pub use error_kind::{is_limit_reply, ErrorKind};
pub use gemini::GeminiArchitect;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

// =============================================================================
// Architect identity
// =============================================================================

/// Identifier for one of the two interchangeable back ends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ArchitectId {
    /// The `claude` CLI back end.
    #[default]
    Claude,
    /// The `gemini` CLI back end.
    Gemini,
}

impl ArchitectId {
    /// The alternate architect used for fallback.
    #[must_use]
    pub fn alternate(&self) -> Self {
        match self {
            Self::Claude => Self::Gemini,
            Self::Gemini => Self::Claude,
        }
    }

    /// The CLI binary name for this architect.
    #[must_use]
    pub const fn cli_name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for ArchitectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

// =============================================================================
// Provider result
// =============================================================================

/// Tagged outcome of a single gateway invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderResult {
    /// The back end answered.
    Success {
        /// Reply text, trimmed.
        text: String,
        /// Wall-clock latency of the call.
        latency: Duration,
    },
    /// The back end failed; `kind` drives the retry/fallback policy.
    Failure {
        /// Classified error kind.
        kind: ErrorKind,
        /// Raw error message for logging and notices.
        message: String,
        /// Wall-clock latency of the call.
        latency: Duration,
    },
}

impl ProviderResult {
    /// Check if this result is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Get the failure kind, if any.
    #[must_use]
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            Self::Success { .. } => None,
        }
    }

    /// Get the latency of the call regardless of outcome.
    #[must_use]
    pub fn latency(&self) -> Duration {
        match self {
            Self::Success { latency, .. } | Self::Failure { latency, .. } => *latency,
        }
    }
}

// =============================================================================
// Architect trait
// =============================================================================

/// Abstraction over an external text-generation back end.
///
/// # Contract
///
/// `invoke` performs exactly one external call: no internal retry, no
/// session mutation. Failures are classified into an [`ErrorKind`] from the
/// message content and exit signal; everything else maps to
/// [`ProviderResult::Success`].
///
/// # Object Safety
///
/// The trait is object-safe; the cycle holds architects as
/// `Box<dyn Architect>` so the active back end can be switched at runtime
/// for fallback.
#[async_trait]
pub trait Architect: Send + Sync {
    /// Send a prompt and wait up to `timeout` for the reply.
    async fn invoke(&self, prompt: &str, timeout: Duration) -> ProviderResult;

    /// Which back end this is.
    fn id(&self) -> ArchitectId;

    /// Check whether the back end's CLI is reachable.
    async fn available(&self) -> bool;
}

/// Create the gateway for the given architect id.
///
/// # Arguments
///
/// * `id` - Which back end to construct
/// * `working_dir` - Directory the CLI should run in
#[must_use]
pub fn create_architect(id: ArchitectId, working_dir: impl AsRef<Path>) -> Box<dyn Architect> {
    match id {
        ArchitectId::Claude => Box::new(ClaudeArchitect::new(working_dir.as_ref())),
        ArchitectId::Gemini => Box::new(GeminiArchitect::new(working_dir.as_ref())),
    }
}

// =============================================================================
// Mock architect
// =============================================================================

/// A scripted outcome for [`MockArchitect`].
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this reply.
    Reply(String),
    /// Fail with this kind and message.
    Fail(ErrorKind, String),
}

/// Mock back end for tests.
///
/// Plays back a script of outcomes in order, repeating the last entry once
/// the script is exhausted. Records every prompt and timeout it was
/// invoked with so tests can assert on the escalation schedule.
pub struct MockArchitect {
    id: ArchitectId,
    script: Mutex<Vec<MockOutcome>>,
    calls: Mutex<Vec<(String, Duration)>>,
}

impl MockArchitect {
    /// Create a mock with the given identity and script.
    #[must_use]
    pub fn new(id: ArchitectId, script: Vec<MockOutcome>) -> Self {
        Self {
            id,
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same reply.
    #[must_use]
    pub fn always(id: ArchitectId, reply: &str) -> Self {
        Self::new(id, vec![MockOutcome::Reply(reply.to_string())])
    }

    /// Create a mock that always fails with the given kind.
    #[must_use]
    pub fn failing(id: ArchitectId, kind: ErrorKind, message: &str) -> Self {
        Self::new(id, vec![MockOutcome::Fail(kind, message.to_string())])
    }

    /// Number of times `invoke` was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock lock poisoned").len()
    }

    /// Timeouts used per call, in order.
    #[must_use]
    pub fn timeouts_used(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .iter()
            .map(|(_, t)| *t)
            .collect()
    }

    /// Prompts received, in order.
    #[must_use]
    pub fn prompts_received(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }
}

#[async_trait]
impl Architect for MockArchitect {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> ProviderResult {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .push((prompt.to_string(), timeout));

        let outcome = {
            let mut script = self.script.lock().expect("mock lock poisoned");
            if script.len() > 1 {
                script.remove(0)
            } else {
                script.first().cloned().unwrap_or(MockOutcome::Fail(
                    ErrorKind::Unknown,
                    "empty mock script".to_string(),
                ))
            }
        };

        match outcome {
            MockOutcome::Reply(text) => ProviderResult::Success {
                text,
                latency: Duration::from_millis(1),
            },
            MockOutcome::Fail(kind, message) => ProviderResult::Failure {
                kind,
                message,
                latency: Duration::from_millis(1),
            },
        }
    }

    fn id(&self) -> ArchitectId {
        self.id
    }

    async fn available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architect_id_alternate() {
        assert_eq!(ArchitectId::Claude.alternate(), ArchitectId::Gemini);
        assert_eq!(ArchitectId::Gemini.alternate(), ArchitectId::Claude);
    }

    #[test]
    fn test_architect_id_display() {
        assert_eq!(ArchitectId::Claude.to_string(), "claude");
        assert_eq!(ArchitectId::Gemini.to_string(), "gemini");
    }

    #[test]
    fn test_provider_result_accessors() {
        let ok = ProviderResult::Success {
            text: "hi".into(),
            latency: Duration::from_millis(5),
        };
        assert!(ok.is_success());
        assert_eq!(ok.failure_kind(), None);
        assert_eq!(ok.latency(), Duration::from_millis(5));

        let err = ProviderResult::Failure {
            kind: ErrorKind::RateLimit,
            message: "429".into(),
            latency: Duration::from_millis(7),
        };
        assert!(!err.is_success());
        assert_eq!(err.failure_kind(), Some(ErrorKind::RateLimit));
    }

    #[tokio::test]
    async fn test_mock_architect_plays_script_in_order() {
        let mock = MockArchitect::new(
            ArchitectId::Claude,
            vec![
                MockOutcome::Fail(ErrorKind::Timeout, "timed out".into()),
                MockOutcome::Reply("done".into()),
            ],
        );

        let first = mock.invoke("p1", Duration::from_secs(60)).await;
        assert_eq!(first.failure_kind(), Some(ErrorKind::Timeout));

        let second = mock.invoke("p2", Duration::from_secs(120)).await;
        assert!(second.is_success());

        // Last entry repeats once exhausted
        let third = mock.invoke("p3", Duration::from_secs(300)).await;
        assert!(third.is_success());

        assert_eq!(mock.call_count(), 3);
        assert_eq!(
            mock.timeouts_used(),
            vec![
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(300)
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_architect_always() {
        let mock = MockArchitect::always(ArchitectId::Gemini, "reply");
        for _ in 0..3 {
            assert!(mock.invoke("p", Duration::from_secs(1)).await.is_success());
        }
        assert_eq!(mock.id(), ArchitectId::Gemini);
    }

    #[test]
    fn test_architect_trait_is_object_safe() {
        fn assert_boxed(_: &dyn Architect) {}
        let mock = MockArchitect::always(ArchitectId::Claude, "x");
        assert_boxed(&mock);
    }

    #[test]
    fn test_create_architect_ids() {
        let claude = create_architect(ArchitectId::Claude, ".");
        assert_eq!(claude.id(), ArchitectId::Claude);

        let gemini = create_architect(ArchitectId::Gemini, ".");
        assert_eq!(gemini.id(), ArchitectId::Gemini);
    }
}
