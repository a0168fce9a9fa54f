//! Session state: conversation history, project plan, mode and status.
//!
//! A [`Session`] is the unit of orchestration. It owns the append-only
//! conversation transcript, the project plan, the architect selection
//! (original plus current, which diverge under fallback), and the counters
//! the cycle and the completion detector read.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PrometheanError, Result};
use crate::lang::{contains_trigger_phrase, UiLang};
use crate::provider::{ArchitectId, ErrorKind};

/// Maximum length of the derived plan summary, in characters.
pub const PLAN_SUMMARY_MAX_CHARS: usize = 300;

// =============================================================================
// Enums
// =============================================================================

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The human operator.
    User,
    /// The architect back end.
    Assistant,
    /// The orchestrator itself (notices, recovery feedback).
    System,
}

/// High-level phase of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Interactive planning; no autonomous cycle runs here.
    #[default]
    Brainstorming,
    /// The autonomous development cycle is in charge.
    Development,
}

/// Lifecycle status of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created but not yet running.
    #[default]
    Idle,
    /// The development loop is active.
    Running,
    /// Waiting on human input.
    Paused,
    /// The project was declared finished.
    Completed,
    /// The loop stopped on an unrecoverable condition.
    Error,
}

impl Status {
    /// Whether this status ends the development loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Development methodology driving the per-cycle decision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, Default)]
#[serde(rename_all = "lowercase")]
pub enum Methodology {
    /// Red/green/refactor with an explicit test-first decision tree.
    #[default]
    Tdd,
    /// Analyze, implement, verify, iterate.
    Classic,
}

// =============================================================================
// Conversation
// =============================================================================

/// One turn of the conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub speaker: Speaker,
    /// The full turn text.
    pub text: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Record a turn now.
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Project plan
// =============================================================================

/// The agreed project plan, fixed for the duration of a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPlan {
    /// Full plan text as captured during brainstorming.
    pub text: String,
    /// Derived summary, at most [`PLAN_SUMMARY_MAX_CHARS`] characters.
    pub summary: String,
}

impl ProjectPlan {
    /// Build a plan from its full text, deriving the bounded summary.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let summary = truncate_chars(&text, PLAN_SUMMARY_MAX_CHARS);
        Self { text, summary }
    }
}

/// Truncate to at most `max` characters on a char boundary, appending an
/// ellipsis when anything was cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

// =============================================================================
// Session
// =============================================================================

/// State of one orchestration session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable identifier, also the checkpoint slot name.
    pub id: String,
    /// UI language for notices and trigger phrases.
    pub lang: UiLang,
    /// The architect the session started with.
    pub original_architect: ArchitectId,
    /// The architect currently in use (differs under fallback).
    pub current_architect: ArchitectId,
    /// Directory the architect CLIs run in.
    pub working_dir: PathBuf,
    /// Decision-tree methodology.
    pub methodology: Methodology,
    /// Current phase.
    pub mode: Mode,
    /// Lifecycle status.
    pub status: Status,
    /// When `status` last changed.
    pub status_updated_at: DateTime<Utc>,
    /// Append-only transcript.
    pub turns: Vec<ConversationTurn>,
    /// The plan, once agreed.
    pub plan: Option<ProjectPlan>,
    /// Whether the session has fallen back to the alternate architect.
    pub fallback_active: bool,
    /// Why fallback happened, when it did.
    pub fallback_reason: Option<ErrorKind>,
    /// Completed development cycles.
    pub cycle_count: u32,
    /// Consecutive cycles that ended in a provider failure.
    pub consecutive_errors: u32,
    /// Consecutive replies that looked finished without the sentinel.
    pub consecutive_completion_signals: u32,
}

impl Session {
    /// Create a fresh session in brainstorming mode.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lang: UiLang::default(),
            original_architect: ArchitectId::default(),
            current_architect: ArchitectId::default(),
            working_dir: working_dir.into(),
            methodology: Methodology::default(),
            mode: Mode::default(),
            status: Status::default(),
            status_updated_at: Utc::now(),
            turns: Vec::new(),
            plan: None,
            fallback_active: false,
            fallback_reason: None,
            cycle_count: 0,
            consecutive_errors: 0,
            consecutive_completion_signals: 0,
        }
    }

    /// Set the UI language.
    #[must_use]
    pub fn with_lang(mut self, lang: UiLang) -> Self {
        self.lang = lang;
        self
    }

    /// Set the starting architect (both original and current).
    #[must_use]
    pub fn with_architect(mut self, architect: ArchitectId) -> Self {
        self.original_architect = architect;
        self.current_architect = architect;
        self
    }

    /// Set the methodology.
    #[must_use]
    pub fn with_methodology(mut self, methodology: Methodology) -> Self {
        self.methodology = methodology;
        self
    }

    /// Append a turn to the transcript.
    pub fn push_turn(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.turns.push(ConversationTurn::new(speaker, text));
    }

    /// The last `n` turns, oldest first.
    #[must_use]
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Adopt the project plan. Rejected once development has started.
    ///
    /// # Errors
    ///
    /// Returns [`PrometheanError::InvalidState`] if the session is no longer
    /// brainstorming.
    pub fn set_plan(&mut self, text: impl Into<String>) -> Result<()> {
        if self.mode != Mode::Brainstorming {
            return Err(PrometheanError::invalid_state(
                "plan can only be set while brainstorming",
            ));
        }
        self.plan = Some(ProjectPlan::new(text));
        Ok(())
    }

    /// Transition to a new status, stamping the change time.
    pub fn set_status(&mut self, status: Status) {
        if self.status != status {
            self.status = status;
            self.status_updated_at = Utc::now();
        }
    }

    /// Handle a user message during brainstorming.
    ///
    /// Returns `true` when the message contained the engine-start trigger
    /// phrase and the session moved into development mode.
    ///
    /// # Errors
    ///
    /// The trigger phrase with no plan in place is rejected with
    /// [`PrometheanError::MissingPlan`]; the mode does not change.
    pub fn handle_user_message(&mut self, text: &str) -> Result<bool> {
        self.push_turn(Speaker::User, text);

        if self.mode == Mode::Brainstorming && contains_trigger_phrase(text) {
            if self.plan.is_none() {
                return Err(PrometheanError::MissingPlan {
                    session_id: self.id.clone(),
                });
            }
            self.mode = Mode::Development;
            self.set_status(Status::Running);
            return Ok(true);
        }
        Ok(false)
    }

    /// Switch to the alternate architect, recording why.
    pub fn activate_fallback(&mut self, reason: ErrorKind) {
        self.current_architect = self.current_architect.alternate();
        self.fallback_active = true;
        self.fallback_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_ready_session() -> Session {
        let mut session = Session::new("/tmp/project");
        session.set_plan("Build a CLI todo app").unwrap();
        session
    }

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new("/tmp/project");
        assert_eq!(session.mode, Mode::Brainstorming);
        assert_eq!(session.status, Status::Idle);
        assert_eq!(session.current_architect, ArchitectId::Claude);
        assert!(!session.fallback_active);
        assert_eq!(session.cycle_count, 0);
    }

    #[test]
    fn test_trigger_phrase_starts_development() {
        let mut session = dev_ready_session();
        let started = session
            .handle_user_message("Ok, START THE ENGINES!")
            .unwrap();
        assert!(started);
        assert_eq!(session.mode, Mode::Development);
        assert_eq!(session.status, Status::Running);
    }

    #[test]
    fn test_italian_trigger_phrase() {
        let mut session = dev_ready_session();
        let started = session.handle_user_message("accendi i motori!").unwrap();
        assert!(started);
        assert_eq!(session.mode, Mode::Development);
    }

    #[test]
    fn test_trigger_without_plan_is_rejected() {
        let mut session = Session::new("/tmp/project");
        let err = session
            .handle_user_message("START THE ENGINES")
            .unwrap_err();
        assert!(matches!(err, PrometheanError::MissingPlan { .. }));
        // Mode unchanged
        assert_eq!(session.mode, Mode::Brainstorming);
    }

    #[test]
    fn test_ordinary_message_does_not_start() {
        let mut session = dev_ready_session();
        let started = session.handle_user_message("what about auth?").unwrap();
        assert!(!started);
        assert_eq!(session.mode, Mode::Brainstorming);
    }

    #[test]
    fn test_plan_locked_after_development_starts() {
        let mut session = dev_ready_session();
        session.handle_user_message("START THE ENGINES").unwrap();
        let err = session.set_plan("a different plan").unwrap_err();
        assert!(matches!(err, PrometheanError::InvalidState { .. }));
    }

    #[test]
    fn test_plan_summary_truncated_to_300_chars() {
        let long = "x".repeat(310);
        let plan = ProjectPlan::new(long);
        assert!(plan.summary.chars().count() <= PLAN_SUMMARY_MAX_CHARS);
        assert!(plan.summary.ends_with("..."));
        assert_eq!(plan.text.chars().count(), 310);
    }

    #[test]
    fn test_short_plan_summary_untouched() {
        let plan = ProjectPlan::new("small plan");
        assert_eq!(plan.summary, "small plan");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        // Multibyte chars must not be split mid-encoding
        let text = "è".repeat(310);
        let out = truncate_chars(&text, 300);
        assert!(out.chars().count() <= 300);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_recent_turns_window() {
        let mut session = Session::new("/tmp/p");
        for i in 0..5 {
            session.push_turn(Speaker::Assistant, format!("turn {i}"));
        }
        let recent = session.recent_turns(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "turn 2");
        assert_eq!(recent[2].text, "turn 4");
    }

    #[test]
    fn test_activate_fallback_switches_architect() {
        let mut session = Session::new("/tmp/p").with_architect(ArchitectId::Gemini);
        session.activate_fallback(ErrorKind::QuotaExceeded);
        assert_eq!(session.current_architect, ArchitectId::Claude);
        assert_eq!(session.original_architect, ArchitectId::Gemini);
        assert!(session.fallback_active);
        assert_eq!(session.fallback_reason, Some(ErrorKind::QuotaExceeded));
    }

    #[test]
    fn test_status_terminal() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Error.is_terminal());
        assert!(!Status::Running.is_terminal());
        assert!(!Status::Paused.is_terminal());
    }

    #[test]
    fn test_session_serde_round_trip() {
        let session = dev_ready_session();
        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, session.id);
        assert_eq!(back.mode, Mode::Brainstorming);
    }
}
