//! Reply classification: finished, needs another cycle, waiting on the
//! user, or stuck.
//!
//! The sentinel token is checked first and is authoritative: a reply
//! containing it is `Complete` no matter what else it says. The question
//! heuristic and the repetition detector only run when the sentinel is
//! absent.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::session::Session;

/// Token an architect emits to declare the project finished.
pub const COMPLETION_SENTINEL: &str = "PROMETHEUS_COMPLETE";

/// Replies compared for near-duplication.
pub const REPETITION_WINDOW: usize = 3;

/// Consecutive provider-failure cycles tolerated before declaring stuck.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Consecutive completion-sounding replies before the loop reminds the
/// architect to emit the sentinel.
pub const COMPLETION_NUDGE_THRESHOLD: u32 = 2;

/// Why the cycle was judged stuck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StuckReason {
    /// The last [`REPETITION_WINDOW`] replies were near-identical.
    Repetition,
    /// Too many consecutive cycles ended in provider failure.
    RepeatedFailures(u32),
}

impl std::fmt::Display for StuckReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repetition => write!(f, "architect is repeating itself"),
            Self::RepeatedFailures(n) => write!(f, "{n} consecutive failed cycles"),
        }
    }
}

/// Outcome of classifying one architect reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The sentinel appeared; the project is done.
    Complete,
    /// Keep iterating.
    NeedsMoreWork,
    /// The architect asked the user something; pause.
    WaitingOnUser,
    /// The loop is not making progress; stop with an error.
    Stuck(StuckReason),
}

// =============================================================================
// Question heuristic data
// =============================================================================

/// Phrases that mean the architect is waiting for human input.
const WAITING_PHRASES: &[&str] = &[
    // English
    "let me know",
    "please confirm",
    "please clarify",
    "which option",
    "which one do you prefer",
    "do you want me to",
    "should i proceed",
    "waiting for your",
    "need your input",
    "before i continue",
    // Italian
    "fammi sapere",
    "per favore conferma",
    "quale opzione",
    "quale preferisci",
    "vuoi che proceda",
    "devo procedere",
    "aspetto una tua",
    "ho bisogno di una tua",
    "prima di continuare",
];

/// Phrases that describe the project as finished without the sentinel.
const COMPLETION_HINT_PHRASES: &[&str] = &[
    // English
    "project is complete",
    "everything is done",
    "all features are implemented",
    "implementation is complete",
    "work is finished",
    "nothing left to implement",
    "fully implemented and verified",
    // Italian
    "progetto è completo",
    "tutto è fatto",
    "tutte le funzionalità sono implementate",
    "implementazione è completa",
    "lavoro è finito",
];

/// Rhetorical/progress phrases that look like questions but are not
/// addressed to the user.
const SELF_DIRECTED_PHRASES: &[&str] = &[
    "let me",
    "i will",
    "i'll",
    "now i",
    "next i",
    "procedo",
    "adesso",
    "ora",
];

fn question_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // A sentence ending in '?' near the end of the reply
    RE.get_or_init(|| Regex::new(r"(?m)[^.!?\n]{3,}\?\s*$").expect("static regex"))
}

// =============================================================================
// Fingerprints
// =============================================================================

/// Fingerprint of a reply for repetition comparison.
///
/// Whitespace runs are collapsed before hashing so formatting jitter does
/// not defeat the comparison.
#[must_use]
pub fn reply_fingerprint(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!("{:x}", md5::compute(normalized.to_lowercase()))
}

// =============================================================================
// Detector
// =============================================================================

/// Classifies architect replies and tracks the repetition window.
#[derive(Debug, Clone, Default)]
pub struct CompletionDetector {
    recent_fingerprints: Vec<String>,
}

impl CompletionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one reply against the session's current counters.
    ///
    /// Checks run in a fixed order: sentinel, question heuristic, then the
    /// stuck conditions. Every sentinel-free reply is recorded into the
    /// repetition window, whatever the verdict.
    pub fn classify(&mut self, reply: &str, session: &Session) -> Verdict {
        // Sentinel first; it is authoritative
        if reply.to_uppercase().contains(COMPLETION_SENTINEL) {
            debug!("completion sentinel found");
            return Verdict::Complete;
        }

        let repeated = self.push_fingerprint(reply);

        if is_waiting_on_user(reply) {
            debug!("reply reads as a question to the user");
            return Verdict::WaitingOnUser;
        }

        if repeated {
            debug!("repetition window saturated with identical replies");
            return Verdict::Stuck(StuckReason::Repetition);
        }

        if session.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            return Verdict::Stuck(StuckReason::RepeatedFailures(session.consecutive_errors));
        }

        Verdict::NeedsMoreWork
    }

    /// Record a fingerprint; returns `true` when the window is full and
    /// all entries are identical.
    fn push_fingerprint(&mut self, reply: &str) -> bool {
        let fp = reply_fingerprint(reply);
        self.recent_fingerprints.push(fp);
        if self.recent_fingerprints.len() > REPETITION_WINDOW {
            self.recent_fingerprints.remove(0);
        }
        self.recent_fingerprints.len() == REPETITION_WINDOW
            && self
                .recent_fingerprints
                .windows(2)
                .all(|pair| pair[0] == pair[1])
    }

    /// Drop accumulated fingerprints (used on resume, where prior replies
    /// are not available).
    pub fn reset(&mut self) {
        self.recent_fingerprints.clear();
    }
}

/// Whether a reply describes the work as finished without carrying the
/// sentinel.
///
/// Used by the cycle to count consecutive completion signals; once the
/// counter reaches [`COMPLETION_NUDGE_THRESHOLD`] the next prompt reminds
/// the architect how to actually finish.
#[must_use]
pub fn looks_finished(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    COMPLETION_HINT_PHRASES.iter().any(|p| lower.contains(p))
}

/// Whether a reply reads as a question addressed to the user.
fn is_waiting_on_user(reply: &str) -> bool {
    let lower = reply.to_lowercase();

    if WAITING_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }

    if question_regex().is_match(reply.trim_end()) {
        // A trailing question mark alone is ambiguous; suppress it when the
        // tail of the reply reads as the architect talking to itself
        let tail: String = lower.chars().rev().take(200).collect::<String>();
        let tail: String = tail.chars().rev().collect();
        return !SELF_DIRECTED_PHRASES.iter().any(|p| tail.contains(p));
    }

    false
}
