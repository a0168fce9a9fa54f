//! Prompt construction with staged size compression.
//!
//! Prompts are rebuilt from session state every cycle; stored history is
//! never mutated. Construction is deterministic: the same session state
//! always produces the same prompt.
//!
//! Two size gates bound the output. Past the aggressive gate, turn bodies
//! are truncated to a fixed prefix; past the emergency gate, the prompt
//! collapses to the single most recent turn plus a one-line plan reference.

use tracing::debug;

use crate::session::{truncate_chars, Session, Speaker};

/// Turns included in the base prompt.
pub const CONTEXT_TURNS: usize = 3;

/// Above this many characters, turn bodies are truncated.
pub const AGGRESSIVE_THRESHOLD: usize = 5000;

/// Above this many characters, the prompt collapses to its minimal form.
pub const EMERGENCY_THRESHOLD: usize = 7000;

/// Per-turn prefix kept by aggressive compression.
const TURN_PREFIX_CHARS: usize = 600;

/// Keywords marking a project as complex (full instruction template).
const COMPLEX_KEYWORDS: &[&str] = &[
    "server",
    "backend",
    "api",
    "database",
    "docker",
    "kubernetes",
    "microservice",
    "daemon",
    "runtime",
    "compiler",
    "authentication",
    "websocket",
];

/// Keywords marking a project as simple (compressed template).
const SIMPLE_KEYWORDS: &[&str] = &[
    "landing page",
    "static site",
    "html",
    "css",
    "portfolio",
    "single page",
    "script",
    "prototype",
];

/// Project complexity, derived from the plan text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    /// Full instruction template.
    Complex,
    /// 4-line compressed template.
    Simple,
}

/// Classify a plan's complexity from its keyword content.
///
/// Complex keywords win over simple ones; a plan mentioning neither set
/// defaults to complex, which only costs prompt length.
#[must_use]
pub fn classify_plan(plan_text: &str) -> Complexity {
    let lower = plan_text.to_lowercase();
    if COMPLEX_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Complexity::Complex;
    }
    if SIMPLE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Complexity::Simple;
    }
    Complexity::Complex
}

/// Deterministic prompt builder with staged compression.
#[derive(Debug, Clone, Default)]
pub struct PromptCompressor;

impl PromptCompressor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the prompt for the next cycle from session state.
    ///
    /// Compression stages apply in order: the aggressive pass runs when
    /// the base form exceeds its gate, and the emergency pass only when
    /// the aggressively compressed result is still over its own gate. The
    /// phase instruction (`instruction`) comes from the decision tree and
    /// is always carried verbatim, even in the emergency form.
    #[must_use]
    pub fn build(&self, session: &Session, instruction: &str) -> String {
        let base = self.base_prompt(session, instruction);
        if base.chars().count() <= AGGRESSIVE_THRESHOLD {
            return base;
        }

        debug!(
            chars = base.chars().count(),
            "prompt over aggressive threshold, truncating turn bodies"
        );
        let aggressive = self.aggressive_prompt(session, instruction);
        if aggressive.chars().count() <= EMERGENCY_THRESHOLD {
            return aggressive;
        }

        debug!(
            chars = aggressive.chars().count(),
            "prompt still over emergency threshold, collapsing to minimal form"
        );
        self.emergency_prompt(session, instruction)
    }

    fn base_prompt(&self, session: &Session, instruction: &str) -> String {
        let mut out = String::new();

        if let Some(plan) = &session.plan {
            out.push_str("PROJECT PLAN:\n");
            out.push_str(&plan.summary);
            out.push_str("\n\n");
        }

        let recent = session.recent_turns(CONTEXT_TURNS);
        if !recent.is_empty() {
            out.push_str("RECENT CONVERSATION:\n");
            for turn in recent {
                out.push_str(&format_turn(turn.speaker, &turn.text));
            }
            out.push('\n');
        }

        out.push_str(&self.instruction_block(session, instruction));
        out
    }

    fn aggressive_prompt(&self, session: &Session, instruction: &str) -> String {
        let mut out = String::new();

        if let Some(plan) = &session.plan {
            out.push_str("PROJECT PLAN:\n");
            out.push_str(&plan.summary);
            out.push_str("\n\n");
        }

        let recent = session.recent_turns(CONTEXT_TURNS);
        if !recent.is_empty() {
            out.push_str("RECENT CONVERSATION (truncated):\n");
            for turn in recent {
                let body = truncate_chars(&turn.text, TURN_PREFIX_CHARS);
                out.push_str(&format_turn(turn.speaker, &body));
            }
            out.push('\n');
        }

        out.push_str(&self.instruction_block(session, instruction));
        out
    }

    fn emergency_prompt(&self, session: &Session, instruction: &str) -> String {
        let mut out = String::new();

        if session.plan.is_some() {
            out.push_str("Continue the project according to the agreed plan.\n\n");
        }

        if let Some(turn) = session.turns.last() {
            let body = truncate_chars(&turn.text, TURN_PREFIX_CHARS);
            out.push_str("LAST EXCHANGE:\n");
            out.push_str(&format_turn(turn.speaker, &body));
            out.push('\n');
        }

        out.push_str(&self.instruction_block(session, instruction));
        out
    }

    fn instruction_block(&self, session: &Session, instruction: &str) -> String {
        let complexity = session
            .plan
            .as_ref()
            .map_or(Complexity::Complex, |p| classify_plan(&p.text));

        match complexity {
            Complexity::Complex => format!(
                "CURRENT TASK:\n{instruction}\n\n\
                 Work autonomously inside the project directory. Make concrete \
                 progress this iteration: write or modify real files, run what \
                 can be run, and report exactly what you did and what remains. \
                 Do not ask for confirmation to proceed. When every feature of \
                 the plan is implemented and verified, reply with the single \
                 word PROMETHEUS_COMPLETE."
            ),
            Complexity::Simple => format!(
                "CURRENT TASK: {instruction}\n\
                 Work autonomously; modify real files.\n\
                 Report what you did and what remains.\n\
                 Reply PROMETHEUS_COMPLETE when the plan is fully done."
            ),
        }
    }
}

fn format_turn(speaker: Speaker, text: &str) -> String {
    let label = match speaker {
        Speaker::User => "USER",
        Speaker::Assistant => "ARCHITECT",
        Speaker::System => "SYSTEM",
    };
    format!("[{label}] {text}\n")
}
