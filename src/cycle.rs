//! The development-cycle state machine.
//!
//! One [`CycleRunner`] drives one session: each tick it picks a phase,
//! builds the prompt, calls the current architect through the retry
//! policy, falls back to the alternate architect if the call fails
//! outright, classifies the reply, and applies the verdict. Observers
//! follow along on the event stream; the stop flag asks the loop to stop
//! between ticks.
//!
//! Fallback is one-shot and sticky: once the session has switched
//! architects it stays switched, and a failure while already on the
//! alternate either counts toward the stuck ceiling (transient) or ends
//! the session (permanent).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use crate::checkpoint::{Checkpoint, CheckpointManager, CHECKPOINT_INTERVAL};
use crate::decision::{classify_last_reply, inspect_project, next_phase};
use crate::detector::{
    looks_finished, CompletionDetector, StuckReason, Verdict, COMPLETION_NUDGE_THRESHOLD,
    COMPLETION_SENTINEL, MAX_CONSECUTIVE_ERRORS,
};
use crate::error::{PrometheanError, Result};
use crate::lang::{
    both_failed_notice, fallback_notice, fallback_success_notice, recovery_feedback,
};
use crate::prompt::PromptCompressor;
use crate::provider::{create_architect, Architect, ArchitectId, ErrorKind, ProviderResult};
use crate::retry::RetryPolicy;
use crate::session::{Session, Speaker, Status};

/// Failsafe ceiling on total cycles per run.
pub const MAX_CYCLES: u32 = 100;

/// Pause between cycles, letting the filesystem and the user's terminal
/// catch up.
pub const TICK_DELAY: Duration = Duration::from_secs(2);

// =============================================================================
// Events
// =============================================================================

/// What the loop is doing, streamed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleEvent {
    /// A cycle is starting; the loop is deciding what to do.
    Thinking,
    /// The prompt about to be sent to the architect.
    ArchitectPrompt(String),
    /// The architect's reply.
    Output(String),
    /// The decision tree picked a phase.
    PhaseTransition(String),
    /// The session switched architects.
    ArchitectChange(ArchitectId),
    /// A user-facing notice (fallback, suspension).
    Notice(String),
    /// The loop ended; no further events follow.
    StreamEnd,
}

// =============================================================================
// Configuration
// =============================================================================

/// Tunables of the cycle runner.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Failsafe ceiling on cycles per run.
    pub max_cycles: u32,
    /// Cycles between periodic checkpoints.
    pub checkpoint_interval: u32,
    /// Delay between cycles.
    pub tick_delay: Duration,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_cycles: MAX_CYCLES,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            tick_delay: TICK_DELAY,
        }
    }
}

// =============================================================================
// Architect set
// =============================================================================

/// The two architects a session can use, selected by id.
pub struct ArchitectSet {
    claude: Box<dyn Architect>,
    gemini: Box<dyn Architect>,
}

impl ArchitectSet {
    /// Build the real CLI-backed pair for a working directory.
    #[must_use]
    pub fn for_dir(working_dir: &std::path::Path) -> Self {
        Self {
            claude: create_architect(ArchitectId::Claude, working_dir),
            gemini: create_architect(ArchitectId::Gemini, working_dir),
        }
    }

    /// Build a set from explicit implementations (tests use mocks here).
    #[must_use]
    pub fn new(claude: Box<dyn Architect>, gemini: Box<dyn Architect>) -> Self {
        Self { claude, gemini }
    }

    /// The architect for an id.
    #[must_use]
    pub fn get(&self, id: ArchitectId) -> &dyn Architect {
        match id {
            ArchitectId::Claude => self.claude.as_ref(),
            ArchitectId::Gemini => self.gemini.as_ref(),
        }
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Drives one session's development loop.
pub struct CycleRunner {
    session: Session,
    architects: ArchitectSet,
    checkpoints: CheckpointManager,
    config: CycleConfig,
    policy: RetryPolicy,
    compressor: PromptCompressor,
    detector: CompletionDetector,
    stop: Arc<AtomicBool>,
    events: UnboundedSender<CycleEvent>,
    receiver: Option<UnboundedReceiver<CycleEvent>>,
    last_failure_kind: Option<ErrorKind>,
}

impl CycleRunner {
    /// Create a runner for a session.
    #[must_use]
    pub fn new(session: Session, architects: ArchitectSet, checkpoints: CheckpointManager) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            session,
            architects,
            checkpoints,
            config: CycleConfig::default(),
            policy: RetryPolicy::default(),
            compressor: PromptCompressor::new(),
            detector: CompletionDetector::new(),
            stop: Arc::new(AtomicBool::new(false)),
            events,
            receiver: Some(receiver),
            last_failure_kind: None,
        }
    }

    /// Override the configuration.
    #[must_use]
    pub fn with_config(mut self, config: CycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Take the event stream. Yields `None` after [`CycleEvent::StreamEnd`].
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<CycleEvent>> {
        self.receiver.take()
    }

    /// Handle observers use to request a stop between ticks.
    #[must_use]
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Share an externally owned stop flag instead of the runner's own.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// The session being driven.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Restore state from a checkpoint before running.
    ///
    /// Injects a recovery turn so the architect re-derives its position
    /// from the working directory rather than a stale transcript.
    pub fn resume_from(&mut self, checkpoint: &Checkpoint) {
        checkpoint.restore_into(&mut self.session);
        self.detector.reset();
        self.last_failure_kind = None;
        let feedback = recovery_feedback(self.session.lang);
        self.session.push_turn(Speaker::System, feedback);
        self.session.set_status(Status::Running);
        info!(
            session_id = self.session.id.as_str(),
            cycle = checkpoint.cycle_count,
            "session resumed from checkpoint"
        );
    }

    /// Run the loop to a terminal state.
    ///
    /// Always emits [`CycleEvent::StreamEnd`] before returning, whatever
    /// the outcome.
    ///
    /// # Errors
    ///
    /// Returns the terminal error for stuck loops, cycle-ceiling
    /// violations, double-architect failures, and checkpoint IO problems.
    pub async fn run(&mut self) -> Result<Status> {
        if self.session.status != Status::Running {
            self.emit(CycleEvent::StreamEnd);
            return Err(PrometheanError::invalid_state(format!(
                "cannot run a session in status {:?}",
                self.session.status
            )));
        }

        if let Err(e) = self.checkpoints.acquire_lock(&self.session.id) {
            self.emit(CycleEvent::StreamEnd);
            return Err(e);
        }
        let outcome = self.run_loop().await;
        self.checkpoints.release_lock();
        self.emit(CycleEvent::StreamEnd);
        outcome
    }

    async fn run_loop(&mut self) -> Result<Status> {
        let mut cycles_this_run = 0u32;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!(session_id = self.session.id.as_str(), "stop requested");
                self.session.set_status(Status::Paused);
                self.checkpoints.write(&self.session)?;
                return Ok(Status::Paused);
            }

            if cycles_this_run >= self.config.max_cycles {
                error!(max = self.config.max_cycles, "cycle ceiling reached");
                self.session.set_status(Status::Error);
                self.checkpoints.write(&self.session)?;
                return Err(PrometheanError::MaxCycles {
                    max: self.config.max_cycles,
                });
            }

            match self.tick().await? {
                Some(terminal) => return Ok(terminal),
                None => {
                    cycles_this_run += 1;
                    self.session.cycle_count += 1;
                    if self.session.cycle_count % self.config.checkpoint_interval == 0 {
                        self.checkpoints.write(&self.session)?;
                    }
                    // A pending stop skips the delay; the loop top handles it
                    if !self.stop.load(Ordering::SeqCst) {
                        tokio::time::sleep(self.config.tick_delay).await;
                    }
                }
            }
        }
    }

    /// One cycle. `Ok(None)` means keep going; `Ok(Some(status))` is a
    /// terminal state reached cleanly.
    async fn tick(&mut self) -> Result<Option<Status>> {
        self.emit(CycleEvent::Thinking);

        let inspection = inspect_project(&self.session.working_dir);
        let last_reply = self
            .session
            .turns
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::Assistant)
            .map(|t| t.text.clone());
        let outcome = classify_last_reply(last_reply.as_deref());
        let phase = next_phase(self.session.methodology, inspection, outcome);
        self.emit(CycleEvent::PhaseTransition(phase.name().to_string()));
        info!(
            session_id = self.session.id.as_str(),
            cycle = self.session.cycle_count,
            phase = phase.name(),
            architect = %self.session.current_architect,
            "starting cycle"
        );

        let mut instruction = phase.instruction().to_string();
        if self.session.consecutive_completion_signals >= COMPLETION_NUDGE_THRESHOLD {
            instruction.push_str(&format!(
                "\nThe work sounds finished. If every feature of the plan is \
                 implemented and verified, reply with the single word \
                 {COMPLETION_SENTINEL}."
            ));
        }
        let prompt = self.compressor.build(&self.session, &instruction);
        self.emit(CycleEvent::ArchitectPrompt(prompt.clone()));

        let reply = match self.call_with_fallback(&prompt).await? {
            Some(reply) => reply,
            // Failure that does not end the session; count it and move on
            None => return Ok(None),
        };

        // A stop raised while the call was in flight takes effect now; the
        // reply is kept in the transcript but not acted on
        if self.stop.load(Ordering::SeqCst) {
            info!(
                session_id = self.session.id.as_str(),
                "stop requested during the architect call"
            );
            self.session.push_turn(Speaker::Assistant, reply.clone());
            self.emit(CycleEvent::Output(reply));
            self.session.set_status(Status::Paused);
            self.checkpoints.write(&self.session)?;
            return Ok(Some(Status::Paused));
        }

        self.session.consecutive_errors = 0;
        self.last_failure_kind = None;
        self.session.push_turn(Speaker::Assistant, reply.clone());
        self.emit(CycleEvent::Output(reply.clone()));

        match self.detector.classify(&reply, &self.session) {
            Verdict::Complete => {
                info!(
                    session_id = self.session.id.as_str(),
                    cycles = self.session.cycle_count,
                    "project complete"
                );
                self.session.set_status(Status::Completed);
                self.checkpoints.delete(&self.session.id)?;
                Ok(Some(Status::Completed))
            }
            Verdict::WaitingOnUser => {
                info!(
                    session_id = self.session.id.as_str(),
                    "architect is waiting on the user"
                );
                self.session.set_status(Status::Paused);
                self.checkpoints.write(&self.session)?;
                Ok(Some(Status::Paused))
            }
            Verdict::Stuck(reason) => {
                error!(session_id = self.session.id.as_str(), %reason, "cycle is stuck");
                self.session.set_status(Status::Error);
                self.checkpoints.write(&self.session)?;
                Err(PrometheanError::Stuck {
                    reason: reason.to_string(),
                })
            }
            Verdict::NeedsMoreWork => {
                if looks_finished(&reply) {
                    self.session.consecutive_completion_signals += 1;
                } else {
                    self.session.consecutive_completion_signals = 0;
                }
                Ok(None)
            }
        }
    }

    /// Call the current architect; on outright failure, fall back once to
    /// the alternate.
    ///
    /// `Ok(Some(reply))` on success, `Ok(None)` when the cycle failed but
    /// the loop should keep going, `Err` when the session must end.
    async fn call_with_fallback(&mut self, prompt: &str) -> Result<Option<String>> {
        let current = self.session.current_architect;
        let result = self.policy.call(self.architects.get(current), prompt).await;

        let (kind, message) = match result {
            ProviderResult::Success { text, .. } => return Ok(Some(text)),
            ProviderResult::Failure { kind, message, .. } => (kind, message),
        };

        if self.session.fallback_active {
            return self.record_post_fallback_failure(kind, message);
        }

        warn!(
            architect = %current,
            %kind,
            "architect exhausted, switching to the alternate"
        );
        self.emit(CycleEvent::Notice(
            fallback_notice(kind, self.session.lang).to_string(),
        ));
        self.session.activate_fallback(kind);
        let alternate = self.session.current_architect;
        self.emit(CycleEvent::ArchitectChange(alternate));

        let second = self
            .policy
            .call(self.architects.get(alternate), prompt)
            .await;

        match second {
            ProviderResult::Success { text, .. } => {
                let notice = fallback_success_notice(self.session.lang, alternate);
                self.session.push_turn(Speaker::System, notice.clone());
                self.emit(CycleEvent::Notice(notice));
                Ok(Some(text))
            }
            ProviderResult::Failure { kind, message, .. } => {
                error!(%kind, "alternate architect failed as well");
                self.emit(CycleEvent::Notice(
                    both_failed_notice(self.session.lang).to_string(),
                ));
                self.session.set_status(Status::Error);
                self.checkpoints.write(&self.session)?;
                Err(PrometheanError::BothArchitectsFailed { kind, message })
            }
        }
    }

    /// A failure while already running on the alternate architect.
    ///
    /// Permanent kinds end the session; transient kinds count toward the
    /// stuck ceiling and otherwise let the loop try again next cycle.
    fn record_post_fallback_failure(
        &mut self,
        kind: ErrorKind,
        message: String,
    ) -> Result<Option<String>> {
        if kind.is_permanent() {
            self.emit(CycleEvent::Notice(
                both_failed_notice(self.session.lang).to_string(),
            ));
            self.session.set_status(Status::Error);
            self.checkpoints.write(&self.session)?;
            return Err(PrometheanError::BothArchitectsFailed { kind, message });
        }

        if self.last_failure_kind == Some(kind) {
            self.session.consecutive_errors += 1;
        } else {
            self.last_failure_kind = Some(kind);
            self.session.consecutive_errors = 1;
        }
        warn!(
            %kind,
            consecutive = self.session.consecutive_errors,
            "cycle failed after fallback; will try again"
        );

        if self.session.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            let reason = StuckReason::RepeatedFailures(self.session.consecutive_errors);
            self.session.set_status(Status::Error);
            self.checkpoints.write(&self.session)?;
            return Err(PrometheanError::Stuck {
                reason: reason.to_string(),
            });
        }
        Ok(None)
    }

    fn emit(&self, event: CycleEvent) {
        // The receiver may be gone (observer dropped); that is fine
        let _ = self.events.send(event);
    }
}
