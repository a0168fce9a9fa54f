//! Promethean: an unattended, multi-iteration code-generation orchestrator.
//!
//! Promethean drives an external architect (the `claude` or `gemini` CLI)
//! through repeated development cycles: it builds a prompt from the
//! session's plan and recent history, sends it, interprets the free-text
//! reply, and decides whether the project is finished, needs another
//! iteration, or requires human input. State is checkpointed so an
//! interrupted run can resume where it left off.
//!
//! # Architecture
//!
//! - [`session`]: conversation, plan, mode and status of one session
//! - [`provider`]: the `Architect` trait and the two CLI gateways
//! - [`retry`]: escalating timeouts and bounded backoff per call
//! - [`prompt`]: deterministic prompt construction with size gates
//! - [`detector`]: reply classification (complete / more work / waiting /
//!   stuck)
//! - [`decision`]: working-directory inspection and phase selection
//! - [`checkpoint`]: crash-recovery snapshots and the session lock
//! - [`cycle`]: the state machine tying it all together
//!
//! # Example
//!
//! ```rust,ignore
//! use promethean::checkpoint::CheckpointManager;
//! use promethean::cycle::{ArchitectSet, CycleRunner};
//! use promethean::session::Session;
//!
//! let mut session = Session::new("/path/to/project");
//! session.set_plan("Build a CLI todo app")?;
//! session.handle_user_message("START THE ENGINES")?;
//!
//! let architects = ArchitectSet::for_dir(&session.working_dir);
//! let checkpoints = CheckpointManager::new()?;
//! let mut runner = CycleRunner::new(session, architects, checkpoints);
//! let status = runner.run().await?;
//! ```

pub mod checkpoint;
pub mod cycle;
pub mod decision;
pub mod detector;
pub mod error;
pub mod lang;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod session;

pub use checkpoint::{Checkpoint, CheckpointManager};
pub use cycle::{ArchitectSet, CycleConfig, CycleEvent, CycleRunner};
pub use detector::{CompletionDetector, Verdict};
pub use error::{PrometheanError, Result};
pub use lang::UiLang;
pub use prompt::PromptCompressor;
pub use provider::{Architect, ArchitectId, ErrorKind, ProviderResult};
pub use retry::RetryPolicy;
pub use session::{Methodology, Mode, Session, Status};
