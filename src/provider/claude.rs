//! Claude CLI gateway.
//!
//! Wraps the `claude` CLI in the [`Architect`] contract: one external call
//! per invocation, stderr-classified failures, no session mutation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::cli::{binary_available, run_cli};
use super::{Architect, ArchitectId, ProviderResult};

/// Gateway to the `claude` CLI.
#[derive(Debug, Clone)]
pub struct ClaudeArchitect {
    /// Directory the CLI runs in; generated code lands here.
    working_dir: PathBuf,
    /// Model variant passed to the CLI.
    model: String,
}

impl ClaudeArchitect {
    /// Create a gateway running in the given working directory.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(working_dir: P) -> Self {
        Self {
            working_dir: working_dir.into(),
            model: "sonnet".to_string(),
        }
    }

    /// Set the model variant (e.g. "opus", "sonnet").
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// The working directory this gateway operates in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}

#[async_trait]
impl Architect for ClaudeArchitect {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> ProviderResult {
        let args = [
            "-p",
            "--dangerously-skip-permissions",
            "--model",
            self.model.as_str(),
            "--output-format",
            "text",
        ];
        run_cli("claude", &args, prompt, &self.working_dir, timeout).await
    }

    fn id(&self) -> ArchitectId {
        ArchitectId::Claude
    }

    async fn available(&self) -> bool {
        binary_available("claude")
    }
}
