//! Gemini CLI gateway.
//!
//! Same contract as [`super::claude::ClaudeArchitect`], driving the
//! `gemini` CLI instead. The two gateways are interchangeable behind the
//! [`Architect`] trait, which is what makes transparent fallback possible.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::cli::{binary_available, run_cli};
use super::{Architect, ArchitectId, ProviderResult};

/// Gateway to the `gemini` CLI.
#[derive(Debug, Clone)]
pub struct GeminiArchitect {
    working_dir: PathBuf,
    /// Model identifier passed to the CLI.
    model: String,
}

impl GeminiArchitect {
    /// Create a gateway running in the given working directory.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(working_dir: P) -> Self {
        Self {
            working_dir: working_dir.into(),
            model: "gemini-2.5-pro".to_string(),
        }
    }

    /// Set the model identifier.
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
impl Architect for GeminiArchitect {
    async fn invoke(&self, prompt: &str, timeout: Duration) -> ProviderResult {
        let args = ["-p", "--model", self.model.as_str(), "--yolo"];
        run_cli("gemini", &args, prompt, &self.working_dir, timeout).await
    }

    fn id(&self) -> ArchitectId {
        ArchitectId::Gemini
    }

    async fn available(&self) -> bool {
        binary_available("gemini")
    }
}
