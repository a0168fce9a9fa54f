//! Shared subprocess plumbing for CLI-backed architects.
//!
//! Both back ends are driven the same way: spawn the CLI in the session's
//! working directory, pipe the prompt over stdin, wait for output under a
//! deadline, and classify any failure from stderr content.

use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

use super::{error_kind::is_limit_reply, ErrorKind, ProviderResult};

/// Spawn `binary args...` with `prompt` on stdin and wait up to `timeout`.
///
/// Exactly one external call; the caller owns any retry policy. The result
/// carries the wall-clock latency of the whole call, including the time a
/// timed-out attempt spent waiting.
pub(super) async fn run_cli(
    binary: &str,
    args: &[&str],
    prompt: &str,
    working_dir: &Path,
    timeout: Duration,
) -> ProviderResult {
    let start = Instant::now();

    debug!(
        binary,
        timeout_secs = timeout.as_secs(),
        prompt_chars = prompt.len(),
        "invoking architect CLI"
    );

    let mut child = match AsyncCommand::new(binary)
        .args(args)
        .current_dir(working_dir)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return failure(
                ErrorKind::ConnectionError,
                format!("'{binary}' CLI not found in PATH"),
                start,
            );
        }
        Err(e) => {
            return failure(
                ErrorKind::ConnectionError,
                format!("failed to spawn '{binary}': {e}"),
                start,
            );
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            return failure(
                ErrorKind::ConnectionError,
                format!("failed to write prompt to '{binary}' stdin: {e}"),
                start,
            );
        }
        drop(stdin);
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return failure(
                ErrorKind::ConnectionError,
                format!("failed to read '{binary}' output: {e}"),
                start,
            );
        }
        Err(_) => {
            // kill_on_drop reaps the child
            return failure(
                ErrorKind::Timeout,
                format!("'{binary}' timed out after {}s", timeout.as_secs()),
                start,
            );
        }
    };

    let latency = start.elapsed();

    if output.status.success() {
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        // Some CLIs print limit banners to stdout and exit zero
        if is_limit_reply(&text) {
            let kind = ErrorKind::classify(&text);
            debug!(%kind, latency_ms = latency.as_millis() as u64, "success-shaped limit reply");
            return ProviderResult::Failure {
                kind,
                message: text,
                latency,
            };
        }
        debug!(
            latency_ms = latency.as_millis() as u64,
            reply_chars = text.len(),
            "architect replied"
        );
        ProviderResult::Success { text, latency }
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let exit_code = output.status.code().unwrap_or(-1);
        let message = if stderr.is_empty() {
            format!("'{binary}' exited with code {exit_code}")
        } else {
            stderr
        };
        let kind = ErrorKind::classify(&message);
        debug!(%kind, exit_code, latency_ms = latency.as_millis() as u64, "architect call failed");
        ProviderResult::Failure {
            kind,
            message,
            latency,
        }
    }
}

fn failure(kind: ErrorKind, message: String, start: Instant) -> ProviderResult {
    ProviderResult::Failure {
        kind,
        message,
        latency: start.elapsed(),
    }
}

/// Check whether `binary` resolves on PATH.
pub(super) fn binary_available(binary: &str) -> bool {
    which::which(binary).is_ok()
}
