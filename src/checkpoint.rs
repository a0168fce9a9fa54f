//! Checkpoint persistence for crash recovery.
//!
//! One JSON file per session under the state directory. The manager writes
//! a checkpoint every few cycles and on graceful pause/stop, loads it once
//! at resume, and deletes it when the project completes. A corrupt file is
//! moved aside rather than deleted, and treated as absent.
//!
//! An advisory lock on the session's slot enforces the one-running-loop
//! invariant across processes.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{PrometheanError, Result};
use crate::provider::ArchitectId;
use crate::session::{Mode, Session, Status};

/// Cycles between periodic checkpoint writes.
pub const CHECKPOINT_INTERVAL: u32 = 3;

/// Snapshot of the state needed to resume a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Session this snapshot belongs to.
    pub session_id: String,
    /// Completed cycles at the time of the write.
    pub cycle_count: u32,
    /// Session phase.
    pub mode: Mode,
    /// Session status at the time of the write.
    pub status: Status,
    /// Directory the architects run in.
    pub working_dir: PathBuf,
    /// Architect in use when the snapshot was taken.
    pub architect: ArchitectId,
    /// Whether fallback had already happened.
    pub fallback_active: bool,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshot a session now.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            cycle_count: session.cycle_count,
            mode: session.mode,
            status: session.status,
            working_dir: session.working_dir.clone(),
            architect: session.current_architect,
            fallback_active: session.fallback_active,
            timestamp: Utc::now(),
        }
    }

    /// Apply this snapshot to a session being resumed.
    pub fn restore_into(&self, session: &mut Session) {
        session.cycle_count = self.cycle_count;
        session.mode = self.mode;
        session.working_dir = self.working_dir.clone();
        session.current_architect = self.architect;
        session.fallback_active = self.fallback_active;
    }
}

/// Manages checkpoint files and the per-session advisory lock.
#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
    /// Held for the lifetime of a running loop.
    lock_file: Option<File>,
}

impl CheckpointManager {
    /// Create a manager over the default state directory
    /// (`~/.local/share/promethean/checkpoints` or platform equivalent).
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn new() -> Result<Self> {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("promethean")
            .join("checkpoints");
        Self::with_dir(base)
    }

    /// Create a manager over an explicit directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock_file: None,
        })
    }

    /// Path of a session's checkpoint file.
    #[must_use]
    pub fn checkpoint_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    fn lock_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.lock"))
    }

    /// Acquire the advisory lock for a session's loop.
    ///
    /// # Errors
    ///
    /// Returns [`PrometheanError::CycleAlreadyRunning`] if another process
    /// holds the lock.
    pub fn acquire_lock(&mut self, session_id: &str) -> Result<()> {
        let path = self.lock_path(session_id);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| PrometheanError::CycleAlreadyRunning {
                session_id: session_id.to_string(),
            })?;
        self.lock_file = Some(file);
        debug!(session_id, path = %path.display(), "acquired session lock");
        Ok(())
    }

    /// Release the advisory lock, if held.
    pub fn release_lock(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }

    /// Write a checkpoint for the session.
    ///
    /// The write goes through a temp file and an atomic rename so a crash
    /// mid-write cannot corrupt the previous checkpoint.
    ///
    /// # Errors
    ///
    /// Fails on IO or serialization errors.
    pub fn write(&self, session: &Session) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::from_session(session);
        let path = self.checkpoint_path(&session.id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(&checkpoint)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        info!(
            session_id = session.id.as_str(),
            cycle = checkpoint.cycle_count,
            path = %path.display(),
            "checkpoint written"
        );
        Ok(checkpoint)
    }

    /// Load a session's checkpoint, if one exists.
    ///
    /// A corrupt file is renamed to `<name>.corrupt.<timestamp>` and `None`
    /// is returned, so a bad checkpoint never blocks a fresh start.
    ///
    /// # Errors
    ///
    /// Fails on IO errors other than the file being absent.
    pub fn load(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path(session_id);
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&path)?;
        match serde_json::from_str::<Checkpoint>(&raw) {
            Ok(checkpoint) => {
                debug!(
                    session_id,
                    cycle = checkpoint.cycle_count,
                    "checkpoint loaded"
                );
                Ok(Some(checkpoint))
            }
            Err(e) => {
                let backup = path.with_extension(format!("corrupt.{}", Utc::now().timestamp()));
                warn!(
                    session_id,
                    error = %e,
                    backup = %backup.display(),
                    "corrupt checkpoint moved aside"
                );
                fs::rename(&path, &backup)?;
                Ok(None)
            }
        }
    }

    /// Delete a session's checkpoint (project completed).
    ///
    /// Deleting an absent checkpoint is not an error.
    ///
    /// # Errors
    ///
    /// Fails on IO errors other than the file being absent.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.checkpoint_path(session_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(session_id, "checkpoint deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List session ids that have a checkpoint on disk.
    ///
    /// # Errors
    ///
    /// Fails if the state directory cannot be read.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl Drop for CheckpointManager {
    fn drop(&mut self) {
        self.release_lock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (CheckpointManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let mgr = CheckpointManager::with_dir(dir.path()).unwrap();
        (mgr, dir)
    }

    fn running_session() -> Session {
        let mut session = Session::new("/tmp/project");
        session.set_plan("a plan").unwrap();
        session.handle_user_message("START THE ENGINES").unwrap();
        session
    }

    #[test]
    fn test_write_and_load_round_trip() {
        let (mgr, _dir) = manager();
        let mut session = running_session();
        session.cycle_count = 6;

        mgr.write(&session).unwrap();
        let loaded = mgr.load(&session.id).unwrap().expect("checkpoint exists");

        assert_eq!(loaded.session_id, session.id);
        assert_eq!(loaded.cycle_count, 6);
        assert_eq!(loaded.mode, Mode::Development);
        assert_eq!(loaded.architect, ArchitectId::Claude);
    }

    #[test]
    fn test_load_missing_is_none() {
        let (mgr, _dir) = manager();
        assert!(mgr.load("no-such-session").unwrap().is_none());
    }

    #[test]
    fn test_restore_preserves_cycle_count_exactly() {
        let (mgr, _dir) = manager();
        let mut session = running_session();
        session.cycle_count = 9;
        session.activate_fallback(crate::provider::ErrorKind::QuotaExceeded);
        mgr.write(&session).unwrap();

        let mut fresh = Session::new("/elsewhere");
        fresh.id = session.id.clone();
        let checkpoint = mgr.load(&session.id).unwrap().unwrap();
        checkpoint.restore_into(&mut fresh);

        assert_eq!(fresh.cycle_count, 9);
        assert_eq!(fresh.current_architect, ArchitectId::Gemini);
        assert!(fresh.fallback_active);
        assert_eq!(fresh.working_dir, PathBuf::from("/tmp/project"));
    }

    #[test]
    fn test_corrupt_checkpoint_backed_up() {
        let (mgr, dir) = manager();
        let path = mgr.checkpoint_path("bad");
        fs::write(&path, "{not json").unwrap();

        assert!(mgr.load("bad").unwrap().is_none());
        assert!(!path.exists());

        // The original bytes survive under a .corrupt.* name
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_delete_removes_checkpoint() {
        let (mgr, _dir) = manager();
        let session = running_session();
        mgr.write(&session).unwrap();
        mgr.delete(&session.id).unwrap();
        assert!(mgr.load(&session.id).unwrap().is_none());
        // Deleting again is fine
        mgr.delete(&session.id).unwrap();
    }

    #[test]
    fn test_lock_excludes_second_holder() {
        let dir = TempDir::new().unwrap();
        let mut first = CheckpointManager::with_dir(dir.path()).unwrap();
        let mut second = CheckpointManager::with_dir(dir.path()).unwrap();

        first.acquire_lock("s1").unwrap();
        let err = second.acquire_lock("s1").unwrap_err();
        assert!(matches!(err, PrometheanError::CycleAlreadyRunning { .. }));

        first.release_lock();
        second.acquire_lock("s1").unwrap();
    }

    #[test]
    fn test_lock_is_per_session() {
        let dir = TempDir::new().unwrap();
        let mut first = CheckpointManager::with_dir(dir.path()).unwrap();
        let mut second = CheckpointManager::with_dir(dir.path()).unwrap();

        first.acquire_lock("s1").unwrap();
        second.acquire_lock("s2").unwrap();
    }

    #[test]
    fn test_list_sessions() {
        let (mgr, _dir) = manager();
        let a = running_session();
        let b = running_session();
        mgr.write(&a).unwrap();
        mgr.write(&b).unwrap();

        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        assert_eq!(mgr.list().unwrap(), expected);
    }
}
