use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::{Context, Result};
use serde_derive::{Deserialize, Serialize};

pub mod metropolis;
pub mod multistart;

/// Represents the status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Every requested iteration was performed
    Completed,
    /// The run was stopped through its [StopSignal] before the last iteration
    ManualStop,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Completed => write!(f, "Completed"),
            Status::ManualStop => write!(f, "Manual stop requested"),
        }
    }
}

/// Caller-driven cancellation of long-running chains
///
/// A run checks its signal between iterations and stops early, keeping the best point found so far, once [StopSignal::stop] has been called on any clone of the signal.
/// Optionally, the presence of a stop file also stops the run.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    file: Option<PathBuf>,
}

impl StopSignal {
    pub fn new() -> Self {
        StopSignal::default()
    }

    /// Also stop when a file exists at `path`
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        if self.flag.load(Ordering::Relaxed) {
            return true;
        }
        match &self.file {
            Some(path) => path.exists(),
            None => false,
        }
    }

    /// Clear the flag and remove a leftover stop file from a previous run
    pub fn reset(&self) -> Result<()> {
        self.flag.store(false, Ordering::Relaxed);
        if let Some(path) = &self.file {
            if Path::new(path).exists() {
                tracing::info!("Removing existing stop file prior to run");
                fs::remove_file(path).context("Unable to remove previous stop file")?;
            }
        }
        Ok(())
    }
}
