//! Board control script hook.
//!
//! Boards usually need the MCU put into its bootloader before flashing (BSL
//! invoke pin, reset line) and released afterwards. A user-supplied
//! executable does that; it is called with `init` before the interface is
//! opened and with `exit` after it is closed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error};

use crate::CliError;

/// Script used when neither the command line nor the config names one.
pub const DEFAULT_SCRIPT: &str = "/etc/mspm0flash/ctrl";

/// Time the bootloader gets to come up after `init`.
pub const SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Argument passed to the control script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Enter the bootloader.
    Init,
    /// Leave the bootloader.
    Exit,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The control script of one flashing session.
#[derive(Debug, Clone)]
pub struct ControlScript {
    path: PathBuf,
    settle: Duration,
}

impl ControlScript {
    /// Use the script at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settle: SETTLE_DELAY,
        }
    }

    /// Pick the script path: an explicit one (flag or `MSPM0FLASH_CTRL`),
    /// then the config file, then [`DEFAULT_SCRIPT`].
    pub fn resolve(explicit: Option<&Path>, configured: Option<&Path>) -> Self {
        let path = explicit
            .or(configured)
            .map_or_else(|| PathBuf::from(DEFAULT_SCRIPT), Path::to_path_buf);
        Self::new(path)
    }

    /// Override the delay after `init`.
    #[must_use]
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Script path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&self, phase: Phase) -> Result<()> {
        debug!("Running control script {} {phase}", self.path.display());
        let status = Command::new(&self.path)
            .arg(phase.as_str())
            .status()
            .with_context(|| format!("Failed to run control script {}", self.path.display()))?;

        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "a signal".to_string(), |code| code.to_string());
            return Err(CliError::Script(format!(
                "control script {} returned {code} (parameter {phase})",
                self.path.display()
            ))
            .into());
        }
        Ok(())
    }

    /// Put the board into the bootloader and wait for it to settle.
    pub fn init(&self) -> Result<()> {
        self.run(Phase::Init)?;
        thread::sleep(self.settle);
        Ok(())
    }

    /// Release the board. Failures are only reported.
    pub fn exit(&self) {
        if let Err(e) = self.run(Phase::Exit) {
            error!("{e:#}");
        }
    }
}
