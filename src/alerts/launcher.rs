use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{MonitorError, MonitorResult};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// Starts an external notifier program by path, without arguments.
pub trait ProgramLauncher: Send + Sync {
    fn launch(&self, program: &Path) -> MonitorResult<()>;
}

/// Spawns the program as a detached child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl ProgramLauncher for ProcessLauncher {
    fn launch(&self, program: &Path) -> MonitorResult<()> {
        let mut child = Command::new(program)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| MonitorError::Launch {
                path: program.to_path_buf(),
                reason: err.to_string(),
            })?;

        log_debug!("launched {} (pid {})", program.display(), child.id());

        // Reap in the background so finished notifiers don't linger as zombies.
        std::thread::Builder::new()
            .name("notifier-reaper".to_string())
            .spawn(move || {
                let _ = child.wait();
            })
            .map_err(|err| MonitorError::Launch {
                path: program.to_path_buf(),
                reason: format!("failed to spawn reaper thread: {err}"),
            })?;

        Ok(())
    }
}
