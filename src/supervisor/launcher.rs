//! Worker process launching

use crate::supervisor::SupervisorError;
use crate::worker::WorkerRange;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// A running worker the supervisor can observe and stop
///
/// The futures carry no `Send` bound: the supervisor awaits them inline on
/// its own task and never spawns them.
#[allow(async_fn_in_trait)]
pub trait WorkerHandle {
    fn worker_id(&self) -> u32;

    /// Exit status if the worker has exited, without blocking
    ///
    /// `Some(true)` is a clean exit.
    fn try_exit(&mut self) -> Result<Option<bool>, SupervisorError>;

    /// Waits for the worker to exit; true on a clean exit
    async fn wait(&mut self) -> Result<bool, SupervisorError>;

    /// Asks the worker to stop, gives it `grace` to exit, then kills it
    async fn shutdown(&mut self, grace: Duration) -> Result<(), SupervisorError>;
}

/// Starts workers for ranges
pub trait WorkerLauncher {
    type Handle: WorkerHandle;

    fn launch(&mut self, range: &WorkerRange) -> Result<Self::Handle, SupervisorError>;
}

/// Launches each worker as a child process of the current executable
///
/// The child runs `<exe> <config> [flags] worker --worker-id N --start S
/// --end E --sink PATH` and inherits stdout/stderr.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    executable: PathBuf,
    config_path: PathBuf,
    global_args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(executable: PathBuf, config_path: PathBuf) -> Self {
        Self {
            executable,
            config_path,
            global_args: Vec::new(),
        }
    }

    /// Launcher for the running binary
    pub fn current_exe(config_path: PathBuf) -> Result<Self, SupervisorError> {
        Ok(Self::new(std::env::current_exe()?, config_path))
    }

    /// Extra flags placed before the subcommand (verbosity)
    pub fn with_global_args(mut self, args: Vec<String>) -> Self {
        self.global_args = args;
        self
    }

    fn command(&self, range: &WorkerRange) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .arg(&self.config_path)
            .args(&self.global_args)
            .arg("worker")
            .arg("--worker-id")
            .arg(range.worker_id.to_string())
            .arg("--start")
            .arg(range.start_identifier.to_string())
            .arg("--end")
            .arg(range.end_identifier.to_string())
            .arg("--sink")
            .arg(&range.sink_location)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl WorkerLauncher for ProcessLauncher {
    type Handle = ProcessHandle;

    fn launch(&mut self, range: &WorkerRange) -> Result<ProcessHandle, SupervisorError> {
        let child = self
            .command(range)
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                worker_id: range.worker_id,
                source,
            })?;

        tracing::info!(
            "Launched worker {} (pid {}) for [{}, {})",
            range.worker_id,
            child.id().unwrap_or_default(),
            range.start_identifier,
            range.end_identifier
        );

        Ok(ProcessHandle {
            worker_id: range.worker_id,
            child,
        })
    }
}

/// Handle to a worker child process
#[derive(Debug)]
pub struct ProcessHandle {
    worker_id: u32,
    child: Child,
}

impl WorkerHandle for ProcessHandle {
    fn worker_id(&self) -> u32 {
        self.worker_id
    }

    fn try_exit(&mut self) -> Result<Option<bool>, SupervisorError> {
        Ok(self.child.try_wait()?.map(|status| status.success()))
    }

    async fn wait(&mut self) -> Result<bool, SupervisorError> {
        Ok(self.child.wait().await?.success())
    }

    async fn shutdown(&mut self, grace: Duration) -> Result<(), SupervisorError> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        self.terminate();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                status?;
            }
            Err(_) => {
                tracing::warn!(
                    "Worker {} did not exit within {:?}, killing it",
                    self.worker_id,
                    grace
                );
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}

impl ProcessHandle {
    /// Sends SIGTERM so the worker flushes its checkpoint before exiting
    #[cfg(unix)]
    fn terminate(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return;
        };
        let Ok(raw) = i32::try_from(pid) else {
            return;
        };
        if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            tracing::warn!(
                pid,
                error = %err,
                "Failed to send SIGTERM to worker {}",
                self.worker_id
            );
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self) {}
}
