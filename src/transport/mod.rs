//! CK-050/051: Command transport: local and SSH execution, and the job
//! runner the walk hands recipe commands to.

pub mod local;
pub mod runner;
pub mod ssh;

use crate::core::recipe::Host;
use std::path::Path;

/// Output from running one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// A command that never got to run.
    pub fn spawn_failure(message: String) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: message,
        }
    }
}

/// One command for one recipe instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: usize,
    pub command: String,
    pub host: Option<Host>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    pub id: usize,
    pub output: ExecOutput,
}

/// Runs recipe commands. `start` never blocks; `wait` blocks until some
/// started job finishes.
pub trait JobRunner {
    fn start(&mut self, job: Job) -> Result<(), String>;

    fn wait(&mut self) -> Result<JobResult, String>;
}

/// Run a script on a host, or locally when unbound.
pub async fn exec_script(host: Option<&Host>, workdir: &Path, script: &str) -> ExecOutput {
    let res = match host {
        Some(h) if !h.is_local() => ssh::exec_ssh(h, script).await,
        _ => local::exec_local(workdir, script).await,
    };
    res.unwrap_or_else(ExecOutput::spawn_failure)
}
