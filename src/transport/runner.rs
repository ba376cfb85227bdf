//! CK-052: Slot runner: runs recipe commands on a tokio runtime.
//!
//! The walk stays synchronous. It starts jobs, which become tokio tasks, and
//! blocks in [`SlotRunner::wait`] for whichever finishes first. Limiting the
//! number of jobs in flight is the walk's business, not the runner's.

use super::{exec_script, Job, JobResult, JobRunner};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

pub struct SlotRunner {
    rt: Runtime,
    workdir: PathBuf,
    tx: mpsc::UnboundedSender<JobResult>,
    rx: mpsc::UnboundedReceiver<JobResult>,
    in_flight: usize,
}

impl SlotRunner {
    pub fn new(workdir: impl Into<PathBuf>, threads: usize) -> Result<Self, String> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .enable_all()
            .build()
            .map_err(|e| format!("cannot start job runtime: {}", e))?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            rt,
            workdir: workdir.into(),
            tx,
            rx,
            in_flight: 0,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl JobRunner for SlotRunner {
    fn start(&mut self, job: Job) -> Result<(), String> {
        let tx = self.tx.clone();
        let workdir = self.workdir.clone();
        tracing::debug!(job = job.id, command = %job.command, "starting job");
        self.rt.spawn(async move {
            let output = exec_script(job.host.as_ref(), &workdir, &job.command).await;
            // receiver only goes away with the runner itself
            let _ = tx.send(JobResult { id: job.id, output });
        });
        self.in_flight += 1;
        Ok(())
    }

    fn wait(&mut self) -> Result<JobResult, String> {
        if self.in_flight == 0 {
            return Err("wait with no job running".to_string());
        }
        let result = self
            .rt
            .block_on(self.rx.recv())
            .ok_or_else(|| "job channel closed".to_string())?;
        self.in_flight -= 1;
        tracing::debug!(job = result.id, exit = result.output.exit_code, "job finished");
        Ok(result)
    }
}
