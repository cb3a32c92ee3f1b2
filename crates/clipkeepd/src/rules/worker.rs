//! Sequential snapshot evaluation off the engine thread.
//!
//! The worker takes one job at a time, evaluates it and hands the outcome to
//! a [`PipelineSink`], which blocks until the engine has applied the commit
//! group. The next snapshot is only evaluated afterwards, so the effects of
//! two snapshots never interleave.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::RULES_TARGET;
use super::chain::{CancelToken, ChainExecutor};
use super::pipeline::{PipelineJob, PipelineOutcome, evaluate};

/// Receives evaluation outcomes.
pub trait PipelineSink: Send + 'static {
    /// Delivers one outcome and waits until it was applied. Returns false
    /// when the receiver is gone and the worker should stop.
    fn deliver(&self, outcome: PipelineOutcome) -> bool;
}

/// Handle to the pipeline worker thread.
pub struct PipelineWorker {
    jobs: Option<Sender<PipelineJob>>,
    cancel: CancelToken,
    thread: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Fails when the thread cannot be spawned.
    pub fn spawn<S>(executor: Arc<dyn ChainExecutor>, sink: S) -> io::Result<Self>
    where
        S: PipelineSink,
    {
        let (jobs, queue) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let thread = thread::Builder::new()
            .name("clipkeep-pipeline".to_owned())
            .spawn(move || run(&queue, executor.as_ref(), &sink, &token))?;
        Ok(Self {
            jobs: Some(jobs),
            cancel,
            thread: Some(thread),
        })
    }

    /// Queues a job without waiting. Returns false when the worker stopped.
    pub fn submit(&self, job: PipelineJob) -> bool {
        self.jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(job).is_ok())
    }

    /// Cancels the running chain, drops queued jobs and joins the thread.
    ///
    /// The sink must not be waiting on the caller, or this deadlocks.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        self.jobs.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!(target: RULES_TARGET, "pipeline worker panicked");
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

fn run(
    queue: &Receiver<PipelineJob>,
    executor: &dyn ChainExecutor,
    sink: &dyn PipelineSink,
    cancel: &CancelToken,
) {
    while let Ok(job) = queue.recv() {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = evaluate(job, executor, cancel);
        if !sink.deliver(outcome) {
            break;
        }
    }
    debug!(target: RULES_TARGET, "pipeline worker stopped");
}
