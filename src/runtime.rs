//! Bounded worker pool for reasoning jobs.
//!
//! Reasoning calls run to completion or to their budget; there is no way to
//! cancel one mid-flight. `ReasoningRuntime` moves them off the caller's
//! thread so the caller can stop waiting with [`ExecutionHandle::join_timeout`]
//! and submission fails fast with `Busy` instead of queueing without bound.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::debug;

use crate::config::RuntimeConfig;
use crate::error::{KgError, KgResult};
use crate::reasoner::{
    CentralityKind, CentralityScores, CommunityResult, InferenceResult, InferenceScope, PathResult, Reasoner, Trace,
};

/// A unit of reasoning work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasoningJob {
    Infer(InferenceScope),
    Communities,
    Centrality(CentralityKind),
    Paths {
        source: String,
        target: String,
        max_length: usize,
    },
    Explain {
        source: String,
        target: String,
    },
}

impl ReasoningJob {
    const fn name(&self) -> &'static str {
        match self {
            Self::Infer(_) => "infer",
            Self::Communities => "communities",
            Self::Centrality(_) => "centrality",
            Self::Paths { .. } => "paths",
            Self::Explain { .. } => "explain",
        }
    }

    fn run(self, reasoner: &Reasoner) -> KgResult<ReasoningOutput> {
        Ok(match self {
            Self::Infer(scope) => ReasoningOutput::Inference(reasoner.infer_relationships(scope)?),
            Self::Communities => ReasoningOutput::Communities(reasoner.detect_communities()?),
            Self::Centrality(kind) => ReasoningOutput::Centrality(reasoner.centrality(kind)?),
            Self::Paths {
                source,
                target,
                max_length,
            } => ReasoningOutput::Paths(reasoner.find_paths(&source, &target, max_length)?),
            Self::Explain { source, target } => ReasoningOutput::Trace(reasoner.explain_relationship(&source, &target)?),
        })
    }
}

/// Result of a [`ReasoningJob`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReasoningOutput {
    Inference(Arc<InferenceResult>),
    Communities(Arc<CommunityResult>),
    Centrality(Arc<CentralityScores>),
    Paths(Arc<PathResult>),
    Trace(Arc<Trace>),
}

impl ReasoningOutput {
    #[must_use]
    pub fn into_inference(self) -> Option<Arc<InferenceResult>> {
        match self {
            Self::Inference(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_communities(self) -> Option<Arc<CommunityResult>> {
        match self {
            Self::Communities(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_centrality(self) -> Option<Arc<CentralityScores>> {
        match self {
            Self::Centrality(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_paths(self) -> Option<Arc<PathResult>> {
        match self {
            Self::Paths(r) => Some(r),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_trace(self) -> Option<Arc<Trace>> {
        match self {
            Self::Trace(r) => Some(r),
            _ => None,
        }
    }
}

enum Job {
    Run {
        job: ReasoningJob,
        reply: Sender<KgResult<ReasoningOutput>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

fn disconnected() -> KgError {
    KgError::internal("reasoning worker disconnected")
}

/// Handle returned by [`ReasoningRuntime::submit`].
#[derive(Debug)]
pub struct ExecutionHandle {
    rx: Receiver<KgResult<ReasoningOutput>>,
}

impl ExecutionHandle {
    /// Waits for the job to complete.
    pub fn join(self) -> KgResult<ReasoningOutput> {
        self.rx.recv().map_err(|_| disconnected())?
    }

    /// Waits at most `timeout`. The job keeps running after a timeout; its
    /// result is discarded.
    pub fn join_timeout(self, timeout: Duration) -> KgResult<ReasoningOutput> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => KgError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => disconnected(),
        })?
    }
}

/// Fixed-size pool of threads sharing one [`Reasoner`].
#[derive(Debug)]
pub struct ReasoningRuntime {
    reasoner: Arc<Reasoner>,
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl ReasoningRuntime {
    /// Starts `config.workers` threads (at least one).
    ///
    /// # Errors
    /// `Io` if a thread cannot be spawned.
    pub fn start(reasoner: Arc<Reasoner>, config: &RuntimeConfig) -> KgResult<Self> {
        let workers = config.workers.max(1);
        let queue_capacity = config.queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let reasoner = Arc::clone(&reasoner);
            let handle = thread::Builder::new()
                .name(format!("fair-kg-reasoner-{idx}"))
                .spawn(move || worker_loop(&rx, &reasoner))?;
            handles.push(handle);
        }
        debug!(workers, queue_capacity, "Reasoning runtime started");

        Ok(Self {
            reasoner,
            tx: Some(tx),
            workers: handles,
            queue_capacity,
        })
    }

    #[must_use]
    pub fn reasoner(&self) -> &Arc<Reasoner> {
        &self.reasoner
    }

    fn try_send(&self, job: Job) -> KgResult<()> {
        let tx = self.tx.as_ref().ok_or_else(disconnected)?;
        match tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(KgError::Busy {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(disconnected()),
        }
    }

    /// Queues `job` without blocking.
    ///
    /// # Errors
    /// `Busy` when the queue is full.
    pub fn submit(&self, job: ReasoningJob) -> KgResult<ExecutionHandle> {
        let (reply, rx) = bounded(1);
        self.try_send(Job::Run { job, reply })?;
        Ok(ExecutionHandle { rx })
    }

    /// Submits and waits.
    pub fn run(&self, job: ReasoningJob) -> KgResult<ReasoningOutput> {
        self.submit(job)?.join()
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> KgResult<Receiver<()>> {
        let (reply, rx) = bounded(1);
        self.try_send(Job::Sleep { duration, reply })?;
        Ok(rx)
    }
}

fn worker_loop(rx: &Receiver<Job>, reasoner: &Reasoner) {
    while let Ok(job) = rx.recv() {
        match job {
            Job::Run { job, reply } => {
                let name = job.name();
                let result = job.run(reasoner);
                if reply.send(result).is_err() {
                    debug!(job = name, "Caller stopped waiting, result dropped");
                }
            }

            #[cfg(test)]
            Job::Sleep { duration, reply } => {
                thread::sleep(duration);
                let _ = reply.send(());
            }
        }
    }
}

impl Drop for ReasoningRuntime {
    fn drop(&mut self) {
        // Closing the channel lets workers drain queued jobs and exit.
        self.tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
