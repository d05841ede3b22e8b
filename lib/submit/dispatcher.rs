//! Bounded parallel dispatch of submission jobs with failure accounting.

use crate::submit::job::Job;
use crate::submit::processing::{execute_command, JobStatus};
use crate::utils::errors::BellesubError;

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

/// Worker pool size used when none is configured
pub const DEFAULT_WORKERS: usize = 8;

// Time a timed out job gets to exit after SIGTERM before it is killed
const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Dispatcher Configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Maximum number of commands running at once
    pub workers: usize,

    /// Optional run time limit per job
    pub timeout: Option<Duration>,

    /// Delay between SIGTERM and SIGKILL for a timed out job
    pub kill_grace: Duration,
}

impl DispatchSettings {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

/// A finished job, reported to a [`DispatchObserver`].
pub struct JobEvent<'a> {
    /// Jobs of the current run finished so far, this one included
    pub completed: usize,
    pub total: usize,
    pub job: &'a Job,
    pub status: &'a JobStatus,
    /// Combined stdout and stderr of the command
    pub output: &'a [u8],
}

/// Receives progress notifications from the dispatcher workers.
///
/// Callbacks run on the worker tasks and may be called concurrently.
pub trait DispatchObserver: Send + Sync {
    fn job_started(&self, _job: &Job) {}

    fn job_finished(&self, _event: &JobEvent<'_>) {}
}

/// Reports progress through the `log` facade.
#[derive(Debug, Default)]
pub struct LogObserver;

impl DispatchObserver for LogObserver {
    fn job_started(&self, job: &Job) {
        log::debug!("Running: {}", job.command());
    }

    fn job_finished(&self, event: &JobEvent<'_>) {
        if event.status.success() {
            log::info!("[{}/{}] {}", event.completed, event.total, event.job.input_path());
        } else {
            log::warn!(
                "[{}/{}] {} ({})",
                event.completed,
                event.total,
                event.job.input_path(),
                event.status
            );
        }
        if !event.output.is_empty() {
            log::debug!("{}", String::from_utf8_lossy(event.output).trim_end());
        }
    }
}

/// Count of finished jobs in the current (or last) run, increasing monotonically during a run.
#[derive(Debug, Clone, Default)]
pub struct Progress(Arc<AtomicUsize>);

impl Progress {
    pub fn completed(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    fn advance(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Stops the dispatcher from starting further jobs. Running jobs are left to finish.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A job that did not exit with code 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedJob {
    pub job: Job,
    pub status: JobStatus,
}

/// Outcome of one dispatch run
#[derive(Debug, Default)]
pub struct DispatchResult {
    /// Number of jobs handed to the dispatcher
    pub total: usize,

    /// Failed jobs in submission order
    pub failed: Vec<FailedJob>,

    /// Jobs never started because the dispatcher was stopped
    pub cancelled: Vec<Job>,
}

impl DispatchResult {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn succeeded(&self) -> usize {
        self.total - self.failed.len() - self.cancelled.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

/// # Dispatcher
/// Runs submission jobs on a fixed size pool of worker tasks.
///
/// Each worker takes the next job from a shared queue, runs its command to completion and
/// records the job's status against its submission index. `run` returns once every worker
/// has drained the queue.
///
/// # Example Usage
///
/// ```rust, ignore
/// let dispatcher = Dispatcher::new(DispatchSettings::new(8))?;
/// let result = dispatcher.run(jobs).await?;
/// println!("{} of {} jobs failed", result.failed_count(), result.total);
/// ```
pub struct Dispatcher {
    settings: DispatchSettings,
    observer: Arc<dyn DispatchObserver>,
    progress: Progress,
    stop: StopHandle,
}

impl Dispatcher {
    /// Create a dispatcher reporting through [`LogObserver`]
    pub fn new(settings: DispatchSettings) -> Result<Self, BellesubError> {
        if settings.workers == 0 {
            return Err(BellesubError::Validation(
                "The number of workers must be positive".to_string(),
            ));
        }
        Ok(Self {
            settings,
            observer: Arc::new(LogObserver),
            progress: Progress::default(),
            stop: StopHandle::default(),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Progress of the current run. The count restarts from zero whenever `run` is called.
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run every job and collect the failures.
    pub async fn run(&self, jobs: Vec<Job>) -> Result<DispatchResult, BellesubError> {
        let total = jobs.len();
        self.progress.reset();
        log::info!("{} commands to run", total);
        log::info!("nworkers = {}", self.settings.workers);
        if total == 0 {
            return Ok(DispatchResult::default());
        }

        let context = WorkerContext {
            jobs: Arc::new(jobs),
            queue: Arc::new(Mutex::new((0..total).collect())),
            results: Arc::new(Mutex::new(Vec::with_capacity(total))),
            observer: Arc::clone(&self.observer),
            completed: Arc::new(AtomicUsize::new(0)),
            progress: self.progress.clone(),
            stop: self.stop.clone(),
            timeout: self.settings.timeout,
            kill_grace: self.settings.kill_grace,
        };

        let workers = self.settings.workers.min(total);
        let handles: Vec<_> = (0..workers)
            .map(|_| tokio::spawn(run_worker(context.clone())))
            .collect();
        for handle in handles {
            handle.await??;
        }

        let WorkerContext { jobs, results, .. } = context;
        let results = std::mem::take(
            &mut *results
                .lock()
                .map_err(|e| BellesubError::Worker(format!("Result lock error: {:?}", e)))?,
        );
        let jobs = Arc::try_unwrap(jobs).unwrap_or_else(|jobs| (*jobs).clone());

        // Attribute every status to the job at its submission index
        let mut statuses: Vec<Option<JobStatus>> = vec![None; total];
        for (index, status) in results {
            statuses[index] = Some(status);
        }

        let mut result = DispatchResult {
            total,
            ..DispatchResult::default()
        };
        for (job, status) in jobs.into_iter().zip(statuses) {
            match status {
                Some(status) if status.success() => {}
                Some(status) => result.failed.push(FailedJob { job, status }),
                None => result.cancelled.push(job),
            }
        }

        log::debug!("Checking for failed commands...");
        if result.failed.is_empty() {
            log::info!("No failed commands");
        } else {
            log::info!("{} failed commands", result.failed.len());
            log::warn!(
                "The first failed command ({}): {}",
                result.failed[0].status,
                result.failed[0].job.command()
            );
        }
        if !result.cancelled.is_empty() {
            log::warn!("{} commands were not started", result.cancelled.len());
        }
        Ok(result)
    }
}

/// State shared by the workers of one dispatch run
#[derive(Clone)]
struct WorkerContext {
    jobs: Arc<Vec<Job>>,

    /// Indices into `jobs` still waiting for a worker
    queue: Arc<Mutex<VecDeque<usize>>>,

    /// (job index, status) pairs in completion order
    results: Arc<Mutex<Vec<(usize, JobStatus)>>>,

    observer: Arc<dyn DispatchObserver>,

    /// Finished jobs of this run
    completed: Arc<AtomicUsize>,

    progress: Progress,
    stop: StopHandle,
    timeout: Option<Duration>,
    kill_grace: Duration,
}

impl WorkerContext {
    /// Get the next job index from the queue, unless the run was stopped
    fn next_job(&self) -> Result<Option<usize>, BellesubError> {
        if self.stop.is_stopped() {
            return Ok(None);
        }
        let mut queue = self
            .queue
            .lock()
            .map_err(|e| BellesubError::Worker(format!("Job queue lock error: {:?}", e)))?;
        Ok(queue.pop_front())
    }

    fn record(&self, index: usize, status: JobStatus) -> Result<(), BellesubError> {
        self.results
            .lock()
            .map_err(|e| BellesubError::Worker(format!("Result lock error: {:?}", e)))?
            .push((index, status));
        Ok(())
    }
}

// Process jobs while the queue is non-empty
async fn run_worker(context: WorkerContext) -> Result<(), BellesubError> {
    while let Some(index) = context.next_job()? {
        let job = &context.jobs[index];
        context.observer.job_started(job);

        let (status, output) =
            match execute_command(job.command(), context.timeout, context.kill_grace).await {
                Ok(processed) => (processed.status, processed.output),
                Err(e) => {
                    log::error!("Error running job for {}: {}", job.input_path(), e);
                    (JobStatus::LaunchFailed(e.to_string()), Vec::new())
                }
            };

        let completed = context.completed.fetch_add(1, Ordering::SeqCst) + 1;
        context.progress.advance();
        context.observer.job_finished(&JobEvent {
            completed,
            total: context.jobs.len(),
            job,
            status: &status,
            output: &output,
        });
        context.record(index, status)?;
    }
    Ok(())
}
