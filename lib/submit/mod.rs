//! # Job Submission
//! Turns mdst files into bsub jobs and dispatches them over a bounded pool of workers,
//! recording the status of every job.

mod dispatcher;
mod job;
mod processing;
pub use self::dispatcher::{
    DispatchObserver, DispatchResult, DispatchSettings, Dispatcher, FailedJob, JobEvent,
    LogObserver, Progress, StopHandle, DEFAULT_WORKERS,
};
pub use self::job::{check_paths, create_bsub_jobs, shell_quote, Job, SubmitOptions};
pub use self::processing::JobStatus;
