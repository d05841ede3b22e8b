//! bellesub: query the KEKCC catalog for mdst files and submit one basf2 job per file
mod args;
mod utils;

use args::Args;
use bellesub::catalog::{CatalogClient, CatalogSource};
use bellesub::submit::{check_paths, create_bsub_jobs, DispatchResult, Dispatcher};
use bellesub::utils::dirs::create_dir;
use std::error::Error;
use std::process::ExitCode;
use structopt::StructOpt;

// Help requested without arguments, or the catalog had nothing to submit
const EXIT_NOTHING_TO_DO: u8 = 1;

// Invalid input, missing paths or an unreachable catalog
const EXIT_FATAL: u8 = 2;

// Stopped by Ctrl-C before every job was submitted (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

/// How a run ended when no fatal error occurred
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    /// Every job was handed to the dispatcher and the run completed
    Submitted,

    /// The catalog returned no mdst files
    NothingToDo,

    /// Commands were printed instead of run
    DryRun { jobs: usize },

    /// The run was stopped before every job started
    Interrupted,
}

impl Outcome {
    fn code(&self) -> u8 {
        match self {
            Outcome::Submitted | Outcome::DryRun { .. } => 0,
            Outcome::NothingToDo => EXIT_NOTHING_TO_DO,
            Outcome::Interrupted => EXIT_INTERRUPTED,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    utils::init_logging();
    if std::env::args_os().len() == 1 {
        if let Err(e) = utils::print_help() {
            log::error!("Failed to print help: {}", e);
        }
        return ExitCode::from(EXIT_NOTHING_TO_DO);
    }

    let opt = Args::from_args();
    let catalog = match CatalogClient::new(&opt.catalog_url) {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let result = run(opt, catalog).await;
    if let Err(e) = &result {
        log::error!("{}", e);
    }
    ExitCode::from(status_code(&result))
}

fn status_code(result: &Result<Outcome, Box<dyn Error>>) -> u8 {
    match result {
        Ok(outcome) => outcome.code(),
        Err(_) => EXIT_FATAL,
    }
}

// Failed jobs are logged by the dispatcher and do not change the exit code
fn outcome(result: &DispatchResult) -> Outcome {
    if result.cancelled.is_empty() {
        Outcome::Submitted
    } else {
        Outcome::Interrupted
    }
}

async fn run<S: CatalogSource>(
    opt: Args,
    catalog: CatalogClient<S>,
) -> Result<Outcome, Box<dyn Error>> {
    // Reject the query before the output directory is touched, it may be cleared
    let query = opt.query();
    query.validate()?;

    create_dir(&opt.outdir, opt.clear_policy(), utils::confirm_clear)?;
    check_paths(&opt.outdir, &opt.script)?;

    let mut mdst_list = catalog.get_mdst_list(&query).await?;
    if mdst_list.is_empty() {
        log::warn!("Zero mdst found for specified experiment info.");
        return Ok(Outcome::NothingToDo);
    }
    if opt.one {
        mdst_list.truncate(1);
    }

    let jobs = create_bsub_jobs(&opt.outdir, &opt.script, &mdst_list, &opt.submit_options())?;
    log::info!("{} bsub commands created", jobs.len());
    if let Some(job) = jobs.first() {
        log::info!("The first bsub command: {}", job.command());
    }

    if opt.dry_run {
        for job in &jobs {
            println!("{}", job.command());
        }
        return Ok(Outcome::DryRun { jobs: jobs.len() });
    }

    let dispatcher = Dispatcher::new(opt.dispatch_settings())?;
    let stop = dispatcher.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, no further jobs will be submitted");
            stop.stop();
        }
    });

    let result = dispatcher.run(jobs).await?;
    log::info!(
        "{} of {} jobs submitted successfully",
        result.succeeded(),
        result.total
    );
    if !result.cancelled.is_empty() {
        log::warn!("{} jobs were never submitted", result.cancelled.len());
    }
    Ok(outcome(&result))
}
