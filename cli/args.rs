//! Command line arguments for bellesub

use bellesub::catalog::{DataType, EventType, QueryParameters, Stream, DATA_TYPES, EVENT_TYPES};
use bellesub::submit::{DispatchSettings, SubmitOptions};
use bellesub::utils::dirs::ClearPolicy;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "bellesub",
    about = "Submit basf2 jobs for the Belle mdst files listed in the KEKCC catalog"
)]
pub struct Args {
    /// Steering script to run
    #[structopt(parse(from_os_str))]
    pub script: PathBuf,

    /// Output dir
    #[structopt(parse(from_os_str))]
    pub outdir: PathBuf,

    /// Query real data instead of MC
    #[structopt(long)]
    pub is_data: bool,

    /// Experiment number
    #[structopt(long, default_value = "65")]
    pub exp: u32,

    /// Run number start
    #[structopt(long, default_value = "1")]
    pub run_start: u32,

    /// Run number end
    #[structopt(long, default_value = "9999")]
    pub run_end: u32,

    /// Event type (MC only)
    #[structopt(long, default_value = "Any", possible_values = EVENT_TYPES)]
    pub event_type: EventType,

    /// Data type
    #[structopt(long, default_value = "on_resonance", possible_values = DATA_TYPES)]
    pub data_type: DataType,

    /// Belle processing level
    #[structopt(long, default_value = "caseB")]
    pub belle_level: String,

    /// Skim type (data only)
    #[structopt(long, default_value = "HadronBorJ")]
    pub skim: String,

    /// Stream number or "Any" (MC only)
    #[structopt(long, default_value = "0")]
    pub stream: Stream,

    /// bsub queue
    #[structopt(short, long, default_value = "s")]
    pub queue: String,

    /// Extra basf2 options, e.g. "-n 1000"
    #[structopt(long, default_value = "", allow_hyphen_values = true)]
    pub basf2_opt: String,

    /// Number of submissions running in parallel
    #[structopt(short = "j", long, default_value = "8", env = "BELLESUB_NWORKERS")]
    pub nworkers: usize,

    /// Per job time limit in seconds
    #[structopt(long)]
    pub timeout: Option<u64>,

    /// Catalog host
    #[structopt(
        long,
        default_value = "http://bweb3.cc.kek.jp/",
        env = "BELLESUB_CATALOG_URL"
    )]
    pub catalog_url: String,

    /// Only process the first mdst in the list
    #[structopt(long)]
    pub one: bool,

    /// Clear a non-empty output dir without asking
    #[structopt(long, conflicts_with = "no-clear")]
    pub clear: bool,

    /// Keep a non-empty output dir without asking
    #[structopt(long)]
    pub no_clear: bool,

    /// Print the bsub commands instead of running them
    #[structopt(long)]
    pub dry_run: bool,
}

impl Args {
    pub fn clear_policy(&self) -> ClearPolicy {
        if self.clear {
            ClearPolicy::AlwaysClear
        } else if self.no_clear {
            ClearPolicy::NeverClear
        } else {
            ClearPolicy::PromptOperator
        }
    }

    pub fn query(&self) -> QueryParameters {
        QueryParameters {
            is_data: self.is_data,
            experiment: self.exp,
            run_start: self.run_start,
            run_end: self.run_end,
            event_type: self.event_type,
            data_type: self.data_type,
            processing_level: self.belle_level.clone(),
            stream: self.stream,
            skim: self.skim.clone(),
        }
    }

    pub fn submit_options(&self) -> SubmitOptions {
        SubmitOptions::new(self.queue.clone(), self.basf2_opt.clone())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        let settings = DispatchSettings::new(self.nworkers);
        match self.timeout {
            Some(secs) => settings.with_timeout(Duration::from_secs(secs)),
            None => settings,
        }
    }
}
