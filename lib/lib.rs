//! This library exposes two modules - an mdst catalog client and a batch job dispatcher
//!
//! # Catalog
//! Builds KEKCC catalog queries for Belle data and MC and returns the matching mdst file list.
//!
//! # Submission
//! Creates one `bsub` job per mdst file and runs the submissions in parallel on a fixed size
//! worker pool, reporting every job that did not exit cleanly.

pub mod catalog;
pub mod submit;
pub mod utils;
pub use utils::errors::BellesubError;
