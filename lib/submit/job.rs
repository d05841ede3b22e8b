//! Exposes the job type and the bsub command builder

use crate::utils::errors::BellesubError;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A single queue submission for one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    input_path: String,
    output_path: PathBuf,
    log_path: PathBuf,
    command: String,
}

impl Job {
    /// Construct a new Job
    ///
    /// # Arguments
    ///
    /// * `input_path`  - Input mdst file the job processes.
    /// * `output_path` - Artifact the job writes.
    /// * `log_path`    - Per-job batch log.
    /// * `command`     - Shell command line that submits the job.
    pub fn new(
        input_path: impl Into<String>,
        output_path: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            log_path: log_path.into(),
            command: command.into(),
        }
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Submission settings shared by every job of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOptions {
    /// bsub queue
    pub queue: String,

    /// Extra basf2 options, inserted verbatim before the steering script
    pub analysis_options: String,

    /// Queue submission executable
    pub submit_tool: String,

    /// Analysis framework executable
    pub analysis_tool: String,

    /// File collecting the output of every submission
    pub shared_log: PathBuf,
}

impl SubmitOptions {
    pub fn new(queue: impl Into<String>, analysis_options: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            analysis_options: analysis_options.into(),
            ..Self::default()
        }
    }
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            queue: "s".to_string(),
            analysis_options: String::new(),
            submit_tool: "bsub".to_string(),
            analysis_tool: "basf2".to_string(),
            shared_log: PathBuf::from("bsub.log"),
        }
    }
}

/// Check that the output directory and the steering script exist.
pub fn check_paths(outdir: &Path, script: &Path) -> Result<(), BellesubError> {
    if !outdir.is_dir() {
        return Err(BellesubError::Validation(format!(
            "outdir ({}) does not exist!",
            outdir.display()
        )));
    }
    if !script.exists() {
        return Err(BellesubError::Validation(format!(
            "script ({}) does not exist!",
            script.display()
        )));
    }
    Ok(())
}

/// Create one bsub job per input file.
///
/// Each job writes `<outdir>/ntuple.<name>` and logs to `<outdir>/<name>.log`, where `<name>`
/// is the input file name. Inputs sharing a file name get a numeric suffix (`<name>.1`, ...)
/// so that no two jobs write the same output or log file.
///
/// # Arguments
///
/// * `outdir`  - Existing output directory.
/// * `script`  - Existing basf2 steering script.
/// * `infiles` - Input mdst files.
/// * `options` - Queue and basf2 settings.
pub fn create_bsub_jobs<S: AsRef<str>>(
    outdir: &Path,
    script: &Path,
    infiles: &[S],
    options: &SubmitOptions,
) -> Result<Vec<Job>, BellesubError> {
    check_paths(outdir, script)?;

    let mut used_files = HashSet::with_capacity(2 * infiles.len());
    let mut jobs = Vec::with_capacity(infiles.len());
    for infile in infiles {
        let infile = infile.as_ref();
        let base = Path::new(infile)
            .file_name()
            .ok_or_else(|| {
                BellesubError::Validation(format!("Input file {} has no file name", infile))
            })?
            .to_string_lossy()
            .into_owned();

        // Log and output names share one namespace inside outdir
        let mut name = base.clone();
        let mut suffix = 1;
        while used_files.contains(&log_name(&name)) || used_files.contains(&output_name(&name)) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }

        let log_path = outdir.join(log_name(&name));
        let output_path = outdir.join(output_name(&name));
        let command = bsub_command(options, script, infile, &output_path, &log_path);
        used_files.insert(log_name(&name));
        used_files.insert(output_name(&name));
        jobs.push(Job::new(infile, output_path, log_path, command));
    }
    Ok(jobs)
}

fn log_name(name: &str) -> String {
    format!("{}.log", name)
}

fn output_name(name: &str) -> String {
    format!("ntuple.{}", name)
}

// <submit-tool> -q <queue> -oo <logfile> <analysis-tool> [<options>] <script> <infile> <outfile> >> <shared-log>
fn bsub_command(
    options: &SubmitOptions,
    script: &Path,
    infile: &str,
    outfile: &Path,
    logfile: &Path,
) -> String {
    let mut parts = vec![
        shell_quote(&options.submit_tool),
        "-q".to_string(),
        shell_quote(&options.queue),
        "-oo".to_string(),
        shell_quote(&logfile.to_string_lossy()),
        shell_quote(&options.analysis_tool),
    ];
    let analysis_options = options.analysis_options.trim();
    if !analysis_options.is_empty() {
        parts.push(analysis_options.to_string());
    }
    parts.push(shell_quote(&script.to_string_lossy()));
    parts.push(shell_quote(infile));
    parts.push(shell_quote(&outfile.to_string_lossy()));
    parts.push(">>".to_string());
    parts.push(shell_quote(&options.shared_log.to_string_lossy()));
    parts.join(" ")
}

/// Quote a string for use as a single shell word. Plain paths are returned unchanged.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    let plain = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c));
    if plain {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Setup {
        dir: tempfile::TempDir,
        outdir: PathBuf,
        script: PathBuf,
    }

    fn setup() -> Result<Setup, BellesubError> {
        let dir = tempfile::tempdir()?;
        let outdir = dir.path().join("out");
        let script = dir.path().join("steer.py");
        fs::create_dir(&outdir)?;
        fs::write(&script, b"import basf2\n")?;
        Ok(Setup {
            dir,
            outdir,
            script,
        })
    }

    #[test]
    fn test_command_shape() -> Result<(), BellesubError> {
        let s = setup()?;
        let infile = "/group/belle/bdata_b/dstprod/dat/e000045/HadronBJ/0127/on_resonance/00/HadronBJ-e000045r000047-b20090127_0910.mdst";
        let options = SubmitOptions::new("l", "-n 100");

        let jobs = create_bsub_jobs(&s.outdir, &s.script, &[infile], &options)?;
        assert_eq!(jobs.len(), 1);

        let job = &jobs[0];
        let log = s.outdir.join("HadronBJ-e000045r000047-b20090127_0910.mdst.log");
        let out = s.outdir.join("ntuple.HadronBJ-e000045r000047-b20090127_0910.mdst");
        assert_eq!(job.input_path(), infile);
        assert_eq!(job.log_path(), log.as_path());
        assert_eq!(job.output_path(), out.as_path());
        assert_eq!(
            job.command(),
            format!(
                "bsub -q l -oo {} basf2 -n 100 {} {} {} >> bsub.log",
                log.display(),
                s.script.display(),
                infile,
                out.display()
            )
        );
        Ok(())
    }

    #[test]
    fn test_empty_input() -> Result<(), BellesubError> {
        let s = setup()?;
        let none: [&str; 0] = [];
        let jobs = create_bsub_jobs(&s.outdir, &s.script, &none, &SubmitOptions::default())?;
        assert!(jobs.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_paths() -> Result<(), BellesubError> {
        let s = setup()?;
        let infiles = ["/group/a.mdst"];
        let options = SubmitOptions::default();

        let missing_dir = s.dir.path().join("nope");
        assert!(matches!(
            create_bsub_jobs(&missing_dir, &s.script, &infiles, &options),
            Err(BellesubError::Validation(_))
        ));

        let missing_script = s.dir.path().join("nope.py");
        assert!(matches!(
            create_bsub_jobs(&s.outdir, &missing_script, &infiles, &options),
            Err(BellesubError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_distinct_inputs_get_distinct_paths() -> Result<(), BellesubError> {
        let s = setup()?;
        let infiles = [
            "/group/e000045/a.mdst",
            "/group/e000046/a.mdst",
            "/group/e000047/a.mdst",
            "/group/e000047/a.mdst.1",
            "/group/e000047/b.mdst",
        ];

        let jobs = create_bsub_jobs(&s.outdir, &s.script, &infiles, &SubmitOptions::default())?;
        let outputs: HashSet<_> = jobs.iter().map(|j| j.output_path()).collect();
        let logs: HashSet<_> = jobs.iter().map(|j| j.log_path()).collect();
        assert_eq!(outputs.len(), infiles.len());
        assert_eq!(logs.len(), infiles.len());

        // The first occurrence keeps the plain name
        assert_eq!(jobs[0].output_path(), s.outdir.join("ntuple.a.mdst").as_path());
        assert_eq!(jobs[1].output_path(), s.outdir.join("ntuple.a.mdst.1").as_path());
        Ok(())
    }

    #[test]
    fn test_log_never_shares_a_path_with_output() -> Result<(), BellesubError> {
        let s = setup()?;
        // ntuple.x logs to ntuple.x.log, which is also the output name of x.log
        let infiles = ["/a/ntuple.x", "/b/x.log"];

        let jobs = create_bsub_jobs(&s.outdir, &s.script, &infiles, &SubmitOptions::default())?;
        let all_paths: HashSet<_> = jobs
            .iter()
            .flat_map(|j| [j.log_path(), j.output_path()])
            .collect();
        assert_eq!(all_paths.len(), 2 * infiles.len());
        assert_eq!(jobs[0].log_path(), s.outdir.join("ntuple.x.log").as_path());
        assert_ne!(jobs[1].output_path(), jobs[0].log_path());
        Ok(())
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/group/belle/x.mdst"), "/group/belle/x.mdst");
        assert_eq!(shell_quote("my dir/x.mdst"), "'my dir/x.mdst'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
