//! Output directory preparation

use crate::utils::errors::BellesubError;

use std::fs;
use std::io;
use std::path::Path;

/// What to do with an output directory that already holds files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearPolicy {
    /// Remove the existing contents.
    AlwaysClear,

    /// Keep the existing contents.
    NeverClear,

    /// Ask the caller supplied confirmation callback.
    PromptOperator,
}

/// Create an output directory, clearing it first when it is non-empty and the policy says so.
///
/// # Arguments
///
/// * `path`    - Directory to create. Missing parents are created too.
/// * `policy`  - How to treat a directory that already has contents.
/// * `confirm` - Called only for `ClearPolicy::PromptOperator` on a non-empty directory.
///               Returns true if the directory should be cleared.
pub fn create_dir<F>(path: &Path, policy: ClearPolicy, confirm: F) -> Result<(), BellesubError>
where
    F: FnOnce(&Path) -> Result<bool, BellesubError>,
{
    log::debug!("Creating dir: {}", path.display());
    if path.is_dir() && !is_empty_dir(path)? {
        let clear = match policy {
            ClearPolicy::AlwaysClear => true,
            ClearPolicy::NeverClear => false,
            ClearPolicy::PromptOperator => confirm(path)?,
        };
        if clear {
            log::info!("Clearing the contents of {}", path.display());
            fs::remove_dir_all(path)?;
        }
    }
    fs::create_dir_all(path)?;

    // Check again the output dir exists
    if !path.is_dir() {
        return Err(BellesubError::NotFound(path.to_path_buf()));
    }
    Ok(())
}

fn is_empty_dir(path: &Path) -> Result<bool, io::Error> {
    Ok(fs::read_dir(path)?.next().is_none())
}
