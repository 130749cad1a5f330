//! JSON result payload.
//!
//! Each run writes its [`ResultTree`] twice:
//! ```text
//! output_dir/
//! ├── latest.json
//! └── 2025-05-06/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//! A later run in the same date and time-of-day slot replaces the earlier
//! file. Both writes are atomic.

use crate::error::PersistenceError;
use crate::models::ResultTree;
use crate::store::write_json_atomic;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const LATEST_FILE: &str = "latest.json";

/// Path of the dated result file for a run.
pub fn dated_path(output_dir: &Path, date: NaiveDate, time_of_day: &str) -> PathBuf {
    output_dir
        .join(date.format("%Y-%m-%d").to_string())
        .join(format!("{time_of_day}.json"))
}

/// Write `tree` to its dated file and to `latest.json`.
/// Returns the dated path.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display()))]
pub async fn write_results(
    tree: &ResultTree,
    output_dir: &Path,
    date: NaiveDate,
    time_of_day: &str,
) -> Result<PathBuf, PersistenceError> {
    let path = dated_path(output_dir, date, time_of_day);
    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(source) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %source, "Failed to create JSON dir");
            return Err(PersistenceError::Write {
                path: dir.to_path_buf(),
                source,
            });
        }
    }

    write_json_atomic(&path, tree).await?;
    write_json_atomic(&output_dir.join(LATEST_FILE), tree).await?;
    info!(path = %path.display(), categories = tree.len(), "Wrote result JSON");
    Ok(path)
}
