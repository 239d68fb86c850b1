pub mod day_id;
pub mod error;
pub mod matchup;
pub mod table;

use std::path::PathBuf;

use log::{info, warn};
use serde::Serialize;

pub use error::{MatchupError, Result};
pub use matchup::{MatchParams, MatchPolicy, MatchStats, Window, WindowAnchor};
pub use table::{ColumnSpec, Dataset, JoinedTable};

/// Inputs for one run of the tool.
#[derive(Debug, Clone)]
pub struct MatchupOptions {
    pub list1: PathBuf,
    pub list2: PathBuf,
    pub output: PathBuf,
    pub list1_columns: ColumnSpec,
    pub list2_columns: ColumnSpec,
    pub params: MatchParams,
}

/// What a finished run did; printed with `--summary`.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub list1: PathBuf,
    pub list2: PathBuf,
    pub output: PathBuf,
    pub window: Window,
    pub anchor: WindowAnchor,
    pub policy: MatchPolicy,
    #[serde(flatten)]
    pub stats: MatchStats,
}

/// Read both inputs, join them and write the result.
///
/// Nothing is written unless every input row parsed; the output file is
/// replaced in one rename at the end.
pub fn run_matchup(opts: &MatchupOptions) -> Result<MatchSummary> {
    for path in [&opts.list1, &opts.list2] {
        if !path.exists() {
            return Err(MatchupError::InputNotFound(path.clone()));
        }
    }

    let primary = table::read_dataset(&opts.list1, &opts.list1_columns)?;
    info!("Loaded {} rows from {}", primary.len(), opts.list1.display());
    let secondary = table::read_dataset(&opts.list2, &opts.list2_columns)?;
    info!("Loaded {} rows from {}", secondary.len(), opts.list2.display());

    let (joined, stats) = matchup::join_datasets(primary, &secondary, &opts.params);
    if joined.rows.is_empty() {
        warn!("No list1 rows matched; writing header only");
    }

    joined.write_atomic(&opts.output)?;
    info!("Wrote {} matched rows -> {}", joined.rows.len(), opts.output.display());

    Ok(MatchSummary {
        list1: opts.list1.clone(),
        list2: opts.list2.clone(),
        output: opts.output.clone(),
        window: opts.params.window,
        anchor: opts.params.anchor,
        policy: opts.params.policy,
        stats,
    })
}
