//! Temporal matching of two cohort datasets.
//!
//! The pipeline is: drop primary rows whose subject never appears in the
//! secondary dataset, pair each remaining primary row with a secondary row of
//! the same subject whose day offset falls inside the window, then emit the
//! primary rows that found a partner with the partner's columns appended.
//!
//! Two selection policies exist. [`MatchPolicy::Nearest`] keeps the secondary
//! row closest in days (earliest row on ties). [`MatchPolicy::LastWriteWins`]
//! reproduces the legacy OASIS matchup behaviour, which walks
//! the secondary rows in file order and lets every qualifying row overwrite
//! the previous one without comparing distances.

use std::collections::{BTreeSet, HashMap, HashSet};

use csv::StringRecord;
use log::{debug, info};
use serde::Serialize;

use crate::table::{Dataset, JoinedTable};

pub const DEFAULT_SUFFIX: &str = "_list2";

/// Acceptance range in days. Both ends are open; a same-day pair is always accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub lower_bound: u32,
    pub upper_bound: u32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            lower_bound: 180,
            upper_bound: 180,
        }
    }
}

impl Window {
    pub fn new(lower_bound: u32, upper_bound: u32) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// True if `candidate` lies within (`reference - lower`, `reference + upper`),
    /// or on the same day as `reference`.
    pub fn admits(&self, reference: u32, candidate: u32) -> bool {
        let diff = i64::from(candidate) - i64::from(reference);
        diff == 0 || (-i64::from(self.lower_bound) < diff && diff < i64::from(self.upper_bound))
    }
}

/// Which record the window is centred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowAnchor {
    /// Window around the list1 day: `lower_bound` is how many days before the
    /// list1 record a list2 record may lie, `upper_bound` how many days after.
    #[default]
    Primary,
    /// Window around the list2 day, in the legacy OASIS matchup orientation.
    /// Unlike the legacy mask, a same-day pair is still accepted when a bound is 0.
    Secondary,
}

impl WindowAnchor {
    pub fn admits(self, window: &Window, primary_day: u32, secondary_day: u32) -> bool {
        match self {
            WindowAnchor::Primary => window.admits(primary_day, secondary_day),
            WindowAnchor::Secondary => window.admits(secondary_day, primary_day),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Closest secondary row by absolute day distance, earliest row on ties.
    #[default]
    Nearest,
    /// Last qualifying secondary row in file order, regardless of distance.
    LastWriteWins,
}

#[derive(Debug, Clone)]
pub struct MatchParams {
    pub window: Window,
    pub anchor: WindowAnchor,
    pub policy: MatchPolicy,
    pub suffix: String,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            window: Window::default(),
            anchor: WindowAnchor::default(),
            policy: MatchPolicy::default(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

/// Subjects and rows removed by [`filter_subjects`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub dropped_rows: usize,
    pub dropped_subjects: BTreeSet<String>,
}

/// Restrict `primary` to subjects that also occur in `secondary`.
pub fn filter_subjects(primary: &mut Dataset, secondary: &Dataset) -> FilterOutcome {
    let known: HashSet<&str> = (0..secondary.len()).map(|i| secondary.subject(i)).collect();
    let before = primary.len();
    let mut dropped_subjects = BTreeSet::new();
    primary.retain(|subject| {
        let keep = known.contains(subject);
        if !keep {
            dropped_subjects.insert(subject.to_string());
        }
        keep
    });
    FilterOutcome {
        dropped_rows: before - primary.len(),
        dropped_subjects,
    }
}

/// Primary row indices grouped by subject, in row order.
fn subject_index(ds: &Dataset) -> HashMap<&str, Vec<usize>> {
    let mut idx: HashMap<&str, Vec<usize>> = HashMap::new();
    for row in 0..ds.len() {
        idx.entry(ds.subject(row)).or_default().push(row);
    }
    idx
}

/// For every primary row, the secondary row chosen for it (if any).
pub fn match_windows(
    primary: &Dataset,
    secondary: &Dataset,
    window: &Window,
    anchor: WindowAnchor,
    policy: MatchPolicy,
) -> Vec<Option<usize>> {
    let by_subject = subject_index(primary);
    let mut chosen: Vec<Option<usize>> = vec![None; primary.len()];

    for s in 0..secondary.len() {
        let Some(rows) = by_subject.get(secondary.subject(s)) else {
            continue;
        };
        let s_day = secondary.day(s);
        for &p in rows {
            let p_day = primary.day(p);
            if !anchor.admits(window, p_day, s_day) {
                continue;
            }
            let slot = &mut chosen[p];
            match policy {
                MatchPolicy::LastWriteWins => *slot = Some(s),
                MatchPolicy::Nearest => {
                    let closer = match *slot {
                        None => true,
                        Some(prev) => p_day.abs_diff(s_day) < p_day.abs_diff(secondary.day(prev)),
                    };
                    if closer {
                        *slot = Some(s);
                    }
                }
            }
        }
    }
    chosen
}

/// Output layout: the primary header plus one slot per secondary column.
#[derive(Debug, Clone)]
pub struct JoinSchema {
    pub header: StringRecord,
    /// Output column for each secondary column, by secondary index.
    pub secondary_slots: Vec<usize>,
}

impl JoinSchema {
    /// Suffixed names that already exist in the primary header reuse that column.
    pub fn new(primary: &StringRecord, secondary: &StringRecord, suffix: &str) -> Self {
        let mut header = primary.clone();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (i, name) in primary.iter().enumerate() {
            positions.entry(name.to_string()).or_insert(i);
        }
        let mut secondary_slots = Vec::with_capacity(secondary.len());
        for name in secondary.iter() {
            let renamed = format!("{name}{suffix}");
            let slot = match positions.get(&renamed) {
                Some(&i) => i,
                None => {
                    header.push_field(&renamed);
                    let i = header.len() - 1;
                    positions.insert(renamed, i);
                    i
                }
            };
            secondary_slots.push(slot);
        }
        Self {
            header,
            secondary_slots,
        }
    }
}

/// Emit matched primary rows, in their original order, joined with their partner.
pub fn materialize(
    primary: &Dataset,
    secondary: &Dataset,
    chosen: &[Option<usize>],
    suffix: &str,
) -> JoinedTable {
    let schema = JoinSchema::new(&primary.header, &secondary.header, suffix);
    let width = schema.header.len();

    let mut rows = Vec::new();
    for (p, partner) in chosen.iter().enumerate() {
        let Some(s) = *partner else {
            continue;
        };
        let mut cells: Vec<&str> = primary.rows[p].iter().collect();
        cells.resize(width, "");
        for (col, &slot) in schema.secondary_slots.iter().enumerate() {
            cells[slot] = secondary.rows[s].get(col).unwrap_or("");
        }
        debug!("{} -> {}", primary.id(p), secondary.id(s));
        rows.push(StringRecord::from(cells));
    }

    JoinedTable {
        header: schema.header,
        rows,
    }
}

/// Row counts for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub list1_rows: usize,
    pub list2_rows: usize,
    pub dropped_rows: usize,
    pub dropped_subjects: usize,
    pub matched_rows: usize,
    pub unmatched_rows: usize,
}

/// Filter, match and materialize in one go.
pub fn join_datasets(
    mut primary: Dataset,
    secondary: &Dataset,
    params: &MatchParams,
) -> (JoinedTable, MatchStats) {
    let list1_rows = primary.len();
    let filtered = filter_subjects(&mut primary, secondary);
    if filtered.dropped_rows > 0 {
        info!(
            "Dropped {} list1 rows for {} subjects absent from list2",
            filtered.dropped_rows,
            filtered.dropped_subjects.len()
        );
        debug!("Subjects absent from list2: {:?}", filtered.dropped_subjects);
    }

    let chosen = match_windows(
        &primary,
        secondary,
        &params.window,
        params.anchor,
        params.policy,
    );
    let table = materialize(&primary, secondary, &chosen, &params.suffix);

    let matched_rows = table.rows.len();
    let stats = MatchStats {
        list1_rows,
        list2_rows: secondary.len(),
        dropped_rows: filtered.dropped_rows,
        dropped_subjects: filtered.dropped_subjects.len(),
        matched_rows,
        unmatched_rows: primary.len() - matched_rows,
    };
    info!(
        "Matched {} of {} list1 rows ({:?}, {:?} window {:?})",
        matched_rows, list1_rows, params.policy, params.anchor, params.window
    );
    (table, stats)
}
