//! Day offsets embedded in cohort record identifiers.
//!
//! Identifiers look like `OAS30001_MR_d0129`: a subject prefix, a record tag and
//! a `d` marker followed by the number of days since the subject's entry. Older
//! exports put the marker in the third `_` segment, newer ones move it around,
//! so the marker is searched for anywhere in the string.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static DAY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"d([0-9]{4,})").expect("static day marker pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no d#### day offset in identifier '{0}'")]
pub struct InvalidDayId(pub String);

/// Extract the day offset from the first `d####` token of `id`.
pub fn parse_day_offset(id: &str) -> Result<u32, InvalidDayId> {
    DAY_MARKER
        .captures(id)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<u32>().ok())
        .ok_or_else(|| InvalidDayId(id.to_string()))
}
