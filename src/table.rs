use std::collections::HashMap;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use log::debug;
use tempfile::NamedTempFile;

use crate::day_id::parse_day_offset;
use crate::error::{MatchupError, Result};

/// Name of the derived day-offset column added to every dataset.
pub const DAY_COLUMN: &str = "Day";

/// Header -> index map; names are trimmed, first occurrence wins.
fn header_index_map(header: &StringRecord) -> HashMap<String, usize> {
    let mut m = HashMap::new();
    for (i, f) in header.iter().enumerate() {
        m.entry(f.trim().to_string()).or_insert(i);
    }
    m
}

/// Which columns of an input carry the identifier and the subject.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// `None` means the first column.
    pub id: Option<String>,
    pub subject: String,
}

impl Default for ColumnSpec {
    fn default() -> Self {
        Self {
            id: None,
            subject: "Subject".to_string(),
        }
    }
}

/// One input CSV held in memory, annotated with the `Day` column.
///
/// Every row is padded to the header width and its `Day` cell holds the offset
/// parsed from the identifier column.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub path: PathBuf,
    pub header: StringRecord,
    pub rows: Vec<StringRecord>,
    pub id_col: usize,
    pub subject_col: usize,
    pub day_col: usize,
    days: Vec<u32>,
}

impl Dataset {
    /// Build a dataset from an already-read header and rows.
    pub fn from_parts(
        path: impl Into<PathBuf>,
        mut header: StringRecord,
        rows: Vec<StringRecord>,
        columns: &ColumnSpec,
    ) -> Result<Self> {
        let path = path.into();
        if header.is_empty() {
            return Err(MatchupError::schema(&path, "input has no columns"));
        }
        let hmap = header_index_map(&header);
        let input_width = header.len();

        let id_col = match &columns.id {
            None => 0,
            Some(name) => *hmap.get(name.as_str()).ok_or_else(|| {
                MatchupError::schema(&path, format!("missing identifier column '{name}'"))
            })?,
        };
        let subject_col = *hmap.get(columns.subject.as_str()).ok_or_else(|| {
            MatchupError::schema(
                &path,
                format!("missing required column '{}'", columns.subject),
            )
        })?;
        let day_col = match hmap.get(DAY_COLUMN) {
            Some(&idx) => idx,
            None => {
                header.push_field(DAY_COLUMN);
                header.len() - 1
            }
        };
        let width = header.len();

        let mut annotated = Vec::with_capacity(rows.len());
        let mut days = Vec::with_capacity(rows.len());
        for (i, rec) in rows.into_iter().enumerate() {
            if rec.len() > input_width {
                return Err(MatchupError::schema(
                    &path,
                    format!(
                        "row {} has {} fields but the header has {}",
                        i + 1,
                        rec.len(),
                        input_width
                    ),
                ));
            }
            let id = rec.get(id_col).unwrap_or("");
            let day = parse_day_offset(id.trim()).map_err(|e| MatchupError::IdentifierParse {
                path: path.clone(),
                row: i + 1,
                id: e.0,
            })?;
            let day_s = day.to_string();
            let mut out = StringRecord::with_capacity(rec.as_slice().len() + 8, width);
            for c in 0..width {
                if c == day_col {
                    out.push_field(&day_s);
                } else {
                    out.push_field(rec.get(c).unwrap_or(""));
                }
            }
            annotated.push(out);
            days.push(day);
        }

        Ok(Self {
            path,
            header,
            rows: annotated,
            id_col,
            subject_col,
            day_col,
            days,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn subject(&self, row: usize) -> &str {
        self.rows[row].get(self.subject_col).unwrap_or("")
    }

    pub fn id(&self, row: usize) -> &str {
        self.rows[row].get(self.id_col).unwrap_or("")
    }

    pub fn day(&self, row: usize) -> u32 {
        self.days[row]
    }

    /// Keep only the rows for which `keep` returns true, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let subject_col = self.subject_col;
        let mut days = std::mem::take(&mut self.days).into_iter();
        let mut kept_days = Vec::with_capacity(self.rows.len());
        self.rows.retain(|rec| {
            let day = days.next().unwrap_or_default();
            let k = keep(rec.get(subject_col).unwrap_or(""));
            if k {
                kept_days.push(day);
            }
            k
        });
        self.days = kept_days;
    }
}

/// Read a comma-separated file and annotate it with day offsets.
pub fn read_dataset(path: &Path, columns: &ColumnSpec) -> Result<Dataset> {
    if !path.exists() {
        return Err(MatchupError::InputNotFound(path.to_path_buf()));
    }
    let csv_err = |source: csv::Error| MatchupError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true) // tolerate ragged exports; short rows are padded
        .from_path(path)
        .map_err(csv_err)?;

    let header = rdr.headers().map_err(csv_err)?.clone();

    let mut rows = Vec::new();
    for rec in rdr.records() {
        rows.push(rec.map_err(csv_err)?);
    }
    debug!("read {} rows x {} columns from {}", rows.len(), header.len(), path.display());

    Dataset::from_parts(path, header, rows, columns)
}

/// The finished join: a fixed header and the rows that survived matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedTable {
    pub header: StringRecord,
    pub rows: Vec<StringRecord>,
}

impl JoinedTable {
    /// Column index of `name`, if present.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Write the table as CSV without an index column.
    ///
    /// The data goes to a temporary file next to `path` first, which is then
    /// renamed over `path`, so a failed run never leaves a half-written file.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let io_err = |source: std::io::Error| MatchupError::Io {
            path: path.to_path_buf(),
            source,
        };
        let csv_err = |source: csv::Error| MatchupError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let mut w = WriterBuilder::new()
                .flexible(false)
                .from_writer(tmp.as_file_mut());
            w.write_record(&self.header).map_err(csv_err)?;
            for rec in &self.rows {
                w.write_record(rec).map_err(csv_err)?;
            }
            w.flush().map_err(io_err)?;
        }
        tmp.persist(path).map_err(|source| MatchupError::Persist {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}
