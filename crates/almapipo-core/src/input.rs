//! Identifier source
//!
//! Reads `.csv` (semicolon-delimited) and `.tsv` files with a header line.
//! The first column holds the record id, possibly a comma-separated chain of
//! ancestor ids; the remaining columns are kept with the row for the archive.
//!
//! Rows are read lazily and exactly once.

use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use almapipo_common::types::{RecordId, SourceLine};

use crate::error::{CoreError, CoreResult};

/// Leading digits Alma uses per record type, e.g. 99 for bibs and 22 for holdings
const ALMA_ID_PREFIXES: &str = "22|23|53|61|62|81|99";

/// Checks id segments against the shape of Alma ids of one institution
#[derive(Debug, Clone)]
pub struct IdValidator {
    pattern: Regex,
}

impl IdValidator {
    pub fn new(institutional_suffix: &str) -> CoreResult<Self> {
        let suffix = institutional_suffix.trim();
        if suffix.is_empty() {
            return Err(CoreError::config(
                "Validation needs ALMA_REST_ID_INSTITUTIONAL_SUFFIX to be set",
            ));
        }

        let pattern = Regex::new(&format!(
            r"^({ALMA_ID_PREFIXES})\d{{2,}}{}$",
            regex::escape(suffix)
        ))
        .map_err(|e| CoreError::config(format!("Invalid institutional suffix: {e}")))?;

        Ok(Self { pattern })
    }

    /// Every comma-separated segment must look like an Alma id
    pub fn is_valid(&self, value: &str) -> bool {
        value.split(',').all(|segment| self.pattern.is_match(segment.trim()))
    }
}

/// One accepted input row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub record_id: RecordId,
    /// The full row, absent when ids did not come from a file
    pub line: Option<SourceLine>,
}

impl From<RecordId> for SourceRow {
    fn from(record_id: RecordId) -> Self {
        Self {
            record_id,
            line: None,
        }
    }
}

/// Lazy, single-pass reader over an input file
pub struct IdentifierSource {
    reader: csv::Reader<File>,
    headers: StringRecord,
    validator: Option<IdValidator>,
    path: PathBuf,
    record: StringRecord,
    discarded: usize,
}

impl std::fmt::Debug for IdentifierSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierSource")
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("validate", &self.validator.is_some())
            .finish()
    }
}

impl IdentifierSource {
    /// Open an input file; rows failing `validator` are discarded with a warning
    pub fn open(path: impl AsRef<Path>, validator: Option<IdValidator>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let delimiter = delimiter_for(&path)?;

        let file = File::open(&path).map_err(|e| {
            CoreError::input(format!("Cannot read {}: {e}", path.display()))
        })?;

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(CoreError::input(format!(
                "{} has no header line",
                path.display()
            )));
        }

        info!(path = %path.display(), validate = validator.is_some(), "Reading identifiers");

        Ok(Self {
            reader,
            headers,
            validator,
            path,
            record: StringRecord::new(),
            discarded: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows dropped so far because of an invalid first column
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Pair the current record with the header; values beyond the last
    /// header column are kept under `column_<position>`
    fn to_source_line(&self) -> SourceLine {
        let mut fields: Vec<(String, String)> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = self.record.get(i).unwrap_or_default();
                (name.to_string(), value.to_string())
            })
            .collect();

        if self.record.len() > self.headers.len() {
            warn!(
                path = %self.path.display(),
                columns = self.record.len(),
                header_columns = self.headers.len(),
                "Row has more columns than the header"
            );
            fields.extend(
                self.record
                    .iter()
                    .enumerate()
                    .skip(self.headers.len())
                    .map(|(i, value)| (format!("column_{}", i + 1), value.to_string())),
            );
        }

        SourceLine::new(fields)
    }
}

impl Iterator for IdentifierSource {
    type Item = CoreResult<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
                Ok(true) => {},
            }

            let line = self.to_source_line();
            let leading = line.leading_value().unwrap_or_default().to_string();

            if let Some(validator) = &self.validator {
                if !validator.is_valid(&leading) {
                    self.discarded += 1;
                    warn!(row = %line.to_json(), "Row discarded, first column is not a valid Alma id");
                    continue;
                }
            }

            match leading.parse::<RecordId>() {
                Ok(record_id) => {
                    return Some(Ok(SourceRow {
                        record_id,
                        line: Some(line),
                    }))
                },
                Err(e) => {
                    self.discarded += 1;
                    warn!(row = %line.to_json(), error = %e, "Row discarded");
                },
            }
        }
    }
}

fn delimiter_for(path: &Path) -> CoreResult<u8> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("csv") => Ok(b';'),
        Some("tsv") => Ok(b'\t'),
        _ => Err(CoreError::input(format!(
            "{} must end in .csv (semicolon-delimited) or .tsv",
            path.display()
        ))),
    }
}
