//! Domain types shared by the ledger, the archive and the orchestrator

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipoError;

// ============================================================================
// Job
// ============================================================================

/// One batch-processing run.
///
/// A job is identified by the UTC timestamp at which it was created. It is
/// passed explicitly to every ledger and archive call and is used purely as a
/// partition key; all rows written by one invocation share the same job.
///
/// The timestamp is truncated to microseconds so that it survives a round
/// trip through a PostgreSQL `TIMESTAMPTZ` column unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Job(DateTime<Utc>);

impl Job {
    /// Create a job for the current instant
    pub fn now() -> Self {
        Self::from_timestamp(Utc::now())
    }

    /// Create a job from an explicit timestamp
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp.trunc_subsecs(6))
    }

    /// The job's timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// File-name friendly form, e.g. `2024-01-31T081500.123456Z`
    pub fn file_suffix(&self) -> String {
        self.0.format("%Y-%m-%dT%H%M%S.%6fZ").to_string()
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl std::str::FromStr for Job {
    type Err = PipoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|ts| Job::from_timestamp(ts.with_timezone(&Utc)))
            .map_err(|_| PipoError::InvalidJob(s.to_string()))
    }
}

// ============================================================================
// Action
// ============================================================================

/// Remote operation tracked per identifier in the status ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Get,
    Put,
    Post,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Get, Action::Put, Action::Post, Action::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "GET",
            Action::Put => "PUT",
            Action::Post => "POST",
            Action::Delete => "DELETE",
        }
    }

    /// HTTP status code the remote service answers with on success
    pub fn expected_status(&self) -> u16 {
        match self {
            Action::Delete => 204,
            Action::Get | Action::Put | Action::Post => 200,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = PipoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "GET" => Ok(Action::Get),
            "PUT" => Ok(Action::Put),
            "POST" => Ok(Action::Post),
            "DELETE" => Ok(Action::Delete),
            _ => Err(PipoError::InvalidAction(s.to_string())),
        }
    }
}

// ============================================================================
// Entry status
// ============================================================================

/// Status of one (job, identifier, action) entry in the ledger.
///
/// `New` transitions exactly once to either `Done` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    New,
    Done,
    Error,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::New => "new",
            EntryStatus::Done => "done",
            EntryStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryStatus {
    type Err = PipoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(EntryStatus::New),
            "done" => Ok(EntryStatus::Done),
            "error" => Ok(EntryStatus::Error),
            _ => Err(PipoError::InvalidStatus(s.to_string())),
        }
    }
}

// ============================================================================
// Record id
// ============================================================================

const SET_KEY_PREFIX: &str = "set:";

/// Composite identifier of one remote record.
///
/// Segments are ordered from ancestor to leaf, e.g. `mms_id, holding_id,
/// item_pid`. The comma-joined form is the storage key used by the ledger and
/// the archive; the segments are used to build the remote resource path.
///
/// A set run registers the set itself under [`RecordId::for_set`], a key
/// (`set:<set id>`) no record id can take, so set entries never turn into
/// remote record paths.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId {
    segments: Vec<String>,
}

impl RecordId {
    pub fn new<I, S>(segments: I) -> crate::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments
            .into_iter()
            .map(|s| s.into().trim().to_string())
            .collect();

        if segments.is_empty()
            || segments
                .iter()
                .any(|s| s.is_empty() || s.contains('/') || s.starts_with(SET_KEY_PREFIX))
        {
            return Err(PipoError::InvalidRecordId(segments.join(",")));
        }

        Ok(Self { segments })
    }

    /// Ledger key of a set run's own entry
    pub fn for_set(set_id: &str) -> crate::Result<Self> {
        let set_id = set_id.trim();
        if set_id.is_empty() || set_id.contains('/') || set_id.contains(',') {
            return Err(PipoError::InvalidRecordId(set_id.to_string()));
        }
        Ok(Self {
            segments: vec![format!("{SET_KEY_PREFIX}{set_id}")],
        })
    }

    /// The set id when this is a set run's entry
    pub fn set_id(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [only] => only.strip_prefix(SET_KEY_PREFIX),
            _ => None,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Storage key, the segments joined with commas
    pub fn key(&self) -> String {
        self.segments.join(",")
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

impl std::str::FromStr for RecordId {
    type Err = PipoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(set_id) = s.trim().strip_prefix(SET_KEY_PREFIX) {
            return RecordId::for_set(set_id);
        }
        RecordId::new(s.split(',')).map_err(|_| PipoError::InvalidRecordId(s.to_string()))
    }
}

impl TryFrom<String> for RecordId {
    type Error = PipoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.key()
    }
}

// ============================================================================
// Status counts
// ============================================================================

/// Number of ledger entries per status for one (action, job)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: i64,
    pub done: i64,
    pub error: i64,
}

impl StatusCounts {
    pub fn new(new: i64, done: i64, error: i64) -> Self {
        Self { new, done, error }
    }

    pub fn add(&mut self, status: EntryStatus, count: i64) {
        match status {
            EntryStatus::New => self.new += count,
            EntryStatus::Done => self.done += count,
            EntryStatus::Error => self.error += count,
        }
    }

    pub fn total(&self) -> i64 {
        self.new + self.done + self.error
    }
}

impl std::fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "done={} error={} new={}", self.done, self.error, self.new)
    }
}

// ============================================================================
// Source line
// ============================================================================

/// One parsed row of an input file, fields in column order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLine {
    fields: Vec<(String, String)>,
}

impl SourceLine {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first column, the leading identifier of the row
    pub fn leading_value(&self) -> Option<&str> {
        self.fields.first().map(|(_, value)| value.as_str())
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Column-ordered JSON object as stored in the archive
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_truncates_to_microseconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let job = Job::from_timestamp(ts);
        assert_eq!(job.timestamp().timestamp_subsec_nanos(), 123_456_000);
    }

    #[test]
    fn test_job_display_parse() {
        let job = Job::from_timestamp(Utc.timestamp_opt(1_700_000_000, 5_000).unwrap());
        let text = job.to_string();
        assert_eq!(text, "2023-11-14T22:13:20.000005Z");
        assert_eq!(text.parse::<Job>().unwrap(), job);
        assert!("yesterday".parse::<Job>().is_err());
    }

    #[test]
    fn test_job_file_suffix() {
        let job = Job::from_timestamp(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        assert_eq!(job.file_suffix(), "2023-11-14T221320.000000Z");
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("get".parse::<Action>().unwrap(), Action::Get);
        assert_eq!("PUT".parse::<Action>().unwrap(), Action::Put);
        assert_eq!(" Post ".parse::<Action>().unwrap(), Action::Post);
        assert_eq!("delete".parse::<Action>().unwrap(), Action::Delete);
        assert!("patch".parse::<Action>().is_err());
    }

    #[test]
    fn test_action_expected_status() {
        assert_eq!(Action::Get.expected_status(), 200);
        assert_eq!(Action::Put.expected_status(), 200);
        assert_eq!(Action::Post.expected_status(), 200);
        assert_eq!(Action::Delete.expected_status(), 204);
    }

    #[test]
    fn test_entry_status_from_str() {
        assert_eq!("ERROR".parse::<EntryStatus>().unwrap(), EntryStatus::Error);
    }

    #[test]
    fn test_record_id_segments() {
        let id: RecordId = "991234,221234 ,231234".parse().unwrap();
        assert_eq!(id.len(), 3);
        assert_eq!(id.set_id(), None);
        assert_eq!(id.segments()[1], "221234");
        assert_eq!(id.key(), "991234,221234,231234");
    }

    #[test]
    fn test_record_id_rejects_empty_segments() {
        assert!("".parse::<RecordId>().is_err());
        assert!("991234,,231234".parse::<RecordId>().is_err());
        assert!("99/12".parse::<RecordId>().is_err());
    }

    #[test]
    fn test_set_key_is_not_a_record_id() {
        let set = RecordId::for_set(" 12345 ").unwrap();
        assert_eq!(set.key(), "set:12345");
        assert_eq!(set.set_id(), Some("12345"));
        assert_eq!("set:12345".parse::<RecordId>().unwrap(), set);

        assert!(RecordId::new(["set:12345"]).is_err());
        assert!(RecordId::new(["991", "set:1"]).is_err());
        assert!(RecordId::for_set("1,2").is_err());
        assert!(RecordId::for_set("").is_err());
    }

    #[test]
    fn test_record_id_serde_as_string() {
        let id: RecordId = "1,2".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1,2\"");
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_status_counts() {
        let mut counts = StatusCounts::default();
        counts.add(EntryStatus::Done, 2);
        counts.add(EntryStatus::Error, 1);
        assert_eq!(counts, StatusCounts::new(0, 2, 1));
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.to_string(), "done=2 error=1 new=0");
    }

    #[test]
    fn test_source_line_keeps_column_order() {
        let line = SourceLine::new(vec![
            ("mms_id".to_string(), "991".to_string()),
            ("note".to_string(), "x".to_string()),
            ("a".to_string(), "y".to_string()),
        ]);
        assert_eq!(line.leading_value(), Some("991"));
        assert_eq!(line.get("note"), Some("x"));
        assert_eq!(line.to_json().to_string(), r#"{"mms_id":"991","note":"x","a":"y"}"#);
    }
}
