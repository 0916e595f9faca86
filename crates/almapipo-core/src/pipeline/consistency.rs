//! Consistency checker
//!
//! Compares what was sent in a PUT/POST with what Alma answered. A record
//! that cannot be verified (one of the two snapshots is missing) is reported
//! as not consistent, but logged differently from a mismatch.

use tracing::{debug, warn};

use almapipo_common::types::{Job, RecordId};

use crate::db::{RecordArchive, StoreResult};
use crate::xml;

/// How a mismatch between sent and returned payload is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyPolicy {
    /// The entry stays `done`, the mismatch is logged
    #[default]
    Advisory,
    /// The entry becomes `error`
    Strict,
}

impl ConsistencyPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::Advisory
        }
    }
}

pub struct ConsistencyChecker<'a, A: RecordArchive + ?Sized> {
    archive: &'a A,
}

impl<'a, A: RecordArchive + ?Sized> ConsistencyChecker<'a, A> {
    pub fn new(archive: &'a A) -> Self {
        Self { archive }
    }

    /// True only if both snapshots exist for the job and match after normalisation
    pub async fn check(&self, record_id: &RecordId, job: Job) -> StoreResult<bool> {
        if !self.archive.exists_sent_and_response(record_id, job).await? {
            warn!(record_id = %record_id, job = %job, "Could not verify response, sent or response snapshot missing");
            return Ok(false);
        }

        let Some((sent, response)) = self.archive.sent_and_response(record_id, job).await? else {
            warn!(record_id = %record_id, job = %job, "Could not verify response, snapshots not found");
            return Ok(false);
        };

        let consistent = payloads_match(&sent, &response);
        if consistent {
            debug!(record_id = %record_id, "Response matches sent record");
        } else {
            warn!(record_id = %record_id, job = %job, "Response differs from sent record");
        }
        Ok(consistent)
    }
}

/// Compare two payloads as normalised XML, falling back to trimmed text
pub fn payloads_match(sent: &str, response: &str) -> bool {
    match (xml::normalize(sent), xml::normalize(response)) {
        (Ok(a), Ok(b)) => a == b,
        _ => sent.trim() == response.trim(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn id(s: &str) -> RecordId {
        s.parse().unwrap()
    }

    #[test]
    fn test_payloads_match_ignores_formatting() {
        assert!(payloads_match(
            "<?xml version=\"1.0\"?>\n<bib>\n  <note>x</note>\n</bib>",
            "<bib><note>x</note></bib>"
        ));
        assert!(!payloads_match("<bib><note>x</note></bib>", "<bib><note>y</note></bib>"));
        assert!(payloads_match("plain ", "plain"));
    }

    #[tokio::test]
    async fn test_check_missing_snapshots() {
        let store = MemoryStore::new();
        let job = Job::now();
        store.save_sent(&id("A"), "<a/>", job).await.unwrap();

        let checker = ConsistencyChecker::new(&store);
        assert!(!checker.check(&id("A"), job).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_match_and_mismatch() {
        let store = MemoryStore::new();
        let job = Job::now();
        store.save_sent(&id("A"), "<a><b>1</b></a>", job).await.unwrap();
        store.save_response(&id("A"), "<?xml version=\"1.0\"?><a>\n<b>1</b></a>", job).await.unwrap();
        store.save_sent(&id("B"), "<a><b>1</b></a>", job).await.unwrap();
        store.save_response(&id("B"), "<a><b>2</b></a>", job).await.unwrap();

        let checker = ConsistencyChecker::new(&store);
        assert!(checker.check(&id("A"), job).await.unwrap());
        assert!(!checker.check(&id("B"), job).await.unwrap());
    }

    #[test]
    fn test_policy_from_flag() {
        assert_eq!(ConsistencyPolicy::from_strict(true), ConsistencyPolicy::Strict);
        assert_eq!(ConsistencyPolicy::default(), ConsistencyPolicy::Advisory);
    }
}
