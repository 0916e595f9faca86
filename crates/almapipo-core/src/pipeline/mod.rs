//! Batch orchestration
//!
//! A run takes a stream of record ids and drives each of them through the
//! calls of a [`Workflow`]. Every step is registered in the ledger as `new`
//! before the remote call and finished as `done` or `error` afterwards.

use serde::{Deserialize, Serialize};

use almapipo_common::types::{Action, Job, StatusCounts};
use almapipo_common::PipoError;

pub mod consistency;
pub mod orchestrator;
pub mod transform;

pub use consistency::{ConsistencyChecker, ConsistencyPolicy};
pub use orchestrator::Orchestrator;
pub use transform::{Transform, XmlEdit, XmlEdits};

/// What a run does with each record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    /// Fetch and archive
    Get,
    /// Fetch, transform, send back
    Put,
    /// Fetch, then delete
    Delete,
    /// Re-create from the latest archived snapshot
    Restore,
}

impl Workflow {
    /// The action this workflow ends with
    pub fn action(&self) -> Action {
        match self {
            Workflow::Get => Action::Get,
            Workflow::Put => Action::Put,
            Workflow::Delete => Action::Delete,
            Workflow::Restore => Action::Post,
        }
    }

    /// Whether a GET is interposed before the action
    pub fn fetches_first(&self) -> bool {
        !matches!(self, Workflow::Restore)
    }

    /// Actions that get ledger entries, in execution order
    pub fn actions(&self) -> Vec<Action> {
        match self {
            Workflow::Get => vec![Action::Get],
            Workflow::Restore => vec![Action::Post],
            other => vec![Action::Get, other.action()],
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Workflow::Restore => f.write_str("post"),
            other => f.write_str(&other.action().as_str().to_lowercase()),
        }
    }
}

impl std::str::FromStr for Workflow {
    type Err = PipoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<Action>()? {
            Action::Get => Ok(Workflow::Get),
            Action::Put => Ok(Workflow::Put),
            Action::Delete => Ok(Workflow::Delete),
            Action::Post => Ok(Workflow::Restore),
        }
    }
}

/// Counts per action of one finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub job: Job,
    pub summaries: Vec<(Action, StatusCounts)>,
}

impl RunReport {
    pub fn counts(&self, action: Action) -> StatusCounts {
        self.summaries
            .iter()
            .find(|(a, _)| *a == action)
            .map(|(_, counts)| *counts)
            .unwrap_or_default()
    }

    /// True if no entry of the run ended in `error` or stayed `new`
    pub fn is_clean(&self) -> bool {
        self.summaries
            .iter()
            .all(|(_, counts)| counts.error == 0 && counts.new == 0)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "job {}", self.job)?;
        for (action, counts) in &self.summaries {
            writeln!(f, "  {:<6} {}", action.as_str(), counts)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_from_method() {
        assert_eq!("get".parse::<Workflow>().unwrap(), Workflow::Get);
        assert_eq!("DELETE".parse::<Workflow>().unwrap(), Workflow::Delete);
        assert_eq!("post".parse::<Workflow>().unwrap(), Workflow::Restore);
        assert!("patch".parse::<Workflow>().is_err());
        assert_eq!(Workflow::Restore.to_string(), "post");
    }

    #[test]
    fn test_workflow_actions() {
        assert_eq!(Workflow::Get.actions(), vec![Action::Get]);
        assert_eq!(Workflow::Put.actions(), vec![Action::Get, Action::Put]);
        assert_eq!(Workflow::Restore.actions(), vec![Action::Post]);
        assert!(!Workflow::Restore.fetches_first());
    }

    #[test]
    fn test_report_display() {
        let report = RunReport {
            job: "2024-01-31T08:15:00.123456Z".parse().unwrap(),
            summaries: vec![
                (Action::Get, StatusCounts::new(0, 2, 1)),
                (Action::Delete, StatusCounts::new(0, 2, 0)),
            ],
        };
        let text = report.to_string();
        assert!(text.contains("2024-01-31T08:15:00.123456Z"));
        assert!(text.contains("GET    done=2 error=1 new=0"));
        assert_eq!(report.counts(Action::Put), StatusCounts::default());
        assert!(!report.is_clean());
    }
}
