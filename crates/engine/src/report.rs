//! Outcome of one reconciliation run

use crate::backup::BackupRecord;
use crate::node::NodeKind;
use crate::sync::SyncOutcome;
use serde::Serialize;
use settle_config::Environment;
use std::fmt;

/// What happened to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeOutcome {
    Created,
    Updated,
    Unchanged,
    /// Its own pre block returned ABORT
    Aborted,
    /// An enclosing module was aborted
    SkippedByModule,
}

impl NodeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Aborted => "aborted",
            Self::SkippedByModule => "skipped",
        }
    }
}

impl From<SyncOutcome> for NodeOutcome {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Created => Self::Created,
            SyncOutcome::Updated => Self::Updated,
            SyncOutcome::Unchanged => Self::Unchanged,
        }
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeReport {
    /// Path relative to the module root
    pub node: String,
    pub kind: NodeKind,
    /// Path relative to the sync root, when it was computed
    pub target: Option<String>,
    pub outcome: NodeOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub environment: Environment,
    pub nodes: Vec<NodeReport>,
    /// Paths removed by the deletion sweep, relative to the sync root
    pub deleted: Vec<String>,
    pub backups: Vec<BackupRecord>,
}

impl RunReport {
    pub fn count(&self, outcome: NodeOutcome) -> usize {
        self.nodes.iter().filter(|n| n.outcome == outcome).count()
    }

    pub fn outcome_of(&self, node: &str) -> Option<NodeOutcome> {
        self.nodes
            .iter()
            .find(|n| n.node == node)
            .map(|n| n.outcome)
    }

    /// Whether the run changed anything on disk
    pub fn changed(&self) -> bool {
        !self.deleted.is_empty()
            || self
                .nodes
                .iter()
                .any(|n| matches!(n.outcome, NodeOutcome::Created | NodeOutcome::Updated))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    fn report(outcomes: &[NodeOutcome]) -> RunReport {
        RunReport {
            environment: Environment::Development,
            nodes: outcomes
                .iter()
                .enumerate()
                .map(|(i, o)| NodeReport {
                    node: format!("n{i}"),
                    kind: NodeKind::File,
                    target: None,
                    outcome: *o,
                })
                .collect(),
            deleted: Vec::new(),
            backups: Vec::new(),
        }
    }

    #[test]
    fn test_changed() {
        assert!(!report(&[NodeOutcome::Unchanged, NodeOutcome::Aborted]).changed());
        assert!(report(&[NodeOutcome::Unchanged, NodeOutcome::Updated]).changed());

        let mut r = report(&[]);
        r.deleted.push("f.txt".to_string());
        assert!(r.changed());
    }

    #[test]
    fn test_count_and_lookup() {
        let r = report(&[NodeOutcome::Created, NodeOutcome::Created, NodeOutcome::SkippedByModule]);
        assert_eq!(r.count(NodeOutcome::Created), 2);
        assert_eq!(r.outcome_of("n2"), Some(NodeOutcome::SkippedByModule));
        assert_eq!(r.outcome_of("n9"), None);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(report(&[NodeOutcome::SkippedByModule])).unwrap();
        assert_eq!(json["nodes"][0]["outcome"], "skippedByModule");
        assert_eq!(json["environment"], "development");
    }
}
