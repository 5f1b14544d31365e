//! Batch run summaries

use crate::error::{ErrorKind, MigrateError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Summary written by the exporter
pub const EXPORT_SUMMARY_FILE: &str = "summary.json";

/// Summary written by the importer
pub const IMPORT_SUMMARY_FILE: &str = "import_summary.json";

/// Whether `file_name` is one of the summary files rather than a manifest
pub fn is_summary_file(file_name: &str) -> bool {
    file_name == EXPORT_SUMMARY_FILE || file_name == IMPORT_SUMMARY_FILE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// What the importer did to a function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeAction {
    Exported,
    Created,
    Updated,
}

impl std::fmt::Display for OutcomeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeAction::Exported => write!(f, "exported"),
            OutcomeAction::Created => write!(f, "created"),
            OutcomeAction::Updated => write!(f, "updated"),
        }
    }
}

/// Result for a single function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub name: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<OutcomeAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

/// Ordered outcomes of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunSummary {
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success(&mut self, name: impl Into<String>, action: OutcomeAction) {
        self.outcomes.push(Outcome {
            name: name.into(),
            status: OutcomeStatus::Success,
            action: Some(action),
            error: None,
            kind: None,
        });
    }

    pub fn add_failure(&mut self, name: impl Into<String>, error: &MigrateError) {
        self.outcomes.push(Outcome {
            name: name.into(),
            status: OutcomeStatus::Error,
            action: None,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
        });
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn get(&self, name: &str) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Write the summary as pretty JSON
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} succeeded, {} failed", self.succeeded(), self.failed())
    }
}
