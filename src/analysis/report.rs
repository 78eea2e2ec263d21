//! Consolidated report model

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::result::AnalysisResult;
use super::task::AnalysisKind;

/// Overall verdict of a consolidated report, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectHealth {
    /// At least one task rated the project Poor or Critical
    Critical,
    /// At least one task rated a High risk
    #[serde(rename = "At Risk")]
    AtRisk,
    /// Fair or Medium ratings only
    Stable,
    /// Good, Excellent or Low ratings only
    Healthy,
    /// No task produced a result
    Unknown,
}

impl ProjectHealth {
    /// Maps a task headline rating onto the overall scale.
    ///
    /// Unrecognised ratings map to `None` and are ignored by the severity scan.
    pub fn from_rating(rating: &str) -> Option<Self> {
        match rating.trim() {
            "Poor" | "Critical" => Some(Self::Critical),
            "High" => Some(Self::AtRisk),
            "Fair" | "Medium" => Some(Self::Stable),
            "Good" | "Excellent" | "Low" => Some(Self::Healthy),
            _ => None,
        }
    }

    /// Display name as it appears in reports
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::AtRisk => "At Risk",
            Self::Stable => "Stable",
            Self::Healthy => "Healthy",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ProjectHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the five analysis tasks folded into one document
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedReport {
    health: ProjectHealth,
    summary: String,
    action_items: Vec<String>,
    analyses: BTreeMap<AnalysisKind, Option<AnalysisResult>>,
    failures: BTreeMap<AnalysisKind, String>,
}

impl ConsolidatedReport {
    pub(crate) fn new(
        health: ProjectHealth,
        summary: String,
        action_items: Vec<String>,
        analyses: BTreeMap<AnalysisKind, Option<AnalysisResult>>,
        failures: BTreeMap<AnalysisKind, String>,
    ) -> Self {
        Self {
            health,
            summary,
            action_items,
            analyses,
            failures,
        }
    }

    /// Overall verdict
    pub fn health(&self) -> ProjectHealth {
        self.health
    }

    /// One clause per task, in summary order
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Recommendations, most severe task first
    pub fn action_items(&self) -> &[String] {
        &self.action_items
    }

    /// Result of one task, `None` when it failed
    pub fn analysis(&self, kind: AnalysisKind) -> Option<&AnalysisResult> {
        self.analyses.get(&kind).and_then(Option::as_ref)
    }

    /// Why a task failed, if it did
    pub fn failure(&self, kind: AnalysisKind) -> Option<&str> {
        self.failures.get(&kind).map(String::as_str)
    }

    /// All failed tasks with their reasons
    pub fn failures(&self) -> &BTreeMap<AnalysisKind, String> {
        &self.failures
    }

    /// Number of tasks that produced a result
    pub fn succeeded(&self) -> usize {
        self.analyses.values().filter(|slot| slot.is_some()).count()
    }

    /// Pretty-printed JSON document
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

struct Slots<'a>(&'a BTreeMap<AnalysisKind, Option<AnalysisResult>>);

impl Serialize for Slots<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, slot) in self.0 {
            map.serialize_entry(kind.report_key(), slot)?;
        }
        map.end()
    }
}

struct Failures<'a>(&'a BTreeMap<AnalysisKind, String>);

impl Serialize for Failures<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (kind, reason) in self.0 {
            map.serialize_entry(kind.report_key(), reason)?;
        }
        map.end()
    }
}

impl Serialize for ConsolidatedReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("overallProjectHealth", &self.health)?;
        map.serialize_entry("overallSummary", &self.summary)?;
        map.serialize_entry("prioritizedActionItems", &self.action_items)?;
        map.serialize_entry("analyses", &Slots(&self.analyses))?;
        map.serialize_entry("failures", &Failures(&self.failures))?;
        map.end()
    }
}
