//! Report aggregation
//!
//! Runs every analysis task against the same root and folds the outcomes
//! into one [`ConsolidatedReport`]. The fold is deterministic: the same
//! outcomes always produce the same report.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use super::client::AnalysisClient;
use super::report::{ConsolidatedReport, ProjectHealth};
use super::result::AnalysisResult;
use super::selector::{self, FileSelector};
use super::service::CompletionService;
use super::task::{AnalysisKind, AnalysisTask};
use crate::error::{ButterflyError, Result};
use crate::parallel::ParallelProcessor;

/// Default cap on `prioritizedActionItems`
pub const DEFAULT_MAX_ACTION_ITEMS: usize = 10;

/// Result of one task, success or failure
pub type TaskOutcome = (AnalysisKind, Result<AnalysisResult>);

/// Runs the analysis clients and consolidates their results
pub struct ReportAggregator {
    clients: Vec<AnalysisClient>,
    selector: Arc<FileSelector>,
    processor: ParallelProcessor,
    max_action_items: usize,
}

impl ReportAggregator {
    /// Create an aggregator over an explicit set of clients
    pub fn new(clients: Vec<AnalysisClient>, selector: FileSelector) -> Self {
        let processor = ParallelProcessor::new(clients.len().max(1));
        Self {
            clients,
            selector: Arc::new(selector),
            processor,
            max_action_items: DEFAULT_MAX_ACTION_ITEMS,
        }
    }

    /// One client per task, all sharing `service`
    pub fn from_tasks(
        tasks: Vec<AnalysisTask>,
        service: Arc<dyn CompletionService>,
        selector: FileSelector,
    ) -> Self {
        let clients = tasks
            .into_iter()
            .map(|task| AnalysisClient::new(task, service.clone()))
            .collect();
        Self::new(clients, selector)
    }

    /// Bounds the number of tasks in flight at once
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.processor = ParallelProcessor::new(max_concurrent);
        self
    }

    /// Caps the number of prioritized action items
    pub fn with_max_action_items(mut self, max_action_items: usize) -> Self {
        self.max_action_items = max_action_items;
        self
    }

    /// Clients in execution order
    pub fn clients(&self) -> &[AnalysisClient] {
        &self.clients
    }

    /// Runs every task against `root` and consolidates the outcomes.
    ///
    /// A missing root fails the whole run. Any single task failing only
    /// empties that task's slot.
    pub async fn run(&self, root: &Path) -> Result<ConsolidatedReport> {
        selector::check_root(root)?;
        info!(
            "Analysing {} with {} tasks, at most {} at once",
            root.display(),
            self.clients.len(),
            self.processor.max_concurrent()
        );

        let futures: Vec<_> = self
            .clients
            .iter()
            .cloned()
            .map(|client| {
                let selector = self.selector.clone();
                let root: PathBuf = root.to_path_buf();
                async move {
                    let patterns = client.task().patterns.clone();
                    let records = tokio::task::spawn_blocking(move || selector.select(&root, &patterns))
                        .await
                        .map_err(|e| ButterflyError::Aggregation(format!("file selection panicked: {}", e)))?
                        .map_err(|e| match e {
                            ButterflyError::Selection(_) => e,
                            other => ButterflyError::service(client.kind(), other.to_string()),
                        })?;
                    client.analyze(&records).await
                }
            })
            .collect();

        let kinds = self.clients.iter().map(AnalysisClient::kind);
        let mut outcomes = Vec::with_capacity(self.clients.len());
        for (kind, outcome) in kinds.zip(self.processor.process(futures).await) {
            match outcome {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("{} analysis failed: {}", kind, e);
                    outcomes.push((kind, Err(e)));
                }
                Ok(result) => outcomes.push((kind, Ok(result))),
            }
        }

        let report = aggregate(outcomes, self.max_action_items);
        info!(
            "Analysis finished: {} ({} of {} tasks succeeded)",
            report.health(),
            report.succeeded(),
            self.clients.len()
        );
        Ok(report)
    }
}

/// Folds task outcomes into a consolidated report.
///
/// Every task gets a slot; tasks missing from `outcomes` count as failed.
/// When a task appears twice the first outcome wins.
pub fn aggregate(outcomes: Vec<TaskOutcome>, max_action_items: usize) -> ConsolidatedReport {
    let mut analyses: BTreeMap<AnalysisKind, Option<AnalysisResult>> = BTreeMap::new();
    let mut failures: BTreeMap<AnalysisKind, String> = BTreeMap::new();

    for (kind, outcome) in outcomes {
        if analyses.contains_key(&kind) || failures.contains_key(&kind) {
            continue;
        }
        match outcome {
            Ok(result) => {
                analyses.insert(kind, Some(result));
            }
            Err(e) => {
                analyses.insert(kind, None);
                failures.insert(kind, e.to_string());
            }
        }
    }
    for kind in AnalysisKind::ALL {
        if !analyses.contains_key(&kind) {
            analyses.insert(kind, None);
            failures.insert(kind, "task did not run".to_string());
        }
    }

    let severities: BTreeMap<AnalysisKind, ProjectHealth> = analyses
        .iter()
        .filter_map(|(kind, slot)| {
            let rating = slot.as_ref()?.headline()?;
            Some((*kind, ProjectHealth::from_rating(rating)?))
        })
        .collect();

    let health = severities
        .values()
        .min()
        .copied()
        .unwrap_or(ProjectHealth::Unknown);

    let summary = AnalysisKind::SUMMARY_ORDER
        .iter()
        .map(|kind| match analyses.get(kind).and_then(Option::as_ref) {
            Some(result) => clause(*kind, result.headline().unwrap_or("unrated")),
            None => format!("{} analysis unavailable.", kind.label()),
        })
        .collect::<Vec<_>>()
        .join(" ");

    let action_items = prioritize(&analyses, &severities, max_action_items);

    ConsolidatedReport::new(health, summary, action_items, analyses, failures)
}

fn clause(kind: AnalysisKind, rating: &str) -> String {
    match kind {
        AnalysisKind::Architecture => format!("Architecture risk: {}.", rating),
        AnalysisKind::Quality => format!("Code quality: {}.", rating),
        AnalysisKind::Dependency => format!("Dependency health: {}.", rating),
        AnalysisKind::Performance => format!("Performance risk: {}.", rating),
        AnalysisKind::Static => format!("Static code health: {}.", rating),
    }
}

/// Recommendations from the most severe task first, ties broken by summary
/// order, first occurrence kept
fn prioritize(
    analyses: &BTreeMap<AnalysisKind, Option<AnalysisResult>>,
    severities: &BTreeMap<AnalysisKind, ProjectHealth>,
    cap: usize,
) -> Vec<String> {
    let mut ranked: Vec<(ProjectHealth, usize, &AnalysisResult)> = AnalysisKind::SUMMARY_ORDER
        .iter()
        .enumerate()
        .filter_map(|(position, kind)| {
            let result = analyses.get(kind)?.as_ref()?;
            let severity = severities.get(kind).copied().unwrap_or(ProjectHealth::Unknown);
            Some((severity, position, result))
        })
        .collect();
    ranked.sort_by_key(|(severity, position, _)| (*severity, *position));

    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .flat_map(|(_, _, result)| result.recommendations())
        .map(str::trim)
        .filter(|item| !item.is_empty() && seen.insert(item.to_string()))
        .take(cap)
        .map(str::to_string)
        .collect()
}
