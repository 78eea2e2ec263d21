//! One analysis run end to end, and the periodic scheduler that repeats it

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::analysis::{CompletionService, ConsolidatedReport, FileSelector, ReportAggregator};
use crate::broker::{Broker, BrokerEvent};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{self, ReportStore};

/// Runs the aggregator over a root and hands the report to every sink
pub struct Pipeline {
    aggregator: ReportAggregator,
    root: PathBuf,
    reports: Option<(ReportStore, String)>,
    json_path: Option<PathBuf>,
    broker: Option<Broker>,
}

impl Pipeline {
    /// A pipeline with no sinks attached
    pub fn new(aggregator: ReportAggregator, root: impl Into<PathBuf>) -> Self {
        Self {
            aggregator,
            root: root.into(),
            reports: None,
            json_path: None,
            broker: None,
        }
    }

    /// Aggregator and JSON output built from configuration.
    ///
    /// Database and broker sinks are attached by the caller.
    pub fn from_config(config: &Config, service: Arc<dyn CompletionService>) -> Self {
        let aggregator = ReportAggregator::from_tasks(
            config.tasks(),
            service,
            FileSelector::new(config.selection_limits()),
        )
        .with_max_concurrent(config.completion.max_concurrent)
        .with_max_action_items(config.report.max_action_items);

        let mut pipeline = Self::new(aggregator, config.project_root.clone());
        pipeline.json_path = config.report_json_path();
        pipeline
    }

    /// Stores every report in `store` under `user_id`
    pub fn with_report_store(mut self, store: ReportStore, user_id: impl Into<String>) -> Self {
        self.reports = Some((store, user_id.into()));
        self
    }

    /// Writes every report to `path` as pretty JSON
    pub fn with_json_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_path = Some(path.into());
        self
    }

    /// Announces every report on `broker`
    pub fn with_broker(mut self, broker: Broker) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Directory being analysed
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Analyses the root once.
    ///
    /// Only a fatal analysis error fails the run. A sink that cannot take
    /// the report is logged and skipped.
    pub async fn run(&self) -> Result<ConsolidatedReport> {
        let report = self.aggregator.run(&self.root).await?;

        if let Some((store, user_id)) = &self.reports {
            let store = store.clone();
            let user_id = user_id.clone();
            let owned = report.clone();
            match tokio::task::spawn_blocking(move || store.save(&user_id, &owned)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("Failed to store report: {}", e),
                Err(e) => error!("Report storage task failed: {}", e),
            }
        }

        if let Some(path) = &self.json_path {
            if let Err(e) = storage::write_json(path, &report) {
                error!("Failed to write {}: {}", path.display(), e);
            }
        }

        if let Some(broker) = &self.broker {
            broker.publish(BrokerEvent::report_generated(&report));
        }

        Ok(report)
    }
}

/// Repeats a pipeline on a fixed period until cancelled
pub struct Scheduler;

impl Scheduler {
    /// Spawns the loop. The first run happens one `period` from now.
    ///
    /// Errors from a run are logged and the loop carries on. The handle
    /// resolves to the number of completed runs once `token` is cancelled.
    pub fn spawn(pipeline: Arc<Pipeline>, period: Duration, token: CancellationToken) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut runs = 0;

            info!("Scheduling analysis of {} every {:?}", pipeline.root().display(), period);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    outcome = pipeline.run() => {
                        runs += 1;
                        match outcome {
                            Ok(report) => info!("Scheduled run {} finished: {}", runs, report.health()),
                            Err(e) => warn!("Scheduled run {} failed: {}", runs, e),
                        }
                    }
                }
            }

            info!("Scheduler stopped after {} runs", runs);
            runs
        })
    }
}
