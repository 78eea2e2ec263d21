//! Consolidated report persistence

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::info;
use rusqlite::params;
use serde::Serialize;
use serde_json::Value;

use super::database::Database;
use crate::analysis::ConsolidatedReport;
use crate::error::{ButterflyError, Result};

/// One persisted report row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredReport {
    /// Row id, increasing with insertion order
    pub id: i64,
    /// Owner of the analysed project
    pub user_id: String,
    /// When the report was stored
    pub timestamp: DateTime<Utc>,
    /// Overall verdict
    #[serde(rename = "overallProjectHealth")]
    pub overall_project_health: String,
    /// Overall summary sentence
    #[serde(rename = "overallSummary")]
    pub overall_summary: String,
    /// The full report document
    pub formatted_report: Value,
}

/// Appends reports to `analysis_results` and reads them back
#[derive(Clone)]
pub struct ReportStore {
    db: Database,
}

impl ReportStore {
    /// Create a store over `db`
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Stores `report` for `user_id`, returning the row id
    pub fn save(&self, user_id: &str, report: &ConsolidatedReport) -> Result<i64> {
        let document = serde_json::to_string(report)?;
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO analysis_results
                (user_id, timestamp, overall_project_health, overall_summary, formatted_report)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                Utc::now().to_rfc3339(),
                report.health().as_str(),
                report.summary(),
                document
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("Stored report {} for {}", id, user_id);
        Ok(id)
    }

    /// Most recently stored report
    pub fn latest(&self) -> Result<Option<StoredReport>> {
        let conn = self.db.connection()?;
        let result = conn.query_row(
            "SELECT id, user_id, timestamp, overall_project_health, overall_summary, formatted_report
             FROM analysis_results ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        );

        let (id, user_id, timestamp, health, summary, document) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| ButterflyError::Message(format!("invalid timestamp '{}': {}", timestamp, e)))?
            .with_timezone(&Utc);

        Ok(Some(StoredReport {
            id,
            user_id,
            timestamp,
            overall_project_health: health,
            overall_summary: summary,
            formatted_report: serde_json::from_str(&document)?,
        }))
    }

    /// Number of stored reports
    pub fn count(&self) -> Result<i64> {
        let conn = self.db.connection()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM analysis_results", [], |row| row.get(0))?)
    }
}

/// Writes `report` as pretty-printed JSON, creating parent directories
pub fn write_json(path: &Path, report: &ConsolidatedReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, report.to_json_pretty()?)?;
    info!("Report written to {}", path.display());
    Ok(())
}
