//! Codebase analysis
//!
//! File selection, prompt building, the structured-completion client and
//! the aggregator that turns five task results into one report.

pub mod aggregator;
/// One task against the completion service
pub mod client;
/// Prompt assembly
pub mod prompt;
pub mod report;
/// Validated task output
pub mod result;
pub mod schema;
pub mod selector;
pub mod service;
pub mod task;

pub use aggregator::{aggregate, ReportAggregator, TaskOutcome, DEFAULT_MAX_ACTION_ITEMS};
pub use client::AnalysisClient;
pub use prompt::Prompt;
pub use report::{ConsolidatedReport, ProjectHealth};
pub use result::AnalysisResult;
pub use schema::{Field, FieldType, OutputSchema};
pub use selector::{FileRecord, FileSelector, SelectionLimits};
pub use service::{CompletionRequest, CompletionService, OpenAiCompletionService};
pub use task::{AnalysisKind, AnalysisTask};
