#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]

//! Butterfly - scheduled, LLM-backed codebase health analysis
//!
//! Five analysis tasks (architecture, static analysis, code quality,
//! dependencies, performance) each select files from a project, send them to
//! a chat-completions endpoint and validate the structured answer. The
//! aggregator folds the five answers into one [`ConsolidatedReport`].
//!
//! ## Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use butterfly::{Config, OpenAiCompletionService, Pipeline};
//!
//! async fn example() -> butterfly::Result<()> {
//!     let config = Config::load(std::path::Path::new("."))?;
//!     let service = OpenAiCompletionService::new(&config.completion, config.api_keys.openai_api_key()?)?;
//!     let report = Pipeline::from_config(&config, Arc::new(service)).run().await?;
//!     println!("{}", report.health());
//!     Ok(())
//! }
//! ```

/// File selection, prompts, completion client, aggregation
pub mod analysis;
/// HTTP and WebSocket routes
pub mod api;
/// Password hashing and access tokens for user accounts
pub mod auth;
/// In-process publish/subscribe for report notifications
pub mod broker;
/// Terminal rendering for the CLI
pub mod cli;
/// Configuration module for the application
pub mod config;
/// Error handling types and utilities
pub mod error;
/// Logging configuration and utilities
pub mod logging;
/// Parallel processing utilities
pub mod parallel;
/// End-to-end analysis runs and the periodic scheduler
pub mod pipeline;
/// Per-client request limiting
pub mod rate_limiter;
/// API key and report persistence
pub mod storage;
/// Utilities (path normalization, retry helpers)
pub mod utils;

pub use analysis::{
    AnalysisClient, AnalysisKind, AnalysisResult, AnalysisTask, CompletionService,
    ConsolidatedReport, OpenAiCompletionService, ProjectHealth, ReportAggregator,
};
pub use broker::{Broker, BrokerEvent};
pub use config::Config;
pub use error::{ButterflyError, Result};
pub use pipeline::{Pipeline, Scheduler};
pub use storage::{Database, KeyStore, ReportStore, UserStore};
