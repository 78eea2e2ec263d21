//! SQLite-backed persistence for API keys, user accounts and analysis reports

pub mod database;
pub mod keys;
pub mod reports;
pub mod users;

pub use database::Database;
pub use keys::{ApiKeyRecord, KeyStore};
pub use reports::{write_json, ReportStore, StoredReport};
pub use users::UserStore;
